use std::fmt::{self, Debug};

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use color_eyre::eyre::{self, eyre, ContextCompat, WrapErr};
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;

use crate::class_file::{ClassAccessFlags, ClassFile, FieldAccessFlags, MethodAccessFlags};
use crate::descriptor::{self, FieldType, MethodDescriptor};

pub const CONSTRUCTOR: &str = "<init>";

/// Metadata view of a loaded class: names resolved out of the constant pool
/// and method descriptors parsed.
pub struct Class<'a> {
    class_file: &'a ClassFile<'a>,
    name: &'a str,
    super_name: Option<&'a str>,
    interfaces: BumpVec<'a, &'a str>,
    methods: BumpVec<'a, Method<'a>>,
    method_index: HashMap<MethodId<'a>, usize, DefaultHashBuilder, &'a Bump>,
    enum_constants: BumpVec<'a, &'a str>,
}

#[derive(Debug)]
pub struct Method<'a> {
    pub name: &'a str,
    pub descriptor: &'a str,
    pub signature: MethodDescriptor<'a>,
    pub access_flags: MethodAccessFlags,
}

impl<'a> Class<'a> {
    pub fn new(arena: &'a Bump, class_file: &'a ClassFile<'a>) -> eyre::Result<Class<'a>> {
        let pool = &class_file.constant_pool;

        let name = class_file.name().wrap_err("missing class name in constant pool")?;

        let super_name = match class_file.super_class {
            0 => None,
            _ => Some(
                class_file
                    .super_name()
                    .wrap_err("invalid super class in constant pool")?,
            ),
        };

        let mut interfaces = BumpVec::with_capacity_in(class_file.interfaces.len(), arena);
        for index in &class_file.interfaces {
            interfaces.push(
                pool.class_name(*index)
                    .wrap_err("invalid interface in constant pool")?,
            );
        }

        let mut methods = BumpVec::with_capacity_in(class_file.methods.len(), arena);
        let mut method_index = HashMap::new_in(arena);
        for method in &class_file.methods {
            let method_name = pool
                .utf8(method.name_index)
                .wrap_err("invalid method name in constant pool")?;

            let descriptor = pool
                .utf8(method.descriptor_index)
                .wrap_err("invalid method descriptor in constant pool")?;

            let signature = descriptor::parse_method_descriptor(arena, descriptor)
                .wrap_err_with(|| eyre!("bad descriptor for {name}.{method_name}"))?;

            method_index.insert(
                MethodId {
                    name: method_name,
                    descriptor,
                },
                methods.len(),
            );
            methods.push(Method {
                name: method_name,
                descriptor,
                signature,
                access_flags: method.access_flags,
            });
        }

        let mut enum_constants = BumpVec::new_in(arena);
        if class_file.access_flags.contains(ClassAccessFlags::ENUM) {
            for field in &class_file.fields {
                if field.access_flags.contains(FieldAccessFlags::ENUM) {
                    enum_constants.push(
                        pool.utf8(field.name_index)
                            .wrap_err("invalid field name in constant pool")?,
                    );
                }
            }
        }

        Ok(Class {
            class_file,
            name,
            super_name,
            interfaces,
            methods,
            method_index,
            enum_constants,
        })
    }

    /// Internal name, e.g. `java/lang/Integer`.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Binary name as written on the command line, e.g. `java.lang.Integer`.
    pub fn binary_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn super_name(&self) -> Option<&'a str> {
        self.super_name
    }

    pub fn interfaces(&self) -> &[&'a str] {
        &self.interfaces
    }

    pub fn source_file(&self) -> Option<&'a str> {
        self.class_file.source_file()
    }

    pub fn is_interface(&self) -> bool {
        self.class_file
            .access_flags
            .contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.class_file
            .access_flags
            .intersects(ClassAccessFlags::ABSTRACT | ClassAccessFlags::INTERFACE)
    }

    pub fn is_enum(&self) -> bool {
        self.class_file.access_flags.contains(ClassAccessFlags::ENUM)
    }

    pub fn enum_constants(&self) -> &[&'a str] {
        &self.enum_constants
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> &[Method<'a>] {
        &self.methods
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method<'a>> {
        self.method_index
            .get(&MethodId { name, descriptor })
            .map(|i| &self.methods[*i])
    }

    pub fn has_public_constructor(&self, descriptor: &str) -> bool {
        self.method(CONSTRUCTOR, descriptor)
            .is_some_and(|ctor| ctor.is_public())
    }
}

impl<'a> Method<'a> {
    pub fn is_public(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PUBLIC)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_varargs(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::VARARGS)
    }

    /// Compiler-generated members that never show up as callable overloads.
    pub fn is_synthetic(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::BRIDGE | MethodAccessFlags::SYNTHETIC)
    }

    pub fn params(&self) -> &'a [FieldType<'a>] {
        self.signature.params
    }

    pub fn return_type(&self) -> Option<FieldType<'a>> {
        self.signature.return_type
    }
}

impl Debug for Class<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("super_name", &self.super_name)
            .field("interfaces", &self.interfaces)
            .field("methods", &self.method_index.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
struct MethodId<'a> {
    name: &'a str,
    descriptor: &'a str,
}

impl<'a> Debug for MethodId<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}{}\"", self.name, self.descriptor)
    }
}
