use bitflags::bitflags;
use bumpalo::collections::Vec;
use strum::EnumTryAs;

use self::constant_pool::ConstantPool;

#[derive(Debug)]
pub struct ClassFile<'a> {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool<'a>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<'a, u16>,
    pub fields: Vec<'a, FieldInfo>,
    pub methods: Vec<'a, MethodInfo>,
    pub attributes: Vec<'a, AttributeInfo>,
}

impl<'a> ClassFile<'a> {
    /// Internal name of this class, e.g. `java/lang/Integer`.
    pub fn name(&self) -> Option<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// `None` only for `java/lang/Object` (and module descriptors).
    pub fn super_name(&self) -> Option<&str> {
        if self.super_class == 0 {
            return None;
        }
        self.constant_pool.class_name(self.super_class)
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find_map(AttributeInfo::try_as_source_file_ref)
            .and_then(|attr| self.constant_pool.utf8(attr.sourcefile_index))
    }
}

pub mod constant_pool {
    use strum::EnumTryAs;

    #[derive(Debug)]
    pub struct ConstantPool<'a>(pub(crate) bumpalo::collections::Vec<'a, ConstantInfo<'a>>);

    impl<'a> ConstantPool<'a> {
        pub fn get(&self, index: u16) -> Option<&ConstantInfo<'a>> {
            self.0.get(index.checked_sub(1)? as usize)
        }

        pub fn utf8(&self, index: u16) -> Option<&str> {
            self.get(index)?.try_as_utf_8_ref().map(|s| s.as_str())
        }

        /// Resolves a `CONSTANT_Class` entry to the class's internal name.
        pub fn class_name(&self, index: u16) -> Option<&str> {
            let class = self.get(index)?.try_as_class_ref()?;
            self.utf8(class.name_index)
        }

        pub fn len(&self) -> usize {
            self.0.len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }

    #[derive(Debug, EnumTryAs)]
    pub enum ConstantInfo<'a> {
        /// The second slot taken by `Long` and `Double` constants.
        Unused,
        Utf8(bumpalo::collections::String<'a>),
        Integer(i32),
        Float(f32),
        Long(i64),
        Double(f64),
        Class(Class),
        String(String),
        FieldRef(MemberRef),
        MethodRef(MemberRef),
        InterfaceMethodRef(MemberRef),
        NameAndType(NameAndType),
        MethodHandle(MethodHandle),
        MethodType(MethodType),
        Dynamic(Dynamic),
        InvokeDynamic(Dynamic),
        Module(Named),
        Package(Named),
    }

    #[derive(Debug)]
    pub struct Class {
        pub name_index: u16,
    }

    #[derive(Debug)]
    pub struct String {
        pub string_index: u16,
    }

    #[derive(Debug)]
    pub struct MemberRef {
        pub class_index: u16,
        pub name_and_type_index: u16,
    }

    #[derive(Debug)]
    pub struct NameAndType {
        pub name_index: u16,
        pub descriptor_index: u16,
    }

    #[derive(Debug)]
    pub struct MethodHandle {
        pub reference_kind: u8,
        pub reference_index: u16,
    }

    #[derive(Debug)]
    pub struct MethodType {
        pub descriptor_index: u16,
    }

    #[derive(Debug)]
    pub struct Dynamic {
        pub bootstrap_method_attr_index: u16,
        pub name_and_type_index: u16,
    }

    #[derive(Debug)]
    pub struct Named {
        pub name_index: u16,
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug)]
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

#[derive(Debug)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
}

bitflags! {
    #[derive(Clone, Copy, Debug)]
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// Class-level attributes. Member attributes (`Code`, `Signature`, ...) are
/// skipped by the reader since only member signatures are needed.
#[derive(Debug, EnumTryAs)]
pub enum AttributeInfo {
    SourceFile(SourceFileAttribute),
    Custom(CustomAttribute),
}

#[derive(Debug)]
pub struct SourceFileAttribute {
    pub sourcefile_index: u16,
}

#[derive(Debug)]
pub struct CustomAttribute {
    pub attribute_name_index: u16,
    pub length: u32,
}
