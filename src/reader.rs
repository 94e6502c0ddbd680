use std::io::{self, Read};

use bumpalo::collections::{String as BumpString, Vec as BumpVec};
use bumpalo::Bump;
use byteorder::{BigEndian, ReadBytesExt};
use color_eyre::eyre::{self, bail, Context};

use crate::class_file::constant_pool::{self, ConstantInfo, ConstantPool};
use crate::class_file::{
    AttributeInfo, ClassAccessFlags, ClassFile, CustomAttribute, FieldAccessFlags, FieldInfo,
    MethodAccessFlags, MethodInfo, SourceFileAttribute,
};

const MAGIC: u32 = 0xcafebabe;

pub struct ClassReader<'a, R> {
    arena: &'a Bump,
    reader: R,
}

impl<'a, R: io::Read> ClassReader<'a, R> {
    pub fn new(arena: &'a Bump, reader: R) -> ClassReader<'a, R> {
        ClassReader { arena, reader }
    }

    pub fn read_class_file(&mut self) -> eyre::Result<ClassFile<'a>> {
        let magic = self.read_u32()?;
        if magic != MAGIC {
            bail!("invalid magic bytes: 0x{magic:08x}");
        }

        let minor_version = self.read_u16()?;
        let major_version = self.read_u16()?;
        let constant_pool = self
            .read_constant_pool()
            .wrap_err("failed to read constant pool")?;
        let access_flags = ClassAccessFlags::from_bits_retain(self.read_u16()?);
        let this_class = self.read_u16()?;
        let super_class = self.read_u16()?;
        let interfaces = self.read_interfaces()?;
        let fields = self.read_fields(&constant_pool)?;
        let methods = self.read_methods(&constant_pool)?;
        let attributes = self.read_attributes(&constant_pool)?;

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn read_constant_pool(&mut self) -> eyre::Result<ConstantPool<'a>> {
        let constant_pool_count = self.read_u16()?;
        let mut constant_pool =
            BumpVec::with_capacity_in(constant_pool_count as usize, self.arena);

        let mut index = 1;
        while index < constant_pool_count {
            let tag = self.read_u8()?;
            let constant = match tag {
                1 => ConstantInfo::Utf8(self.read_utf8()?),
                3 => ConstantInfo::Integer(self.reader.read_i32::<BigEndian>()?),
                4 => ConstantInfo::Float(self.reader.read_f32::<BigEndian>()?),
                5 => ConstantInfo::Long(self.reader.read_i64::<BigEndian>()?),
                6 => ConstantInfo::Double(self.reader.read_f64::<BigEndian>()?),
                7 => ConstantInfo::Class(constant_pool::Class {
                    name_index: self.read_u16()?,
                }),
                8 => ConstantInfo::String(constant_pool::String {
                    string_index: self.read_u16()?,
                }),
                9 => ConstantInfo::FieldRef(self.read_member_ref()?),
                10 => ConstantInfo::MethodRef(self.read_member_ref()?),
                11 => ConstantInfo::InterfaceMethodRef(self.read_member_ref()?),
                12 => ConstantInfo::NameAndType(constant_pool::NameAndType {
                    name_index: self.read_u16()?,
                    descriptor_index: self.read_u16()?,
                }),
                15 => ConstantInfo::MethodHandle(constant_pool::MethodHandle {
                    reference_kind: self.read_u8()?,
                    reference_index: self.read_u16()?,
                }),
                16 => ConstantInfo::MethodType(constant_pool::MethodType {
                    descriptor_index: self.read_u16()?,
                }),
                17 => ConstantInfo::Dynamic(self.read_dynamic()?),
                18 => ConstantInfo::InvokeDynamic(self.read_dynamic()?),
                19 => ConstantInfo::Module(constant_pool::Named {
                    name_index: self.read_u16()?,
                }),
                20 => ConstantInfo::Package(constant_pool::Named {
                    name_index: self.read_u16()?,
                }),
                _ => bail!("unknown constant pool tag {tag} at index {index}"),
            };

            let wide = matches!(constant, ConstantInfo::Long(_) | ConstantInfo::Double(_));
            constant_pool.push(constant);
            index += 1;

            if wide {
                constant_pool.push(ConstantInfo::Unused);
                index += 1;
            }
        }

        Ok(ConstantPool(constant_pool))
    }

    fn read_utf8(&mut self) -> eyre::Result<BumpString<'a>> {
        let length = self.read_u16()? as usize;
        let mut bytes = vec![0; length];
        self.reader.read_exact(&mut bytes)?;
        Ok(BumpString::from_str_in(
            &decode_modified_utf8(&bytes),
            self.arena,
        ))
    }

    fn read_member_ref(&mut self) -> eyre::Result<constant_pool::MemberRef> {
        Ok(constant_pool::MemberRef {
            class_index: self.read_u16()?,
            name_and_type_index: self.read_u16()?,
        })
    }

    fn read_dynamic(&mut self) -> eyre::Result<constant_pool::Dynamic> {
        Ok(constant_pool::Dynamic {
            bootstrap_method_attr_index: self.read_u16()?,
            name_and_type_index: self.read_u16()?,
        })
    }

    fn read_interfaces(&mut self) -> eyre::Result<BumpVec<'a, u16>> {
        let interfaces_count = self.read_u16()?;
        let mut interfaces = BumpVec::with_capacity_in(interfaces_count as usize, self.arena);
        for _ in 0..interfaces_count {
            interfaces.push(self.read_u16().wrap_err("failed to read interfaces")?);
        }
        Ok(interfaces)
    }

    fn read_fields(&mut self, constant_pool: &ConstantPool) -> eyre::Result<BumpVec<'a, FieldInfo>> {
        let fields_count = self.read_u16()?;
        let mut fields = BumpVec::with_capacity_in(fields_count as usize, self.arena);
        for _ in 0..fields_count {
            let field = FieldInfo {
                access_flags: FieldAccessFlags::from_bits_retain(self.read_u16()?),
                name_index: self.read_u16()?,
                descriptor_index: self.read_u16()?,
            };
            self.skip_attributes(constant_pool)?;
            fields.push(field);
        }
        Ok(fields)
    }

    fn read_methods(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> eyre::Result<BumpVec<'a, MethodInfo>> {
        let methods_count = self.read_u16()?;
        let mut methods = BumpVec::with_capacity_in(methods_count as usize, self.arena);
        for _ in 0..methods_count {
            let method = MethodInfo {
                access_flags: MethodAccessFlags::from_bits_retain(self.read_u16()?),
                name_index: self.read_u16()?,
                descriptor_index: self.read_u16()?,
            };
            self.skip_attributes(constant_pool)?;
            methods.push(method);
        }
        Ok(methods)
    }

    fn read_attributes(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> eyre::Result<BumpVec<'a, AttributeInfo>> {
        let attributes_count = self.read_u16()?;
        let mut attributes = BumpVec::with_capacity_in(attributes_count as usize, self.arena);
        for _ in 0..attributes_count {
            attributes.push(self.read_attribute_info(constant_pool)?);
        }
        Ok(attributes)
    }

    fn read_attribute_info(&mut self, constant_pool: &ConstantPool) -> eyre::Result<AttributeInfo> {
        let attribute_name_index = self.read_u16()?;
        let length = self.read_u32()?;

        let Some(name) = constant_pool.utf8(attribute_name_index) else {
            bail!("invalid attribute name index: {attribute_name_index}")
        };

        let attribute_info = match name {
            "SourceFile" => AttributeInfo::SourceFile(SourceFileAttribute {
                sourcefile_index: self.read_u16()?,
            }),
            _ => {
                self.skip(length as u64)?;
                AttributeInfo::Custom(CustomAttribute {
                    attribute_name_index,
                    length,
                })
            }
        };

        Ok(attribute_info)
    }

    fn skip_attributes(&mut self, constant_pool: &ConstantPool) -> eyre::Result<()> {
        let attributes_count = self.read_u16()?;
        for _ in 0..attributes_count {
            let attribute_name_index = self.read_u16()?;
            if constant_pool.utf8(attribute_name_index).is_none() {
                bail!("invalid attribute name index: {attribute_name_index}");
            }
            let length = self.read_u32()?;
            self.skip(length as u64)?;
        }
        Ok(())
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        self.reader.read_u8()
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        self.reader.read_u16::<BigEndian>()
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        self.reader.read_u32::<BigEndian>()
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(n), &mut io::sink())?;
        if skipped != n {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }
}

/// Decodes the JVM's "modified UTF-8": NUL is encoded as `C0 80` and
/// supplementary characters as two encoded surrogates. Invalid sequences
/// become U+FFFD.
fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_owned();
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let continuation = |offset: usize| {
            bytes
                .get(i + offset)
                .filter(|c| *c & 0xc0 == 0x80)
                .map(|c| u16::from(c & 0x3f))
        };

        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            match continuation(1) {
                Some(c) => {
                    units.push((u16::from(b & 0x1f) << 6) | c);
                    i += 2;
                }
                None => {
                    units.push(0xfffd);
                    i += 1;
                }
            }
        } else if b & 0xf0 == 0xe0 {
            match (continuation(1), continuation(2)) {
                (Some(c1), Some(c2)) => {
                    units.push((u16::from(b & 0x0f) << 12) | (c1 << 6) | c2);
                    i += 3;
                }
                _ => {
                    units.push(0xfffd);
                    i += 1;
                }
            }
        } else {
            units.push(0xfffd);
            i += 1;
        }
    }

    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bumpalo::Bump;

    use super::*;
    use crate::testing::ClassFileBuilder;

    #[test]
    fn reads_generated_class_file() {
        let bytes = ClassFileBuilder::new("com/example/Calculator")
            .interface("java/lang/Runnable")
            .field(0x0019, "ZERO", "I")
            .method(0x0009, "add", "(II)I")
            .method(0x0001, "run", "()V")
            .build();

        let arena = Bump::new();
        let class_file = ClassReader::new(&arena, Cursor::new(bytes))
            .read_class_file()
            .unwrap();

        assert_eq!(class_file.name(), Some("com/example/Calculator"));
        assert_eq!(class_file.super_name(), Some("java/lang/Object"));
        assert_eq!(class_file.source_file(), Some("Calculator.java"));
        assert_eq!(class_file.interfaces.len(), 1);
        assert_eq!(class_file.fields.len(), 1);
        assert_eq!(class_file.methods.len(), 2);

        let add = &class_file.methods[0];
        assert!(add.access_flags.contains(MethodAccessFlags::STATIC));
        assert_eq!(class_file.constant_pool.utf8(add.name_index), Some("add"));
        assert_eq!(
            class_file.constant_pool.utf8(add.descriptor_index),
            Some("(II)I")
        );
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let bytes = ClassFileBuilder::new("com/example/Wide")
            .long_constant(42)
            .method(0x0001, "get", "()J")
            .build();

        let arena = Bump::new();
        let class_file = ClassReader::new(&arena, Cursor::new(bytes))
            .read_class_file()
            .unwrap();

        let long_index = (1..=class_file.constant_pool.len() as u16)
            .find(|i| matches!(class_file.constant_pool.get(*i), Some(ConstantInfo::Long(42))))
            .unwrap();
        assert!(matches!(
            class_file.constant_pool.get(long_index + 1),
            Some(ConstantInfo::Unused)
        ));
        assert_eq!(class_file.name(), Some("com/example/Wide"));
    }

    #[test]
    fn rejects_bad_magic() {
        let arena = Bump::new();
        let err = ClassReader::new(&arena, Cursor::new(vec![0xca, 0xfe, 0xd0, 0x0d, 0, 0]))
            .read_class_file()
            .unwrap_err();
        insta::assert_snapshot!(err, @"invalid magic bytes: 0xcafed00d");
    }

    #[test]
    fn rejects_truncated_class() {
        let mut bytes = ClassFileBuilder::new("com/example/Cut").build();
        bytes.truncate(bytes.len() / 2);

        let arena = Bump::new();
        assert!(ClassReader::new(&arena, Cursor::new(bytes))
            .read_class_file()
            .is_err());
    }

    #[test]
    fn decodes_modified_utf8() {
        assert_eq!(decode_modified_utf8(b"plain"), "plain");
        assert_eq!(decode_modified_utf8(&[b'a', 0xc0, 0x80, b'b']), "a\0b");
        // U+1F600 as a surrogate pair, each encoded in three bytes
        assert_eq!(
            decode_modified_utf8(&[0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]),
            "\u{1F600}"
        );
    }
}
