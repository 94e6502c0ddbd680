//! Helpers for unit tests: an in-memory class file writer and class source.

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};
use color_eyre::eyre;

use crate::source::ClassSource;

/// Writes minimal but well-formed class files. Members carry no attributes;
/// the class carries a `SourceFile` attribute.
pub struct ClassFileBuilder {
    name: String,
    access: u16,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<(u16, String, String)>,
    methods: Vec<(u16, String, String)>,
    long_constants: Vec<i64>,
}

impl ClassFileBuilder {
    pub fn new(name: &str) -> ClassFileBuilder {
        ClassFileBuilder {
            name: name.to_owned(),
            access: 0x0021,
            super_class: Some("java/lang/Object".to_owned()),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            long_constants: vec![],
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.access = flags;
        self
    }

    pub fn super_class(mut self, name: Option<&str>) -> Self {
        self.super_class = name.map(str::to_owned);
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_owned());
        self
    }

    pub fn field(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        self.fields
            .push((flags, name.to_owned(), descriptor.to_owned()));
        self
    }

    pub fn method(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        self.methods
            .push((flags, name.to_owned(), descriptor.to_owned()));
        self
    }

    pub fn long_constant(mut self, value: i64) -> Self {
        self.long_constants.push(value);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = PoolWriter::default();

        for value in &self.long_constants {
            pool.long(*value);
        }

        let this_class = pool.class(&self.name);
        let super_class = self.super_class.as_deref().map_or(0, |name| pool.class(name));
        let interfaces = self
            .interfaces
            .iter()
            .map(|name| pool.class(name))
            .collect::<Vec<_>>();
        let fields = self
            .fields
            .iter()
            .map(|(flags, name, desc)| (*flags, pool.utf8(name), pool.utf8(desc)))
            .collect::<Vec<_>>();
        let methods = self
            .methods
            .iter()
            .map(|(flags, name, desc)| (*flags, pool.utf8(name), pool.utf8(desc)))
            .collect::<Vec<_>>();

        let simple_name = self.name.rsplit('/').next().unwrap_or(&self.name);
        let source_file_name = pool.utf8("SourceFile");
        let source_file = pool.utf8(&format!("{simple_name}.java"));

        let mut out = vec![];
        out.write_u32::<BigEndian>(0xcafebabe).unwrap();
        out.write_u16::<BigEndian>(0).unwrap();
        out.write_u16::<BigEndian>(61).unwrap();
        out.write_u16::<BigEndian>(pool.next_index).unwrap();
        out.extend_from_slice(&pool.bytes);
        out.write_u16::<BigEndian>(self.access).unwrap();
        out.write_u16::<BigEndian>(this_class).unwrap();
        out.write_u16::<BigEndian>(super_class).unwrap();

        out.write_u16::<BigEndian>(interfaces.len() as u16).unwrap();
        for index in interfaces {
            out.write_u16::<BigEndian>(index).unwrap();
        }

        for members in [fields, methods] {
            out.write_u16::<BigEndian>(members.len() as u16).unwrap();
            for (flags, name, descriptor) in members {
                out.write_u16::<BigEndian>(flags).unwrap();
                out.write_u16::<BigEndian>(name).unwrap();
                out.write_u16::<BigEndian>(descriptor).unwrap();
                out.write_u16::<BigEndian>(0).unwrap();
            }
        }

        out.write_u16::<BigEndian>(1).unwrap();
        out.write_u16::<BigEndian>(source_file_name).unwrap();
        out.write_u32::<BigEndian>(2).unwrap();
        out.write_u16::<BigEndian>(source_file).unwrap();

        out
    }
}

struct PoolWriter {
    bytes: Vec<u8>,
    next_index: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Default for PoolWriter {
    fn default() -> Self {
        PoolWriter {
            bytes: vec![],
            next_index: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}

impl PoolWriter {
    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        self.bytes.push(1);
        self.bytes
            .write_u16::<BigEndian>(value.len() as u16)
            .unwrap();
        self.bytes.extend_from_slice(value.as_bytes());
        let index = self.push(1);
        self.utf8.insert(value.to_owned(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        self.bytes.push(7);
        self.bytes.write_u16::<BigEndian>(name_index).unwrap();
        let index = self.push(1);
        self.classes.insert(name.to_owned(), index);
        index
    }

    fn long(&mut self, value: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.write_i64::<BigEndian>(value).unwrap();
        self.push(2)
    }

    fn push(&mut self, slots: u16) -> u16 {
        let index = self.next_index;
        self.next_index += slots;
        index
    }
}

/// Class source over a map of internal name to class bytes.
#[derive(Default)]
pub struct InMemorySource {
    classes: HashMap<String, Vec<u8>>,
}

impl InMemorySource {
    pub fn insert(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.classes.insert(name.to_owned(), bytes);
        self
    }

    pub fn class(
        self,
        name: &str,
        build: impl FnOnce(ClassFileBuilder) -> ClassFileBuilder,
    ) -> Self {
        let bytes = build(ClassFileBuilder::new(name)).build();
        self.insert(name, bytes)
    }
}

impl ClassSource for InMemorySource {
    fn read_class(&mut self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(internal_name).cloned())
    }

    fn describe(&self) -> String {
        "<memory>".to_owned()
    }
}

/// A few JDK shapes shared by locator and coercer tests.
pub fn jdk_basics() -> InMemorySource {
    InMemorySource::default()
        .class("java/lang/Object", |c| {
            c.super_class(None)
                .method(0x0001, "<init>", "()V")
                .method(0x0001, "toString", "()Ljava/lang/String;")
                .method(0x0001, "hashCode", "()I")
        })
        .class("java/lang/CharSequence", |c| {
            c.access(0x0601).method(0x0401, "length", "()I")
        })
        .class("java/lang/Comparable", |c| c.access(0x0601))
        .class("java/lang/String", |c| {
            c.access(0x0031)
                .interface("java/lang/CharSequence")
                .interface("java/lang/Comparable")
                .method(0x0001, "<init>", "(Ljava/lang/String;)V")
                .method(0x0001, "length", "()I")
                .method(0x0001, "toUpperCase", "()Ljava/lang/String;")
                .method(0x0001, "repeat", "(I)Ljava/lang/String;")
                .method(0x0001, "charAt", "(I)C")
                .method(0x1041, "compareTo", "(Ljava/lang/Object;)I")
                .method(0x0001, "compareTo", "(Ljava/lang/String;)I")
                .method(0x0001, "chars", "()Ljava/util/stream/IntStream;")
                .method(0x0089, "format", "(Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/String;")
                .method(0x0009, "valueOf", "(I)Ljava/lang/String;")
                .method(0x0009, "valueOf", "(J)Ljava/lang/String;")
                .method(0x0009, "valueOf", "(Z)Ljava/lang/String;")
                .method(0x0009, "valueOf", "(C)Ljava/lang/String;")
                .method(0x0009, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;")
        })
        .class("java/lang/Number", |c| c.access(0x0421))
        .class("java/lang/Integer", |c| {
            c.access(0x0031)
                .super_class(Some("java/lang/Number"))
                .method(0x0009, "parseInt", "(Ljava/lang/String;)I")
                .method(0x0009, "parseInt", "(Ljava/lang/String;I)I")
                .method(0x0009, "toHexString", "(I)Ljava/lang/String;")
                .method(0x0009, "valueOf", "(I)Ljava/lang/Integer;")
                .method(0x0009, "valueOf", "(Ljava/lang/String;)Ljava/lang/Integer;")
                .method(0x0001, "<init>", "(I)V")
                .method(0x0001, "<init>", "(Ljava/lang/String;)V")
                .method(0x0001, "intValue", "()I")
        })
        .class("java/lang/Math", |c| {
            c.access(0x0031)
                .method(0x0002, "<init>", "()V")
                .method(0x0009, "max", "(II)I")
                .method(0x0009, "max", "(JJ)J")
                .method(0x0009, "max", "(FF)F")
                .method(0x0009, "max", "(DD)D")
                .method(0x0009, "sqrt", "(D)D")
                .method(0x0009, "abs", "(I)I")
                .method(0x0009, "abs", "(J)J")
                .method(0x0009, "abs", "(D)D")
                .method(0x0009, "random", "()D")
        })
        .class("java/lang/Enum", |c| {
            c.access(0x0421).method(0x0011, "name", "()Ljava/lang/String;")
        })
        .class("java/time/DayOfWeek", |c| {
            c.access(0x4031)
                .super_class(Some("java/lang/Enum"))
                .field(0x4019, "MONDAY", "Ljava/time/DayOfWeek;")
                .field(0x4019, "TUESDAY", "Ljava/time/DayOfWeek;")
                .method(0x0009, "valueOf", "(Ljava/lang/String;)Ljava/time/DayOfWeek;")
                .method(0x0001, "plus", "(J)Ljava/time/DayOfWeek;")
        })
        .class("java/util/UUID", |c| {
            c.access(0x0031)
                .method(0x0001, "<init>", "(JJ)V")
                .method(0x0009, "randomUUID", "()Ljava/util/UUID;")
                .method(0x0009, "fromString", "(Ljava/lang/String;)Ljava/util/UUID;")
                .method(0x0001, "version", "()I")
        })
        .class("java/lang/StringBuilder", |c| {
            c.access(0x0031)
                .method(0x0001, "<init>", "()V")
                .method(0x0001, "<init>", "(Ljava/lang/String;)V")
                .method(0x0001, "reverse", "()Ljava/lang/StringBuilder;")
                .method(0x0001, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
                .method(0x0001, "append", "(Ljava/lang/CharSequence;)Ljava/lang/StringBuilder;")
                .method(0x0001, "append", "(Ljava/lang/Object;)Ljava/lang/StringBuilder;")
                .method(0x0001, "append", "(I)Ljava/lang/StringBuilder;")
                .method(0x0001, "append", "(Z)Ljava/lang/StringBuilder;")
        })
        .class("java/lang/Thread", |c| {
            c.method(0x0009, "sleep", "(J)V")
                .method(0x0001, "<init>", "()V")
        })
        .class("com/example/Ambiguous", |c| {
            c.method(0x0009, "pick", "(Ljava/lang/Integer;)Ljava/lang/String;")
                .method(0x0009, "pick", "(Ljava/lang/Long;)Ljava/lang/String;")
                .method(0x0009, "days", "(Ljava/time/DayOfWeek;)I")
                .method(0x0009, "typeOf", "(Ljava/lang/Class;)Ljava/lang/String;")
                .method(0x0009, "bump", "(IZ)I")
                .method(0x0009, "initial", "(C)C")
                .method(0x0009, "sum", "([I)I")
        })
}
