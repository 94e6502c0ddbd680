use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;

use bumpalo::Bump;
use color_eyre::eyre::{self, bail, WrapErr};
use tracing::{debug, trace};

use crate::class::Class;
use crate::error::JcliError;
use crate::reader::ClassReader;
use crate::source::ClassSource;

/// Loads class metadata from an ordered list of sources. The first source
/// that has a class wins. Nothing is initialized and no code runs.
pub struct ClassLoader<'a> {
    arena: &'a Bump,
    sources: Vec<Box<dyn ClassSource + 'a>>,
    classes: HashMap<&'a str, &'a Class<'a>>,
    missing: HashSet<String>,
}

impl<'a> ClassLoader<'a> {
    pub fn new(arena: &'a Bump, sources: Vec<Box<dyn ClassSource + 'a>>) -> ClassLoader<'a> {
        ClassLoader {
            arena,
            sources,
            classes: HashMap::new(),
            missing: HashSet::new(),
        }
    }

    /// Looks a class up by binary (`java.util.Map.Entry`) or internal
    /// (`java/util/Map$Entry`) name. Dotted names that do not resolve are
    /// retried as nested classes.
    pub fn load_class(&mut self, name: &str) -> Result<Option<&'a Class<'a>>, JcliError> {
        let internal = name.replace('.', "/");
        if let Some(class) = self.load_internal(&internal)? {
            return Ok(Some(class));
        }

        if !name.contains('.') {
            return Ok(None);
        }

        // java/util/Map/Entry -> java/util/Map$Entry -> java/util$Map$Entry
        let mut candidate = internal;
        while let Some(pos) = candidate.rfind('/') {
            candidate.replace_range(pos..=pos, "$");
            if let Some(class) = self.load_internal(&candidate)? {
                return Ok(Some(class));
            }
        }

        Ok(None)
    }

    pub fn require_class(&mut self, name: &str) -> Result<&'a Class<'a>, JcliError> {
        self.load_class(name)?
            .ok_or_else(|| JcliError::ClassNotFound(name.replace('/', ".")))
    }

    fn load_internal(&mut self, internal_name: &str) -> Result<Option<&'a Class<'a>>, JcliError> {
        if let Some(class) = self.classes.get(internal_name).copied() {
            return Ok(Some(class));
        }

        if self.missing.contains(internal_name) {
            return Ok(None);
        }

        let binary_name = internal_name.replace('/', ".");
        let Some((bytes, origin)) = self
            .find_bytes(internal_name)
            .map_err(|e| JcliError::malformed_class(&binary_name, e))?
        else {
            trace!(class = internal_name, "not found on classpath");
            self.missing.insert(internal_name.to_owned());
            return Ok(None);
        };

        let class = self
            .define(internal_name, bytes)
            .wrap_err_with(|| format!("from {origin}"))
            .map_err(|e| JcliError::malformed_class(&binary_name, e))?;

        debug!(
            class = %binary_name,
            %origin,
            source_file = class.source_file().unwrap_or("?"),
            "loaded class"
        );
        self.classes.insert(class.name(), class);

        Ok(Some(class))
    }

    fn find_bytes(&mut self, internal_name: &str) -> eyre::Result<Option<(Vec<u8>, String)>> {
        for source in &mut self.sources {
            if let Some(bytes) = source.read_class(internal_name)? {
                return Ok(Some((bytes, source.describe())));
            }
        }
        Ok(None)
    }

    fn define(&self, internal_name: &str, bytes: Vec<u8>) -> eyre::Result<&'a Class<'a>> {
        let class_file = self.arena.alloc(
            ClassReader::new(self.arena, Cursor::new(bytes))
                .read_class_file()
                .wrap_err("failed to read class file")?,
        );

        let class = self.arena.alloc(Class::new(self.arena, class_file)?);
        if class.name() != internal_name {
            bail!("class file declares {}", class.binary_name());
        }

        Ok(class)
    }

    /// The class followed by its superclasses, then every interface it
    /// implements directly or indirectly, each listed once. Supertypes that
    /// cannot be found are left out.
    pub fn hierarchy(&mut self, class: &'a Class<'a>) -> Result<Vec<&'a Class<'a>>, JcliError> {
        let mut classes = vec![class];
        let mut current = class;
        while let Some(super_name) = current.super_name() {
            match self.load_class(super_name)? {
                Some(super_class) => {
                    classes.push(super_class);
                    current = super_class;
                }
                None => {
                    debug!(class = %current.binary_name(), super_name, "superclass not found");
                    break;
                }
            }
        }

        let mut seen = classes.iter().map(|c| c.name()).collect::<HashSet<_>>();
        let mut queue = classes
            .iter()
            .flat_map(|c| c.interfaces().iter().copied())
            .collect::<VecDeque<_>>();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            match self.load_class(name)? {
                Some(interface) => {
                    queue.extend(interface.interfaces().iter().copied());
                    classes.push(interface);
                }
                None => debug!(interface = name, "interface not found"),
            }
        }

        Ok(classes)
    }

    /// Whether a value of class `from` can be used where `to` is expected.
    /// Both are internal names.
    pub fn is_assignable(&mut self, from: &str, to: &str) -> Result<bool, JcliError> {
        if from == to || to == "java/lang/Object" {
            return Ok(true);
        }

        let Some(class) = self.load_class(from)? else {
            return Ok(false);
        };

        Ok(self.hierarchy(class)?.iter().any(|c| c.name() == to))
    }
}
