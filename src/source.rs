use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;

use color_eyre::eyre::{self, eyre, WrapErr};
use tracing::trace;
use zip::result::ZipError;
use zip::ZipArchive;

/// A container that class file bytes can be read from, looked up by
/// internal name (`java/lang/String`).
pub trait ClassSource {
    fn read_class(&mut self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>>;

    fn describe(&self) -> String;
}

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> DirectorySource {
        DirectorySource { root: root.into() }
    }
}

impl ClassSource for DirectorySource {
    fn read_class(&mut self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>> {
        let path = self.root.join(format!("{internal_name}.class"));
        match fs::read(&path) {
            Ok(bytes) => {
                trace!(path = %path.display(), "read class file");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).wrap_err_with(|| eyre!("failed to read {}", path.display())),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// A `.jar` or `.zip` archive. The archive is opened on first lookup.
pub struct JarSource {
    path: PathBuf,
    archive: Option<ZipArchive<File>>,
}

impl JarSource {
    pub fn new(path: impl Into<PathBuf>) -> JarSource {
        JarSource {
            path: path.into(),
            archive: None,
        }
    }

    fn archive(&mut self) -> eyre::Result<&mut ZipArchive<File>> {
        if self.archive.is_none() {
            let file = File::open(&self.path)
                .wrap_err_with(|| eyre!("failed to open {}", self.path.display()))?;
            let archive = ZipArchive::new(file)
                .wrap_err_with(|| eyre!("failed to read archive {}", self.path.display()))?;
            self.archive = Some(archive);
        }

        self.archive
            .as_mut()
            .ok_or_else(|| eyre!("archive {} is not open", self.path.display()))
    }
}

impl ClassSource for JarSource {
    fn read_class(&mut self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>> {
        let entry_name = format!("{internal_name}.class");
        let path = self.path.display().to_string();

        let mut entry = match self.archive()?.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(e).wrap_err_with(|| eyre!("failed to read {entry_name} from {path}"))
            }
        };

        // The header size is not trusted for the allocation.
        let mut bytes = vec![];
        entry
            .read_to_end(&mut bytes)
            .wrap_err_with(|| eyre!("failed to read {entry_name} from {path}"))?;

        trace!(jar = %path, entry = %entry_name, "read class file");
        Ok(Some(bytes))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::testing::ClassFileBuilder;

    #[test]
    fn reads_classes_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("com/example")).unwrap();
        let bytes = ClassFileBuilder::new("com/example/Greeter").build();
        fs::write(dir.path().join("com/example/Greeter.class"), &bytes).unwrap();

        let mut source = DirectorySource::new(dir.path());
        assert_eq!(
            source.read_class("com/example/Greeter").unwrap(),
            Some(bytes)
        );
        assert_eq!(source.read_class("com/example/Missing").unwrap(), None);
    }

    #[test]
    fn reads_classes_from_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("greeter.jar");
        let bytes = ClassFileBuilder::new("com/example/Greeter").build();

        let mut writer = ZipWriter::new(File::create(&jar).unwrap());
        writer
            .start_file("com/example/Greeter.class", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&bytes).unwrap();
        writer.finish().unwrap();

        let mut source = JarSource::new(&jar);
        assert_eq!(
            source.read_class("com/example/Greeter").unwrap(),
            Some(bytes)
        );
        assert_eq!(source.read_class("com/example/Other").unwrap(), None);
    }

    #[test]
    fn corrupt_jar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("broken.jar");
        fs::write(&jar, b"not a zip").unwrap();

        let mut source = JarSource::new(&jar);
        assert!(source.read_class("com/example/Greeter").is_err());
    }
}
