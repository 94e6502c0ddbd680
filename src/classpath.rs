//! Turns the user's search roots into an ordered list of class containers
//! and locates the JVM installation the calls run in.

use std::collections::HashSet;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{self, eyre, WrapErr};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::JcliError;
use crate::source::{ClassSource, DirectorySource, JarSource};

/// Where classes and the JVM are looked for. `classpath` holds the raw
/// `--classpath` values (or `CLASSPATH`), each possibly a platform path list.
#[derive(Clone, Debug, Default)]
pub struct SearchRoots {
    pub classpath: Vec<OsString>,
    pub java_home: Option<PathBuf>,
    pub current_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassContainer {
    Directory(PathBuf),
    Archive(PathBuf),
}

/// How the installation ships its own classes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformRuntime {
    /// A `lib/modules` image, read through the running JVM's `jrt:/` file
    /// system.
    Modules,
    /// A pre-module `rt.jar`.
    RtJar(PathBuf),
}

#[derive(Clone, Debug)]
pub struct JavaHome {
    pub root: PathBuf,
    pub libjvm: PathBuf,
    pub runtime: PlatformRuntime,
}

#[derive(Clone, Debug)]
pub struct ResolvedClasspath {
    pub java_home: JavaHome,
    /// User containers in precedence order, without the platform runtime.
    pub containers: Vec<ClassContainer>,
}

pub struct ClasspathResolver {
    roots: SearchRoots,
}

#[cfg(target_os = "windows")]
const LIBJVM: &str = "jvm.dll";
#[cfg(target_os = "macos")]
const LIBJVM: &str = "libjvm.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBJVM: &str = "libjvm.so";

const LIBJVM_DIRS: &[&str] = &[
    "lib/server",
    "lib/client",
    "bin/server",
    "bin/client",
    "jre/lib/server",
    "jre/lib/amd64/server",
    "jre/lib/aarch64/server",
    "jre/lib/i386/client",
    "jre/bin/server",
    "lib",
];

impl ClasspathResolver {
    pub fn new(roots: SearchRoots) -> ClasspathResolver {
        ClasspathResolver { roots }
    }

    pub fn resolve(&self) -> Result<ResolvedClasspath, JcliError> {
        let java_home = self.java_home()?;
        let containers = self.containers()?;

        debug!(
            java_home = %java_home.root.display(),
            libjvm = %java_home.libjvm.display(),
            containers = containers.len(),
            "resolved classpath"
        );

        Ok(ResolvedClasspath {
            java_home,
            containers,
        })
    }

    fn java_home(&self) -> Result<JavaHome, JcliError> {
        let root = match &self.roots.java_home {
            Some(home) => home.clone(),
            None => java_home_from_path().ok_or_else(|| {
                JcliError::Configuration(
                    "no JVM installation found: set JAVA_HOME, pass --java-home or put java on PATH"
                        .to_owned(),
                )
            })?,
        };

        if !root.is_dir() {
            return Err(JcliError::Configuration(format!(
                "JVM home {} is not a directory",
                root.display()
            )));
        }

        let libjvm = find_libjvm(&root).ok_or_else(|| {
            JcliError::Configuration(format!(
                "no {LIBJVM} found under JVM home {}",
                root.display()
            ))
        })?;

        let runtime = if root.join("lib/modules").is_file() {
            PlatformRuntime::Modules
        } else if let Some(rt_jar) = ["jre/lib/rt.jar", "lib/rt.jar"]
            .iter()
            .map(|p| root.join(p))
            .find(|p| p.is_file())
        {
            PlatformRuntime::RtJar(rt_jar)
        } else {
            return Err(JcliError::Configuration(format!(
                "JVM home {} has neither lib/modules nor rt.jar",
                root.display()
            )));
        };

        Ok(JavaHome {
            root,
            libjvm,
            runtime,
        })
    }

    fn containers(&self) -> Result<Vec<ClassContainer>, JcliError> {
        let explicit = !self.roots.classpath.is_empty();
        let entries = if explicit {
            self.roots
                .classpath
                .iter()
                .flat_map(env::split_paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect::<Vec<_>>()
        } else {
            vec![self.roots.current_dir.clone()]
        };

        let mut seen = HashSet::new();
        let mut containers = vec![];
        for entry in entries {
            let entry = self.absolute(entry);
            if is_wildcard(&entry) {
                for jar in wildcard_jars(&entry) {
                    self.push_container(jar, &mut seen, &mut containers);
                }
            } else {
                self.push_container(entry, &mut seen, &mut containers);
            }
        }

        if explicit && containers.is_empty() {
            return Err(JcliError::Configuration(
                "none of the classpath entries exist".to_owned(),
            ));
        }

        Ok(containers)
    }

    fn push_container(
        &self,
        path: PathBuf,
        seen: &mut HashSet<PathBuf>,
        containers: &mut Vec<ClassContainer>,
    ) {
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if seen.contains(&key) {
            return;
        }

        let container = if path.is_dir() {
            ClassContainer::Directory(path)
        } else if path.is_file() && is_archive(&path) {
            ClassContainer::Archive(path)
        } else {
            warn!(entry = %path.display(), "skipping classpath entry that does not exist");
            return;
        };

        seen.insert(key);

        let manifest_entries = match &container {
            ClassContainer::Archive(jar) => match manifest_class_path(jar) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(jar = %jar.display(), "ignoring unreadable manifest: {e:#}");
                    vec![]
                }
            },
            ClassContainer::Directory(_) => vec![],
        };

        containers.push(container);

        // Referenced jars follow the jar that references them.
        for entry in manifest_entries {
            self.push_container(entry, seen, containers);
        }
    }

    fn absolute(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.roots.current_dir.join(path)
        }
    }
}

impl ResolvedClasspath {
    /// The `-Djava.class.path` value for the JVM.
    pub fn class_path_option(&self) -> Result<String, JcliError> {
        let paths = self.containers.iter().map(ClassContainer::path);
        let joined = env::join_paths(paths)
            .map_err(|e| JcliError::Configuration(format!("invalid classpath entry: {e}")))?;
        joined.into_string().map_err(|path| {
            JcliError::Configuration(format!("classpath is not valid unicode: {path:?}"))
        })
    }

    /// Class sources in lookup order, after the platform runtime.
    pub fn user_sources(&self) -> Vec<Box<dyn ClassSource>> {
        self.containers
            .iter()
            .map(|container| -> Box<dyn ClassSource> {
                match container {
                    ClassContainer::Directory(dir) => Box::new(DirectorySource::new(dir)),
                    ClassContainer::Archive(jar) => Box::new(JarSource::new(jar)),
                }
            })
            .collect()
    }
}

impl ClassContainer {
    pub fn path(&self) -> &Path {
        match self {
            ClassContainer::Directory(path) | ClassContainer::Archive(path) => path,
        }
    }
}

fn java_home_from_path() -> Option<PathBuf> {
    let java = which::which("java").ok()?;
    let java = fs::canonicalize(&java).unwrap_or(java);
    // <home>/bin/java, or <home>/jre/bin/java on old layouts
    let mut home = java.parent()?.parent()?.to_path_buf();
    if home.file_name() == Some(OsStr::new("jre")) && home.parent()?.join("lib").is_dir() {
        home = home.parent()?.to_path_buf();
    }
    debug!(java = %java.display(), home = %home.display(), "found java on PATH");
    Some(home)
}

fn find_libjvm(home: &Path) -> Option<PathBuf> {
    let candidate = LIBJVM_DIRS
        .iter()
        .map(|dir| home.join(dir).join(LIBJVM))
        .find(|p| p.is_file());
    if candidate.is_some() {
        return candidate;
    }

    WalkDir::new(home)
        .max_depth(5)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == LIBJVM)
        .map(|entry| entry.into_path())
}

fn is_wildcard(path: &Path) -> bool {
    path.file_name() == Some(OsStr::new("*"))
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

/// All jars directly inside the wildcard's directory, sorted by name.
fn wildcard_jars(wildcard: &Path) -> Vec<PathBuf> {
    let Some(dir) = wildcard.parent() else {
        return vec![];
    };

    let mut jars = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
        })
        .collect::<Vec<_>>();

    if jars.is_empty() {
        warn!(dir = %dir.display(), "classpath wildcard matched no jars");
    }

    jars.sort();
    jars
}

/// Entries of the jar's `META-INF/MANIFEST.MF` `Class-Path` attribute,
/// resolved against the jar's directory.
fn manifest_class_path(jar: &Path) -> eyre::Result<Vec<PathBuf>> {
    let file = File::open(jar).wrap_err_with(|| eyre!("failed to open {}", jar.display()))?;
    let mut archive =
        ZipArchive::new(file).wrap_err_with(|| eyre!("failed to read {}", jar.display()))?;

    let mut content = String::new();
    match archive.by_name("META-INF/MANIFEST.MF") {
        Ok(mut manifest) => {
            manifest
                .read_to_string(&mut content)
                .wrap_err("failed to read META-INF/MANIFEST.MF")?;
        }
        Err(zip::result::ZipError::FileNotFound) => return Ok(vec![]),
        Err(e) => return Err(e).wrap_err("failed to read META-INF/MANIFEST.MF"),
    }

    let base = jar.parent().unwrap_or_else(|| Path::new(""));
    Ok(parse_manifest_class_path(&content)
        .into_iter()
        .map(|entry| base.join(entry))
        .collect())
}

/// Reads the main section's `Class-Path` value, joining continuation lines
/// (lines starting with a single space).
fn parse_manifest_class_path(content: &str) -> Vec<String> {
    let mut attributes: Vec<(String, String)> = vec![];

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            // end of the main section
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = attributes.last_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            attributes.push((key.trim().to_owned(), value.trim_start().to_owned()));
        }
    }

    attributes
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("Class-Path"))
        .map(|(_, value)| value.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}
