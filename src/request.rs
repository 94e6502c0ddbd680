use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::JcliError;

/// How the receiver of the target method is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    /// Only static methods, all arguments passed to the method.
    Static,
    /// Only instance methods, the first argument builds the receiver.
    Instance,
    /// Static first, then a default instance, then the first argument as
    /// the receiver.
    #[default]
    #[serde(alias = "HYBRID")]
    Auto,
}

/// One fully parsed command line. Built once by the dispatcher and not
/// modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRequest {
    pub classpath: Vec<OsString>,
    pub java_home: Option<PathBuf>,
    /// Binary name, e.g. `java.lang.Integer`.
    pub class_name: String,
    pub method_name: String,
    pub args: Vec<String>,
    pub strategy: Strategy,
    /// Static method on the target class used to build receivers from a
    /// string, e.g. `fromString` for `java.util.UUID`.
    pub factory: Option<String>,
    pub timeout: Option<Duration>,
}

/// Replaces `@path` with the contents of `path`, with one trailing newline
/// removed. `@@text` stands for the literal `@text`.
pub fn expand_argument(arg: String) -> Result<String, JcliError> {
    if let Some(literal) = arg.strip_prefix("@@") {
        return Ok(format!("@{literal}"));
    }

    let Some(path) = arg.strip_prefix('@').filter(|path| !path.is_empty()) else {
        return Ok(arg);
    };

    let mut contents = fs::read_to_string(path)
        .map_err(|e| JcliError::Usage(format!("cannot read argument file '{path}': {e}")))?;

    if contents.ends_with('\n') {
        contents.pop();
        if contents.ends_with('\r') {
            contents.pop();
        }
    }

    Ok(contents)
}

pub fn expand_arguments(args: Vec<String>) -> Result<Vec<String>, JcliError> {
    args.into_iter().map(expand_argument).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arguments_are_untouched() {
        assert_eq!(expand_argument("42".into()).unwrap(), "42");
        assert_eq!(expand_argument("@".into()).unwrap(), "@");
        assert_eq!(expand_argument("a@b".into()).unwrap(), "a@b");
    }

    #[test]
    fn reads_argument_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.txt");
        fs::write(&path, "hello world\n").unwrap();

        let arg = format!("@{}", path.display());
        assert_eq!(expand_argument(arg).unwrap(), "hello world");
    }

    #[test]
    fn double_at_escapes() {
        assert_eq!(expand_argument("@@home".into()).unwrap(), "@home");
    }

    #[test]
    fn missing_argument_file_is_a_usage_error() {
        let err = expand_argument("@/definitely/not/here.txt".into()).unwrap_err();
        assert!(matches!(err, JcliError::Usage(_)), "{err:?}");
    }

    #[test]
    fn strategy_names_from_config() {
        let strategies: Vec<Strategy> =
            serde_yaml::from_str("[STATIC, INSTANCE, AUTO, HYBRID]").unwrap();
        assert_eq!(
            strategies,
            [
                Strategy::Static,
                Strategy::Instance,
                Strategy::Auto,
                Strategy::Auto
            ]
        );
    }
}
