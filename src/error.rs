use std::fmt;
use std::time::Duration;

use color_eyre::eyre;
use jvm_host::Thrown;
use thiserror::Error;

/// Every way a single jcli run can fail. Each variant maps to exactly one
/// [`FailureKind`] and therefore one exit code.
#[derive(Debug, Error)]
pub enum JcliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Configuration(String),

    #[error("class {0} was not found on the classpath")]
    ClassNotFound(String),

    #[error("failed to load class {class}: {reason}")]
    MalformedClass { class: String, reason: String },

    #[error("{class}.{method} with {arity} argument(s): {detail}")]
    MethodNotFound {
        class: String,
        method: String,
        arity: usize,
        detail: String,
    },

    #[error("{class}.{method} is ambiguous between {}", .signatures.join(", "))]
    AmbiguousMethod {
        class: String,
        method: String,
        signatures: Vec<String>,
    },

    #[error("argument {position} ('{token}') cannot be converted to {expected}")]
    ArgumentCoercion {
        position: usize,
        token: String,
        expected: String,
    },

    #[error("{method} threw {cause}")]
    InvocationFault { method: String, cause: Cause },

    #[error("{method} did not complete within {:.3}s", .elapsed.as_secs_f64())]
    Timeout { method: String, elapsed: Duration },

    #[error("{0}")]
    Runtime(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Usage,
    Configuration,
    ClassNotFound,
    MalformedClass,
    MethodNotFound,
    AmbiguousMethod,
    ArgumentCoercion,
    InvocationFault,
    Timeout,
    Runtime,
}

/// The exception a target method threw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cause {
    pub class_name: String,
    pub message: Option<String>,
}

impl JcliError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JcliError::Usage(_) => FailureKind::Usage,
            JcliError::Configuration(_) => FailureKind::Configuration,
            JcliError::ClassNotFound(_) => FailureKind::ClassNotFound,
            JcliError::MalformedClass { .. } => FailureKind::MalformedClass,
            JcliError::MethodNotFound { .. } => FailureKind::MethodNotFound,
            JcliError::AmbiguousMethod { .. } => FailureKind::AmbiguousMethod,
            JcliError::ArgumentCoercion { .. } => FailureKind::ArgumentCoercion,
            JcliError::InvocationFault { .. } => FailureKind::InvocationFault,
            JcliError::Timeout { .. } => FailureKind::Timeout,
            JcliError::Runtime(_) => FailureKind::Runtime,
        }
    }

    /// Flattens an eyre report (with its context chain) into a runtime error.
    pub fn runtime(report: eyre::Report) -> JcliError {
        JcliError::Runtime(chain(&report))
    }

    pub fn malformed_class(class: impl Into<String>, report: eyre::Report) -> JcliError {
        JcliError::MalformedClass {
            class: class.into(),
            reason: chain(&report),
        }
    }

    pub fn cause(&self) -> Option<&Cause> {
        match self {
            JcliError::InvocationFault { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

fn chain(report: &eyre::Report) -> String {
    report
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::Usage => 1,
            FailureKind::Configuration
            | FailureKind::ClassNotFound
            | FailureKind::MalformedClass
            | FailureKind::MethodNotFound
            | FailureKind::AmbiguousMethod
            | FailureKind::ArgumentCoercion => 2,
            FailureKind::InvocationFault | FailureKind::Runtime => 3,
            FailureKind::Timeout => 4,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Usage => "usage error",
            FailureKind::Configuration => "configuration error",
            FailureKind::ClassNotFound => "class not found",
            FailureKind::MalformedClass => "malformed class",
            FailureKind::MethodNotFound => "method not found",
            FailureKind::AmbiguousMethod => "ambiguous method",
            FailureKind::ArgumentCoercion => "argument coercion error",
            FailureKind::InvocationFault => "invocation fault",
            FailureKind::Timeout => "timeout",
            FailureKind::Runtime => "runtime error",
        })
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.class_name),
            None => f.write_str(&self.class_name),
        }
    }
}

impl From<Thrown> for Cause {
    fn from(thrown: Thrown) -> Self {
        Cause {
            class_name: thrown.class_name,
            message: thrown.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::eyre::{eyre, WrapErr};

    use super::*;

    #[test]
    fn exit_codes_follow_failure_kind() {
        let cases = [
            (JcliError::Usage("missing --class".into()), 1),
            (JcliError::Configuration("no JVM".into()), 2),
            (JcliError::ClassNotFound("com.example.Nope".into()), 2),
            (
                JcliError::ArgumentCoercion {
                    position: 0,
                    token: "abc".into(),
                    expected: "int".into(),
                },
                2,
            ),
            (
                JcliError::InvocationFault {
                    method: "java.lang.Integer.parseInt(java.lang.String)".into(),
                    cause: Cause {
                        class_name: "java.lang.NumberFormatException".into(),
                        message: None,
                    },
                },
                3,
            ),
            (
                JcliError::Timeout {
                    method: "java.lang.Thread.sleep(long)".into(),
                    elapsed: Duration::from_millis(500),
                },
                4,
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.kind().exit_code(), code, "{error}");
        }
    }

    #[test]
    fn messages_name_the_actionable_detail() {
        let coercion = JcliError::ArgumentCoercion {
            position: 0,
            token: "abc".into(),
            expected: "int".into(),
        };
        insta::assert_snapshot!(coercion, @"argument 0 ('abc') cannot be converted to int");

        let ambiguous = JcliError::AmbiguousMethod {
            class: "com.example.Ambiguous".into(),
            method: "pick".into(),
            signatures: vec![
                "pick(java.lang.Integer)".into(),
                "pick(java.lang.Long)".into(),
            ],
        };
        insta::assert_snapshot!(ambiguous, @"com.example.Ambiguous.pick is ambiguous between pick(java.lang.Integer), pick(java.lang.Long)");

        let fault = JcliError::InvocationFault {
            method: "java.lang.Integer.parseInt(java.lang.String)".into(),
            cause: Cause {
                class_name: "java.lang.NumberFormatException".into(),
                message: Some("For input string: \"abc\"".into()),
            },
        };
        insta::assert_snapshot!(fault, @r#"java.lang.Integer.parseInt(java.lang.String) threw java.lang.NumberFormatException: For input string: "abc""#);

        let timeout = JcliError::Timeout {
            method: "java.lang.Thread.sleep(long)".into(),
            elapsed: Duration::from_millis(1500),
        };
        insta::assert_snapshot!(timeout, @"java.lang.Thread.sleep(long) did not complete within 1.500s");
    }

    #[test]
    fn runtime_errors_keep_the_context_chain() {
        let report = Err::<(), _>(eyre!("no such file"))
            .wrap_err("failed to open jrt:/")
            .unwrap_err();
        insta::assert_snapshot!(JcliError::runtime(report), @"failed to open jrt:/: no such file");
    }
}
