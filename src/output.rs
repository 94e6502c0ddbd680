use std::io::{self, Write};

use crate::engine::InvocationResult;
use crate::error::FailureKind;

/// Renders a run's result: the value on stdout, failures as one line on
/// stderr.
pub struct Output<'w> {
    stdout: &'w mut dyn Write,
    stderr: &'w mut dyn Write,
    debug: bool,
}

impl<'w> Output<'w> {
    pub fn new(stdout: &'w mut dyn Write, stderr: &'w mut dyn Write, debug: bool) -> Output<'w> {
        Output {
            stdout,
            stderr,
            debug,
        }
    }

    /// Writes the result and returns the process exit code.
    pub fn emit(&mut self, result: &InvocationResult) -> io::Result<i32> {
        match result {
            InvocationResult::Success(value) => match self.write_value(value.text.as_deref()) {
                Ok(()) => Ok(0),
                // The reader went away, e.g. `jcli ... | head`.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(0),
                Err(e) => {
                    writeln!(
                        self.stderr,
                        "jcli: {}: cannot write to stdout: {e}",
                        FailureKind::Runtime
                    )?;
                    self.stderr.flush()?;
                    Ok(FailureKind::Runtime.exit_code())
                }
            },
            InvocationResult::Failure(failure) => {
                writeln!(
                    self.stderr,
                    "jcli: {}: {}",
                    failure.kind,
                    single_line(&failure.message)
                )?;
                if self.debug {
                    if let Some(cause) = &failure.cause {
                        writeln!(self.stderr, "  caused by: {}", single_line(&cause.to_string()))?;
                    }
                }
                self.stderr.flush()?;
                Ok(failure.kind.exit_code())
            }
        }
    }

    fn write_value(&mut self, text: Option<&str>) -> io::Result<()> {
        if let Some(text) = text {
            writeln!(self.stdout, "{text}")?;
        }
        self.stdout.flush()
    }
}

fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Failure, ReturnValue};
    use crate::error::Cause;

    fn emit(result: InvocationResult, debug: bool) -> (i32, String, String) {
        let mut stdout = vec![];
        let mut stderr = vec![];
        let code = Output::new(&mut stdout, &mut stderr, debug)
            .emit(&result)
            .unwrap();
        (
            code,
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(stderr).unwrap(),
        )
    }

    #[test]
    fn success_prints_the_value() {
        let (code, stdout, stderr) = emit(
            InvocationResult::Success(ReturnValue {
                return_type: Some("double".into()),
                text: Some("4.0".into()),
            }),
            false,
        );
        assert_eq!(code, 0);
        assert_eq!(stdout, "4.0\n");
        assert_eq!(stderr, "");
    }

    #[test]
    fn void_prints_nothing() {
        let (code, stdout, _) = emit(
            InvocationResult::Success(ReturnValue {
                return_type: None,
                text: None,
            }),
            false,
        );
        assert_eq!(code, 0);
        assert_eq!(stdout, "");
    }

    #[test]
    fn failure_is_one_line_on_stderr() {
        let failure = InvocationResult::Failure(Failure {
            kind: FailureKind::InvocationFault,
            message: "java.lang.Integer.parseInt(java.lang.String) threw java.lang.NumberFormatException: For input string: \"abc\"\n\tat somewhere".into(),
            cause: Some(Cause {
                class_name: "java.lang.NumberFormatException".into(),
                message: Some("For input string: \"abc\"".into()),
            }),
        });

        let (code, stdout, stderr) = emit(failure.clone(), false);
        assert_eq!(code, 3);
        assert_eq!(stdout, "");
        insta::assert_snapshot!(stderr.trim_end(), @r#"jcli: invocation fault: java.lang.Integer.parseInt(java.lang.String) threw java.lang.NumberFormatException: For input string: "abc" at somewhere"#);

        let (_, _, stderr) = emit(failure, true);
        assert_eq!(stderr.lines().count(), 2);
        assert!(stderr.ends_with("  caused by: java.lang.NumberFormatException: For input string: \"abc\"\n"));
    }

    #[test]
    fn exit_code_follows_kind() {
        let (code, _, stderr) = emit(
            InvocationResult::Failure(Failure {
                kind: FailureKind::Timeout,
                message: "java.lang.Thread.sleep(long) did not complete within 0.200s".into(),
                cause: None,
            }),
            true,
        );
        assert_eq!(code, 4);
        assert_eq!(
            stderr,
            "jcli: timeout: java.lang.Thread.sleep(long) did not complete within 0.200s\n"
        );
    }

    /// A stdout that rejects every write with `kind`.
    struct Closed(io::ErrorKind);

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(self.0))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(self.0))
        }
    }

    fn emit_into(stdout: io::ErrorKind) -> (i32, String) {
        let mut stdout = Closed(stdout);
        let mut stderr = vec![];
        let code = Output::new(&mut stdout, &mut stderr, false)
            .emit(&InvocationResult::Success(ReturnValue {
                return_type: Some("int".into()),
                text: Some("20".into()),
            }))
            .unwrap();
        (code, String::from_utf8(stderr).unwrap())
    }

    #[test]
    fn closed_pipe_is_quiet() {
        let (code, stderr) = emit_into(io::ErrorKind::BrokenPipe);
        assert_eq!(code, 0);
        assert_eq!(stderr, "");
    }

    #[test]
    fn other_write_failures_are_one_line() {
        let (code, stderr) = emit_into(io::ErrorKind::PermissionDenied);
        assert_eq!(code, 3);
        assert_eq!(stderr.lines().count(), 1);
        assert!(stderr.starts_with("jcli: runtime error: cannot write to stdout: "));
    }
}
