use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use libtest_mimic::{Arguments, Failed, Trial};

struct Case {
    name: &'static str,
    args: &'static [&'static str],
    check: fn(Output) -> Result<(), Failed>,
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            name: "parse_int",
            args: &["--class", "java.lang.Integer", "--method", "parseInt", "--", "42"],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"42");
                Ok(())
            },
        },
        Case {
            name: "parse_int_throws",
            args: &["--class", "java.lang.Integer", "--method", "parseInt", "--", "abc"],
            check: |output| {
                expect_code(&output, 3)?;
                insta::assert_snapshot!(stderr(&output), @r#"jcli: invocation fault: java.lang.Integer.parseInt(java.lang.String) threw java.lang.NumberFormatException: For input string: "abc""#);
                Ok(())
            },
        },
        Case {
            name: "math_max",
            args: &["--class", "java.lang.Math", "--method", "max", "--", "10", "20"],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"20");
                Ok(())
            },
        },
        Case {
            name: "math_sqrt",
            args: &["--class", "java.lang.Math", "--method", "sqrt", "--", "16"],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"4.0");
                Ok(())
            },
        },
        Case {
            name: "string_length",
            args: &["--class", "java.lang.String", "--method", "length", "--", "hello"],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"5");
                Ok(())
            },
        },
        Case {
            name: "uuid_alias",
            args: &[
                "--command",
                "uuid",
                "--method",
                "version",
                "--",
                "123e4567-e89b-12d3-a456-426614174000",
            ],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"1");
                Ok(())
            },
        },
        Case {
            name: "receiver_constructor_fallback",
            args: &["--class", "java.util.Date", "--method", "getTime", "--instance", "--", "0"],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"0");
                Ok(())
            },
        },
        Case {
            name: "unknown_method",
            args: &["--class", "java.lang.Math", "--method", "bogusMethod", "--", "1"],
            check: |output| {
                expect_code(&output, 2)?;
                insta::assert_snapshot!(stderr(&output), @"jcli: method not found: java.lang.Math.bogusMethod with 1 argument(s): no public method named 'bogusMethod'");
                Ok(())
            },
        },
        Case {
            name: "unknown_class",
            args: &["--class", "com.example.DoesNotExist", "--method", "run"],
            check: |output| {
                expect_code(&output, 2)?;
                insta::assert_snapshot!(stderr(&output), @"jcli: class not found: class com.example.DoesNotExist was not found on the classpath");
                Ok(())
            },
        },
        Case {
            name: "unknown_class_argument",
            args: &["--class", "java.util.EnumSet", "--method", "allOf", "--static", "--", "no.such.Clazz"],
            check: |output| {
                expect_code(&output, 2)?;
                insta::assert_snapshot!(stderr(&output), @"jcli: argument coercion error: argument 0 ('no.such.Clazz') cannot be converted to java.lang.Class");
                Ok(())
            },
        },
        Case {
            name: "sleep_times_out",
            args: &[
                "--class",
                "java.lang.Thread",
                "--method",
                "sleep",
                "--timeout",
                "0.2",
                "--",
                "5000",
            ],
            check: |output| {
                expect_code(&output, 4)?;
                if !stderr(&output).starts_with("jcli: timeout: java.lang.Thread.sleep(long) did not complete within") {
                    return Err(format!("unexpected stderr: {}", stderr(&output)).into());
                }
                Ok(())
            },
        },
        Case {
            name: "void_prints_nothing",
            args: &["--class", "java.lang.Thread", "--method", "sleep", "--", "1"],
            check: |output| {
                expect_code(&output, 0)?;
                insta::assert_snapshot!(stdout(&output), @"");
                Ok(())
            },
        },
    ]
}

fn main() {
    let args = Arguments::from_args();
    let java_home = find_java_home();

    let mut trials = vec![
        Trial::test("help", || {
            let output = jcli(&["--help"], None)?;
            expect_code(&output, 0)?;
            if !stdout(&output).contains("Usage: jcli") {
                return Err("help text has no usage line".into());
            }
            Ok(())
        }),
        Trial::test("missing_method", || {
            let output = jcli(&["--class", "java.lang.Math"], None)?;
            expect_code(&output, 1)?;
            if !stderr(&output).starts_with("jcli: usage error: --method is required") {
                return Err(format!("unexpected stderr: {}", stderr(&output)).into());
            }
            Ok(())
        }),
    ];

    trials.push({
        let java_home = java_home.clone();
        let ignored = java_home.is_none();
        Trial::test("timed_call_keeps_stderr_clean", move || {
            let args = ["--class", "java.lang.Math", "--method", "max", "--timeout", "5", "--", "1", "2"];
            let output = run(&args, java_home.as_ref(), None)?;
            expect_code(&output, 0)?;
            insta::assert_snapshot!(stdout(&output), @"2");
            if !output.stderr.is_empty() {
                return Err(format!("unexpected stderr: {}", stderr(&output)).into());
            }
            Ok(())
        })
        .with_ignored_flag(ignored)
    });

    trials.extend(cases().into_iter().map(|case| {
        let java_home = java_home.clone();
        let ignored = java_home.is_none();
        Trial::test(case.name, move || {
            let output = jcli(case.args, java_home.as_ref())?;
            (case.check)(output)
        })
        .with_ignored_flag(ignored)
    }));

    libtest_mimic::run(&args, trials).exit();
}

fn jcli(args: &[&str], java_home: Option<&PathBuf>) -> Result<Output, Failed> {
    run(args, java_home, Some("off"))
}

/// Runs the binary in a scratch directory. Without `log` the default log
/// level applies.
fn run(args: &[&str], java_home: Option<&PathBuf>, log: Option<&str>) -> Result<Output, Failed> {
    let scratch = tempfile::tempdir()?;

    let mut command = Command::new(env!("CARGO_BIN_EXE_jcli"));
    command
        .args(args)
        .current_dir(scratch.path())
        .env_remove("CLASSPATH")
        .env_remove("JCLI_CONFIG")
        .env_remove("JCLI_LOG");
    if let Some(log) = log {
        command.env("JCLI_LOG", log);
    }
    if let Some(java_home) = java_home {
        command.env("JAVA_HOME", java_home);
    }

    Ok(command.output()?)
}

/// `JAVA_HOME`, or the installation of the `java` on `PATH`.
fn find_java_home() -> Option<PathBuf> {
    if let Some(home) = env::var_os("JAVA_HOME").map(PathBuf::from) {
        return home.join("bin").is_dir().then_some(home);
    }

    let java = fs::canonicalize(which::which("java").ok()?).ok()?;
    let home = java.parent()?.parent()?;
    Some(match home.file_name() {
        Some(name) if name == "jre" => home.parent()?.to_path_buf(),
        _ => home.to_path_buf(),
    })
}

fn expect_code(output: &Output, expected: i32) -> Result<(), Failed> {
    match output.status.code() {
        Some(code) if code == expected => Ok(()),
        code => Err(format!(
            "expected exit code {expected}, got {code:?}\nstdout: {}\nstderr: {}",
            stdout(output),
            stderr(output)
        )
        .into()),
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim_end().to_owned()
}
