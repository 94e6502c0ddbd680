use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::CommandRegistry;
use crate::error::JcliError;
use crate::request::{expand_arguments, InvocationRequest, Strategy};

const USAGE: &str = "usage: jcli [--classpath <PATHS>] --class <CLASS> --method <METHOD> [--static|--instance] [--timeout <SECS>] [-- <ARGS>...]";

/// Invoke a static or instance method of a JVM class from the command line.
#[derive(Debug, Parser)]
#[command(name = "jcli", version)]
pub struct Args {
    /// Class path entries, separated by the platform path separator.
    #[arg(long, visible_alias = "cp", env = "CLASSPATH", hide_env_values = true)]
    pub classpath: Vec<OsString>,

    /// JDK installation to run.
    #[arg(long, env = "JAVA_HOME", hide_env_values = true)]
    pub java_home: Option<PathBuf>,

    /// Fully-qualified class name, e.g. java.lang.Math.
    #[arg(long, short = 'c')]
    pub class: Option<String>,

    /// Method name.
    #[arg(long, short = 'm')]
    pub method: Option<String>,

    /// Only consider static methods.
    #[arg(long = "static", conflicts_with = "instance")]
    pub static_only: bool,

    /// Only consider instance methods; the first argument builds the receiver.
    #[arg(long)]
    pub instance: bool,

    /// Use a named command alias for the class and strategy.
    #[arg(long, conflicts_with = "class")]
    pub command: Option<String>,

    /// Static method that builds a receiver from the first argument.
    #[arg(long)]
    pub factory: Option<String>,

    /// Give up after this many seconds.
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// List the callable methods of the class instead of calling one.
    #[arg(long)]
    pub methods: bool,

    /// List the command aliases.
    #[arg(long)]
    pub list_commands: bool,

    /// Extra command alias file.
    #[arg(long, env = "JCLI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log what jcli is doing to stderr.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Print the cause of failures.
    #[arg(long)]
    pub debug: bool,

    /// Start the JVM with -Xcheck:jni.
    #[arg(long, hide = true)]
    pub check_jni: bool,

    /// Method arguments. `@file` reads an argument from a file.
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// What a run does once flags are understood.
#[derive(Debug, PartialEq)]
pub enum Action {
    ListCommands,
    /// `method_name` of the request is empty.
    ListMethods(InvocationRequest),
    Invoke(InvocationRequest),
}

impl Args {
    /// Rejects missing required flags. Needs nothing loaded.
    pub fn check(&self) -> Result<(), JcliError> {
        if self.list_commands {
            return Ok(());
        }
        if self.class.is_none() && self.command.is_none() {
            return Err(usage("--class is required"));
        }
        if !self.methods && self.method.as_deref().map_or(true, str::is_empty) {
            return Err(usage("--method is required"));
        }
        Ok(())
    }

    /// Validates the flags against the alias registry and expands `@file`
    /// arguments.
    pub fn action(self, registry: &CommandRegistry) -> Result<Action, JcliError> {
        self.check()?;
        if self.list_commands {
            return Ok(Action::ListCommands);
        }

        let alias = self
            .command
            .as_deref()
            .map(|name| registry.require(name))
            .transpose()?;

        let class_name = match (self.class, alias) {
            (Some(class), _) => class,
            (None, Some(alias)) => alias.class_name.clone(),
            (None, None) => return Err(usage("--class is required")),
        };

        let strategy = if self.static_only {
            Strategy::Static
        } else if self.instance {
            Strategy::Instance
        } else {
            alias.map(|a| a.strategy).unwrap_or_default()
        };

        let factory = self
            .factory
            .or_else(|| alias.and_then(|a| a.factory.clone()));

        let mut request = InvocationRequest {
            classpath: self.classpath,
            java_home: self.java_home,
            class_name,
            method_name: String::new(),
            args: expand_arguments(self.args)?,
            strategy,
            factory,
            timeout: self.timeout,
        };

        if self.methods {
            return Ok(Action::ListMethods(request));
        }

        request.method_name = self
            .method
            .filter(|m| !m.is_empty())
            .ok_or_else(|| usage("--method is required"))?;

        Ok(Action::Invoke(request))
    }
}

fn usage(problem: &str) -> JcliError {
    JcliError::Usage(format!("{problem} ({USAGE})"))
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs = value
        .parse::<f64>()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got {value}"));
    }
    Ok(Duration::from_secs_f64(secs))
}
