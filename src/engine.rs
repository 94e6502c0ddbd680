use std::time::Duration;

use color_eyre::eyre;
use jvm_host::{Call, Jvm, JvmOptions, Outcome};
use tracing::{debug, info};

use crate::classpath::ResolvedClasspath;
use crate::error::{Cause, FailureKind, JcliError};
use crate::source::ClassSource;

/// The embedded JVM as seen by the engine.
pub trait Runtime {
    /// Class file bytes of a platform class, by internal name.
    fn read_platform_class(&self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>>;

    fn call(&self, call: &Call, timeout: Option<Duration>) -> eyre::Result<Outcome>;
}

impl Runtime for Jvm {
    fn read_platform_class(&self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>> {
        Jvm::read_platform_class(self, internal_name)
    }

    fn call(&self, call: &Call, timeout: Option<Duration>) -> eyre::Result<Outcome> {
        Jvm::call(self, call, timeout)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    ClassLoaded,
    Invoking,
    Completed,
    Faulted,
}

/// A planned call with everything bound, independent of the class metadata
/// it was planned from.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub call: Call,
    /// Java-style signature used in messages, e.g. `java.lang.Math.max(int, int)`.
    pub signature: String,
    /// `None` for void methods.
    pub return_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnValue {
    pub return_type: Option<String>,
    /// `String.valueOf` of the returned value, `None` for void methods.
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub cause: Option<Cause>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvocationResult {
    Success(ReturnValue),
    Failure(Failure),
}

/// Owns the runtime handle for the whole run and performs the one call.
pub struct InvocationEngine<R> {
    runtime: R,
    state: EngineState,
}

impl InvocationEngine<Jvm> {
    /// Starts the JVM of the resolved installation with the user classpath.
    pub fn start(classpath: &ResolvedClasspath, check_jni: bool) -> Result<Self, JcliError> {
        let options = JvmOptions {
            libjvm: classpath.java_home.libjvm.clone(),
            class_path: classpath.class_path_option()?,
            check_jni,
        };

        let jvm = Jvm::start(&options).map_err(|e| {
            JcliError::Configuration(format!(
                "could not start the JVM at {}: {e:#}",
                classpath.java_home.root.display()
            ))
        })?;

        info!(java_home = %classpath.java_home.root.display(), "jvm started");
        Ok(InvocationEngine::new(jvm))
    }
}

impl<R: Runtime> InvocationEngine<R> {
    pub fn new(runtime: R) -> Self {
        InvocationEngine {
            runtime,
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Class source for the runtime's own classes.
    pub fn platform_classes(&self) -> PlatformClasses<'_, R> {
        PlatformClasses {
            runtime: &self.runtime,
        }
    }

    /// Records that the target class was resolved and its metadata loaded.
    pub fn load(&mut self, class_name: &str) -> Result<(), JcliError> {
        self.transition(EngineState::Idle, EngineState::ClassLoaded)?;
        debug!(class = class_name, "target class loaded");
        Ok(())
    }

    pub fn invoke(
        &mut self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<ReturnValue, JcliError> {
        self.transition(EngineState::ClassLoaded, EngineState::Invoking)?;
        debug!(call = %invocation.call, ?timeout, "invoking");

        let outcome = self.runtime.call(&invocation.call, timeout);

        let result = match outcome {
            Ok(Outcome::Returned(text)) => Ok(ReturnValue {
                return_type: invocation.return_type.clone(),
                text,
            }),
            Ok(Outcome::Threw(thrown)) => Err(JcliError::InvocationFault {
                method: invocation.signature.clone(),
                cause: thrown.into(),
            }),
            Ok(Outcome::TimedOut(elapsed)) => Err(JcliError::Timeout {
                method: invocation.signature.clone(),
                elapsed,
            }),
            Err(e) => Err(JcliError::runtime(e)),
        };

        self.state = match result {
            Ok(_) => EngineState::Completed,
            Err(_) => EngineState::Faulted,
        };

        result
    }

    fn transition(&mut self, from: EngineState, to: EngineState) -> Result<(), JcliError> {
        if self.state != from {
            return Err(JcliError::Runtime(format!(
                "invocation engine cannot move from {:?} to {to:?}",
                self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}

pub struct PlatformClasses<'r, R> {
    runtime: &'r R,
}

impl<R: Runtime> ClassSource for PlatformClasses<'_, R> {
    fn read_class(&mut self, internal_name: &str) -> eyre::Result<Option<Vec<u8>>> {
        self.runtime.read_platform_class(internal_name)
    }

    fn describe(&self) -> String {
        "jrt:/".to_owned()
    }
}

impl From<JcliError> for Failure {
    fn from(error: JcliError) -> Self {
        Failure {
            kind: error.kind(),
            cause: error.cause().cloned(),
            message: error.to_string(),
        }
    }
}

impl From<Result<ReturnValue, JcliError>> for InvocationResult {
    fn from(result: Result<ReturnValue, JcliError>) -> Self {
        match result {
            Ok(value) => InvocationResult::Success(value),
            Err(error) => InvocationResult::Failure(error.into()),
        }
    }
}
