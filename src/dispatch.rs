//! Runs one command line end to end: resolve the classpath, start the JVM,
//! plan the call against class metadata, invoke, print.

use std::env;
use std::io::{self, Write};

use bumpalo::Bump;
use tracing::{debug, info};

use crate::classpath::{ClasspathResolver, PlatformRuntime, ResolvedClasspath, SearchRoots};
use crate::cli::{Action, Args};
use crate::config::CommandRegistry;
use crate::engine::{InvocationEngine, InvocationResult, ReturnValue, Runtime};
use crate::error::JcliError;
use crate::loader::ClassLoader;
use crate::locator::MethodLocator;
use crate::output::Output;
use crate::request::InvocationRequest;
use crate::source::{ClassSource, JarSource};

/// Executes the parsed command line and returns the process exit code.
pub fn run(args: Args, stdout: &mut dyn Write, stderr: &mut dyn Write) -> io::Result<i32> {
    let mut output = Output::new(stdout, stderr, args.debug);
    let result = InvocationResult::from(dispatch(args));
    output.emit(&result)
}

fn dispatch(args: Args) -> Result<ReturnValue, JcliError> {
    let check_jni = args.check_jni;
    args.check()?;
    let registry = CommandRegistry::load(args.config.as_deref())?;

    match args.action(&registry)? {
        Action::ListCommands => Ok(text(registry.describe().trim_end().to_owned())),
        Action::ListMethods(request) => {
            let classpath = resolve(&request)?;
            let engine = InvocationEngine::start(&classpath, check_jni)?;
            let listing = list_methods(&engine, &classpath, &request.class_name)?;
            Ok(text(listing.join("\n")))
        }
        Action::Invoke(request) => {
            let classpath = resolve(&request)?;
            let mut engine = InvocationEngine::start(&classpath, check_jni)?;
            invoke(&mut engine, &classpath, &request)
        }
    }
}

fn text(text: String) -> ReturnValue {
    ReturnValue {
        return_type: None,
        text: Some(text),
    }
}

fn resolve(request: &InvocationRequest) -> Result<ResolvedClasspath, JcliError> {
    let current_dir = env::current_dir().map_err(|e| {
        JcliError::Configuration(format!("cannot determine the current directory: {e}"))
    })?;

    ClasspathResolver::new(SearchRoots {
        classpath: request.classpath.clone(),
        java_home: request.java_home.clone(),
        current_dir,
    })
    .resolve()
}

/// Platform classes first, then the user's containers.
fn class_sources<'e, R: Runtime + 'e>(
    engine: &'e InvocationEngine<R>,
    classpath: &ResolvedClasspath,
) -> Vec<Box<dyn ClassSource + 'e>> {
    let mut sources: Vec<Box<dyn ClassSource + 'e>> = vec![];
    match &classpath.java_home.runtime {
        PlatformRuntime::Modules => sources.push(Box::new(engine.platform_classes())),
        PlatformRuntime::RtJar(jar) => sources.push(Box::new(JarSource::new(jar))),
    }
    sources.extend(
        classpath
            .user_sources()
            .into_iter()
            .map(|source| source as Box<dyn ClassSource + 'e>),
    );
    sources
}

/// Plans, coerces and performs the requested call.
pub fn invoke<R: Runtime>(
    engine: &mut InvocationEngine<R>,
    classpath: &ResolvedClasspath,
    request: &InvocationRequest,
) -> Result<ReturnValue, JcliError> {
    let invocation = {
        let arena = Bump::new();
        let mut loader = ClassLoader::new(&arena, class_sources(engine, classpath));
        let plan = MethodLocator::new(&mut loader).plan(request)?;
        let args = plan.coerce(&mut loader)?;
        plan.bind(args)
    };

    info!(method = %invocation.signature, "resolved");
    engine.load(&request.class_name)?;
    engine.invoke(&invocation, request.timeout)
}

pub fn list_methods<R: Runtime>(
    engine: &InvocationEngine<R>,
    classpath: &ResolvedClasspath,
    class_name: &str,
) -> Result<Vec<String>, JcliError> {
    let arena = Bump::new();
    let mut loader = ClassLoader::new(&arena, class_sources(engine, classpath));
    let listing = MethodLocator::new(&mut loader).list_methods(class_name)?;
    debug!(class = class_name, count = listing.len(), "listed methods");
    Ok(listing)
}
