//! The JNI side of jcli: starting an embedded JVM, reading platform class
//! files out of the runtime image and performing bound method calls.

mod value;

use std::convert::identity;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{self, bail, eyre, Context};
use jni::objects::{
    GlobalRef, JByteArray, JClass, JObject, JString, JValue, JValueGen, JValueOwned,
};
use jni::{InitArgsBuilder, JNIEnv, JNIVersion, JavaVM};
use tracing::{debug, warn};

pub use value::{Call, JvmValue, Outcome, Receiver, Thrown};

#[derive(Clone, Debug)]
pub struct JvmOptions {
    /// Path to the `libjvm` shared library of the JVM installation.
    pub libjvm: PathBuf,
    /// Value of `-Djava.class.path`.
    pub class_path: String,
    pub check_jni: bool,
}

pub struct Jvm {
    jvm: Arc<JavaVM>,
}

enum Message {
    Started(GlobalRef),
    Finished(eyre::Result<Outcome>),
}

impl Jvm {
    pub fn start(options: &JvmOptions) -> eyre::Result<Jvm> {
        let class_path = format!("-Djava.class.path={}", options.class_path);

        let mut builder = InitArgsBuilder::new()
            .version(JNIVersion::V8)
            .option(&class_path);
        if options.check_jni {
            builder = builder.option("-Xcheck:jni");
        }

        let libjvm = options.libjvm.clone();
        debug!(libjvm = %libjvm.display(), %class_path, "starting jvm");

        let jvm = JavaVM::with_libjvm(builder.build()?, || Ok(libjvm))
            .wrap_err_with(|| eyre!("failed to start jvm from '{}'", options.libjvm.display()))?;

        Ok(Jvm { jvm: Arc::new(jvm) })
    }

    /// Reads the class file bytes of a platform class (`java/lang/Integer`)
    /// from the `jrt:/` file system. Returns `None` if no platform module
    /// defines the class.
    pub fn read_platform_class(&self, class_name: &str) -> eyre::Result<Option<Vec<u8>>> {
        let mut env = self.jvm.attach_current_thread()?;

        let Some(module) = platform_module(&mut env, class_name)? else {
            return Ok(None);
        };

        let root_path = env.new_string("jrt:/")?;

        let uri = env
            .call_static_method(
                "java/net/URI",
                "create",
                "(Ljava/lang/String;)Ljava/net/URI;",
                &[JValue::from(&root_path)],
            )?
            .l()?;

        let jrt_fs = env
            .call_static_method(
                "java/nio/file/FileSystems",
                "getFileSystem",
                "(Ljava/net/URI;)Ljava/nio/file/FileSystem;",
                &[JValue::from(&uri)],
            )?
            .l()?;

        let path_components = env.new_object_array(0, "java/lang/String", JObject::null())?;

        let relative_class_path =
            env.new_string(format!("modules/{module}/{class_name}.class"))?;
        let class_path = env
            .call_method(
                &jrt_fs,
                "getPath",
                "(Ljava/lang/String;[Ljava/lang/String;)Ljava/nio/file/Path;",
                &[
                    JValue::from(&relative_class_path),
                    JValue::from(&path_components),
                ],
            )?
            .l()?;

        let bytes = match env.call_static_method(
            "java/nio/file/Files",
            "readAllBytes",
            "(Ljava/nio/file/Path;)[B",
            &[JValue::from(&class_path)],
        ) {
            Ok(bytes) => bytes.l()?,
            Err(jni::errors::Error::JavaException) => {
                let thrown = take_exception(&mut env)?;
                bail!(
                    "failed to read {class_name} from module {module}: {}",
                    describe(&thrown)
                );
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = JByteArray::from(bytes);
        let bytes = env.convert_byte_array(bytes)?;

        Ok(Some(bytes))
    }

    /// Performs `call`. With a timeout the call runs on a dedicated thread;
    /// when the deadline passes that thread's Java `Thread` is interrupted
    /// and `Outcome::TimedOut` is returned without waiting for it.
    pub fn call(&self, call: &Call, timeout: Option<Duration>) -> eyre::Result<Outcome> {
        match timeout {
            None => {
                let mut env = self.jvm.attach_current_thread()?;
                perform(&mut env, call)
            }
            Some(timeout) => self.call_with_deadline(call.clone(), timeout),
        }
    }

    fn call_with_deadline(&self, call: Call, timeout: Duration) -> eyre::Result<Outcome> {
        let (tx, rx) = mpsc::channel();
        let jvm = Arc::clone(&self.jvm);
        let started = Instant::now();

        thread::Builder::new()
            .name("jcli-invoke".to_owned())
            .spawn(move || {
                let result = (|| -> eyre::Result<Outcome> {
                    let mut env = jvm.attach_current_thread()?;
                    let current = env
                        .call_static_method(
                            "java/lang/Thread",
                            "currentThread",
                            "()Ljava/lang/Thread;",
                            &[],
                        )?
                        .l()?;
                    let _ = tx.send(Message::Started(env.new_global_ref(current)?));
                    perform(&mut env, &call)
                })();
                let _ = tx.send(Message::Finished(result));
            })
            .wrap_err("failed to spawn invocation thread")?;

        // Declared before `java_thread` so the reference is released while
        // this thread is still attached.
        let mut env = self.jvm.attach_current_thread()?;
        let mut java_thread = None;
        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            match rx.recv_timeout(remaining) {
                Ok(Message::Started(thread)) => java_thread = Some(thread),
                Ok(Message::Finished(result)) => return result,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("invocation thread exited without a result")
                }
            }
        }

        let elapsed = started.elapsed();
        warn!(?elapsed, "call did not finish before the deadline, interrupting");

        if let Some(thread) = &java_thread {
            env.call_method(thread, "interrupt", "()V", &[])?;
        }

        Ok(Outcome::TimedOut(elapsed))
    }
}

fn platform_module(env: &mut JNIEnv, class_name: &str) -> eyre::Result<Option<String>> {
    let loader = env
        .call_static_method(
            "java/lang/ClassLoader",
            "getPlatformClassLoader",
            "()Ljava/lang/ClassLoader;",
            &[],
        )?
        .l()?;

    let binary_name = env.new_string(class_name.replace('/', "."))?;

    // Initialization is skipped, so this never runs static initializers.
    let class = match env.call_static_method(
        "java/lang/Class",
        "forName",
        "(Ljava/lang/String;ZLjava/lang/ClassLoader;)Ljava/lang/Class;",
        &[
            JValue::from(&binary_name),
            JValue::Bool(0),
            JValue::from(&loader),
        ],
    ) {
        Ok(class) => class.l()?,
        Err(jni::errors::Error::JavaException) => {
            env.exception_clear()?;
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let module = env
        .call_method(&class, "getModule", "()Ljava/lang/Module;", &[])?
        .l()?;
    let name = env
        .call_method(&module, "getName", "()Ljava/lang/String;", &[])?
        .l()?;

    if name.is_null() {
        return Ok(None);
    }

    Ok(Some(env.get_string(&JString::from(name))?.into()))
}

fn perform(env: &mut JNIEnv, call: &Call) -> eyre::Result<Outcome> {
    match invoke(env, call) {
        Ok(text) => Ok(Outcome::Returned(text)),
        Err(jni::errors::Error::JavaException) => Ok(Outcome::Threw(take_exception(env)?)),
        Err(e) => Err(e).wrap_err_with(|| eyre!("failed to call {call}")),
    }
}

fn invoke(env: &mut JNIEnv, call: &Call) -> jni::errors::Result<Option<String>> {
    let class = env.find_class(&call.class)?;

    let receiver = match &call.receiver {
        Receiver::Static => None,
        Receiver::New { descriptor, args } => {
            let args = to_jvalues(env, args)?;
            let args = args.iter().map(|arg| arg.borrow()).collect::<Vec<_>>();
            Some(env.new_object(&class, descriptor, &args)?)
        }
        Receiver::Construct { constructors } => Some(construct(env, &class, constructors)?),
        Receiver::Value(value) => Some(to_jvalue(env, value)?.l()?),
        Receiver::Factory {
            method,
            descriptor,
            args,
        } => {
            let args = to_jvalues(env, args)?;
            let args = args.iter().map(|arg| arg.borrow()).collect::<Vec<_>>();
            Some(
                env.call_static_method(&class, method, descriptor, &args)?
                    .l()?,
            )
        }
    };

    let args = to_jvalues(env, &call.args)?;
    let args = args.iter().map(|arg| arg.borrow()).collect::<Vec<_>>();

    let result = match receiver {
        None => env.call_static_method(&class, &call.method, &call.descriptor, &args)?,
        Some(receiver) => env.call_method(&receiver, &call.method, &call.descriptor, &args)?,
    };

    render(env, &result)
}

/// Only the exception of the last constructor tried is reported.
fn construct<'local>(
    env: &mut JNIEnv<'local>,
    class: &JClass<'local>,
    constructors: &[(String, JvmValue)],
) -> jni::errors::Result<JObject<'local>> {
    for (i, (descriptor, value)) in constructors.iter().enumerate() {
        let arg = to_jvalue(env, value)?;
        match env.new_object(class, descriptor, &[arg.borrow()]) {
            Err(jni::errors::Error::JavaException) if i + 1 < constructors.len() => {
                debug!(%descriptor, "receiver constructor threw, trying the next one");
                env.exception_clear()?;
            }
            result => return result,
        }
    }
    Err(jni::errors::Error::NullPtr("no receiver constructor"))
}

/// Formats a return value with `String.valueOf` so the text matches what
/// Java itself would print.
fn render(env: &mut JNIEnv, result: &JValueOwned) -> jni::errors::Result<Option<String>> {
    let (descriptor, value) = match result {
        JValueGen::Void => return Ok(None),
        JValueGen::Bool(v) => ("(Z)Ljava/lang/String;", JValue::Bool(*v)),
        JValueGen::Byte(v) => ("(I)Ljava/lang/String;", JValue::Int(i32::from(*v))),
        JValueGen::Char(v) => ("(C)Ljava/lang/String;", JValue::Char(*v)),
        JValueGen::Short(v) => ("(I)Ljava/lang/String;", JValue::Int(i32::from(*v))),
        JValueGen::Int(v) => ("(I)Ljava/lang/String;", JValue::Int(*v)),
        JValueGen::Long(v) => ("(J)Ljava/lang/String;", JValue::Long(*v)),
        JValueGen::Float(v) => ("(F)Ljava/lang/String;", JValue::Float(*v)),
        JValueGen::Double(v) => ("(D)Ljava/lang/String;", JValue::Double(*v)),
        JValueGen::Object(obj) => ("(Ljava/lang/Object;)Ljava/lang/String;", JValue::Object(obj)),
    };

    let text = env
        .call_static_method("java/lang/String", "valueOf", descriptor, &[value])?
        .l()?;

    Ok(Some(env.get_string(&JString::from(text))?.into()))
}

fn to_jvalues<'local>(
    env: &mut JNIEnv<'local>,
    values: &[JvmValue],
) -> jni::errors::Result<Vec<JValueOwned<'local>>> {
    values.iter().map(|value| to_jvalue(env, value)).collect()
}

fn to_jvalue<'local>(
    env: &mut JNIEnv<'local>,
    value: &JvmValue,
) -> jni::errors::Result<JValueOwned<'local>> {
    Ok(match value {
        JvmValue::Boolean(v) => JValueGen::Bool(u8::from(*v)),
        JvmValue::Byte(v) => JValueGen::Byte(*v),
        JvmValue::Char(v) => JValueGen::Char(*v),
        JvmValue::Short(v) => JValueGen::Short(*v),
        JvmValue::Int(v) => JValueGen::Int(*v),
        JvmValue::Long(v) => JValueGen::Long(*v),
        JvmValue::Float(v) => JValueGen::Float(*v),
        JvmValue::Double(v) => JValueGen::Double(*v),
        JvmValue::Null => JValueGen::Object(JObject::null()),
        JvmValue::String(v) => JValueGen::Object(JObject::from(env.new_string(v)?)),
        JvmValue::Boxed(inner) => {
            let (class, descriptor) = box_method(inner);
            let primitive = to_jvalue(env, inner)?;
            env.call_static_method(class, "valueOf", descriptor, &[primitive.borrow()])?
        }
        JvmValue::Enum { class, constant } => {
            env.get_static_field(class.as_str(), constant, format!("L{class};"))?
        }
        JvmValue::Class(name) => {
            let name = env.new_string(name)?;
            let loader = env
                .call_static_method(
                    "java/lang/ClassLoader",
                    "getSystemClassLoader",
                    "()Ljava/lang/ClassLoader;",
                    &[],
                )?
                .l()?;
            // Looked up without running static initializers.
            env.call_static_method(
                "java/lang/Class",
                "forName",
                "(Ljava/lang/String;ZLjava/lang/ClassLoader;)Ljava/lang/Class;",
                &[JValue::from(&name), JValue::Bool(0), JValue::from(&loader)],
            )?
        }
        JvmValue::Array {
            component,
            elements,
        } => JValueGen::Object(new_array(env, component, elements)?),
    })
}

fn box_method(value: &JvmValue) -> (&'static str, &'static str) {
    match value {
        JvmValue::Boolean(_) => ("java/lang/Boolean", "(Z)Ljava/lang/Boolean;"),
        JvmValue::Byte(_) => ("java/lang/Byte", "(B)Ljava/lang/Byte;"),
        JvmValue::Char(_) => ("java/lang/Character", "(C)Ljava/lang/Character;"),
        JvmValue::Short(_) => ("java/lang/Short", "(S)Ljava/lang/Short;"),
        JvmValue::Long(_) => ("java/lang/Long", "(J)Ljava/lang/Long;"),
        JvmValue::Float(_) => ("java/lang/Float", "(F)Ljava/lang/Float;"),
        JvmValue::Double(_) => ("java/lang/Double", "(D)Ljava/lang/Double;"),
        _ => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
    }
}

macro_rules! primitive_array {
    ($env:ident, $elements:ident, $variant:ident, $new:ident, $set:ident, $convert:expr) => {{
        let values = $elements
            .iter()
            .filter_map(|element| match element {
                JvmValue::$variant(v) => Some($convert(*v)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let array = $env.$new(values.len() as i32)?;
        $env.$set(&array, 0, &values)?;
        JObject::from(array)
    }};
}

fn new_array<'local>(
    env: &mut JNIEnv<'local>,
    component: &str,
    elements: &[JvmValue],
) -> jni::errors::Result<JObject<'local>> {
    Ok(match component {
        "Z" => primitive_array!(env, elements, Boolean, new_boolean_array, set_boolean_array_region, u8::from),
        "B" => primitive_array!(env, elements, Byte, new_byte_array, set_byte_array_region, identity),
        "C" => primitive_array!(env, elements, Char, new_char_array, set_char_array_region, identity),
        "S" => primitive_array!(env, elements, Short, new_short_array, set_short_array_region, identity),
        "I" => primitive_array!(env, elements, Int, new_int_array, set_int_array_region, identity),
        "J" => primitive_array!(env, elements, Long, new_long_array, set_long_array_region, identity),
        "F" => primitive_array!(env, elements, Float, new_float_array, set_float_array_region, identity),
        "D" => primitive_array!(env, elements, Double, new_double_array, set_double_array_region, identity),
        _ => {
            let class = component
                .strip_prefix('L')
                .and_then(|c| c.strip_suffix(';'))
                .unwrap_or(component);
            let array = env.new_object_array(elements.len() as i32, class, JObject::null())?;
            for (i, element) in elements.iter().enumerate() {
                let element = to_jvalue(env, element)?.l()?;
                env.set_object_array_element(&array, i as i32, element)?;
            }
            JObject::from(array)
        }
    })
}

fn take_exception(env: &mut JNIEnv) -> eyre::Result<Thrown> {
    let throwable = env.exception_occurred()?;
    env.exception_clear()?;

    let class = env
        .call_method(&throwable, "getClass", "()Ljava/lang/Class;", &[])?
        .l()?;
    let class_name = env
        .call_method(&class, "getName", "()Ljava/lang/String;", &[])?
        .l()?;
    let class_name: String = env.get_string(&JString::from(class_name))?.into();

    let message = env
        .call_method(&throwable, "getMessage", "()Ljava/lang/String;", &[])?
        .l()?;
    let message = if message.is_null() {
        None
    } else {
        Some(env.get_string(&JString::from(message))?.into())
    };

    Ok(Thrown {
        class_name,
        message,
    })
}

fn describe(thrown: &Thrown) -> String {
    match &thrown.message {
        Some(message) => format!("{}: {message}", thrown.class_name),
        None => thrown.class_name.clone(),
    }
}
