use std::fmt;
use std::time::Duration;

/// A typed argument on its way into the JVM.
#[derive(Clone, Debug, PartialEq)]
pub enum JvmValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    String(String),
    /// A primitive wrapped in its `java.lang` box (`Integer`, `Long`, ...).
    Boxed(Box<JvmValue>),
    /// `class` is an internal name such as `java/time/DayOfWeek`.
    Enum {
        class: String,
        constant: String,
    },
    /// A `java.lang.Class` looked up by binary name.
    Class(String),
    /// `component` is a field descriptor (`I`, `Ljava/lang/String;`).
    Array {
        component: String,
        elements: Vec<JvmValue>,
    },
}

impl fmt::Display for JvmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JvmValue::Boolean(v) => write!(f, "{v}"),
            JvmValue::Byte(v) => write!(f, "{v}"),
            JvmValue::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{v:04x}'"),
            },
            JvmValue::Short(v) => write!(f, "{v}"),
            JvmValue::Int(v) => write!(f, "{v}"),
            JvmValue::Long(v) => write!(f, "{v}L"),
            JvmValue::Float(v) => write!(f, "{v}f"),
            JvmValue::Double(v) => write!(f, "{v}d"),
            JvmValue::Null => f.write_str("null"),
            JvmValue::String(v) => write!(f, "{v:?}"),
            JvmValue::Boxed(v) => write!(f, "box({v})"),
            JvmValue::Enum { class, constant } => write!(f, "{class}.{constant}"),
            JvmValue::Class(name) => write!(f, "{name}.class"),
            JvmValue::Array {
                component,
                elements,
            } => {
                write!(f, "{component}[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// How the object a method is called on gets produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Receiver {
    Static,
    /// `new C(args)` using the constructor with the given descriptor.
    New {
        descriptor: String,
        args: Vec<JvmValue>,
    },
    /// `new C(arg)` through the first `(descriptor, arg)` constructor, in
    /// order, that does not throw.
    Construct {
        constructors: Vec<(String, JvmValue)>,
    },
    /// Use the value itself as the receiver, e.g. a `java.lang.String`.
    Value(JvmValue),
    /// Call a static factory on the target class and use its result.
    Factory {
        method: String,
        descriptor: String,
        args: Vec<JvmValue>,
    },
}

/// A fully bound method call.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// Internal name of the class the call is made through.
    pub class: String,
    pub method: String,
    pub descriptor: String,
    pub receiver: Receiver,
    pub args: Vec<JvmValue>,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.method, self.descriptor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thrown {
    pub class_name: String,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// `String.valueOf` of the result, `None` for void methods.
    Returned(Option<String>),
    Threw(Thrown),
    TimedOut(Duration),
}
