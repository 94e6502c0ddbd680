//! Conversion of command-line tokens into typed JVM values.

use std::fmt;

use jvm_host::JvmValue;

use crate::class::Method;
use crate::descriptor::{BaseType, FieldType};
use crate::error::JcliError;
use crate::loader::ClassLoader;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// A parameter type that can be produced from a single token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType<'a> {
    Primitive(Primitive),
    Boxed(Primitive),
    String,
    CharSequence,
    Object,
    Enum {
        /// Internal name.
        class: &'a str,
        constants: &'a [&'a str],
    },
    Class,
}

/// The parameters of a method whose every type is supported. A varargs
/// method keeps its trailing array as the element type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters<'a> {
    pub fixed: Vec<ParamType<'a>>,
    pub varargs: Option<ParamType<'a>>,
}

/// What a token looks like on its own, before any parameter is considered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Long,
    Decimal,
    Boolean,
    Char,
    Text,
}

/// How well a parameter accepts a token. Lower is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Acceptance {
    Exact = 0,
    Widening = 1,
    Fallback = 2,
}

/// Typed values, one per declared parameter, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct CoercedArguments(pub Vec<JvmValue>);

impl Primitive {
    fn from_base(base: BaseType) -> Option<Primitive> {
        Some(match base {
            BaseType::Boolean => Primitive::Boolean,
            BaseType::Byte => Primitive::Byte,
            BaseType::Char => Primitive::Char,
            BaseType::Short => Primitive::Short,
            BaseType::Int => Primitive::Int,
            BaseType::Long => Primitive::Long,
            BaseType::Float => Primitive::Float,
            BaseType::Double => Primitive::Double,
            BaseType::Object(_) => return None,
        })
    }

    fn from_box(internal_name: &str) -> Option<Primitive> {
        Some(match internal_name {
            "java/lang/Boolean" => Primitive::Boolean,
            "java/lang/Byte" => Primitive::Byte,
            "java/lang/Character" => Primitive::Char,
            "java/lang/Short" => Primitive::Short,
            "java/lang/Integer" => Primitive::Int,
            "java/lang/Long" => Primitive::Long,
            "java/lang/Float" => Primitive::Float,
            "java/lang/Double" => Primitive::Double,
            _ => return None,
        })
    }

    pub fn box_name(self) -> &'static str {
        match self {
            Primitive::Boolean => "java/lang/Boolean",
            Primitive::Byte => "java/lang/Byte",
            Primitive::Char => "java/lang/Character",
            Primitive::Short => "java/lang/Short",
            Primitive::Int => "java/lang/Integer",
            Primitive::Long => "java/lang/Long",
            Primitive::Float => "java/lang/Float",
            Primitive::Double => "java/lang/Double",
        }
    }

    pub fn descriptor(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    /// The primitive a token of this kind is most naturally read as.
    fn natural_for(kind: TokenKind) -> Option<Primitive> {
        match kind {
            TokenKind::Int => Some(Primitive::Int),
            TokenKind::Long => Some(Primitive::Long),
            TokenKind::Decimal => Some(Primitive::Double),
            TokenKind::Boolean => Some(Primitive::Boolean),
            TokenKind::Char => Some(Primitive::Char),
            TokenKind::Text => None,
        }
    }

    fn parse(self, token: &str) -> Option<JvmValue> {
        match self {
            Primitive::Byte => parse_integer(token, i8::MIN.into(), i8::MAX.into())
                .map(|v| JvmValue::Byte(v as i8)),
            Primitive::Short => parse_integer(token, i16::MIN.into(), i16::MAX.into())
                .map(|v| JvmValue::Short(v as i16)),
            Primitive::Int => parse_integer(token, i32::MIN.into(), i32::MAX.into())
                .map(|v| JvmValue::Int(v as i32)),
            Primitive::Long => parse_integer(token, i64::MIN, i64::MAX).map(JvmValue::Long),
            Primitive::Float => parse_decimal(token).map(|v| JvmValue::Float(v as f32)),
            Primitive::Double => parse_decimal(token).map(JvmValue::Double),
            Primitive::Boolean => parse_boolean(token).map(JvmValue::Boolean),
            Primitive::Char => parse_char(token).map(JvmValue::Char),
        }
    }
}

impl<'a> ParamType<'a> {
    /// Maps a field type to a supported parameter type, or `None` when the
    /// type cannot be built from a token.
    pub fn classify(
        field_type: FieldType<'a>,
        loader: &mut ClassLoader<'a>,
    ) -> Result<Option<ParamType<'a>>, JcliError> {
        let name = match field_type {
            FieldType::Array(..) => return Ok(None),
            FieldType::Base(BaseType::Object(name)) => name,
            FieldType::Base(base) => return Ok(Primitive::from_base(base).map(ParamType::Primitive)),
        };

        if let Some(primitive) = Primitive::from_box(name) {
            return Ok(Some(ParamType::Boxed(primitive)));
        }

        Ok(match name {
            "java/lang/String" => Some(ParamType::String),
            "java/lang/CharSequence" => Some(ParamType::CharSequence),
            "java/lang/Object" => Some(ParamType::Object),
            "java/lang/Class" => Some(ParamType::Class),
            _ => match loader.load_class(name)? {
                Some(class) if class.is_enum() => Some(ParamType::Enum {
                    class: class.name(),
                    constants: class.enum_constants(),
                }),
                _ => None,
            },
        })
    }

    /// Field descriptor of the type, e.g. `I` or `Ljava/lang/Integer;`.
    pub fn descriptor(&self) -> String {
        match self {
            ParamType::Primitive(p) => p.descriptor().to_string(),
            ParamType::Boxed(p) => format!("L{};", p.box_name()),
            ParamType::String => "Ljava/lang/String;".to_owned(),
            ParamType::CharSequence => "Ljava/lang/CharSequence;".to_owned(),
            ParamType::Object => "Ljava/lang/Object;".to_owned(),
            ParamType::Enum { class, .. } => format!("L{class};"),
            ParamType::Class => "Ljava/lang/Class;".to_owned(),
        }
    }

    /// Converts one token, trying numeric, boolean and character readings
    /// before passing the text through.
    pub fn coerce(&self, token: &str) -> Option<JvmValue> {
        match self {
            ParamType::Primitive(p) => p.parse(token),
            ParamType::Boxed(p) => p.parse(token).map(|v| JvmValue::Boxed(Box::new(v))),
            ParamType::String | ParamType::CharSequence | ParamType::Object => {
                Some(JvmValue::String(token.to_owned()))
            }
            ParamType::Enum { class, constants } => {
                let constant = constants
                    .iter()
                    .find(|c| **c == token)
                    .or_else(|| constants.iter().find(|c| c.eq_ignore_ascii_case(token)))?;
                Some(JvmValue::Enum {
                    class: (*class).to_owned(),
                    constant: (*constant).to_owned(),
                })
            }
            ParamType::Class => Some(JvmValue::Class(token.to_owned())),
        }
    }

    /// Ranks how well the parameter takes `token`, `None` if it cannot.
    pub fn accept(&self, token: &str) -> Option<Acceptance> {
        self.coerce(token)?;

        let kind = TokenKind::infer(token);
        Some(match self {
            ParamType::Primitive(Primitive::Char) if kind != TokenKind::Char => {
                Acceptance::Fallback
            }
            ParamType::Primitive(p) if Primitive::natural_for(kind) == Some(*p) => {
                Acceptance::Exact
            }
            ParamType::Primitive(_) | ParamType::Boxed(_) => Acceptance::Widening,
            ParamType::String if kind == TokenKind::Text => Acceptance::Exact,
            ParamType::CharSequence if kind == TokenKind::Text => Acceptance::Widening,
            ParamType::Enum { .. } => Acceptance::Exact,
            ParamType::String | ParamType::CharSequence | ParamType::Object | ParamType::Class => {
                Acceptance::Fallback
            }
        })
    }
}

impl<'a> Parameters<'a> {
    /// `None` if any parameter type is unsupported.
    pub fn of(
        method: &Method<'a>,
        loader: &mut ClassLoader<'a>,
    ) -> Result<Option<Parameters<'a>>, JcliError> {
        let params = method.params();
        let (fixed, tail) = match params.split_last() {
            Some((FieldType::Array(1, element), rest)) if method.is_varargs() => {
                (rest, Some(FieldType::Base(*element)))
            }
            _ => (params, None),
        };

        let mut types = Vec::with_capacity(fixed.len());
        for param in fixed {
            match ParamType::classify(*param, loader)? {
                Some(ty) => types.push(ty),
                None => return Ok(None),
            }
        }

        let varargs = match tail {
            Some(element) => match ParamType::classify(element, loader)? {
                Some(ty) => Some(ty),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(Parameters {
            fixed: types,
            varargs,
        }))
    }

    pub fn accepts_arity(&self, arity: usize) -> bool {
        match self.varargs {
            Some(_) => arity >= self.fixed.len(),
            None => arity == self.fixed.len(),
        }
    }

    /// The parameter type each token is matched against.
    pub fn for_position(&self, index: usize) -> Option<ParamType<'a>> {
        self.fixed.get(index).copied().or(self.varargs)
    }
}

impl TokenKind {
    pub fn infer(token: &str) -> TokenKind {
        if parse_integer(token, i32::MIN.into(), i32::MAX.into()).is_some() {
            TokenKind::Int
        } else if parse_integer(token, i64::MIN, i64::MAX).is_some() {
            TokenKind::Long
        } else if parse_decimal(token).is_some() {
            TokenKind::Decimal
        } else if parse_boolean(token).is_some() {
            TokenKind::Boolean
        } else if parse_char(token).is_some() {
            TokenKind::Char
        } else {
            TokenKind::Text
        }
    }
}

/// Coerces every token for `params`. `offset` is the position of
/// `tokens[0]` among the raw arguments, used in error reports. Class names
/// must resolve through `loader` and are rewritten to their binary name.
pub fn coerce_arguments(
    params: &Parameters,
    tokens: &[String],
    offset: usize,
    loader: &mut ClassLoader,
) -> Result<CoercedArguments, JcliError> {
    let mut coerce = |index: usize, ty: &ParamType| -> Result<JvmValue, JcliError> {
        let token = &tokens[index];
        let rejected = || JcliError::ArgumentCoercion {
            position: offset + index,
            token: token.clone(),
            expected: ty.to_string(),
        };

        match ty.coerce(token).ok_or_else(rejected)? {
            JvmValue::Class(name) => match loader.load_class(&name)? {
                Some(class) => Ok(JvmValue::Class(class.binary_name())),
                None => Err(rejected()),
            },
            value => Ok(value),
        }
    };

    if !params.accepts_arity(tokens.len()) {
        return Err(JcliError::Runtime(format!(
            "{} argument(s) given for {} parameter(s)",
            tokens.len(),
            params.fixed.len()
        )));
    }

    let mut values = Vec::with_capacity(params.fixed.len() + 1);
    for (index, ty) in params.fixed.iter().enumerate() {
        values.push(coerce(index, ty)?);
    }

    if let Some(element) = &params.varargs {
        let elements = (params.fixed.len()..tokens.len())
            .map(|index| coerce(index, element))
            .collect::<Result<Vec<_>, _>>()?;
        values.push(JvmValue::Array {
            component: element.descriptor(),
            elements,
        });
    }

    Ok(CoercedArguments(values))
}

fn parse_integer(token: &str, min: i64, max: i64) -> Option<i64> {
    let value = token.parse::<i64>().ok()?;
    (min..=max).contains(&value).then_some(value)
}

/// Reads decimals the way `Double.parseDouble` does, minus hex floats: an
/// optional `f`/`d` suffix, and `NaN`/`Infinity` spelled exactly.
fn parse_decimal(token: &str) -> Option<f64> {
    let body = token.trim();
    let (sign, unsigned) = match body.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, body.strip_prefix('+').unwrap_or(body)),
    };

    match unsigned {
        "NaN" => return Some(f64::NAN),
        "Infinity" => return Some(sign * f64::INFINITY),
        _ => {}
    }

    let number = unsigned
        .strip_suffix(['f', 'F', 'd', 'D'])
        .unwrap_or(unsigned);

    let valid = number.bytes().any(|b| b.is_ascii_digit())
        && !number.starts_with(['+', '-'])
        && number
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !valid {
        return None;
    }

    number.parse::<f64>().ok().map(|v| sign * v)
}

fn parse_boolean(token: &str) -> Option<bool> {
    if token.eq_ignore_ascii_case("true") {
        Some(true)
    } else if token.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_char(token: &str) -> Option<u16> {
    let mut units = token.encode_utf16();
    match (units.next(), units.next()) {
        (Some(unit), None) => Some(unit),
        _ => None,
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        })
    }
}

impl fmt::Display for ParamType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Primitive(p) => write!(f, "{p}"),
            ParamType::Boxed(p) => f.write_str(&p.box_name().replace('/', ".")),
            ParamType::String => f.write_str("java.lang.String"),
            ParamType::CharSequence => f.write_str("java.lang.CharSequence"),
            ParamType::Object => f.write_str("java.lang.Object"),
            ParamType::Enum { class, .. } => f.write_str(&class.replace('/', ".")),
            ParamType::Class => f.write_str("java.lang.Class"),
        }
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use super::*;
    use crate::testing::jdk_basics;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn infers_token_kinds() {
        let cases = [
            ("42", TokenKind::Int),
            ("-7", TokenKind::Int),
            ("9999999999", TokenKind::Long),
            ("4.0", TokenKind::Decimal),
            ("1e3", TokenKind::Decimal),
            ("2.5f", TokenKind::Decimal),
            ("99999999999999999999", TokenKind::Decimal),
            ("TRUE", TokenKind::Boolean),
            ("x", TokenKind::Char),
            ("é", TokenKind::Char),
            ("hello", TokenKind::Text),
            ("", TokenKind::Text),
            ("inf", TokenKind::Text),
        ];
        for (token, kind) in cases {
            assert_eq!(TokenKind::infer(token), kind, "{token}");
        }
    }

    #[test]
    fn numeric_parse_is_range_checked() {
        let byte = ParamType::Primitive(Primitive::Byte);
        assert_eq!(byte.coerce("127"), Some(JvmValue::Byte(127)));
        assert_eq!(byte.coerce("128"), None);

        let int = ParamType::Primitive(Primitive::Int);
        assert_eq!(int.coerce("2147483647"), Some(JvmValue::Int(i32::MAX)));
        assert_eq!(int.coerce("2147483648"), None);
        assert_eq!(int.coerce("1.5"), None);

        let double = ParamType::Primitive(Primitive::Double);
        assert_eq!(double.coerce("16"), Some(JvmValue::Double(16.0)));
        assert_eq!(double.coerce("-Infinity"), Some(JvmValue::Double(f64::NEG_INFINITY)));
        assert_eq!(double.coerce("abc"), None);
    }

    #[test]
    fn boxed_and_text_parameters() {
        assert_eq!(
            ParamType::Boxed(Primitive::Long).coerce("5"),
            Some(JvmValue::Boxed(Box::new(JvmValue::Long(5))))
        );
        assert_eq!(
            ParamType::CharSequence.coerce("hello"),
            Some(JvmValue::String("hello".into()))
        );
        assert_eq!(
            ParamType::Primitive(Primitive::Boolean).coerce("False"),
            Some(JvmValue::Boolean(false))
        );
        assert_eq!(
            ParamType::Primitive(Primitive::Char).coerce("ab"),
            None
        );
    }

    #[test]
    fn enum_constants_by_name() {
        let ty = ParamType::Enum {
            class: "java/time/DayOfWeek",
            constants: &["MONDAY", "TUESDAY"],
        };
        assert_eq!(
            ty.coerce("monday"),
            Some(JvmValue::Enum {
                class: "java/time/DayOfWeek".into(),
                constant: "MONDAY".into()
            })
        );
        assert_eq!(ty.coerce("FRIDAY"), None);
        assert_eq!(ty.to_string(), "java.time.DayOfWeek");
    }

    #[test]
    fn ranks_acceptance() {
        let int = ParamType::Primitive(Primitive::Int);
        let long = ParamType::Primitive(Primitive::Long);
        assert_eq!(int.accept("10"), Some(Acceptance::Exact));
        assert_eq!(long.accept("10"), Some(Acceptance::Widening));
        assert_eq!(int.accept("ten"), None);
        assert_eq!(ParamType::String.accept("ten"), Some(Acceptance::Exact));
        assert_eq!(ParamType::String.accept("10"), Some(Acceptance::Fallback));
        assert_eq!(
            ParamType::CharSequence.accept("ten"),
            Some(Acceptance::Widening)
        );
        assert_eq!(
            ParamType::Primitive(Primitive::Char).accept("7"),
            Some(Acceptance::Fallback)
        );
    }

    #[test]
    fn coercion_failure_names_position_token_and_type() {
        let arena = Bump::new();
        let mut loader = ClassLoader::new(&arena, vec![Box::new(jdk_basics())]);
        let class = loader.require_class("com.example.Ambiguous").unwrap();
        let bump = class.method("bump", "(IZ)I").unwrap();
        let params = Parameters::of(bump, &mut loader).unwrap().unwrap();

        let err = coerce_arguments(&params, &tokens(&["abc", "true"]), 0, &mut loader).unwrap_err();
        insta::assert_snapshot!(err, @"argument 0 ('abc') cannot be converted to int");

        let err = coerce_arguments(&params, &tokens(&["1", "maybe"]), 1, &mut loader).unwrap_err();
        insta::assert_snapshot!(err, @"argument 2 ('maybe') cannot be converted to boolean");

        let args = coerce_arguments(&params, &tokens(&["1", "TRUE"]), 0, &mut loader).unwrap();
        assert_eq!(
            args,
            CoercedArguments(vec![JvmValue::Int(1), JvmValue::Boolean(true)])
        );
    }

    #[test]
    fn packs_varargs_tail() {
        let arena = Bump::new();
        let mut loader = ClassLoader::new(&arena, vec![Box::new(jdk_basics())]);
        let string = loader.require_class("java.lang.String").unwrap();
        let format = string
            .method("format", "(Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/String;")
            .unwrap();
        let params = Parameters::of(format, &mut loader).unwrap().unwrap();
        assert!(params.accepts_arity(1));
        assert!(params.accepts_arity(3));

        let args = coerce_arguments(&params, &tokens(&["%s-%s", "a", "b"]), 0, &mut loader).unwrap();
        assert_eq!(
            args.0[1],
            JvmValue::Array {
                component: "Ljava/lang/Object;".into(),
                elements: vec![JvmValue::String("a".into()), JvmValue::String("b".into())],
            }
        );

        let args = coerce_arguments(&params, &tokens(&["plain"]), 0, &mut loader).unwrap();
        assert_eq!(
            args.0[1],
            JvmValue::Array {
                component: "Ljava/lang/Object;".into(),
                elements: vec![],
            }
        );
    }

    #[test]
    fn classifies_supported_types() {
        let arena = Bump::new();
        let mut loader = ClassLoader::new(&arena, vec![Box::new(jdk_basics())]);

        let days = FieldType::Base(BaseType::Object("java/time/DayOfWeek"));
        assert_eq!(
            ParamType::classify(days, &mut loader).unwrap(),
            Some(ParamType::Enum {
                class: "java/time/DayOfWeek",
                constants: &["MONDAY", "TUESDAY"],
            })
        );

        let uuid = FieldType::Base(BaseType::Object("java/util/UUID"));
        assert_eq!(ParamType::classify(uuid, &mut loader).unwrap(), None);

        let ints = FieldType::Array(1, BaseType::Int);
        assert_eq!(ParamType::classify(ints, &mut loader).unwrap(), None);
    }
}
