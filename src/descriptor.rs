use std::fmt;

use bumpalo::Bump;
use color_eyre::eyre::{self, eyre};
use winnow::combinator::{alt, delimited, dispatch, empty, fail, repeat, terminated};
use winnow::token::{any, take_till, take_while};
use winnow::{PResult, Parser};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseType<'a> {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Internal class name, e.g. `java/lang/String`.
    Object(&'a str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType<'a> {
    Base(BaseType<'a>),
    Array(u8, BaseType<'a>),
}

#[derive(Clone, Copy, Debug)]
pub struct MethodDescriptor<'a> {
    pub params: &'a [FieldType<'a>],
    pub return_type: Option<FieldType<'a>>,
}

pub fn parse_method_descriptor<'a>(
    arena: &'a Bump,
    descriptor: &'a str,
) -> eyre::Result<MethodDescriptor<'a>> {
    let (params, return_type) = (parse_params_types, parse_return_type)
        .parse(descriptor)
        .map_err(|e| eyre!("invalid method descriptor '{descriptor}': {e}"))?;

    Ok(MethodDescriptor {
        params: arena.alloc_slice_fill_iter(params),
        return_type,
    })
}

fn parse_base_type<'s>(input: &mut &'s str) -> PResult<BaseType<'s>> {
    dispatch! { any;
        'L' => terminated(take_till(1.., ';').map(BaseType::Object), ';'),
        'B' => empty.map(|_| BaseType::Byte),
        'C' => empty.map(|_| BaseType::Char),
        'D' => empty.map(|_| BaseType::Double),
        'F' => empty.map(|_| BaseType::Float),
        'I' => empty.map(|_| BaseType::Int),
        'J' => empty.map(|_| BaseType::Long),
        'S' => empty.map(|_| BaseType::Short),
        'Z' => empty.map(|_| BaseType::Boolean),
        _ => fail,
    }
    .parse_next(input)
}

fn parse_array_type<'s>(input: &mut &'s str) -> PResult<(u8, BaseType<'s>)> {
    let parse_array_depth = take_while(1..=255, '[').map(|v: &str| v.len() as u8);
    (parse_array_depth, parse_base_type).parse_next(input)
}

fn parse_field_type<'s>(input: &mut &'s str) -> PResult<FieldType<'s>> {
    alt((
        parse_base_type.map(FieldType::Base),
        parse_array_type.map(|(n, ty)| FieldType::Array(n, ty)),
    ))
    .parse_next(input)
}

fn parse_params_types<'s>(input: &mut &'s str) -> PResult<Vec<FieldType<'s>>> {
    delimited("(", repeat(.., parse_field_type), ")").parse_next(input)
}

fn parse_return_type<'s>(input: &mut &'s str) -> PResult<Option<FieldType<'s>>> {
    alt(("V".map(|_| None), parse_field_type.map(Some))).parse_next(input)
}

impl<'a> FieldType<'a> {
    /// The element type of an array type, `None` for non-arrays.
    pub fn component(&self) -> Option<FieldType<'a>> {
        match *self {
            FieldType::Base(_) => None,
            FieldType::Array(1, base) => Some(FieldType::Base(base)),
            FieldType::Array(depth, base) => Some(FieldType::Array(depth - 1, base)),
        }
    }
}

impl fmt::Display for BaseType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Byte => f.write_str("byte"),
            BaseType::Char => f.write_str("char"),
            BaseType::Double => f.write_str("double"),
            BaseType::Float => f.write_str("float"),
            BaseType::Int => f.write_str("int"),
            BaseType::Long => f.write_str("long"),
            BaseType::Short => f.write_str("short"),
            BaseType::Boolean => f.write_str("boolean"),
            BaseType::Object(name) => f.write_str(&name.replace('/', ".")),
        }
    }
}

/// Renders types the way Java source spells them: `int`, `java.lang.String[]`.
impl fmt::Display for FieldType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => write!(f, "{base}"),
            FieldType::Array(depth, base) => {
                write!(f, "{base}")?;
                for _ in 0..*depth {
                    f.write_str("[]")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use super::*;

    #[test]
    fn parses_method_descriptor() {
        let arena = Bump::new();
        let descriptor =
            parse_method_descriptor(&arena, "(I[JLjava/lang/String;[[Ljava/lang/Object;)V")
                .unwrap();

        assert_eq!(
            descriptor.params,
            &[
                FieldType::Base(BaseType::Int),
                FieldType::Array(1, BaseType::Long),
                FieldType::Base(BaseType::Object("java/lang/String")),
                FieldType::Array(2, BaseType::Object("java/lang/Object")),
            ]
        );
        assert_eq!(descriptor.return_type, None);
    }

    #[test]
    fn parses_return_types() {
        let arena = Bump::new();
        let descriptor = parse_method_descriptor(&arena, "()Ljava/util/UUID;").unwrap();
        assert!(descriptor.params.is_empty());
        assert_eq!(
            descriptor.return_type,
            Some(FieldType::Base(BaseType::Object("java/util/UUID")))
        );
    }

    #[test]
    fn rejects_malformed_descriptors() {
        let arena = Bump::new();
        for descriptor in ["", "I", "(I", "(Q)V", "(Ljava/lang/String)V", "(L;)V", "()"] {
            assert!(
                parse_method_descriptor(&arena, descriptor).is_err(),
                "{descriptor} should not parse"
            );
        }
    }

    #[test]
    fn renders_java_names() {
        let arena = Bump::new();
        let descriptor =
            parse_method_descriptor(&arena, "(C[ILjava/lang/CharSequence;)[[D").unwrap();
        let params = descriptor
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        assert_eq!(params, ["char", "int[]", "java.lang.CharSequence"]);
        assert_eq!(descriptor.return_type.unwrap().to_string(), "double[][]");
    }

    #[test]
    fn component_of_arrays() {
        let ty = FieldType::Array(2, BaseType::Int);
        assert_eq!(ty.component(), Some(FieldType::Array(1, BaseType::Int)));
        assert_eq!(
            ty.component().and_then(|c| c.component()),
            Some(FieldType::Base(BaseType::Int))
        );
        assert_eq!(FieldType::Base(BaseType::Int).component(), None);
    }
}
