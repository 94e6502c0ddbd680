//! Overload resolution: which method of which class gets called, on what
//! receiver, with which tokens.

use std::collections::HashSet;

use jvm_host::{Call, JvmValue, Receiver};
use tracing::debug;

use crate::class::{Class, Method};
use crate::coerce::{coerce_arguments, CoercedArguments, ParamType, Parameters, Primitive};
use crate::descriptor::{BaseType, FieldType};
use crate::engine::Invocation;
use crate::error::JcliError;
use crate::loader::ClassLoader;
use crate::request::{InvocationRequest, Strategy};

/// Return types whose `toString` says nothing useful.
const OPAQUE_RETURN_TYPES: &[&str] = &[
    "java/util/stream/BaseStream",
    "java/util/Iterator",
    "java/util/Spliterator",
    "java/util/Enumeration",
];

/// Single-argument constructors tried, in order, to build a receiver from a
/// token.
const RECEIVER_CONSTRUCTORS: &[(&str, ParamType<'static>)] = &[
    ("(Ljava/lang/String;)V", ParamType::String),
    ("(J)V", ParamType::Primitive(Primitive::Long)),
    ("(I)V", ParamType::Primitive(Primitive::Int)),
];

#[derive(Clone, Debug)]
pub struct ResolvedMethod<'a> {
    pub declaring_class: &'a Class<'a>,
    pub method: &'a Method<'a>,
    pub params: Parameters<'a>,
}

#[derive(Clone, Debug)]
pub enum ReceiverPlan<'a> {
    /// Static call, no receiver.
    Static,
    /// `new C()`.
    DefaultConstructor,
    /// The target class is `java.lang.String`; the token is the receiver.
    Text(String),
    /// `new C(value)` through the single-argument constructors that accept
    /// the token, tried in order until one does not throw.
    Construct {
        constructors: Vec<(&'static str, JvmValue)>,
    },
    /// `C.factory(token)`.
    Factory {
        method: ResolvedMethod<'a>,
        args: CoercedArguments,
    },
}

/// The chosen method, how its receiver is obtained, and the tokens destined
/// for its parameters.
#[derive(Clone, Debug)]
pub struct CallPlan<'a> {
    pub target: &'a Class<'a>,
    pub method: ResolvedMethod<'a>,
    pub receiver: ReceiverPlan<'a>,
    pub tokens: Vec<String>,
    /// Position of `tokens[0]` among the raw arguments.
    pub token_offset: usize,
}

#[derive(Debug)]
enum Support<'a> {
    Supported(Parameters<'a>),
    UnsupportedParams,
    UnsupportedReturn(FieldType<'a>),
}

#[derive(Debug)]
struct Candidate<'a> {
    declaring_class: &'a Class<'a>,
    method: &'a Method<'a>,
    support: Support<'a>,
}

/// Where the receiver of a selected method comes from.
#[derive(Clone, Copy, Debug)]
enum Stage {
    Static,
    DefaultConstructor,
    FirstToken,
}

enum Selection<'a> {
    Found(ResolvedMethod<'a>),
    /// Arity matched, but no candidate accepts every token. The first such
    /// candidate is kept so coercion can report the offending token.
    Incompatible(ResolvedMethod<'a>),
    Ambiguous(Vec<String>),
    Nothing,
}

pub struct MethodLocator<'l, 'a> {
    loader: &'l mut ClassLoader<'a>,
}

impl<'l, 'a> MethodLocator<'l, 'a> {
    pub fn new(loader: &'l mut ClassLoader<'a>) -> MethodLocator<'l, 'a> {
        MethodLocator { loader }
    }

    pub fn plan(&mut self, request: &InvocationRequest) -> Result<CallPlan<'a>, JcliError> {
        let target = self.loader.require_class(&request.class_name)?;
        let candidates = self.candidates(target, &request.method_name)?;
        let tokens = &request.args;

        debug!(
            class = %target.binary_name(),
            method = %request.method_name,
            candidates = candidates.len(),
            strategy = ?request.strategy,
            "locating method"
        );

        let mut fallback = None;
        let mut stage = |selection: Selection<'a>,
                         receiver: Stage|
         -> Result<Option<ResolvedMethod<'a>>, JcliError> {
            match selection {
                Selection::Found(method) => Ok(Some(method)),
                Selection::Ambiguous(signatures) => Err(JcliError::AmbiguousMethod {
                    class: target.binary_name(),
                    method: request.method_name.clone(),
                    signatures,
                }),
                Selection::Incompatible(method) => {
                    fallback.get_or_insert((method, receiver));
                    Ok(None)
                }
                Selection::Nothing => Ok(None),
            }
        };

        let mut chosen = None;
        match request.strategy {
            Strategy::Static => {
                chosen = stage(select(&candidates, tokens, true), Stage::Static)?
                    .map(|m| (m, Stage::Static));
            }
            Strategy::Instance => {
                if tokens.is_empty() {
                    return Err(JcliError::Usage(format!(
                        "calling instance method {} needs the receiver as the first argument",
                        request.method_name
                    )));
                }
                chosen = stage(select(&candidates, &tokens[1..], false), Stage::FirstToken)?
                    .map(|m| (m, Stage::FirstToken));
            }
            Strategy::Auto => {
                chosen = stage(select(&candidates, tokens, true), Stage::Static)?
                    .map(|m| (m, Stage::Static));

                if chosen.is_none() && !target.is_abstract() && target.has_public_constructor("()V")
                {
                    chosen = stage(select(&candidates, tokens, false), Stage::DefaultConstructor)?
                        .map(|m| (m, Stage::DefaultConstructor));
                }

                if chosen.is_none() && !tokens.is_empty() {
                    chosen = stage(select(&candidates, &tokens[1..], false), Stage::FirstToken)?
                        .map(|m| (m, Stage::FirstToken));
                }
            }
        }

        let Some((method, stage)) = chosen.or(fallback) else {
            return Err(self.diagnose(target, &candidates, request));
        };

        let (receiver, offset) = match stage {
            Stage::Static => (ReceiverPlan::Static, 0),
            Stage::DefaultConstructor => (ReceiverPlan::DefaultConstructor, 0),
            Stage::FirstToken => (self.receiver_from_token(target, &tokens[0], request)?, 1),
        };

        Ok(CallPlan {
            target,
            method,
            receiver,
            tokens: tokens[offset..].to_vec(),
            token_offset: offset,
        })
    }

    /// Every supported public method of `class_name` as `name(Type, Type)`,
    /// sorted by name then signature. Static methods carry a `static `
    /// prefix that does not take part in the ordering.
    pub fn list_methods(&mut self, class_name: &str) -> Result<Vec<String>, JcliError> {
        let class = self.loader.require_class(class_name)?;

        let mut listing = vec![];
        for candidate in self.members(class, None)? {
            if let Support::Supported(_) = candidate.support {
                listing.push((
                    candidate.method.name,
                    short_signature(candidate.method),
                    candidate.method.is_static(),
                ));
            }
        }

        listing.sort();
        listing.dedup();
        Ok(listing
            .into_iter()
            .map(|(_, signature, is_static)| match is_static {
                true => format!("static {signature}"),
                false => signature,
            })
            .collect())
    }

    fn candidates(
        &mut self,
        class: &'a Class<'a>,
        name: &str,
    ) -> Result<Vec<Candidate<'a>>, JcliError> {
        if name.starts_with('<') {
            return Ok(vec![]);
        }
        self.members(class, Some(name))
    }

    /// Public members visible on `class`, optionally filtered by name.
    /// Declarations closer to `class` shadow identical signatures further
    /// up, and static interface methods are not inherited.
    fn members(
        &mut self,
        class: &'a Class<'a>,
        name: Option<&str>,
    ) -> Result<Vec<Candidate<'a>>, JcliError> {
        let mut seen = HashSet::new();
        let mut candidates = vec![];

        for declaring_class in self.loader.hierarchy(class)? {
            let inherited = !std::ptr::eq(declaring_class, class);

            for method in declaring_class.methods() {
                if name.is_some_and(|name| method.name != name)
                    || method.name.starts_with('<')
                    || !method.is_public()
                {
                    continue;
                }
                if inherited && declaring_class.is_interface() && method.is_static() {
                    continue;
                }

                if method.is_synthetic() {
                    continue;
                }

                let params_key = method.descriptor.split(')').next().unwrap_or_default();
                if !seen.insert((method.name, params_key)) {
                    continue;
                }

                candidates.push(Candidate {
                    declaring_class,
                    method,
                    support: self.support(method)?,
                });
            }
        }

        Ok(candidates)
    }

    fn support(&mut self, method: &'a Method<'a>) -> Result<Support<'a>, JcliError> {
        let Some(params) = Parameters::of(method, self.loader)? else {
            return Ok(Support::UnsupportedParams);
        };

        if let Some(return_type @ FieldType::Base(BaseType::Object(name))) = method.return_type() {
            for opaque in OPAQUE_RETURN_TYPES {
                if self.loader.is_assignable(name, opaque)? {
                    return Ok(Support::UnsupportedReturn(return_type));
                }
            }
        }

        Ok(Support::Supported(params))
    }

    fn receiver_from_token(
        &mut self,
        target: &'a Class<'a>,
        token: &str,
        request: &InvocationRequest,
    ) -> Result<ReceiverPlan<'a>, JcliError> {
        if let Some(factory) = &request.factory {
            let candidates = self.candidates(target, factory)?;
            let token = [token.to_owned()];
            let method = match select(&candidates, &token, true) {
                Selection::Found(method) | Selection::Incompatible(method) => method,
                Selection::Ambiguous(signatures) => {
                    return Err(JcliError::AmbiguousMethod {
                        class: target.binary_name(),
                        method: factory.clone(),
                        signatures,
                    })
                }
                Selection::Nothing => {
                    return Err(JcliError::MethodNotFound {
                        class: target.binary_name(),
                        method: factory.clone(),
                        arity: 1,
                        detail: "factory must be a public static method taking one argument"
                            .to_owned(),
                    })
                }
            };
            let args = coerce_arguments(&method.params, &token, 0, self.loader)?;
            return Ok(ReceiverPlan::Factory { method, args });
        }

        if target.name() == "java/lang/String" {
            return Ok(ReceiverPlan::Text(token.to_owned()));
        }

        if !target.is_abstract() {
            let constructors = RECEIVER_CONSTRUCTORS
                .iter()
                .filter(|(descriptor, _)| target.has_public_constructor(descriptor))
                .filter_map(|&(descriptor, ty)| Some((descriptor, ty.coerce(token)?)))
                .collect::<Vec<_>>();
            if !constructors.is_empty() {
                return Ok(ReceiverPlan::Construct { constructors });
            }
        }

        Err(JcliError::ArgumentCoercion {
            position: 0,
            token: token.to_owned(),
            expected: target.binary_name(),
        })
    }

    fn diagnose(
        &self,
        target: &'a Class<'a>,
        candidates: &[Candidate<'a>],
        request: &InvocationRequest,
    ) -> JcliError {
        let arity = request.args.len();
        let receiver_arity = match request.strategy {
            Strategy::Static => None,
            _ => arity.checked_sub(1),
        };

        let detail = if candidates.is_empty() {
            format!("no public method named '{}'", request.method_name)
        } else if let Some(detail) = explain(candidates, arity, request.strategy)
            .or_else(|| receiver_arity.and_then(|n| explain(candidates, n, request.strategy)))
        {
            detail
        } else {
            format!(
                "'{}' exists but takes a different number of arguments (found {} overload(s))",
                request.method_name,
                candidates.len()
            )
        };

        JcliError::MethodNotFound {
            class: target.binary_name(),
            method: request.method_name.clone(),
            arity,
            detail,
        }
    }
}

/// Picks the best candidate for `tokens` among methods of the requested
/// staticness. Candidates are ranked by the per-token acceptance total;
/// fixed-arity methods beat varargs ones, and fewer `Object` fallbacks
/// break remaining ties.
fn select<'a>(candidates: &[Candidate<'a>], tokens: &[String], want_static: bool) -> Selection<'a> {
    let arity_matches = candidates
        .iter()
        .filter(|c| c.method.is_static() == want_static)
        .filter_map(|c| match &c.support {
            Support::Supported(params) if params.accepts_arity(tokens.len()) => Some((c, params)),
            _ => None,
        })
        .collect::<Vec<_>>();

    let Some((first, first_params)) = arity_matches.first() else {
        return Selection::Nothing;
    };

    let scored = arity_matches
        .iter()
        .filter_map(|(candidate, params)| score(params, tokens).map(|s| (s, candidate, params)))
        .collect::<Vec<_>>();

    let Some(best) = scored.iter().map(|(s, ..)| *s).min() else {
        return Selection::Incompatible(resolved(first, first_params));
    };

    let tied = scored
        .iter()
        .filter(|(s, ..)| *s == best)
        .collect::<Vec<_>>();

    if let [(_, candidate, params)] = tied.as_slice() {
        return Selection::Found(resolved(candidate, params));
    }

    Selection::Ambiguous(
        tied.iter()
            .map(|(_, candidate, _)| short_signature(candidate.method))
            .collect(),
    )
}

/// `(varargs, total cost, Object positions)`, or `None` if a token is
/// rejected.
fn score(params: &Parameters, tokens: &[String]) -> Option<(bool, u32, u32)> {
    let mut total = 0;
    let mut objects = 0;
    for (index, token) in tokens.iter().enumerate() {
        let ty = params.for_position(index)?;
        total += ty.accept(token)? as u32;
        if ty == ParamType::Object {
            objects += 1;
        }
    }
    Some((params.varargs.is_some(), total, objects))
}

fn resolved<'a>(candidate: &Candidate<'a>, params: &Parameters<'a>) -> ResolvedMethod<'a> {
    ResolvedMethod {
        declaring_class: candidate.declaring_class,
        method: candidate.method,
        params: params.clone(),
    }
}

/// Why no method with `arity` arguments could be used, if there is a more
/// specific reason than a plain arity mismatch.
fn explain(candidates: &[Candidate], arity: usize, strategy: Strategy) -> Option<String> {
    let with_arity = candidates
        .iter()
        .filter(|c| raw_accepts_arity(c.method, arity))
        .collect::<Vec<_>>();

    let unsupported_return = with_arity.iter().find_map(|c| match c.support {
        Support::UnsupportedReturn(return_type) => Some((c.method.name, return_type)),
        _ => None,
    });
    if let Some((name, return_type)) = unsupported_return {
        return Some(format!(
            "'{name}' exists but returns {return_type}, which has no useful text form"
        ));
    }

    if let Some(c) = with_arity
        .iter()
        .find(|c| matches!(c.support, Support::UnsupportedParams))
    {
        return Some(format!(
            "'{}' exists but has unsupported parameter types",
            c.method.name
        ));
    }

    let supported = with_arity
        .iter()
        .find(|c| matches!(c.support, Support::Supported(_)))?;
    match strategy {
        Strategy::Static if !supported.method.is_static() => Some(format!(
            "'{}' is an instance method; the receiver comes from the first argument without --static",
            supported.method.name
        )),
        Strategy::Instance if supported.method.is_static() => Some(format!(
            "'{}' is static; drop --instance",
            supported.method.name
        )),
        _ => None,
    }
}

fn raw_accepts_arity(method: &Method, arity: usize) -> bool {
    let count = method.params().len();
    count == arity || (method.is_varargs() && count > 0 && arity >= count - 1)
}

/// `max(int, int)`, with a varargs tail rendered as `Object...`.
fn short_signature(method: &Method) -> String {
    let params = method.params();
    let rendered = params
        .iter()
        .enumerate()
        .map(|(i, param)| match (method.is_varargs(), param.component()) {
            (true, Some(component)) if i + 1 == params.len() => format!("{component}..."),
            _ => param.to_string(),
        })
        .collect::<Vec<_>>();
    format!("{}({})", method.name, rendered.join(", "))
}

impl<'a> ResolvedMethod<'a> {
    /// `java.lang.Math.max(int, int)`.
    pub fn signature(&self) -> String {
        format!(
            "{}.{}",
            self.declaring_class.binary_name(),
            short_signature(self.method)
        )
    }

    pub fn return_type(&self) -> Option<String> {
        self.method.return_type().map(|ty| ty.to_string())
    }
}

impl<'a> CallPlan<'a> {
    /// Coerces the tokens for the chosen method. Nothing runs in the JVM
    /// until this has succeeded for every token.
    pub fn coerce(&self, loader: &mut ClassLoader<'a>) -> Result<CoercedArguments, JcliError> {
        coerce_arguments(&self.method.params, &self.tokens, self.token_offset, loader)
    }

    /// Binds coerced arguments into a call that no longer borrows class
    /// metadata.
    pub fn bind(&self, args: CoercedArguments) -> Invocation {
        let receiver = match &self.receiver {
            ReceiverPlan::Static => Receiver::Static,
            ReceiverPlan::DefaultConstructor => Receiver::New {
                descriptor: "()V".to_owned(),
                args: vec![],
            },
            ReceiverPlan::Text(text) => Receiver::Value(JvmValue::String(text.clone())),
            ReceiverPlan::Construct { constructors } => Receiver::Construct {
                constructors: constructors
                    .iter()
                    .map(|(descriptor, value)| ((*descriptor).to_owned(), value.clone()))
                    .collect(),
            },
            ReceiverPlan::Factory { method, args } => Receiver::Factory {
                method: method.method.name.to_owned(),
                descriptor: method.method.descriptor.to_owned(),
                args: args.0.clone(),
            },
        };

        Invocation {
            call: Call {
                class: self.target.name().to_owned(),
                method: self.method.method.name.to_owned(),
                descriptor: self.method.method.descriptor.to_owned(),
                receiver,
                args: args.0,
            },
            signature: self.method.signature(),
            return_type: self.method.return_type(),
        }
    }
}
