//! Request argument binding.
//!
//! Every handler parameter is described by a [`ParamSpec`]: an optional
//! binding tag plus the declared type. Arguments are built in parameter order,
//! each from the first source that applies:
//!
//! 1. path-binding tag: the named path segment, coerced to the declared type
//! 2. query-binding tag: the named query parameter, coerced
//! 3. body-binding tag: the request payload, deserialized from JSON
//! 4. the declared type is [`RequestContext`], [`ResponseSink`] or [`HttpRequest`]
//! 5. a registered component assignable to the declared type
//!
//! Path and query values that are missing or don't coerce bind as absent. A
//! body that fails to deserialize is a handler failure.

use crate::context::{RequestContext, ResponseSink};
use crate::descriptor::TypeKey;
use crate::exception::Failure;
use crate::logging::trace;
use crate::registry::{Binding, Registry};
use crate::value::ConfigScalar;
use crate::{Error, HttpRequest};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Where a tagged parameter reads its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTag {
    Path(String),
    Query(String),
    Body,
}

type CoerceFn = Arc<dyn Fn(&str) -> Option<Binding> + Send + Sync>;
type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<Binding, Error> + Send + Sync>;

/// Binding specification of one handler parameter.
#[derive(Clone)]
pub struct ParamSpec {
    tag: Option<BindingTag>,
    declared: TypeKey,
    coerce: Option<CoerceFn>,
    decode: Option<DecodeFn>,
}

impl ParamSpec {
    /// A parameter of type `T` with no string or body conversion.
    ///
    /// Context types bind as owned clones; anything else is looked up in the
    /// registry and binds as `Arc<T>`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            tag: None,
            declared: TypeKey::of::<T>(),
            coerce: None,
            decode: None,
        }
    }

    /// A scalar parameter, coercible from a path segment or query value.
    pub fn scalar<T: ConfigScalar>() -> Self {
        Self {
            coerce: Some(Arc::new(|raw: &str| {
                T::coerce(raw).map(|value| Box::new(value) as Binding)
            })),
            ..Self::of::<T>()
        }
    }

    /// A parameter deserializable from a JSON body.
    pub fn json<T: DeserializeOwned + Send + Sync + 'static>() -> Self {
        Self {
            decode: Some(Arc::new(|bytes: &[u8]| {
                serde_json::from_slice::<T>(bytes)
                    .map(|value| Box::new(value) as Binding)
                    .map_err(|e| Error::Deserialization(e.to_string()))
            })),
            ..Self::of::<T>()
        }
    }

    pub fn path(mut self, name: impl Into<String>) -> Self {
        self.tag = Some(BindingTag::Path(name.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.tag = Some(BindingTag::Query(name.into()));
        self
    }

    pub fn body(mut self) -> Self {
        self.tag = Some(BindingTag::Body);
        self
    }

    pub fn tag(&self) -> Option<&BindingTag> {
        self.tag.as_ref()
    }

    pub fn declared(&self) -> TypeKey {
        self.declared
    }

    /// Whether this parameter can represent the full request context.
    pub fn carries_context(&self) -> bool {
        self.declared == TypeKey::of::<RequestContext>()
    }

    fn coerce(&self, raw: Option<&String>) -> Option<Binding> {
        let raw = raw?;
        let coerce = self.coerce.as_ref()?;
        coerce(raw.as_str())
    }
}

impl std::fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSpec")
            .field("tag", &self.tag)
            .field("declared", &self.declared)
            .finish()
    }
}

/// Bind one of the framework-provided context objects, if `declared` names one.
fn bind_context(declared: &TypeKey, ctx: &RequestContext) -> Option<Binding> {
    if *declared == TypeKey::of::<RequestContext>() {
        Some(Box::new(ctx.clone()))
    } else if *declared == TypeKey::of::<ResponseSink>() {
        Some(Box::new(ctx.response().clone()))
    } else if *declared == TypeKey::of::<HttpRequest>() {
        Some(Box::new(ctx.request().clone()))
    } else {
        None
    }
}

/// Bound call arguments, one optional slot per parameter.
#[derive(Default)]
pub struct Args {
    slots: Vec<Option<Binding>>,
}

impl Args {
    pub fn new(slots: Vec<Option<Binding>>) -> Self {
        Self { slots }
    }

    /// Take the argument at `index` as `T`. Absent or differently typed slots yield `None`.
    pub fn take<T: 'static>(&mut self, index: usize) -> Option<T> {
        let binding = self.slots.get_mut(index)?.take()?;
        binding.downcast::<T>().ok().map(|value| *value)
    }

    /// Like [`Args::take`], but an absent argument is an error.
    pub fn require<T: 'static>(&mut self, index: usize) -> Result<T, Error> {
        self.take(index).ok_or_else(|| {
            Error::Internal(format!(
                "argument {} is not bound as `{}`",
                index,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn is_bound(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(Option::is_some))
            .finish()
    }
}

/// Build the argument list of a routed handler.
pub fn bind_arguments(
    params: &[ParamSpec],
    ctx: &RequestContext,
    registry: &Registry,
) -> Result<Args, Error> {
    let mut slots = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        let slot = match &param.tag {
            Some(BindingTag::Path(name)) => param.coerce(ctx.request().param(name)),
            Some(BindingTag::Query(name)) => param.coerce(ctx.request().query(name)),
            Some(BindingTag::Body) => match &param.decode {
                Some(decode) => Some(decode(ctx.request().body.as_slice())?),
                None => {
                    return Err(Error::Deserialization(format!(
                        "parameter {} of type `{}` can't be read from the body",
                        index,
                        param.declared.name()
                    )));
                }
            },
            None => bind_context(&param.declared, ctx)
                .or_else(|| registry.find_assignable(&param.declared)),
        };
        trace!(
            index,
            declared = param.declared.name(),
            bound = slot.is_some(),
            "Bound handler argument"
        );
        slots.push(slot);
    }
    Ok(Args::new(slots))
}

/// Build the argument list of an exception-mapped handler.
///
/// Tags are ignored here: parameters bind to the failure, the context objects
/// or a registered component, and absent otherwise.
pub fn bind_failure_arguments(
    params: &[ParamSpec],
    ctx: &RequestContext,
    registry: &Registry,
    failure: &Failure,
) -> Args {
    let failure_key = TypeKey::of::<Failure>();
    let slots = params
        .iter()
        .map(|param| {
            if param.declared == failure_key {
                Some(Box::new(failure.clone()) as Binding)
            } else {
                bind_context(&param.declared, ctx)
                    .or_else(|| registry.find_assignable(&param.declared))
            }
        })
        .collect();
    Args::new(slots)
}
