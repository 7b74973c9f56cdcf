// Handler methods and their dispatch mappings

use crate::binder::{Args, ParamSpec};
use crate::registry::Instance;
use crate::{Error, HttpMethod};
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by every handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

type InvokeFn = Arc<dyn Fn(Instance, Args) -> Option<HandlerFuture> + Send + Sync>;

/// A method of a handler group or error-handler group.
///
/// The method is described by its parameter specs and an async function of
/// the owning component plus the bound [`Args`]. Output goes through the
/// [`ResponseSink`](crate::ResponseSink) of the request.
#[derive(Clone)]
pub struct HandlerMethod {
    name: &'static str,
    params: Vec<ParamSpec>,
    invoke: InvokeFn,
}

impl HandlerMethod {
    pub fn new<C, F, Fut>(name: &'static str, handler: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            name,
            params: Vec::new(),
            invoke: Arc::new(move |owner: Instance, args: Args| {
                let owner = owner.downcast::<C>().ok()?;
                Some(Box::pin(handler(owner, args)) as HandlerFuture)
            }),
        }
    }

    /// Append a parameter.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Whether some parameter can carry the full request context.
    pub fn accepts_context(&self) -> bool {
        self.params.iter().any(ParamSpec::carries_context)
    }

    /// Comma-separated declared parameter types, for diagnostics.
    pub fn signature(&self) -> String {
        self.params
            .iter()
            .map(|param| param.declared().name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Call the method on `owner`.
    pub fn invoke(&self, owner: Instance, args: Args) -> HandlerFuture {
        match (self.invoke)(owner, args) {
            Some(future) => future,
            None => {
                let name = self.name;
                Box::pin(async move {
                    Err(Error::Internal(format!(
                        "handler `{}` invoked on an instance of the wrong type",
                        name
                    )))
                })
            }
        }
    }
}

impl std::fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// What a route mapping dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Method(HttpMethod),
    /// Fallback for requests no other endpoint matched
    CatchAll,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Method(method) => f.write_str(method.as_str()),
            Verb::CatchAll => f.write_str("*"),
        }
    }
}

/// Default media type of handler output.
pub const DEFAULT_PRODUCES: &str = "application/json";

/// Verb, paths and content-type constraints of a routable method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMapping {
    verb: Verb,
    paths: Vec<String>,
    consumes: Option<String>,
    produces: String,
}

impl RouteMapping {
    pub fn method(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            verb: Verb::Method(method),
            paths: vec![path.into()],
            consumes: None,
            produces: DEFAULT_PRODUCES.to_string(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::DELETE, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::method(HttpMethod::PATCH, path)
    }

    pub fn catch_all() -> Self {
        Self {
            verb: Verb::CatchAll,
            paths: Vec::new(),
            consumes: None,
            produces: DEFAULT_PRODUCES.to_string(),
        }
    }

    /// Map an additional path to the same method.
    pub fn also(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Only accept request bodies of this media type.
    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes = Some(media_type.into());
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces = media_type.into();
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn consumed(&self) -> Option<&str> {
        self.consumes.as_deref()
    }

    pub fn produced(&self) -> &str {
        &self.produces
    }
}

type CauseMatcher = fn(&(dyn StdError + Send + Sync + 'static)) -> bool;

/// Failure type an exception-mapped method handles.
#[derive(Clone, Copy)]
pub enum ExceptionMapping {
    /// Exactly this cause type
    Exact {
        name: &'static str,
        matches: CauseMatcher,
    },
    /// Last resort for any failure
    Any,
}

impl ExceptionMapping {
    pub fn of<E: StdError + 'static>() -> Self {
        ExceptionMapping::Exact {
            name: std::any::type_name::<E>(),
            matches: |cause: &(dyn StdError + Send + Sync + 'static)| cause.is::<E>(),
        }
    }

    pub fn any() -> Self {
        ExceptionMapping::Any
    }

    /// Whether this is an exact mapping for the type of `cause`.
    pub fn matches_exactly(&self, cause: &(dyn StdError + Send + Sync + 'static)) -> bool {
        match self {
            ExceptionMapping::Exact { matches, .. } => matches(cause),
            ExceptionMapping::Any => false,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, ExceptionMapping::Any)
    }
}

impl std::fmt::Debug for ExceptionMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionMapping::Exact { name, .. } => write!(f, "Exact({})", name),
            ExceptionMapping::Any => f.write_str("Any"),
        }
    }
}

/// A handler method with the mappings that route to it.
#[derive(Debug, Clone)]
pub struct RoutableMethod {
    pub mapping: RouteMapping,
    pub method: Arc<HandlerMethod>,
}

/// A method of an error-handler group.
#[derive(Debug, Clone)]
pub struct ExceptionMethod {
    pub mapping: ExceptionMapping,
    pub method: Arc<HandlerMethod>,
}
