// Core library for the Trellis runtime
// Component resolution, value injection, lifecycle hooks and request argument binding

pub mod application;
pub mod binder;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod exception;
pub mod filter;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod routing;
pub mod value;

// Re-export commonly used types
pub use application::{Application, ApplicationBuilder, StartCallback, StartFailureCallback};
pub use binder::{Args, BindingTag, ParamSpec, bind_arguments, bind_failure_arguments};
pub use config::{ConfigSource, ServerOptions};
pub use context::{RequestContext, ResponseSink};
pub use descriptor::{Capability, ComponentDescriptor, Role, TypeDescriptor, TypeKey};
pub use error::*;
pub use exception::{ExceptionDispatcher, Failure};
pub use filter::{FrontFilter, Next};
pub use handler::{ExceptionMapping, HandlerFuture, HandlerMethod, RouteMapping, Verb};
pub use crate::http::*;
pub use lifecycle::{HookFailure, LifecycleInvoker, invoke_init_hooks};
pub use registry::{Binding, ComponentEntry, Instance, Registry};
pub use resolver::Resolver;
pub use routing::{RouteEndpoint, Router};
pub use value::{ConfigScalar, ScalarKind, ValueBinding, ValueOutcome, inject_values};
