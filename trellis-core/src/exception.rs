//! Uncaught handler failures and their dispatch to error-handler groups.
//!
//! When a routed handler (or the front filter) fails, error-handler groups
//! are consulted in registry order until one of them handles it:
//!
//! - a method mapped to the exact type of the failure's cause is invoked
//! - otherwise, if the response has not ended yet, the group's generic
//!   method ([`ExceptionMapping::any`]) is invoked
//!
//! The response status is preset to the failure's status before any handler
//! runs. When no handler was found, or the chosen handler fails itself, the
//! raw failure message is written back as the body.
//!
//! [`ExceptionMapping::any`]: crate::ExceptionMapping::any

use crate::Error;
use crate::binder::bind_failure_arguments;
use crate::context::{RequestContext, ResponseSink};
use crate::descriptor::Role;
use crate::handler::ExceptionMethod;
use crate::logging::{debug, warn};
use crate::registry::{Instance, Registry};
use std::error::Error as StdError;
use std::sync::Arc;

/// A handler failure as seen by exception-mapped methods.
///
/// Declare a `ParamSpec::of::<Failure>()` parameter to receive it.
#[derive(Clone)]
pub struct Failure(Arc<Error>);

impl Failure {
    pub fn new(error: Error) -> Self {
        Self(Arc::new(error))
    }

    pub fn error(&self) -> &Error {
        &self.0
    }

    /// The error exception mappings are matched against.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        Error::cause(&self.0)
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.cause().is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause().downcast_ref::<E>()
    }

    pub fn message(&self) -> String {
        self.0.to_string()
    }

    pub fn status(&self) -> u16 {
        self.0.status_code()
    }
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

struct ErrorGroup {
    name: &'static str,
    owner: Instance,
    methods: Vec<ExceptionMethod>,
}

impl ErrorGroup {
    fn select(&self, failure: &Failure, sink: &ResponseSink) -> Option<&ExceptionMethod> {
        let cause = failure.cause();
        self.methods
            .iter()
            .find(|method| method.mapping.matches_exactly(cause))
            .or_else(|| {
                if sink.is_ended() {
                    None
                } else {
                    self.methods.iter().find(|method| method.mapping.is_generic())
                }
            })
    }
}

/// Error-handler groups of a built registry.
pub struct ExceptionDispatcher {
    groups: Vec<ErrorGroup>,
}

impl ExceptionDispatcher {
    pub fn from_registry(registry: &Registry) -> Self {
        let groups = registry
            .with_role(Role::ErrorHandlerGroup)
            .filter_map(|entry| {
                let descriptor = entry.descriptor()?;
                Some(ErrorGroup {
                    name: entry.name(),
                    owner: entry.instance().clone(),
                    methods: descriptor.exception_methods().to_vec(),
                })
            })
            .collect();
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Hand `failure` to the first error-handler group with a matching method.
    ///
    /// Later groups are not consulted once a handler has succeeded. The raw
    /// message is written as a last resort.
    pub async fn dispatch(&self, failure: Failure, ctx: &RequestContext, registry: &Registry) {
        let sink = ctx.response();
        sink.set_status(failure.status());

        for group in &self.groups {
            let Some(selected) = group.select(&failure, sink) else {
                continue;
            };
            debug!(
                group = group.name,
                method = selected.method.name(),
                mapping = ?selected.mapping,
                "Dispatching handler failure"
            );
            let args = bind_failure_arguments(selected.method.params(), ctx, registry, &failure);
            match selected.method.invoke(group.owner.clone(), args).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        group = group.name,
                        method = selected.method.name(),
                        error = %e,
                        "Exception handler failed"
                    );
                    write_failure(sink, &failure);
                    return;
                }
            }
        }

        debug!(error = %failure, "No exception handler matched");
        write_failure(sink, &failure);
    }
}

/// End the response with the raw failure message, unless it has already ended.
fn write_failure(sink: &ResponseSink, failure: &Failure) {
    if sink.is_ended() {
        return;
    }
    sink.set_status(failure.status());
    sink.put_header("Content-Type", "text/plain; charset=utf-8");
    sink.end(failure.message());
}
