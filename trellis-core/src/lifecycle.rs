//! Lifecycle invoker.
//!
//! Once the registry is complete and the server accepts traffic, every
//! initialization hook of every registered instance is invoked exactly once:
//! instances in registry order, hooks base-before-derived. Each hook receives
//! the registry so it can look up whatever it needs; lookups that find nothing
//! are simply absent values.
//!
//! A failing hook is logged and recorded. It never stops the remaining hooks.
//!
//! ```ignore
//! let descriptor = ComponentDescriptor::<Warmup>::component()
//!     .on_init("prime", |warmup, registry| {
//!         warmup.prime(registry.lookup::<dyn Cache>())
//!     });
//! ```

use crate::error::HookError;
use crate::logging::{debug, error, info};
use crate::registry::Registry;

/// A hook that returned an error.
#[derive(Debug)]
pub struct HookFailure {
    pub component: &'static str,
    pub hook: &'static str,
    pub error: HookError,
}

impl std::fmt::Display for HookFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}() failed: {}", self.component, self.hook, self.error)
    }
}

/// Invokes the initialization hooks of a built registry.
pub struct LifecycleInvoker<'a> {
    registry: &'a Registry,
}

impl<'a> LifecycleInvoker<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Run every hook. Returns the number of hooks that completed, or every
    /// failure once all hooks have run.
    pub fn invoke_init_hooks(&self) -> Result<usize, Vec<HookFailure>> {
        info!("Calling initialization hooks");
        let mut completed = 0;
        let mut failures = Vec::new();

        for entry in self.registry.iter() {
            let Some(descriptor) = entry.descriptor() else {
                continue;
            };
            for hook in descriptor.init_hooks() {
                match hook.call(entry.instance().as_ref(), self.registry) {
                    Ok(()) => {
                        debug!(component = entry.name(), hook = hook.name(), "Hook completed");
                        completed += 1;
                    }
                    Err(e) => {
                        error!(
                            component = entry.name(),
                            hook = hook.name(),
                            error = %e,
                            "Hook failed"
                        );
                        failures.push(HookFailure {
                            component: entry.name(),
                            hook: hook.name(),
                            error: e,
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(completed)
        } else {
            Err(failures)
        }
    }
}

/// Shorthand for [`LifecycleInvoker::invoke_init_hooks`].
pub fn invoke_init_hooks(registry: &Registry) -> Result<usize, Vec<HookFailure>> {
    LifecycleInvoker::new(registry).invoke_init_hooks()
}
