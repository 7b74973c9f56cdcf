// Resolution engine: builds the registry from the candidate descriptors

use crate::Error;
use crate::config::ConfigSource;
use crate::descriptor::{Role, TypeDescriptor};
use crate::logging::{debug, info, trace, warn};
use crate::registry::{ComponentEntry, Registry};
use crate::value::inject_values;
use std::any::Any;
use std::sync::Arc;

/// Builds a [`Registry`] from a candidate set without an explicit ordering.
///
/// Resolution runs full passes over the remaining candidates. A candidate is
/// ready once every dependency requirement has an assignable entry in the
/// registry; ready candidates are instantiated, injected and registered in the
/// same pass, so later candidates of that pass already see them. A pass that
/// registers nothing ends resolution with [`Error::UnsatisfiedDependency`],
/// which covers missing dependencies and cycles alike.
pub struct Resolver<'a> {
    config: &'a dyn ConfigSource,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a dyn ConfigSource) -> Self {
        Self { config }
    }

    /// Resolve `candidates` into `registry`, which may already hold seeded entries.
    pub fn resolve(
        &self,
        candidates: Vec<TypeDescriptor>,
        mut registry: Registry,
    ) -> Result<Registry, Error> {
        let mut pending: Vec<Arc<TypeDescriptor>> = candidates.into_iter().map(Arc::new).collect();
        debug!(
            candidates = pending.len(),
            seeded = registry.len(),
            "Resolving components"
        );

        let mut pass = 0usize;
        while !pending.is_empty() {
            pass += 1;
            let before = pending.len();
            let mut blocked = Vec::with_capacity(before);

            for descriptor in pending {
                if is_ready(&descriptor, &registry) {
                    trace!(component = descriptor.name(), pass, "Pending -> Ready");
                    self.register(descriptor, &mut registry);
                } else {
                    blocked.push(descriptor);
                }
            }

            if blocked.len() == before {
                return Err(unsatisfied(&blocked, &registry));
            }
            pending = blocked;
        }

        info!(components = registry.len(), passes = pass, "Components resolved");
        Ok(registry)
    }

    fn register(&self, descriptor: Arc<TypeDescriptor>, registry: &mut Registry) {
        let name = descriptor.name();
        let mut instance = descriptor.instantiate();

        inject_values(name, descriptor.values(), &mut *instance, self.config);

        if descriptor.has_role(Role::ConfigurationSource) {
            run_producers(&descriptor, &*instance, registry);
        }

        for requirement in descriptor.requirements() {
            let assigned = registry
                .find_assignable(&requirement.required())
                .is_some_and(|binding| requirement.assign(&mut *instance, binding));
            if !assigned {
                warn!(
                    component = name,
                    field = requirement.field(),
                    requirement = requirement.required().name(),
                    "Dependency field left unassigned"
                );
            }
        }

        let instance: Arc<dyn Any + Send + Sync> = Arc::from(instance);
        let entry = ComponentEntry::from_descriptor(descriptor, instance);
        if registry.insert(entry).is_some() {
            warn!(component = name, "Component replaced an entry registered under the same type");
        }
        trace!(component = name, "Ready -> Registered");
    }
}

/// Whether every requirement of `descriptor` has an assignable entry.
fn is_ready(descriptor: &TypeDescriptor, registry: &Registry) -> bool {
    descriptor
        .requirements()
        .iter()
        .all(|requirement| registry.find_entry(&requirement.required()).is_some())
}

/// Run every producer of a freshly created configuration source.
///
/// The first producer of a type wins; failures are logged and skipped.
fn run_producers(descriptor: &TypeDescriptor, owner: &(dyn Any + Send + Sync), registry: &mut Registry) {
    for producer in descriptor.producers() {
        match producer.call(owner, registry) {
            Ok(Some(entry)) => {
                let produced = entry.name();
                if registry.insert_if_absent(entry) {
                    debug!(
                        component = descriptor.name(),
                        producer = producer.name(),
                        produced,
                        "Produced component registered"
                    );
                } else {
                    debug!(
                        component = descriptor.name(),
                        producer = producer.name(),
                        produced,
                        "Discarding produced component, type already registered"
                    );
                }
            }
            Ok(None) => {
                trace!(component = descriptor.name(), producer = producer.name(), "Producer returned nothing");
            }
            Err(e) => {
                warn!(
                    component = descriptor.name(),
                    producer = producer.name(),
                    error = %e,
                    "Producer failed"
                );
            }
        }
    }
}

/// The failure for a pass without progress: first blocked candidate, first unmet requirement.
fn unsatisfied(blocked: &[Arc<TypeDescriptor>], registry: &Registry) -> Error {
    let Some(descriptor) = blocked.first() else {
        return Error::DependencyInjection("resolution stalled without candidates".to_string());
    };
    let requirement = descriptor
        .requirements()
        .iter()
        .find(|requirement| registry.find_entry(&requirement.required()).is_none())
        .map(|requirement| requirement.required().name())
        .unwrap_or("<unknown>");

    warn!(
        component = descriptor.name(),
        requirement,
        blocked = blocked.len(),
        "Resolution blocked"
    );
    Error::UnsatisfiedDependency {
        component: descriptor.name().to_string(),
        requirement: requirement.to_string(),
    }
}
