// Component registry: one live instance per type key

use crate::descriptor::{Capability, Role, TypeDescriptor, TypeKey};
use crate::logging::{debug, trace};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A live component instance, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A resolved binding: a boxed `Arc<T>` for the requested capability `T`.
pub type Binding = Box<dyn Any + Send + Sync>;

/// A registered instance together with the capabilities it can be bound as.
#[derive(Clone)]
pub struct ComponentEntry {
    key: TypeKey,
    instance: Instance,
    capabilities: Vec<Capability>,
    descriptor: Option<Arc<TypeDescriptor>>,
}

impl ComponentEntry {
    /// Wrap a value that is only assignable to its own type.
    pub fn new<C: Send + Sync + 'static>(value: C) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<C: Send + Sync + 'static>(value: Arc<C>) -> Self {
        Self {
            key: TypeKey::of::<C>(),
            instance: value,
            capabilities: vec![Capability::exact::<C>()],
            descriptor: None,
        }
    }

    pub(crate) fn from_descriptor(descriptor: Arc<TypeDescriptor>, instance: Instance) -> Self {
        Self {
            key: descriptor.key(),
            instance,
            capabilities: descriptor.capabilities().to_vec(),
            descriptor: Some(descriptor),
        }
    }

    /// Make the entry assignable to the capability `T` as well.
    pub fn provides<C, T, F>(mut self, upcast: F) -> Self
    where
        C: Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        self.capabilities.push(Capability::upcast(upcast));
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The descriptor this entry was resolved from, if any.
    pub fn descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        self.descriptor.as_ref()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.descriptor
            .as_ref()
            .is_some_and(|descriptor| descriptor.has_role(role))
    }

    /// Concrete-type access to the instance.
    pub fn downcast<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.instance.clone().downcast::<C>().ok()
    }

    pub fn is_assignable_to(&self, required: &TypeKey) -> bool {
        self.capabilities.iter().any(|cap| cap.key() == *required)
    }

    /// Bind the instance as `required`, if it provides that capability.
    pub fn cast(&self, required: &TypeKey) -> Option<Binding> {
        self.capabilities
            .iter()
            .find(|cap| cap.key() == *required)
            .and_then(|cap| cap.cast(&self.instance))
    }
}

impl std::fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("key", &self.key)
            .field(
                "capabilities",
                &self.capabilities.iter().map(Capability::key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Mapping from type key to exactly one live instance, kept in insertion order.
///
/// The registry is only written through `&mut` while the resolver builds it.
/// Afterwards it is shared as `Arc<Registry>` and never written again.
#[derive(Default)]
pub struct Registry {
    entries: Vec<ComponentEntry>,
    index: HashMap<TypeKey, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any entry already stored under the same key.
    pub fn insert(&mut self, entry: ComponentEntry) -> Option<ComponentEntry> {
        let key = entry.key();
        match self.index.get(&key) {
            Some(&slot) => {
                debug!(component = key.name(), "Replacing registered component");
                Some(std::mem::replace(&mut self.entries[slot], entry))
            }
            None => {
                trace!(component = key.name(), "Component registered");
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    /// Insert only when the key is free. Returns whether the entry was stored.
    pub fn insert_if_absent(&mut self, entry: ComponentEntry) -> bool {
        if self.index.contains_key(&entry.key()) {
            return false;
        }
        self.insert(entry);
        true
    }

    pub fn contains_key(&self, key: &TypeKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(&TypeKey::of::<T>())
    }

    pub fn entry(&self, key: &TypeKey) -> Option<&ComponentEntry> {
        self.index.get(key).map(|&slot| &self.entries[slot])
    }

    /// The first entry assignable to `required`.
    ///
    /// An exact key match wins; otherwise entries are scanned in registration
    /// order and the first one providing the capability is returned.
    pub fn find_entry(&self, required: &TypeKey) -> Option<&ComponentEntry> {
        self.entry(required)
            .filter(|entry| entry.is_assignable_to(required))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|entry| entry.is_assignable_to(required))
            })
    }

    /// Bind the first assignable entry as `required`.
    pub fn find_assignable(&self, required: &TypeKey) -> Option<Binding> {
        self.find_entry(required)
            .and_then(|entry| entry.cast(required))
    }

    /// Keys of every entry assignable to `required`, in registration order.
    pub fn assignable_keys(&self, required: &TypeKey) -> Vec<TypeKey> {
        self.entries
            .iter()
            .filter(|entry| entry.is_assignable_to(required))
            .map(ComponentEntry::key)
            .collect()
    }

    /// Typed lookup through the assignability policy.
    pub fn lookup<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.find_assignable(&TypeKey::of::<T>())
            .and_then(|binding| binding.downcast::<Arc<T>>().ok())
            .map(|arc| *arc)
    }

    /// Exact-type lookup of a concrete component.
    pub fn get<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.entry(&TypeKey::of::<C>())
            .and_then(ComponentEntry::downcast::<C>)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.entries.iter().map(ComponentEntry::key)
    }

    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &ComponentEntry> {
        self.entries.iter().filter(move |entry| entry.has_role(role))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
