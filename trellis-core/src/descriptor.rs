//! Type descriptors.
//!
//! A [`TypeDescriptor`] is the flattened registration table of one component
//! type: its roles, the capabilities it can be bound as, its configurable
//! values, dependency requirements, producer methods, initialization hooks,
//! routable methods and exception-mapped methods. Descriptors are built once
//! at the composition root through the typed [`ComponentDescriptor`] builder
//! and are immutable afterwards.
//!
//! ```ignore
//! let service = ComponentDescriptor::<OrderService>::component()
//!     .inject("repo", |s: &mut OrderService, repo: Arc<dyn OrderRepo>| s.repo = Some(repo))
//!     .value("page_size", "orders.page-size", "20", |s: &mut OrderService, v: usize| s.page_size = v)
//!     .on_init("warm_cache", |s, _registry| s.warm_cache());
//! ```

use crate::binder::ParamSpec;
use crate::error::HookResult;
use crate::handler::{ExceptionMapping, ExceptionMethod, HandlerMethod, RoutableMethod, RouteMapping};
use crate::logging::debug;
use crate::registry::{Binding, ComponentEntry, Instance, Registry};
use crate::value::{ConfigScalar, ValueBinding};
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Runtime identity of a type, including unsized capability types such as `dyn Trait`.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Declared role of a component type.
///
/// Every role implies [`Role::Component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Eligible for instantiation into the registry
    Component,
    /// Routable methods become endpoints
    HandlerGroup,
    /// Producer methods run once at instantiation
    ConfigurationSource,
    /// Wraps every request, if it also provides `dyn FrontFilter`
    FrontFilter,
    /// Exception-mapped methods handle uncaught handler failures
    ErrorHandlerGroup,
}

type CastFn = Arc<dyn Fn(&Instance) -> Option<Binding> + Send + Sync>;

/// Something an instance can be bound as: its own type or an implemented trait.
#[derive(Clone)]
pub struct Capability {
    key: TypeKey,
    cast: CastFn,
}

impl Capability {
    /// The concrete type itself. Binds as `Arc<C>`.
    pub fn exact<C: Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<C>(),
            cast: Arc::new(|instance: &Instance| {
                instance
                    .clone()
                    .downcast::<C>()
                    .ok()
                    .map(|concrete| Box::new(concrete) as Binding)
            }),
        }
    }

    /// A capability `T` reached from `C` through `upcast`. Binds as `Arc<T>`.
    pub fn upcast<C, T, F>(upcast: F) -> Self
    where
        C: Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<T>(),
            cast: Arc::new(move |instance: &Instance| {
                instance
                    .clone()
                    .downcast::<C>()
                    .ok()
                    .map(|concrete| Box::new(upcast(concrete)) as Binding)
            }),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn cast(&self, instance: &Instance) -> Option<Binding> {
        (self.cast)(instance)
    }
}

type AssignFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync), Binding) -> bool + Send + Sync>;

/// A dependency field: filled from the registry before the owner is registered.
#[derive(Clone)]
pub struct Requirement {
    field: &'static str,
    required: TypeKey,
    assign: AssignFn,
}

impl Requirement {
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn required(&self) -> TypeKey {
        self.required
    }

    pub(crate) fn assign(&self, instance: &mut (dyn Any + Send + Sync), binding: Binding) -> bool {
        (self.assign)(instance, binding)
    }
}

impl std::fmt::Debug for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requirement")
            .field("field", &self.field)
            .field("required", &self.required)
            .finish()
    }
}

type ProduceFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &Registry) -> HookResult<Option<ComponentEntry>> + Send + Sync>;

/// A producer method of a configuration source.
#[derive(Clone)]
pub struct Producer {
    name: &'static str,
    call: ProduceFn,
}

impl Producer {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(
        &self,
        owner: &(dyn Any + Send + Sync),
        registry: &Registry,
    ) -> HookResult<Option<ComponentEntry>> {
        (self.call)(owner, registry)
    }
}

type HookFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &Registry) -> HookResult + Send + Sync>;

/// An initialization hook.
///
/// `depth` is the distance to the declaring type in the inheritance chain the
/// hook was flattened from: 0 for the type itself, 1 for its base, and so on.
#[derive(Clone)]
pub struct InitHook {
    name: &'static str,
    depth: u32,
    call: HookFn,
}

impl InitHook {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn call(&self, owner: &(dyn Any + Send + Sync), registry: &Registry) -> HookResult {
        (self.call)(owner, registry)
    }
}

type ConstructFn = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Registration table of one component type, erased.
#[derive(Clone)]
pub struct TypeDescriptor {
    key: TypeKey,
    roles: Vec<Role>,
    prefix: String,
    construct: ConstructFn,
    capabilities: Vec<Capability>,
    values: Vec<ValueBinding>,
    requirements: Vec<Requirement>,
    producers: Vec<Producer>,
    init_hooks: Vec<InitHook>,
    routes: Vec<RoutableMethod>,
    exception_methods: Vec<ExceptionMethod>,
}

impl TypeDescriptor {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        role == Role::Component || self.roles.contains(&role)
    }

    /// Path prefix of a handler group.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn values(&self) -> &[ValueBinding] {
        &self.values
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn producers(&self) -> &[Producer] {
        &self.producers
    }

    /// Hooks in invocation order: base types before derived, then declaration order.
    pub fn init_hooks(&self) -> &[InitHook] {
        &self.init_hooks
    }

    pub fn routes(&self) -> &[RoutableMethod] {
        &self.routes
    }

    pub fn exception_methods(&self) -> &[ExceptionMethod] {
        &self.exception_methods
    }

    /// Default-construct a fresh instance.
    pub(crate) fn instantiate(&self) -> Box<dyn Any + Send + Sync> {
        (self.construct)()
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("roles", &self.roles)
            .field("requirements", &self.requirements)
            .field("values", &self.values.len())
            .field("producers", &self.producers.len())
            .field("init_hooks", &self.init_hooks.len())
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Typed builder of a [`TypeDescriptor`] for component type `C`.
pub struct ComponentDescriptor<C> {
    inner: TypeDescriptor,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Default + Send + Sync + 'static> ComponentDescriptor<C> {
    /// A plain component.
    pub fn component() -> Self {
        Self {
            inner: TypeDescriptor {
                key: TypeKey::of::<C>(),
                roles: vec![Role::Component],
                prefix: String::new(),
                construct: Arc::new(|| Box::new(C::default()) as Box<dyn Any + Send + Sync>),
                capabilities: vec![Capability::exact::<C>()],
                values: Vec::new(),
                requirements: Vec::new(),
                producers: Vec::new(),
                init_hooks: Vec::new(),
                routes: Vec::new(),
                exception_methods: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn with_role(role: Role) -> Self {
        Self::component().role(role)
    }

    /// A handler group whose routes are mounted under `prefix`.
    pub fn handler_group(prefix: impl Into<String>) -> Self {
        let mut builder = Self::with_role(Role::HandlerGroup);
        builder.inner.prefix = prefix.into();
        builder
    }

    pub fn configuration() -> Self {
        Self::with_role(Role::ConfigurationSource)
    }

    pub fn front_filter() -> Self {
        Self::with_role(Role::FrontFilter)
    }

    pub fn error_handlers() -> Self {
        Self::with_role(Role::ErrorHandlerGroup)
    }

    /// Add a role.
    pub fn role(mut self, role: Role) -> Self {
        if !self.inner.roles.contains(&role) {
            self.inner.roles.push(role);
        }
        self
    }

    /// Make the component assignable to `T`.
    pub fn provides<T, F>(mut self, upcast: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        self.inner.capabilities.push(Capability::upcast(upcast));
        self
    }

    /// Fill `field` from configuration key `key`, falling back to `default`.
    pub fn value<V, F>(mut self, field: &'static str, key: &'static str, default: &'static str, setter: F) -> Self
    where
        V: ConfigScalar,
        F: Fn(&mut C, V) + Send + Sync + 'static,
    {
        self.inner
            .values
            .push(ValueBinding::new(field, key, default, setter));
        self
    }

    /// Declare a dependency on a registered component assignable to `T`.
    pub fn inject<T, F>(mut self, field: &'static str, setter: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&mut C, Arc<T>) + Send + Sync + 'static,
    {
        self.inner.requirements.push(Requirement {
            field,
            required: TypeKey::of::<T>(),
            assign: Arc::new(move |instance: &mut (dyn Any + Send + Sync), binding: Binding| {
                match (instance.downcast_mut::<C>(), binding.downcast::<Arc<T>>()) {
                    (Some(target), Ok(value)) => {
                        setter(target, *value);
                        true
                    }
                    _ => false,
                }
            }),
        });
        self
    }

    /// Register a producer method whose result is registered under its own type.
    ///
    /// A producer of `()` produces nothing and is not registered.
    pub fn producer<T, F>(self, name: &'static str, produce: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&C, &Registry) -> HookResult<Option<T>> + Send + Sync + 'static,
    {
        if TypeId::of::<T>() == TypeId::of::<()>() {
            debug!(
                component = std::any::type_name::<C>(),
                producer = name,
                "Ignoring producer without a result type"
            );
            return self;
        }
        self.producer_entry(name, move |owner, registry| {
            Ok(produce(owner, registry)?.map(ComponentEntry::new))
        })
    }

    /// Register a producer method returning a prepared entry, for results that
    /// must also be assignable to trait capabilities.
    pub fn producer_entry<F>(mut self, name: &'static str, produce: F) -> Self
    where
        F: Fn(&C, &Registry) -> HookResult<Option<ComponentEntry>> + Send + Sync + 'static,
    {
        self.inner.producers.push(Producer {
            name,
            call: Arc::new(move |owner: &(dyn Any + Send + Sync), registry: &Registry| {
                match owner.downcast_ref::<C>() {
                    Some(owner) => produce(owner, registry),
                    None => Ok(None),
                }
            }),
        });
        self
    }

    /// Initialization hook declared on `C` itself.
    pub fn on_init<F>(self, name: &'static str, hook: F) -> Self
    where
        F: Fn(&C, &Registry) -> HookResult + Send + Sync + 'static,
    {
        self.inherited_init(0, name, hook)
    }

    /// Initialization hook inherited from a base `depth` levels up.
    pub fn inherited_init<F>(mut self, depth: u32, name: &'static str, hook: F) -> Self
    where
        F: Fn(&C, &Registry) -> HookResult + Send + Sync + 'static,
    {
        self.inner.init_hooks.push(InitHook {
            name,
            depth,
            call: Arc::new(move |owner: &(dyn Any + Send + Sync), registry: &Registry| {
                match owner.downcast_ref::<C>() {
                    Some(owner) => hook(owner, registry),
                    None => Ok(()),
                }
            }),
        });
        self
    }

    /// Route requests matching `mapping` to `method`.
    pub fn route(mut self, mapping: RouteMapping, method: HandlerMethod) -> Self {
        self.inner.routes.push(RoutableMethod {
            mapping,
            method: Arc::new(method),
        });
        self
    }

    /// Handle uncaught handler failures matching `mapping` with `method`.
    pub fn exception_handler(mut self, mapping: ExceptionMapping, method: HandlerMethod) -> Self {
        self.inner.exception_methods.push(ExceptionMethod {
            mapping,
            method: Arc::new(method),
        });
        self
    }

    /// Shorthand for a handler method owned by `C`.
    pub fn method<F, Fut>(name: &'static str, params: impl IntoIterator<Item = ParamSpec>, handler: F) -> HandlerMethod
    where
        F: Fn(Arc<C>, crate::binder::Args) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), crate::Error>> + Send + 'static,
    {
        params
            .into_iter()
            .fold(HandlerMethod::new(name, handler), HandlerMethod::param)
    }

    /// Finish the descriptor. Hooks are ordered base-before-derived.
    pub fn build(mut self) -> TypeDescriptor {
        // stable: equal depths keep declaration order
        self.inner
            .init_hooks
            .sort_by(|a, b| b.depth.cmp(&a.depth));
        self.inner
    }
}

impl<C: Default + Send + Sync + 'static> From<ComponentDescriptor<C>> for TypeDescriptor {
    fn from(builder: ComponentDescriptor<C>) -> Self {
        builder.build()
    }
}
