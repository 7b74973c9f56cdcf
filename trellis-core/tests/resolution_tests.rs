use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use trellis_core::{
    ComponentDescriptor, ComponentEntry, Error, Registry, Resolver, TypeDescriptor, TypeKey,
};

fn config(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn resolve(candidates: Vec<TypeDescriptor>) -> Result<Registry, Error> {
    let config = config(&[]);
    Resolver::new(&config).resolve(candidates, Registry::new())
}

// ---------- order independence ----------

#[derive(Default)]
struct Repo;

#[derive(Default)]
struct Service {
    repo: Option<Arc<Repo>>,
}

#[derive(Default)]
struct Ctrl {
    service: Option<Arc<Service>>,
}

#[derive(Default)]
struct Audit {
    repo: Option<Arc<Repo>>,
    service: Option<Arc<Service>>,
}

fn graph() -> Vec<TypeDescriptor> {
    vec![
        ComponentDescriptor::<Repo>::component().build(),
        ComponentDescriptor::<Service>::component()
            .inject("repo", |s: &mut Service, r: Arc<Repo>| s.repo = Some(r))
            .build(),
        ComponentDescriptor::<Ctrl>::component()
            .inject("service", |c: &mut Ctrl, s: Arc<Service>| c.service = Some(s))
            .build(),
        ComponentDescriptor::<Audit>::component()
            .inject("repo", |a: &mut Audit, r: Arc<Repo>| a.repo = Some(r))
            .inject("service", |a: &mut Audit, s: Arc<Service>| a.service = Some(s))
            .build(),
    ]
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut result = Vec::new();
    for rest in permutations(n - 1) {
        for position in 0..=rest.len() {
            let mut order = rest.clone();
            order.insert(position, n - 1);
            result.push(order);
        }
    }
    result
}

#[test]
fn test_every_permutation_resolves_the_same_keys() {
    let expected: BTreeSet<&str> = graph().iter().map(TypeDescriptor::name).collect();

    for order in permutations(4) {
        let descriptors = graph();
        let candidates: Vec<TypeDescriptor> =
            order.iter().map(|&i| descriptors[i].clone()).collect();

        let registry = resolve(candidates).unwrap();
        let keys: BTreeSet<&str> = registry.keys().map(|key| key.name()).collect();
        assert_eq!(keys, expected, "order {:?}", order);

        let audit = registry.get::<Audit>().unwrap();
        let service = registry.get::<Service>().unwrap();
        assert!(Arc::ptr_eq(audit.service.as_ref().unwrap(), &service));
        assert!(Arc::ptr_eq(
            service.repo.as_ref().unwrap(),
            audit.repo.as_ref().unwrap()
        ));
    }
}

#[test]
fn test_single_instance_per_type() {
    let registry = resolve(graph()).unwrap();
    let ctrl = registry.get::<Ctrl>().unwrap();
    let repo = registry.get::<Repo>().unwrap();
    let via_ctrl = ctrl.service.as_ref().unwrap().repo.as_ref().unwrap();
    assert!(Arc::ptr_eq(via_ctrl, &repo));
}

// ---------- cycles ----------

#[derive(Default)]
struct Ping {
    _pong: Option<Arc<Pong>>,
}

#[derive(Default)]
struct Pong {
    _ping: Option<Arc<Ping>>,
}

fn cycle() -> (TypeDescriptor, TypeDescriptor) {
    (
        ComponentDescriptor::<Ping>::component()
            .inject("pong", |p: &mut Ping, x: Arc<Pong>| p._pong = Some(x))
            .build(),
        ComponentDescriptor::<Pong>::component()
            .inject("ping", |p: &mut Pong, x: Arc<Ping>| p._ping = Some(x))
            .build(),
    )
}

#[test]
fn test_cycle_is_reported_deterministically() {
    for _ in 0..3 {
        let (ping, pong) = cycle();
        match resolve(vec![ping, pong, ComponentDescriptor::<Repo>::component().build()]) {
            Err(Error::UnsatisfiedDependency {
                component,
                requirement,
            }) => {
                assert_eq!(component, TypeKey::of::<Ping>().name());
                assert_eq!(requirement, TypeKey::of::<Pong>().name());
            }
            other => panic!("expected unsatisfied dependency, got {:?}", other.map(|r| r.len())),
        }
    }
}

#[test]
fn test_cycle_first_reported_follows_candidate_order() {
    let (ping, pong) = cycle();
    let err = resolve(vec![pong, ping]).unwrap_err();
    assert!(err.is_startup_failure());
    assert!(err.to_string().contains(TypeKey::of::<Pong>().name()));
}

// ---------- supertype injection ----------

trait Store: Send + Sync {
    fn kind(&self) -> &'static str;
}

#[derive(Default)]
struct MemoryStore;

impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[derive(Default)]
struct DiskStore;

impl Store for DiskStore {
    fn kind(&self) -> &'static str {
        "disk"
    }
}

#[derive(Default)]
struct Catalog {
    store: Option<Arc<dyn Store>>,
}

fn catalog() -> TypeDescriptor {
    ComponentDescriptor::<Catalog>::component()
        .inject("store", |c: &mut Catalog, s: Arc<dyn Store>| c.store = Some(s))
        .build()
}

#[test]
fn test_requirement_resolves_to_implementer() {
    let memory = ComponentDescriptor::<MemoryStore>::component()
        .provides(|s: Arc<MemoryStore>| s as Arc<dyn Store>)
        .build();

    let registry = resolve(vec![catalog(), memory]).unwrap();
    let catalog = registry.get::<Catalog>().unwrap();
    assert_eq!(catalog.store.as_ref().map(|s| s.kind()), Some("memory"));
    assert_eq!(registry.lookup::<dyn Store>().map(|s| s.kind()), Some("memory"));
}

#[test]
fn test_first_registered_implementer_wins() {
    let memory = ComponentDescriptor::<MemoryStore>::component()
        .provides(|s: Arc<MemoryStore>| s as Arc<dyn Store>)
        .build();
    let disk = ComponentDescriptor::<DiskStore>::component()
        .provides(|s: Arc<DiskStore>| s as Arc<dyn Store>)
        .build();

    let registry = resolve(vec![disk, catalog(), memory]).unwrap();
    let catalog = registry.get::<Catalog>().unwrap();
    assert_eq!(catalog.store.as_ref().map(|s| s.kind()), Some("disk"));
}

// ---------- producers ----------

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct SystemClock {
    epoch: u64,
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.epoch
    }
}

#[derive(Default)]
struct ClockConfig {
    epoch: u64,
}

#[derive(Debug, PartialEq)]
struct Banner(String);

#[test]
fn test_producer_registers_clock() {
    let clock_config = ComponentDescriptor::<ClockConfig>::configuration()
        .value("epoch", "clock.epoch", "1", |c: &mut ClockConfig, v: u64| c.epoch = v)
        .producer_entry("clock", |c, _| {
            Ok(Some(
                ComponentEntry::new(SystemClock { epoch: c.epoch })
                    .provides(|s: Arc<SystemClock>| s as Arc<dyn Clock>),
            ))
        })
        .build();

    let config = config(&[("clock.epoch", "1700000000")]);
    let registry = Resolver::new(&config)
        .resolve(vec![clock_config], Registry::new())
        .unwrap();

    assert!(registry.contains::<SystemClock>());
    assert_eq!(registry.lookup::<dyn Clock>().map(|c| c.now()), Some(1_700_000_000));
}

#[test]
fn test_first_producer_of_a_type_wins() {
    let producers = ComponentDescriptor::<ClockConfig>::configuration()
        .producer("first", |_, _| Ok(Some(Banner("first".into()))))
        .producer("second", |_, _| Ok(Some(Banner("second".into()))))
        .build();

    let registry = resolve(vec![producers]).unwrap();
    assert_eq!(registry.get::<Banner>().map(|b| b.0.clone()), Some("first".to_string()));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_failing_producer_is_skipped() {
    let producers = ComponentDescriptor::<ClockConfig>::configuration()
        .producer::<Banner, _>("broken", |_, _| Err("no banner today".into()))
        .producer("nothing", |_, _| Ok(None::<u32>))
        .build();

    let registry = resolve(vec![producers]).unwrap();
    assert!(registry.contains::<ClockConfig>());
    assert!(!registry.contains::<Banner>());
    assert!(!registry.contains::<u32>());
}

#[test]
fn test_producers_only_run_for_configuration_sources() {
    let plain = ComponentDescriptor::<ClockConfig>::component()
        .producer("banner", |_, _| Ok(Some(Banner("ignored".into()))))
        .build();

    let registry = resolve(vec![plain]).unwrap();
    assert!(!registry.contains::<Banner>());
}

#[test]
fn test_produced_component_satisfies_later_candidates() {
    #[derive(Default)]
    struct Greeter {
        banner: Option<Arc<Banner>>,
    }

    let greeter = ComponentDescriptor::<Greeter>::component()
        .inject("banner", |g: &mut Greeter, b: Arc<Banner>| g.banner = Some(b))
        .build();
    let producers = ComponentDescriptor::<ClockConfig>::configuration()
        .producer("banner", |_, _| Ok(Some(Banner("hello".into()))))
        .build();

    let registry = resolve(vec![greeter, producers]).unwrap();
    let greeter = registry.get::<Greeter>().unwrap();
    assert_eq!(greeter.banner.as_deref(), Some(&Banner("hello".into())));
}

// ---------- values ----------

#[derive(Default)]
struct Limits {
    max: u32,
    name: String,
}

#[test]
fn test_values_fall_back_to_default() {
    let limits = ComponentDescriptor::<Limits>::component()
        .value("max", "limits.max", "25", |l: &mut Limits, v: u32| l.max = v)
        .value("name", "limits.name", "standard", |l: &mut Limits, v: String| l.name = v)
        .build();

    let config = config(&[("limits.max", "not-a-number")]);
    let registry = Resolver::new(&config)
        .resolve(vec![limits], Registry::new())
        .unwrap();

    let limits = registry.get::<Limits>().unwrap();
    assert_eq!(limits.max, 25);
    assert_eq!(limits.name, "standard");
}
