//! Value injection: scalar fields filled from the configuration source.
//!
//! Each binding names a lookup key and a default literal. The configured
//! value is coerced to the field's declared type; when it is absent or does
//! not coerce, the default literal is coerced instead. When both fail the
//! field keeps its `Default` value. Injection never fails, it only logs.

use crate::config::ConfigSource;
use crate::logging::{debug, trace, warn};
use std::any::Any;
use std::sync::Arc;

/// Declared type family of an injectable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Integer,
    Float,
    Char,
    Text,
    /// Not coercible from configuration; bindings of this kind are skipped.
    Unsupported,
}

/// A type that can be coerced from a configuration string.
///
/// Custom types may implement this trait; unless they override [`ConfigScalar::kind`]
/// they are treated as unsupported and skipped with a warning.
pub trait ConfigScalar: Sized + Send + Sync + 'static {
    fn kind() -> ScalarKind {
        ScalarKind::Unsupported
    }

    fn coerce(raw: &str) -> Option<Self> {
        let _ = raw;
        None
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

macro_rules! parsed_scalar {
    ($kind:expr => $($ty:ty),+) => {
        $(
            impl ConfigScalar for $ty {
                fn kind() -> ScalarKind {
                    $kind
                }

                fn coerce(raw: &str) -> Option<Self> {
                    non_empty(raw)?.parse().ok()
                }
            }
        )+
    };
}

parsed_scalar!(ScalarKind::Integer => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
parsed_scalar!(ScalarKind::Float => f32, f64);

impl ConfigScalar for bool {
    fn kind() -> ScalarKind {
        ScalarKind::Bool
    }

    // Anything other than a case-insensitive "true" reads as false.
    fn coerce(raw: &str) -> Option<Self> {
        non_empty(raw).map(|v| v.eq_ignore_ascii_case("true"))
    }
}

impl ConfigScalar for char {
    fn kind() -> ScalarKind {
        ScalarKind::Char
    }

    fn coerce(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl ConfigScalar for String {
    fn kind() -> ScalarKind {
        ScalarKind::Text
    }

    fn coerce(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

type ApplyFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync), &str) -> bool + Send + Sync>;

/// An externally-configurable field of a component.
#[derive(Clone)]
pub struct ValueBinding {
    field: &'static str,
    key: &'static str,
    default: &'static str,
    kind: ScalarKind,
    apply: ApplyFn,
}

impl ValueBinding {
    /// Bind `key` (falling back to `default`) to a field of `C` through `setter`.
    pub fn new<C, V, F>(field: &'static str, key: &'static str, default: &'static str, setter: F) -> Self
    where
        C: Send + Sync + 'static,
        V: ConfigScalar,
        F: Fn(&mut C, V) + Send + Sync + 'static,
    {
        Self {
            field,
            key,
            default,
            kind: V::kind(),
            apply: Arc::new(move |instance: &mut (dyn Any + Send + Sync), raw: &str| {
                match (instance.downcast_mut::<C>(), V::coerce(raw)) {
                    (Some(target), Some(value)) => {
                        setter(target, value);
                        true
                    }
                    _ => false,
                }
            }),
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn default_literal(&self) -> &'static str {
        self.default
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }
}

impl std::fmt::Debug for ValueBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueBinding")
            .field("field", &self.field)
            .field("key", &self.key)
            .field("default", &self.default)
            .field("kind", &self.kind)
            .finish()
    }
}

/// What happened to one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOutcome {
    /// Coerced from the configured value
    Configured,
    /// Configured value absent or invalid, default literal used
    Defaulted,
    /// Neither value coerced; field keeps its zero value
    LeftUnset,
    /// Declared type can't be coerced from configuration
    Unsupported,
}

/// Fill every value binding on a freshly created instance.
pub fn inject_values(
    owner: &str,
    bindings: &[ValueBinding],
    instance: &mut (dyn Any + Send + Sync),
    config: &dyn ConfigSource,
) -> Vec<(&'static str, ValueOutcome)> {
    bindings
        .iter()
        .map(|binding| (binding.field, inject_one(owner, binding, instance, config)))
        .collect()
}

fn inject_one(
    owner: &str,
    binding: &ValueBinding,
    instance: &mut (dyn Any + Send + Sync),
    config: &dyn ConfigSource,
) -> ValueOutcome {
    if binding.kind == ScalarKind::Unsupported {
        warn!(
            component = owner,
            field = binding.field,
            key = binding.key,
            "Can't inject value: unsupported field type"
        );
        return ValueOutcome::Unsupported;
    }

    if let Some(raw) = config.get(binding.key) {
        if (binding.apply)(instance, &raw) {
            trace!(component = owner, field = binding.field, key = binding.key, "Value injected");
            return ValueOutcome::Configured;
        }
        debug!(
            component = owner,
            field = binding.field,
            key = binding.key,
            value = %raw,
            "Configured value doesn't coerce, using default"
        );
    }

    if (binding.apply)(instance, binding.default) {
        ValueOutcome::Defaulted
    } else {
        warn!(
            component = owner,
            field = binding.field,
            key = binding.key,
            "Can't inject field, possibly wrong type or incorrect value"
        );
        ValueOutcome::LeftUnset
    }
}
