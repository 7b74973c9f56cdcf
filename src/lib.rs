// Trellis - a lightweight component runtime for Rust
//
// Builds the component graph from explicit type descriptors, injects
// configuration values, runs initialization hooks and dispatches HTTP requests
// to handler methods with their arguments bound from the request.

// Re-export core functionality
pub use trellis_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use trellis_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application,
        Args,
        ComponentDescriptor,
        ComponentEntry,
        ConfigSource,
        Error,
        ExceptionMapping,
        Failure,
        FrontFilter,
        HandlerMethod,
        HookResult,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Next,
        ParamSpec,
        Registry,
        RequestContext,
        ResponseSink,
        Role,
        RouteMapping,
    };

    pub use crate::logging::{debug, error, info, trace, warn};

    #[cfg(feature = "config")]
    pub use trellis_config::{Profile, Properties, PropertiesLoader};

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
