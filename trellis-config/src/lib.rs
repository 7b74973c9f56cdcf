// Configuration loading for the Trellis runtime

pub mod env;
pub mod error;
pub mod loader;
pub mod profile;
pub mod properties;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{PropertiesLoader, load_from_args};
pub use profile::Profile;
pub use properties::Properties;
