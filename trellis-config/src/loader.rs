// Profile-aware properties loading

use crate::env::{DEFAULT_PREFIX, EnvLoader};
use crate::{ConfigError, Profile, Properties, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum DotEnv {
    Skip,
    Discover,
    Path(PathBuf),
}

/// Builds the [`Properties`] an application starts with.
///
/// The profile file is read from the configured directory, or from the
/// working directory when none is set. A `.env` file can be loaded into the
/// process environment first; matching environment variables then override
/// file entries.
///
/// ```no_run
/// use trellis_config::{Profile, PropertiesLoader};
///
/// let properties = PropertiesLoader::new()
///     .profile(Profile::from_args(std::env::args()))
///     .dotenv()
///     .load()?;
/// # Ok::<(), trellis_config::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PropertiesLoader {
    profile: Profile,
    config_dir: Option<PathBuf>,
    search_dir: Option<PathBuf>,
    env_prefix: Option<String>,
    dotenv: DotEnv,
}

impl PropertiesLoader {
    pub fn new() -> Self {
        Self {
            profile: Profile::Default,
            config_dir: None,
            search_dir: None,
            env_prefix: Some(DEFAULT_PREFIX.to_string()),
            dotenv: DotEnv::Skip,
        }
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Directory the profile file must exist in.
    ///
    /// Blank, `/` and `./` mean no explicit directory.
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Directory searched when no explicit directory is set. Defaults to the working directory.
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    /// Prefix of the environment variables overlaid onto the file.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Load `.env` from the working directory or its parents, if present.
    pub fn dotenv(mut self) -> Self {
        self.dotenv = DotEnv::Discover;
        self
    }

    /// Load a specific env file. A missing file is an error.
    pub fn dotenv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = DotEnv::Path(path.into());
        self
    }

    fn explicit_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref().filter(|dir| {
            let raw = dir.to_string_lossy();
            !matches!(raw.trim(), "" | "/" | "./")
        })
    }

    /// Path of the profile file that [`PropertiesLoader::load`] reads.
    pub fn file_path(&self) -> Result<PathBuf> {
        let dir = match (self.explicit_dir(), &self.search_dir) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(dir)) => dir.clone(),
            (None, None) => env::current_dir()?,
        };
        Ok(dir.join(self.profile.file_name()))
    }

    pub fn load(&self) -> Result<Properties> {
        let path = self.file_path()?;
        let mut properties = if path.is_file() {
            let properties = Properties::load(&path)?;
            info!(
                profile = %self.profile,
                path = %path.display(),
                entries = properties.len(),
                "Loaded properties"
            );
            properties
        } else if self.explicit_dir().is_some() {
            return Err(ConfigError::NotFound(path));
        } else {
            warn!(
                profile = %self.profile,
                path = %path.display(),
                "Properties file not found, starting with empty configuration"
            );
            Properties::new()
        };

        match &self.dotenv {
            DotEnv::Skip => {}
            DotEnv::Discover => match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
                Err(e) => debug!(error = %e, "No .env file loaded"),
            },
            DotEnv::Path(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    ConfigError::LoadError(format!("Failed to load {}: {}", path.display(), e))
                })?;
                debug!(path = %path.display(), "Loaded env file");
            }
        }

        if let Some(prefix) = &self.env_prefix {
            let overlay = EnvLoader::new(Some(prefix.clone())).load();
            if !overlay.is_empty() {
                debug!(prefix = %prefix, overridden = overlay.len(), "Applying environment overlay");
            }
            for (key, value) in overlay {
                properties.set(key, value);
            }
        }

        Ok(properties)
    }
}

impl Default for PropertiesLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the properties selected by command-line flags, with the default environment overlay.
pub fn load_from_args<I, S>(args: I) -> Result<Properties>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    PropertiesLoader::new()
        .profile(Profile::from_args(args))
        .load()
}
