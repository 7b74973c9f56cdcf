// Profile selection

use crate::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Deployment profile, selecting which properties file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Profile {
    #[default]
    Default,
    Local,
    Dev,
    Prod,
}

impl Profile {
    /// Pick the profile from command-line flags.
    ///
    /// `--local` wins over `--dev`, which wins over `--prod`, regardless of
    /// their position. Without any flag the default profile is used.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selected = Profile::Default;
        for arg in args {
            let candidate = match arg.as_ref() {
                "--local" => Profile::Local,
                "--dev" => Profile::Dev,
                "--prod" => Profile::Prod,
                _ => continue,
            };
            if selected == Profile::Default || candidate.priority() < selected.priority() {
                selected = candidate;
            }
        }
        selected
    }

    fn priority(self) -> u8 {
        match self {
            Profile::Local => 1,
            Profile::Dev => 2,
            Profile::Prod => 3,
            Profile::Default => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Local => "local",
            Profile::Dev => "dev",
            Profile::Prod => "prod",
        }
    }

    /// `application.properties` or `application-<profile>.properties`.
    pub fn file_name(&self) -> String {
        match self {
            Profile::Default => "application.properties".to_string(),
            other => format!("application-{}.properties", other.name()),
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Profile::Default),
            "local" => Ok(Profile::Local),
            "dev" => Ok(Profile::Dev),
            "prod" => Ok(Profile::Prod),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_precedence() {
        assert_eq!(Profile::from_args(["--prod", "--dev"]), Profile::Dev);
        assert_eq!(Profile::from_args(["--prod", "--local", "--dev"]), Profile::Local);
        assert_eq!(Profile::from_args(["app", "--prod"]), Profile::Prod);
        assert_eq!(Profile::from_args(Vec::<String>::new()), Profile::Default);
        assert_eq!(Profile::from_args(["--staging"]), Profile::Default);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(Profile::Default.file_name(), "application.properties");
        assert_eq!(Profile::Local.file_name(), "application-local.properties");
        assert_eq!(Profile::Prod.file_name(), "application-prod.properties");
    }

    #[test]
    fn test_parse() {
        assert_eq!("DEV".parse::<Profile>().unwrap(), Profile::Dev);
        assert!("staging".parse::<Profile>().is_err());
    }
}
