//! Runtime environment detection.
//!
//! Provides a single source of truth for the target environment, read from
//! the `RTMBOT_ENV` environment variable. The environment only decides which
//! external endpoint and credential variables are consulted first.
//!
//! # Environment Variable
//!
//! Set `RTMBOT_ENV` to one of:
//! - `test` - Test mode
//! - `development` or `dev` - Development mode
//! - (anything else or unset) - Production mode

/// Target environment for the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production environment (default).
    #[default]
    Production,
    /// Development environment.
    Development,
    /// Test environment.
    Test,
}

impl Environment {
    /// Detect current environment from `RTMBOT_ENV`.
    #[must_use]
    pub fn current() -> Self {
        std::env::var("RTMBOT_ENV")
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    /// Parse an environment name; unknown names mean production.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "test" => Self::Test,
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Returns `true` if this is the production environment.
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Returns `true` if this is the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    /// Credential variables to consult, most specific first.
    #[must_use]
    pub fn token_vars(self) -> &'static [&'static str] {
        match self {
            Self::Development => &["RTMBOT_DEV_TOKEN", "RTMBOT_TOKEN"],
            Self::Production | Self::Test => &["RTMBOT_TOKEN"],
        }
    }

    /// API base URL variables to consult, most specific first.
    #[must_use]
    pub fn api_url_vars(self) -> &'static [&'static str] {
        match self {
            Self::Development => &["RTMBOT_DEV_API_URL", "RTMBOT_API_URL"],
            Self::Production | Self::Test => &["RTMBOT_API_URL"],
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Returns the first non-empty value among the given environment variables.
#[must_use]
pub fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}
