//! Runtime configuration for the tenant-isolation layer.

use std::convert::Infallible;

use clap::Args;

/// Deployment environment. Controls whether the bypass guardrail runs and
/// how much detail forbidden-operation errors carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Name of the variable read by [`Environment::from_env`].
    pub const VAR: &'static str = "APP_ENV";

    /// Reads `APP_ENV`. Missing or unrecognized values mean development.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(Self::VAR).map_or(Self::Development, |raw| Self::parse_or_default(&raw))
    }

    /// Like [`parse`](Self::parse), falling back to development with a warning.
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            tracing::warn!(value = %raw, "unrecognized {}; assuming development", Self::VAR);
            Self::Development
        })
    }

    /// Case-insensitive parse accepting the usual short forms.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Some(Self::Development),
            "test" | "testing" | "ci" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Clap value parser sharing [`Environment::parse_or_default`], so the flag
/// and `APP_ENV` accept the same spellings and never reject a value.
#[allow(clippy::unnecessary_wraps)]
fn parse_environment(raw: &str) -> Result<Environment, Infallible> {
    Ok(Environment::parse_or_default(raw))
}

/// Tenancy settings a host binary can flatten into its own clap parser.
#[derive(Debug, Clone, Default, Args)]
pub struct TenancyConfig {
    /// Deployment environment.
    #[arg(
        long = "environment",
        env = "APP_ENV",
        value_parser = parse_environment,
        default_value = "development"
    )]
    pub environment: Environment,

    /// Forces the bypass guardrail on or off regardless of environment.
    #[arg(long = "tenancy-guardrail", env = "TENANCY_GUARDRAIL")]
    pub guardrail: Option<bool>,
}

impl TenancyConfig {
    /// Config for `environment` with no guardrail override.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            guardrail: None,
        }
    }

    /// Config built from `APP_ENV`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::for_environment(Environment::from_env())
    }

    /// The guardrail runs everywhere except production unless overridden.
    #[must_use]
    pub fn guardrail_enabled(&self) -> bool {
        self.guardrail
            .unwrap_or(!self.environment.is_production())
    }
}
