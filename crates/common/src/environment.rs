//! Operating environment shared by both service tiers.

use std::str::FromStr;

/// Read from `APP_ENV`. Production turns on the strict startup checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parse an optional `APP_ENV` value, defaulting to development.
    pub fn from_var(value: Option<&str>) -> anyhow::Result<Self> {
        value.map_or(Ok(Environment::Development), str::parse)
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!(
                "Invalid APP_ENV '{}' (expected development/production)",
                s.trim()
            ),
        }
    }
}
