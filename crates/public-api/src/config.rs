//! Configuration management for the Public API
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use relay_common::{Credential, Environment};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Whether PUBLIC_PORT was set explicitly
    port_configured: bool,

    /// Relay Gateway base URL
    pub relay_url: String,

    /// Shared secret attached to forwarded requests
    pub relay_secret: Option<Credential>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Environment::from_var(lookup("APP_ENV").as_deref())?;
        let port_var = lookup("PUBLIC_PORT");

        let config = Config {
            environment,

            api_host: lookup("PUBLIC_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port_configured: port_var.is_some(),
            api_port: port_var
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("Invalid PUBLIC_PORT")?,

            relay_url: lookup("RELAY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8090".to_string()),

            relay_secret: lookup("RELAY_SECRET").and_then(Credential::new),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("PUBLIC_PORT must be greater than 0");
        }

        if !self.relay_url.starts_with("http://") && !self.relay_url.starts_with("https://") {
            anyhow::bail!("RELAY_URL must be an http(s) URL");
        }

        if self.environment.is_production() {
            if !self.port_configured {
                anyhow::bail!("PUBLIC_PORT must be set explicitly in production");
            }
            if self.relay_secret.is_none() {
                anyhow::bail!("RELAY_SECRET is required in production");
            }
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[]).expect("Failed to load config");

        assert_eq!(config.api_address(), "0.0.0.0:8080");
        assert_eq!(config.relay_url, "http://127.0.0.1:8090");
        assert!(config.relay_secret.is_none());
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_production_requires_secret() {
        let err = load(&[("APP_ENV", "production"), ("PUBLIC_PORT", "8080")]).unwrap_err();
        assert!(err.to_string().contains("RELAY_SECRET is required"));

        let config = load(&[
            ("APP_ENV", "production"),
            ("PUBLIC_PORT", "8080"),
            ("RELAY_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.relay_secret.unwrap().expose(), "s3cret");
    }

    #[test]
    fn test_production_requires_port() {
        let err = load(&[("APP_ENV", "Production"), ("RELAY_SECRET", "s3cret")]).unwrap_err();
        assert!(err.to_string().contains("PUBLIC_PORT must be set explicitly"));
    }

    #[test]
    fn test_app_env_is_case_insensitive() {
        let config = load(&[
            ("APP_ENV", "Production"),
            ("PUBLIC_PORT", "8080"),
            ("RELAY_SECRET", "s3cret"),
        ])
        .unwrap();
        assert!(config.environment.is_production());
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("PUBLIC_PORT", "0")]).is_err());
        assert!(load(&[("PUBLIC_PORT", "http")]).is_err());
        assert!(load(&[("RELAY_URL", "relay:8090")]).is_err());
        assert!(load(&[("APP_ENV", "staging")]).is_err());
    }
}
