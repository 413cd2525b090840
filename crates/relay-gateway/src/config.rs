//! Configuration management for the Relay Gateway
//!
//! Loads configuration from environment variables with sensible defaults.
//! Production mode refuses to start without an explicit port and secret.

use anyhow::{Context, Result};
use relay_common::{job::resolve_deadline, Credential, Environment, DEFAULT_DEADLINE};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::AuthMode;
use crate::operation::ContextSettings;

/// Where execution contexts run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One child process per job
    Process,
    /// One tokio task per job
    Task,
}

impl FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(ExecutionMode::Process),
            "task" => Ok(ExecutionMode::Task),
            other => anyhow::bail!("Invalid EXECUTION_MODE '{}' (expected process/task)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Whether RELAY_PORT was set explicitly
    port_configured: bool,

    /// Shared inter-tier secret
    pub secret: Option<Credential>,

    /// Backend endpoint URL
    pub backend_url: String,

    /// Whether to use the simulated backend
    pub mock_mode: bool,

    /// Simulated backend latency in milliseconds
    pub mock_latency_ms: u64,

    /// Operational identity file
    pub identity_path: Option<PathBuf>,

    /// Per-job deadline
    pub job_timeout: Duration,

    /// Upper bound on live execution contexts
    pub max_concurrent_jobs: usize,

    pub execution_mode: ExecutionMode,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Environment::from_var(lookup("APP_ENV").as_deref())?;
        let production = environment.is_production();

        let port_var = lookup("RELAY_PORT");
        let job_timeout_ms: Option<u64> = lookup("JOB_TIMEOUT_MS")
            .map(|v| v.parse().context("Invalid JOB_TIMEOUT_MS"))
            .transpose()?;

        let config = Config {
            environment,

            api_host: lookup("RELAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port_configured: port_var.is_some(),
            api_port: port_var
                .unwrap_or_else(|| "8090".to_string())
                .parse()
                .context("Invalid RELAY_PORT")?,

            secret: lookup("RELAY_SECRET").and_then(Credential::new),

            backend_url: lookup("BACKEND_URL")
                .unwrap_or_else(|| "http://localhost:8899".to_string()),

            mock_mode: lookup("MOCK_MODE")
                .unwrap_or_else(|| (!production).to_string())
                .parse()
                .context("Invalid MOCK_MODE (expected true/false)")?,

            mock_latency_ms: lookup("MOCK_LATENCY_MS")
                .unwrap_or_else(|| "250".to_string())
                .parse()
                .context("Invalid MOCK_LATENCY_MS")?,

            identity_path: lookup("IDENTITY_PATH").map(PathBuf::from),

            job_timeout: match job_timeout_ms {
                Some(ms) => resolve_deadline(Some(Duration::from_millis(ms)))
                    .context("Invalid JOB_TIMEOUT_MS")?,
                None => DEFAULT_DEADLINE,
            },

            max_concurrent_jobs: lookup("MAX_CONCURRENT_JOBS")
                .unwrap_or_else(|| "4".to_string())
                .parse()
                .context("Invalid MAX_CONCURRENT_JOBS")?,

            execution_mode: lookup("EXECUTION_MODE")
                .unwrap_or_else(|| "process".to_string())
                .parse()?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("RELAY_PORT must be greater than 0");
        }

        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("MAX_CONCURRENT_JOBS must be greater than 0");
        }

        if !self.mock_mode && self.identity_path.is_none() {
            anyhow::bail!("IDENTITY_PATH is required when MOCK_MODE=false");
        }

        if self.environment.is_production() {
            if !self.port_configured {
                anyhow::bail!("RELAY_PORT must be set explicitly in production");
            }
            if self.secret.is_none() {
                anyhow::bail!("RELAY_SECRET is required in production");
            }
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn auth_mode(&self) -> AuthMode {
        match &self.secret {
            Some(credential) => AuthMode::Required(credential.clone()),
            None => AuthMode::Disabled,
        }
    }

    /// Settings each execution context rebuilds its client state from.
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            mock_mode: self.mock_mode,
            mock_latency_ms: self.mock_latency_ms,
            backend_url: self.backend_url.clone(),
            identity_path: self.identity_path.clone(),
        }
    }
}
