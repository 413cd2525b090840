//! Operational identity used by execution contexts to talk to the backend.

use anyhow::{Context, Result};
use relay_common::validation::validate_recipient;
use serde::Deserialize;
use std::path::Path;

/// Address of the built-in development identity.
pub const DEV_IDENTITY_ADDRESS: &str = "RE1AYdevWa11et11111111111111111111111111111";

/// The relay's own account on the backend.
///
/// Every execution context loads its own copy; nothing holding the secret is
/// shared between concurrent jobs.
#[derive(Clone, Deserialize)]
pub struct OperationalIdentity {
    pub address: String,
    secret_key: String,
}

impl OperationalIdentity {
    /// Load an identity file: `{"address": "...", "secret_key": "..."}`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read identity file: {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid identity file: {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let identity: OperationalIdentity =
            serde_json::from_str(raw).context("Failed to parse identity JSON")?;

        validate_recipient(&identity.address)?;
        if identity.secret_key.trim().is_empty() {
            anyhow::bail!("secret_key must not be empty");
        }

        Ok(identity)
    }

    /// Fixed identity for mock mode without an identity file.
    pub fn development() -> Self {
        Self {
            address: DEV_IDENTITY_ADDRESS.to_string(),
            secret_key: "development-only".to_string(),
        }
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl std::fmt::Debug for OperationalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationalIdentity")
            .field("address", &self.address)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ADDRESS: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[test]
    fn test_load_identity_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"address": "{}", "secret_key": "k3y"}}"#,
            ADDRESS
        )
        .unwrap();

        let identity = OperationalIdentity::load(file.path()).unwrap();
        assert_eq!(identity.address, ADDRESS);
        assert_eq!(identity.secret_key(), "k3y");
    }

    #[test]
    fn test_missing_file() {
        let err = OperationalIdentity::load(Path::new("/nonexistent/identity.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read identity file"));
    }

    #[test]
    fn test_rejects_invalid_address_and_empty_secret() {
        assert!(OperationalIdentity::from_json(r#"{"address":"not-an-address","secret_key":"k"}"#).is_err());
        let blank = format!(r#"{{"address":"{}","secret_key":"  "}}"#, ADDRESS);
        assert!(OperationalIdentity::from_json(&blank).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", OperationalIdentity::development());
        assert!(rendered.contains(DEV_IDENTITY_ADDRESS));
        assert!(!rendered.contains("development-only"));
    }

    #[test]
    fn test_development_address_is_well_formed() {
        assert!(validate_recipient(DEV_IDENTITY_ADDRESS).is_ok());
    }
}
