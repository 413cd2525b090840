//! Structural validation of job parameters.
//!
//! Runs at the gateway before any job exists and again when a [`crate::Job`]
//! is constructed, so an invalid job can never reach an execution context.

use crate::error::{Error, Result};

/// Decoded length of an ed25519 account key.
const ACCOUNT_KEY_LEN: usize = 32;

/// A 32-byte key never encodes to more than 44 base58 characters.
const MAX_RECIPIENT_LEN: usize = 44;

/// Amounts are in the base unit and must be strictly positive.
pub fn validate_amount(amount: u64) -> Result<u64> {
    if amount == 0 {
        return Err(Error::InvalidAmount(
            "amount must be a positive integer".to_string(),
        ));
    }
    Ok(amount)
}

/// Check that a recipient is a syntactically valid base58 account address,
/// i.e. it decodes to exactly 32 bytes.
///
/// This does not prove the account exists.
pub fn validate_recipient(recipient: &str) -> Result<&str> {
    if recipient.is_empty() || recipient.len() > MAX_RECIPIENT_LEN {
        return Err(Error::InvalidRecipient(format!(
            "expected at most {} base58 characters, got {}",
            MAX_RECIPIENT_LEN,
            recipient.chars().count()
        )));
    }

    let bytes = bs58::decode(recipient)
        .into_vec()
        .map_err(|e| Error::InvalidRecipient(format!("not valid base58: {}", e)))?;

    if bytes.len() != ACCOUNT_KEY_LEN {
        return Err(Error::InvalidRecipient(format!(
            "expected a {}-byte account key, got {} bytes",
            ACCOUNT_KEY_LEN,
            bytes.len()
        )));
    }

    Ok(recipient)
}
