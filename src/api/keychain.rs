//! Keychain persistence for the CLI session.
//!
//! Each CLI invocation is a new process, so the credential pair is kept in
//! the OS keychain between runs (serialized as JSON in a single entry).
//! Nothing is written to disk.

use keyring::Entry;
use thiserror::Error;

use super::credentials::CredentialPair;

/// Keychain service name for the DocAssist CLI.
const SERVICE_NAME: &str = "com.docassist.cli";

/// Entry holding the serialized credential pair.
const SESSION_KEY: &str = "session";

/// Entry holding the last username used to log in.
const LAST_USERNAME_KEY: &str = "last_username";

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("Keychain operation failed: {0}")]
    OperationFailed(String),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        KeychainError::OperationFailed(err.to_string())
    }
}

fn read_entry(key: &str) -> Result<Option<String>, KeychainError> {
    let entry = Entry::new(SERVICE_NAME, key)?;
    match entry.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(KeychainError::from(e)),
    }
}

/// Store the credential pair, replacing any stored session.
pub fn store_session(pair: &CredentialPair) -> Result<(), KeychainError> {
    let json = serde_json::to_string(pair).map_err(|e| KeychainError::Corrupt(e.to_string()))?;
    Entry::new(SERVICE_NAME, SESSION_KEY)?.set_password(&json)?;
    Ok(())
}

/// Load the stored credential pair.
///
/// Returns `None` if the user never logged in or has logged out.
pub fn load_session() -> Result<Option<CredentialPair>, KeychainError> {
    match read_entry(SESSION_KEY)? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| KeychainError::Corrupt(e.to_string())),
        None => Ok(None),
    }
}

/// Delete the stored session.
///
/// Idempotent: ignores `NoEntry` error (already deleted or never stored).
pub fn delete_session() -> Result<(), KeychainError> {
    let entry = Entry::new(SERVICE_NAME, SESSION_KEY)?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(KeychainError::from(e)),
    }
}

/// Remember the username so `login` can default to it next time.
pub fn store_last_username(username: &str) -> Result<(), KeychainError> {
    Entry::new(SERVICE_NAME, LAST_USERNAME_KEY)?.set_password(username)?;
    Ok(())
}

pub fn get_last_username() -> Result<Option<String>, KeychainError> {
    read_entry(LAST_USERNAME_KEY)
}
