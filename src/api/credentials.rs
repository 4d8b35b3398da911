//! In-memory credential store for the authenticated request client.
//!
//! Holds at most one access/refresh token pair per client instance and
//! answers expiry queries. Token strings are zeroized when replaced or
//! cleared. Nothing here touches the network.
//!
//! The store uses a std `RwLock`: it is read while the client holds its
//! refresh-state mutex, and no lock is ever held across an await.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::types::parse_timestamp;

/// Safety margin before the recorded expiry at which a token counts as expired,
/// so the refresh happens before the backend starts rejecting it.
pub const GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Access token, refresh token and the access token's expiry (epoch millis).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    /// `None` when the backend sent no parseable expiry; treated as expired.
    pub expires_at_ms: Option<i64>,
}

impl CredentialPair {
    /// Build a pair from the token strings and the backend's `expires` timestamp.
    pub fn new(access_token: String, refresh_token: String, expires: &str) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at_ms: parse_expiry(expires),
        }
    }

    /// Whether this pair's access token is inside the grace period at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        is_expired(self.expires_at_ms, now_ms)
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Parse the backend's `expires` value into epoch milliseconds.
///
/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC).
pub fn parse_expiry(expires: &str) -> Option<i64> {
    parse_timestamp(expires).map(|dt| dt.timestamp_millis())
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn is_expired(expires_at_ms: Option<i64>, now_ms: i64) -> bool {
    match expires_at_ms {
        None => true,
        Some(expiry) => now_ms.saturating_add(GRACE_PERIOD.as_millis() as i64) >= expiry,
    }
}

/// Holder of the current credential pair.
#[derive(Debug, Default)]
pub struct CredentialStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<CredentialPair>> {
        self.pair.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<CredentialPair>> {
        self.pair.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new pair, overwriting (and zeroizing) any existing one.
    pub fn set(&self, pair: CredentialPair) {
        let mut guard = self.write();
        if let Some(ref mut old) = *guard {
            old.zeroize();
        }
        *guard = Some(pair);
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().as_ref().map(|p| p.refresh_token.clone())
    }

    pub fn expires_at_ms(&self) -> Option<i64> {
        self.read().as_ref().and_then(|p| p.expires_at_ms)
    }

    /// Copy of the current pair, used to persist it outside the process.
    pub fn snapshot(&self) -> Option<CredentialPair> {
        self.read().clone()
    }

    /// True if no expiry is recorded or `now + GRACE_PERIOD >= expiry`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        is_expired(self.expires_at_ms(), now_ms)
    }

    /// Zeroize and drop the stored pair. Calling it again is a no-op.
    pub fn clear(&self) {
        let mut guard = self.write();
        if let Some(ref mut pair) = *guard {
            pair.zeroize();
        }
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE_MS: i64 = 30_000;

    fn pair_expiring_at(expires_at_ms: Option<i64>) -> CredentialPair {
        CredentialPair {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at_ms,
        }
    }

    #[test]
    fn test_empty_store_returns_none() {
        let store = CredentialStore::new();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert!(store.is_expired());
    }

    #[test]
    fn test_set_overwrites_existing_pair() {
        let store = CredentialStore::new();
        store.set(pair_expiring_at(Some(1)));
        store.set(CredentialPair {
            access_token: "access-2".to_string(),
            refresh_token: "refresh-2".to_string(),
            expires_at_ms: Some(2),
        });

        assert_eq!(store.access_token().as_deref(), Some("access-2"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-2"));
        assert_eq!(store.expires_at_ms(), Some(2));
    }

    #[test]
    fn test_is_expired_boundary() {
        let now = 1_700_000_000_000;
        let store = CredentialStore::new();

        // Exactly at now + grace counts as expired
        store.set(pair_expiring_at(Some(now + GRACE_MS)));
        assert!(store.is_expired_at(now));

        store.set(pair_expiring_at(Some(now + GRACE_MS - 1)));
        assert!(store.is_expired_at(now));

        store.set(pair_expiring_at(Some(now + GRACE_MS + 1)));
        assert!(!store.is_expired_at(now));
    }

    #[test]
    fn test_missing_expiry_is_expired() {
        let store = CredentialStore::new();
        store.set(pair_expiring_at(None));
        assert!(store.is_expired_at(0));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = CredentialStore::new();
        store.set(pair_expiring_at(Some(i64::MAX)));

        store.clear();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert!(store.snapshot().is_none());

        store.clear();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert_eq!(
            parse_expiry("2024-01-01T00:00:00Z"),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_expiry("2024-01-01T02:00:00+02:00"),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_expiry("2024-01-01T00:00:00.500"),
            Some(1_704_067_200_500)
        );
        assert_eq!(parse_expiry("next tuesday"), None);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", pair_expiring_at(Some(5)));
        assert!(!rendered.contains("access-1"));
        assert!(!rendered.contains("refresh-1"));
        assert!(rendered.contains("expires_at_ms"));
    }
}
