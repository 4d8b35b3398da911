//! API client module for DocAssist.
//!
//! Provides the authenticated HTTP client (bearer injection, coalesced token
//! refresh, 401 handling), the credential store, keychain persistence for the
//! CLI, and request/response types matching the DocAssist backend API.

pub mod client;
pub mod credentials;
pub mod error;
#[cfg(feature = "keychain")]
pub mod keychain;
pub mod types;

pub use client::ApiClient;
pub use credentials::{CredentialPair, CredentialStore, GRACE_PERIOD};
pub use error::{ApiError, RefreshFailure};
