//! Runtime configuration read from the environment.
//!
//! `main` loads a `.env` file first (via `dotenvy`), so the same variables can
//! live there. CLI flags override what is read here.

use std::time::Duration;

/// Backend used when `DOCASSIST_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Backend group names that grant each role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGroups {
    pub superadmin: String,
    pub admin: String,
    pub downloader: String,
}

impl Default for RoleGroups {
    fn default() -> Self {
        Self {
            superadmin: "SuperAdmin".to_string(),
            admin: "Admin".to_string(),
            downloader: "UserDownload".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub roles: RoleGroups,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            roles: RoleGroups::default(),
        }
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secs = |key: &str, default: Duration| match non_empty(key) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    log::warn!("Ignoring invalid {}={:?}, using {:?}", key, raw, default);
                    default
                }
            },
            None => default,
        };

        let roles = RoleGroups {
            superadmin: non_empty("DOCASSIST_SUPERADMIN_GROUP")
                .unwrap_or(defaults.roles.superadmin),
            admin: non_empty("DOCASSIST_ADMIN_GROUP").unwrap_or(defaults.roles.admin),
            downloader: non_empty("DOCASSIST_DOWNLOADER_GROUP")
                .unwrap_or(defaults.roles.downloader),
        };

        Self {
            api_base_url: non_empty("DOCASSIST_API_URL").unwrap_or(defaults.api_base_url),
            timeout: secs("DOCASSIST_TIMEOUT_SECS", defaults.timeout),
            connect_timeout: secs("DOCASSIST_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            roles,
        }
    }
}
