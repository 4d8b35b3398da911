//! Application state for the DocAssist CLI.
//!
//! Holds the shared API client, the role group names and the signed-in user.
//! The credential pair is mirrored to the OS keychain so a session survives
//! between invocations.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::types::User;
use crate::config::{Config, RoleGroups};
use crate::services::users;

/// State shared by every CLI command.
pub struct AppState {
    /// HTTP client for DocAssist API communication.
    pub api: Arc<ApiClient>,

    /// Backend group names used for privilege checks.
    pub roles: RoleGroups,

    /// User returned by login or `whoami`, fetched lazily.
    pub user: RwLock<Option<User>>,

    /// Whether the session is mirrored to the OS keychain.
    persist: bool,
}

impl AppState {
    /// State whose session is persisted in the OS keychain when available.
    pub fn new(config: &Config) -> Self {
        Self::build(config, cfg!(feature = "keychain"))
    }

    /// State that never touches the keychain.
    pub fn in_memory(config: &Config) -> Self {
        Self::build(config, false)
    }

    fn build(config: &Config, persist: bool) -> Self {
        Self {
            api: Arc::new(ApiClient::from_config(config)),
            roles: config.roles.clone(),
            user: RwLock::new(None),
            persist,
        }
    }

    /// Load a previously saved session into the client.
    ///
    /// Returns `true` if credentials were restored.
    pub fn restore_session(&self) -> bool {
        if !self.persist {
            return false;
        }
        #[cfg(feature = "keychain")]
        {
            match crate::api::keychain::load_session() {
                Ok(Some(pair)) => {
                    self.api.set_credentials(pair);
                    log::info!("Restored session from keychain");
                    return true;
                }
                Ok(None) => log::debug!("No saved session in keychain"),
                Err(e) => log::warn!("Failed to read session from keychain: {}", e),
            }
        }
        false
    }

    /// Mirror the client's current credentials to the keychain.
    ///
    /// Credentials cleared by a failed refresh or a 401 remove the saved entry.
    pub fn persist_session(&self) -> Result<(), ApiError> {
        if !self.persist {
            return Ok(());
        }
        #[cfg(feature = "keychain")]
        {
            use crate::api::keychain;
            match self.api.credentials().snapshot() {
                Some(pair) => keychain::store_session(&pair)?,
                None => keychain::delete_session()?,
            }
        }
        Ok(())
    }

    /// Username of the last successful login, if one was remembered.
    pub fn last_username(&self) -> Option<String> {
        if !self.persist {
            return None;
        }
        #[cfg(feature = "keychain")]
        {
            match crate::api::keychain::get_last_username() {
                Ok(name) => return name,
                Err(e) => log::warn!("Failed to read last username: {}", e),
            }
        }
        None
    }

    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<User, ApiError> {
        let user = users::login(&self.api, username_or_email, password).await?;
        *self.user.write().await = Some(user.clone());

        self.persist_session()?;
        #[cfg(feature = "keychain")]
        {
            if self.persist {
                if let Err(e) = crate::api::keychain::store_last_username(&user.username) {
                    log::warn!("Failed to remember username: {}", e);
                }
            }
        }
        Ok(user)
    }

    /// Clear credentials and the cached user. Keychain cleanup is best-effort.
    pub async fn logout(&self) {
        users::logout(&self.api);
        *self.user.write().await = None;
        if let Err(e) = self.persist_session() {
            log::warn!("Failed to remove saved session: {}", e);
        }
    }

    /// The signed-in user, asking the backend if it is not cached yet.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        if let Some(user) = self.user.read().await.clone() {
            return Ok(user);
        }
        let user = users::whoami(&self.api).await?;
        *self.user.write().await = Some(user.clone());
        Ok(user)
    }

    pub async fn can_download(&self) -> Result<bool, ApiError> {
        let user = self.current_user().await?;
        Ok(users::has_download_privilege(Some(&user), &self.roles))
    }

    pub async fn is_admin(&self) -> Result<bool, ApiError> {
        let user = self.current_user().await?;
        Ok(users::has_admin_privilege(Some(&user), &self.roles))
    }
}
