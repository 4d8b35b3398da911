//! HTTP client with bearer injection and coalesced token refresh.
//!
//! Every request reads the stored access token. A token inside the grace
//! period is refreshed before the request goes out; while one refresh is in
//! flight, other requests queue behind it and reuse its result instead of
//! starting their own. A 401 from the backend clears the stored credentials.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tokio::sync::oneshot;

use super::credentials::{CredentialPair, CredentialStore};
use super::error::{ApiError, RefreshFailure};
use super::types::{
    error_message, Envelope, LoginBody, LoginRequest, RefreshBody, RefreshRequest, User,
};
use crate::config::Config;

pub const LOGIN_PATH: &str = "/api/login/";
pub const REFRESH_PATH: &str = "/api/refresh/";

type RefreshOutcome = Result<String, RefreshFailure>;

/// Refresh bookkeeping owned by one client instance.
#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    /// Requests that arrived while a refresh was in flight, released in FIFO order.
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// What a request must do to obtain its bearer token.
enum TokenPlan {
    Ready(Option<String>),
    Wait(oneshot::Receiver<RefreshOutcome>),
    Refresh,
}

/// Releases queued waiters when a refresh ends, including when the refreshing
/// future is dropped before it completes.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    finished: bool,
}

impl<'a> RefreshGuard<'a> {
    fn new(state: &'a Mutex<RefreshState>) -> Self {
        Self {
            state,
            finished: false,
        }
    }

    fn finish(mut self, outcome: RefreshOutcome) {
        self.finished = true;
        release_waiters(self.state, outcome);
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Token refresh dropped before completion, failing queued requests");
            release_waiters(self.state, Err(RefreshFailure::Abandoned));
        }
    }
}

fn lock_state(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// End the refresh and hand back its waiters, oldest first.
fn take_waiters(state: &Mutex<RefreshState>) -> VecDeque<oneshot::Sender<RefreshOutcome>> {
    let mut guard = lock_state(state);
    guard.refreshing = false;
    std::mem::take(&mut guard.waiters)
}

fn release_waiters(state: &Mutex<RefreshState>, outcome: RefreshOutcome) {
    let waiters = take_waiters(state);
    if !waiters.is_empty() {
        log::debug!("Releasing {} request(s) queued behind token refresh", waiters.len());
    }
    for waiter in waiters {
        // A dropped receiver means its request was abandoned by the caller.
        let _ = waiter.send(outcome.clone());
    }
}

/// HTTP client wrapper for DocAssist API communication.
///
/// Shared across the application via `Arc<ApiClient>`; credentials and the
/// refresh state belong to the instance.
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: CredentialStore,
    refresh: Mutex<RefreshState>,
}

impl ApiClient {
    /// Create a new API client with the given base URL and default timeouts.
    pub fn new(base_url: &str) -> Self {
        Self::from_config(&Config {
            api_base_url: base_url.to_string(),
            ..Config::default()
        })
    }

    pub fn from_config(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials: CredentialStore::new(),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Install a credential pair, e.g. one restored from the keychain.
    pub fn set_credentials(&self, pair: CredentialPair) {
        self.credentials.set(pair);
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.access_token().is_some()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Unauthenticated request builder for a relative API path.
    ///
    /// Pass the result to [`ApiClient::send`] to go through the auth protocol.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send a request with the current bearer token attached.
    ///
    /// Refreshes the token first if it is about to expire. Returns
    /// `ApiError::Unauthorized` (after clearing credentials) on a 401; every
    /// other response, successful or not, is handed back untouched.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let builder = match self.bearer_token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let resp = builder.send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            log::warn!("Backend rejected credentials (401), clearing session");
            self.credentials.clear();
            return Err(ApiError::Unauthorized);
        }
        Ok(resp)
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.send(self.request(Method::DELETE, path)).await
    }

    /// POST with no body.
    pub async fn post_empty(&self, path: &str) -> Result<Response, ApiError> {
        self.send(self.request(Method::POST, path)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ApiError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ApiError> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn post_multipart(&self, path: &str, form: Form) -> Result<Response, ApiError> {
        self.send(self.request(Method::POST, path).multipart(form)).await
    }

    pub async fn patch_multipart(&self, path: &str, form: Form) -> Result<Response, ApiError> {
        self.send(self.request(Method::PATCH, path).multipart(form)).await
    }

    /// Log in with username (or email) and password.
    ///
    /// On success the returned credential pair replaces any stored one.
    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<User, ApiError> {
        let req = LoginRequest {
            username_or_email: username_or_email.to_string(),
            password: password.to_string(),
        };

        let resp = self.client.post(self.url(LOGIN_PATH)).json(&req).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(&text);
            log::warn!("Login failed with status {}", status);
            return Err(ApiError::LoginFailed(if message.is_empty() {
                "Login failed".to_string()
            } else {
                message
            }));
        }

        let envelope: Envelope<LoginBody> = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("login response: {}", e)))?;
        let body = envelope
            .body
            .ok_or_else(|| ApiError::LoginFailed("Login failed: no response body".to_string()))?;

        self.credentials.set(CredentialPair::new(
            body.access_token,
            body.refresh_token,
            &body.expires,
        ));

        log::info!("Logged in as {}", body.user.username);
        Ok(body.user)
    }

    /// Drop the stored credentials. The backend has no session to invalidate.
    pub fn logout(&self) {
        self.credentials.clear();
        log::info!("Logged out, credentials cleared");
    }

    /// Resolve the token to attach to the next request, refreshing if needed.
    async fn bearer_token(&self) -> Result<Option<String>, ApiError> {
        let plan = {
            let mut state = lock_state(&self.refresh);
            match self.credentials.access_token() {
                None => TokenPlan::Ready(None),
                Some(token) if !self.credentials.is_expired() => TokenPlan::Ready(Some(token)),
                Some(_) if state.refreshing => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    TokenPlan::Wait(rx)
                }
                Some(_) => {
                    state.refreshing = true;
                    TokenPlan::Refresh
                }
            }
        };

        match plan {
            TokenPlan::Ready(token) => Ok(token),
            TokenPlan::Wait(rx) => {
                log::debug!("Token refresh in flight, waiting for it");
                match rx.await {
                    Ok(Ok(token)) => Ok(Some(token)),
                    Ok(Err(failure)) => Err(ApiError::RefreshFailed(failure)),
                    Err(_) => Err(ApiError::RefreshFailed(RefreshFailure::Abandoned)),
                }
            }
            TokenPlan::Refresh => self.refresh_session().await.map(Some),
        }
    }

    /// Perform the single in-flight refresh and release everyone queued on it.
    async fn refresh_session(&self) -> Result<String, ApiError> {
        let guard = RefreshGuard::new(&self.refresh);
        log::info!("Access token near expiry, refreshing session");

        match self.request_refresh().await {
            Ok(pair) => {
                let token = pair.access_token.clone();
                self.credentials.set(pair);
                guard.finish(Ok(token.clone()));
                log::info!("Session refreshed");
                Ok(token)
            }
            Err(failure) => {
                log::warn!("Session refresh failed: {}", failure);
                self.credentials.clear();
                guard.finish(Err(failure.clone()));
                Err(ApiError::RefreshFailed(failure))
            }
        }
    }

    async fn request_refresh(&self) -> Result<CredentialPair, RefreshFailure> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .ok_or(RefreshFailure::MissingRefreshToken)?;

        let resp = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(RefreshFailure::Rejected {
                status,
                message: error_message(&text),
            });
        }

        let envelope: Envelope<RefreshBody> = resp
            .json()
            .await
            .map_err(|e| RefreshFailure::Decode(e.to_string()))?;
        let body = envelope
            .body
            .ok_or_else(|| RefreshFailure::Decode("missing body".to_string()))?;

        Ok(CredentialPair::new(
            body.access_token,
            body.refresh_token,
            &body.expires,
        ))
    }
}
