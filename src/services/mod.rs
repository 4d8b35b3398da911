//! Typed wrappers over the DocAssist backend endpoints.
//!
//! Every call goes through the shared [`ApiClient`](crate::api::ApiClient),
//! so authentication and token refresh are handled there.

pub mod chats;
pub mod documents;
pub mod users;

use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::api::types::{error_message, Envelope};

/// Turn a non-2xx response into `ApiError::Status`.
pub(crate) async fn ensure_success(resp: Response) -> Result<Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status,
        message: error_message(&text),
    })
}

/// Check the status and decode the envelope's `body`.
pub(crate) async fn read_body<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let resp = ensure_success(resp).await?;
    let envelope: Envelope<T> = resp
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))?;
    envelope
        .body
        .ok_or_else(|| ApiError::Decode("response has no body".to_string()))
}
