//! Chat session endpoints and the question/answer call to the assistant.

use reqwest::multipart::Form;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::types::{id_string, opt_id_string, Page};

use super::documents::UploadFile;
use super::{ensure_success, read_body};

/// Chat session summary from the session list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default = "untitled", deserialize_with = "title_or_untitled")]
    pub title: String,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub message_count: Option<u64>,
}

/// One question/answer record of a session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatExchange {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<Answer>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub input_data: Option<InputData>,
}

/// The assistant's answer: plain text, or one chunk per source document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Chunks(Vec<AnswerChunk>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerChunk {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
}

/// How the question was asked (typed or recorded).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputData {
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub voice_file: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub voice_duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SessionDetail {
    #[serde(default)]
    messages: Vec<ChatExchange>,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    title: &'a str,
}

/// A question for the assistant, typed or as a voice recording.
#[derive(Debug, Clone, Default)]
pub struct Question {
    pub text: String,
    pub voice: Option<UploadFile>,
    /// Restrict retrieval to one document type.
    pub document_type: Option<String>,
}

impl Question {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn into_form(self) -> Form {
        let input_type = if self.voice.is_some() { "voice" } else { "text" };
        let mut form = Form::new()
            .text("question", self.text)
            .text("input_type", input_type);
        if let Some(voice) = self.voice {
            form = form.part(
                "voice_file",
                reqwest::multipart::Part::bytes(voice.bytes).file_name(voice.file_name),
            );
        }
        if let Some(document_type) = self.document_type {
            form = form.text("document_type", document_type);
        }
        form
    }
}

fn untitled() -> String {
    "Untitled".to_string()
}

fn title_or_untitled<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let title = Option::<String>::deserialize(deserializer)?;
    Ok(title.filter(|t| !t.is_empty()).unwrap_or_else(untitled))
}

/// GET /api/chats/sessions/?page={page}&page_size={page_size}
pub async fn list_sessions(
    api: &ApiClient,
    page: u64,
    page_size: u64,
) -> Result<Vec<ChatSession>, ApiError> {
    let path = format!("/api/chats/sessions/?page={}&page_size={}", page, page_size);
    let body: Page<ChatSession> = read_body(api.get(&path).await?).await?;
    Ok(body.results)
}

/// All sessions visible to the user (backend default paging).
pub async fn all_sessions(api: &ApiClient) -> Result<Vec<ChatSession>, ApiError> {
    let body: Page<ChatSession> = read_body(api.get("/api/chats/sessions/").await?).await?;
    Ok(body.results)
}

/// POST /api/chats/sessions/
pub async fn create_session(api: &ApiClient) -> Result<ChatSession, ApiError> {
    read_body(api.post_empty("/api/chats/sessions/").await?).await
}

/// Messages of one session. A session that does not exist yet has none.
pub async fn session_messages(
    api: &ApiClient,
    session_id: &str,
) -> Result<Vec<ChatExchange>, ApiError> {
    let path = format!("/api/chats/sessions/{}/", urlencoding::encode(session_id));
    let resp = api.get(&path).await?;
    if resp.status() == StatusCode::NOT_FOUND {
        log::debug!("Session {} not found, treating as empty", session_id);
        return Ok(Vec::new());
    }
    let detail: SessionDetail = read_body(resp).await?;
    Ok(detail.messages)
}

/// PATCH /api/chats/sessions/{id}/rename/
pub async fn rename_session(
    api: &ApiClient,
    session_id: &str,
    title: &str,
) -> Result<(), ApiError> {
    let path = format!("/api/chats/sessions/{}/rename/", urlencoding::encode(session_id));
    ensure_success(api.patch_json(&path, &RenameRequest { title }).await?).await?;
    log::info!("Session {} renamed to {:?}", session_id, title);
    Ok(())
}

/// DELETE /api/chats/sessions/{id}/delete/
pub async fn delete_session(api: &ApiClient, session_id: &str) -> Result<(), ApiError> {
    let path = format!("/api/chats/sessions/{}/delete/", urlencoding::encode(session_id));
    ensure_success(api.delete(&path).await?).await?;
    log::info!("Session {} deleted", session_id);
    Ok(())
}

/// Ask the assistant a question.
///
/// Without a session id the backend opens a new session for the question.
pub async fn ask(
    api: &ApiClient,
    session_id: Option<&str>,
    question: Question,
) -> Result<ChatExchange, ApiError> {
    let path = match session_id {
        Some(id) => format!(
            "/api/chats/session/messages/?session_id={}",
            urlencoding::encode(id)
        ),
        None => "/api/chats/session/messages/".to_string(),
    };
    log::debug!(
        "Asking assistant (session: {:?}, voice: {})",
        session_id,
        question.voice.is_some()
    );
    read_body(api.post_multipart(&path, question.into_form()).await?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::credentials::{now_ms, CredentialPair};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn logged_in(server: &MockServer) -> ApiClient {
        let client = ApiClient::new(&server.uri());
        client.set_credentials(CredentialPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at_ms: Some(now_ms() + 3_600_000),
        });
        client
    }

    #[test]
    fn test_exchange_parses_answer_shapes() {
        let text: ChatExchange = serde_json::from_value(json!({
            "id": 7,
            "question": "What is the leave policy?",
            "answer": "Twenty days.",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(text.id, "7");
        assert_eq!(text.answer, Some(Answer::Text("Twenty days.".to_string())));

        let chunks: ChatExchange = serde_json::from_value(json!({
            "id": "abc",
            "answer": [{"text": "See handbook", "file_name": "hr.pdf", "file_id": 12}],
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        match chunks.answer {
            Some(Answer::Chunks(ref list)) => {
                assert_eq!(list[0].file_id.as_deref(), Some("12"));
                assert_eq!(list[0].file_name.as_deref(), Some("hr.pdf"));
            }
            ref other => panic!("expected chunks, got {:?}", other),
        }

        let pending: ChatExchange = serde_json::from_value(json!({
            "id": "p", "question": "hi", "answer": null, "created_at": ""
        }))
        .unwrap();
        assert_eq!(pending.answer, None);
    }

    #[test]
    fn test_session_title_defaults_to_untitled() {
        let session: ChatSession = serde_json::from_value(json!({
            "id": "s1", "title": null, "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(session.title, "Untitled");

        let session: ChatSession = serde_json::from_value(json!({"id": "s2"})).unwrap();
        assert_eq!(session.title, "Untitled");
    }

    #[tokio::test]
    async fn test_missing_session_has_no_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chats/sessions/nope/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = logged_in(&server);
        let messages = session_messages(&client, "nope").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_passes_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chats/sessions/"))
            .and(query_param("page", "1"))
            .and(query_param("page_size", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "body": {"results": [{
                    "id": "s1",
                    "title": "Leave",
                    "created_at": "2024-05-01T10:00:00Z",
                    "message_count": 3
                }]}
            })))
            .mount(&server)
            .await;

        let client = logged_in(&server);
        let sessions = list_sessions(&client, 1, 20).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "Leave");
        assert_eq!(sessions[0].message_count, Some(3));
    }

    #[tokio::test]
    async fn test_rename_sends_title() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/chats/sessions/s1/rename/"))
            .and(body_json(json!({"title": "Benefits"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"body": null})))
            .expect(1)
            .mount(&server)
            .await;

        let client = logged_in(&server);
        rename_session(&client, "s1", "Benefits").await.unwrap();
    }

    #[tokio::test]
    async fn test_ask_targets_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chats/session/messages/"))
            .and(query_param("session_id", "s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "body": {
                    "id": 42,
                    "question": "Who approves travel?",
                    "answer": "Your line manager.",
                    "created_at": "2024-05-01T10:00:00Z"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = logged_in(&server);
        let exchange = ask(&client, Some("s1"), Question::text("Who approves travel?"))
            .await
            .unwrap();
        assert_eq!(exchange.id, "42");
        assert_eq!(
            exchange.answer,
            Some(Answer::Text("Your line manager.".to_string()))
        );
    }
}
