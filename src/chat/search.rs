//! Search over chat sessions by title and, optionally, message content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::services::chats::{self, Answer, ChatExchange, ChatSession};

/// How long fetched session messages are reused by content search.
pub const DETAIL_CACHE_TTL: Duration = Duration::from_secs(300);

type CachedMessages = (Instant, Arc<Vec<ChatExchange>>);

/// Session search with a short-lived cache of session messages.
pub struct ChatSearch {
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedMessages>>,
}

impl Default for ChatSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSearch {
    pub fn new() -> Self {
        Self::with_ttl(DETAIL_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Sessions whose title contains `query`, ignoring case.
    pub fn search_titles(&self, sessions: &[ChatSession], query: &str) -> Vec<ChatSession> {
        let Some(needle) = needle(query) else {
            return sessions.to_vec();
        };
        sessions
            .iter()
            .filter(|s| title_matches(s, &needle))
            .cloned()
            .collect()
    }

    /// Sessions whose title or any question/answer contains `query`.
    ///
    /// Sessions whose messages cannot be fetched are skipped.
    pub async fn search_with_content(
        &self,
        api: &ApiClient,
        sessions: &[ChatSession],
        query: &str,
    ) -> Vec<ChatSession> {
        let Some(needle) = needle(query) else {
            return sessions.to_vec();
        };

        let mut found = Vec::new();
        for session in sessions {
            if title_matches(session, &needle) {
                found.push(session.clone());
                continue;
            }
            match self.messages(api, &session.id).await {
                Ok(messages) => {
                    if messages.iter().any(|m| exchange_matches(m, &needle)) {
                        found.push(session.clone());
                    }
                }
                Err(e) => {
                    log::warn!("Skipping session {} in search: {}", session.id, e);
                }
            }
        }
        found
    }

    async fn messages(
        &self,
        api: &ApiClient,
        session_id: &str,
    ) -> Result<Arc<Vec<ChatExchange>>, ApiError> {
        if let Some(cached) = self.cached(session_id) {
            return Ok(cached);
        }
        let messages = Arc::new(chats::session_messages(api, session_id).await?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), (Instant::now(), Arc::clone(&messages)));
        Ok(messages)
    }

    fn cached(&self, session_id: &str) -> Option<Arc<Vec<ChatExchange>>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(session_id) {
            Some((fetched, messages)) if fetched.elapsed() < self.ttl => {
                Some(Arc::clone(messages))
            }
            Some(_) => {
                cache.remove(session_id);
                None
            }
            None => None,
        }
    }
}

/// Lowercased query, or `None` for a blank one. Surrounding spaces are kept.
fn needle(query: &str) -> Option<String> {
    if query.trim().is_empty() {
        None
    } else {
        Some(query.to_lowercase())
    }
}

fn title_matches(session: &ChatSession, needle: &str) -> bool {
    session.title.to_lowercase().contains(needle)
}

fn exchange_matches(exchange: &ChatExchange, needle: &str) -> bool {
    let contains = |text: &str| text.to_lowercase().contains(needle);

    if exchange.question.as_deref().is_some_and(contains) {
        return true;
    }
    match &exchange.answer {
        Some(Answer::Text(text)) => contains(text),
        Some(Answer::Chunks(chunks)) => chunks.iter().any(|chunk| {
            chunk.text.as_deref().is_some_and(contains)
                || chunk.answer.as_deref().is_some_and(contains)
        }),
        _ => false,
    }
}
