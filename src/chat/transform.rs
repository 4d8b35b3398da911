//! Conversion of backend chat exchanges into displayable messages.

use chrono::Local;

use super::parse_timestamp;
use crate::services::chats::{Answer, AnswerChunk, ChatExchange};

/// Answer the backend gives when retrieval found no document.
pub const NO_DOCUMENT_MESSAGE: &str = "No relevant information found. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sender {
    #[default]
    User,
    Bot,
}

/// A single message as shown in a conversation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    /// Local `HH:MM` of the exchange.
    pub timestamp: String,
    pub doc_id: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub published_date: Option<String>,
    pub has_references: bool,
    pub voice_url: Option<String>,
    pub voice_duration: Option<f64>,
    pub is_voice: bool,
}

impl ChatMessage {
    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}

/// A user message together with the bot messages answering it.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user: ChatMessage,
    pub bots: Vec<ChatMessage>,
}

fn display_time(created_at: &str) -> String {
    parse_timestamp(created_at)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

fn chunk_message(
    exchange_id: &str,
    idx: usize,
    chunk: &AnswerChunk,
    base_url: &str,
    timestamp: &str,
) -> ChatMessage {
    let content = chunk
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(chunk.answer.as_deref())
        .unwrap_or_default()
        .replace(" - ", "\n- ");
    let file_name = chunk.file_name.clone().filter(|n| !n.is_empty());

    ChatMessage {
        id: format!("{}-a-{}", exchange_id, idx),
        sender: Sender::Bot,
        content,
        timestamp: timestamp.to_string(),
        file_url: file_name
            .as_ref()
            .map(|name| format!("{}/media/protected/documents/{}", base_url, name)),
        file_type: file_name
            .as_ref()
            .and_then(|name| name.rsplit('.').next())
            .map(|ext| ext.to_lowercase()),
        file_name,
        doc_id: chunk.file_id.clone().or_else(|| chunk.doc_id.clone()),
        published_date: chunk.published_date.clone(),
        has_references: true,
        ..ChatMessage::default()
    }
}

/// Turn one backend exchange into the user message followed by bot messages.
///
/// `previous_user_message` is the locally shown message for the same
/// question; its recorded voice duration wins over the backend's.
pub fn transform_exchange(
    exchange: &ChatExchange,
    base_url: &str,
    previous_user_message: Option<&ChatMessage>,
) -> Vec<ChatMessage> {
    let base_url = base_url.trim_end_matches('/');
    let input = exchange.input_data.as_ref();
    let is_voice = input.and_then(|i| i.input_type.as_deref()) == Some("voice");

    let voice_url = if is_voice {
        input
            .and_then(|i| i.voice_file.as_deref())
            .filter(|f| !f.is_empty())
            .map(|file| format!("{}/{}", base_url, file.trim_start_matches('/')))
    } else {
        None
    };

    let timestamp = display_time(&exchange.created_at);
    let user = ChatMessage {
        id: format!("{}-q", exchange.id),
        sender: Sender::User,
        content: if is_voice {
            String::new()
        } else {
            exchange.question.clone().unwrap_or_default()
        },
        timestamp: timestamp.clone(),
        is_voice,
        voice_url,
        voice_duration: previous_user_message
            .and_then(|m| m.voice_duration)
            .filter(|d| *d > 0.0)
            .or_else(|| input.and_then(|i| i.voice_duration).filter(|d| *d > 0.0)),
        ..ChatMessage::default()
    };

    match &exchange.answer {
        Some(Answer::Chunks(chunks)) => {
            let mut messages = Vec::with_capacity(chunks.len() + 1);
            messages.push(user);
            messages.extend(chunks.iter().enumerate().map(|(idx, chunk)| {
                chunk_message(&exchange.id, idx, chunk, base_url, &timestamp)
            }));
            messages
        }
        Some(Answer::Text(text)) if !text.trim().is_empty() => {
            let bot = ChatMessage {
                id: format!("{}-a", exchange.id),
                sender: Sender::Bot,
                content: text.clone(),
                timestamp,
                has_references: text != NO_DOCUMENT_MESSAGE,
                ..ChatMessage::default()
            };
            vec![user, bot]
        }
        _ => vec![user],
    }
}

/// Transform a whole session history, in order.
pub fn transform_history(exchanges: &[ChatExchange], base_url: &str) -> Vec<ChatMessage> {
    exchanges
        .iter()
        .flat_map(|exchange| transform_exchange(exchange, base_url, None))
        .collect()
}

/// Pair every user message with the bot messages directly after it.
///
/// Bot messages with no preceding user message are dropped.
pub fn group_turns(messages: &[ChatMessage]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    for message in messages {
        if message.is_user() {
            turns.push(Turn {
                user: message.clone(),
                bots: Vec::new(),
            });
        } else if let Some(turn) = turns.last_mut() {
            turn.bots.push(message.clone());
        }
    }
    turns
}
