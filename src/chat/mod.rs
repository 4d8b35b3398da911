//! Client-side chat bookkeeping: message transformation, history grouping
//! and session search.

pub mod history;
pub mod search;
pub mod transform;

pub use history::{group_sessions, SessionGroup};
pub use search::ChatSearch;
pub use transform::{group_turns, transform_exchange, transform_history, ChatMessage, Sender, Turn};

pub(crate) use crate::api::types::parse_timestamp;
