//! Grouping of chat sessions into recency buckets for the history list.

use std::fmt;

use chrono::{DateTime, TimeZone};

const DAY_MS: i64 = 86_400_000;

use super::parse_timestamp;
use crate::services::chats::ChatSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionGroup {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    Older,
    /// `created_at` could not be parsed.
    Unknown,
}

impl SessionGroup {
    pub fn label(&self) -> &'static str {
        match self {
            SessionGroup::Today => "Today",
            SessionGroup::Yesterday => "Yesterday",
            SessionGroup::Last7Days => "Last 7 Days",
            SessionGroup::Last30Days => "Last 30 Days",
            SessionGroup::Older => "Older",
            SessionGroup::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SessionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bucket for a session created at `created_at`, as seen at `now`.
///
/// Calendar days are compared in `now`'s timezone.
pub fn group_for<Tz: TimeZone>(created_at: &str, now: &DateTime<Tz>) -> SessionGroup {
    let Some(created) = parse_timestamp(created_at) else {
        return SessionGroup::Unknown;
    };
    let created = created.with_timezone(&now.timezone());

    let created_day = created.date_naive();
    let today = now.date_naive();
    if created_day == today {
        return SessionGroup::Today;
    }
    if today.pred_opt() == Some(created_day) {
        return SessionGroup::Yesterday;
    }

    let diff_days = (now.clone() - created).num_milliseconds().div_euclid(DAY_MS);
    if diff_days <= 7 {
        SessionGroup::Last7Days
    } else if diff_days <= 30 {
        SessionGroup::Last30Days
    } else {
        SessionGroup::Older
    }
}

/// Group sessions by recency, keeping the order in which groups first appear.
pub fn group_sessions<Tz: TimeZone>(
    sessions: &[ChatSession],
    now: &DateTime<Tz>,
) -> Vec<(SessionGroup, Vec<ChatSession>)> {
    let mut groups: Vec<(SessionGroup, Vec<ChatSession>)> = Vec::new();
    for session in sessions {
        let group = group_for(&session.created_at, now);
        match groups.iter_mut().find(|(g, _)| *g == group) {
            Some((_, members)) => members.push(session.clone()),
            None => groups.push((group, vec![session.clone()])),
        }
    }
    groups
}
