use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NO_SUBJECT: &str = "(No Subject)";
pub const UNKNOWN_ADDRESS: &str = "Unknown";
pub const INBOX: &str = "INBOX";

/// Raw RFC 5322 payload as handed out by the mailbox.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub uid: u32,
    /// Server-side arrival time (IMAP INTERNALDATE), when the server sent one.
    pub internal_date: Option<DateTime<Utc>>,
    pub source: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: String,
    pub received_at: DateTime<Utc>,
    pub account_id: String,
    pub folder: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Interested,
    #[serde(rename = "Meeting Booked")]
    MeetingBooked,
    #[serde(rename = "Not Interested")]
    NotInterested,
    Spam,
    #[serde(rename = "Out of Office")]
    OutOfOffice,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Interested,
        Category::MeetingBooked,
        Category::NotInterested,
        Category::Spam,
        Category::OutOfOffice,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interested => "Interested",
            Self::MeetingBooked => "Meeting Booked",
            Self::NotInterested => "Not Interested",
            Self::Spam => "Spam",
            Self::OutOfOffice => "Out of Office",
            Self::Other => "Other",
        }
    }

    /// Exact, case-insensitive lookup of a display name.
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub message: NormalizedMessage,
    pub category: Category,
}

/// Durable form of a classified message, keyed by its stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "date")]
    pub received_at: DateTime<Utc>,
    #[serde(rename = "aiCategory")]
    pub category: Category,
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub folder: String,
}

impl IndexedRecord {
    pub fn from_classified(id: String, classified: &ClassifiedMessage) -> Self {
        let m = &classified.message;
        Self {
            id,
            subject: m.subject.clone(),
            body: m.body.clone(),
            from: m.from.clone(),
            to: m.to.clone(),
            received_at: m.received_at,
            category: classified.category,
            account_id: m.account_id.clone(),
            folder: m.folder.clone(),
        }
    }
}
