use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column labels of the record table, in render order.
pub const COLUMNS: [&str; 5] = ["ID", "Bloom", "First Name", "Song", "Year"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub display_name: String,
    pub identity_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_in_at: Option<DateTime<Utc>>,
}

impl SessionInfo {
    pub fn new(display_name: impl Into<String>, identity_key: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            identity_key: identity_key.into(),
            email: None,
            signed_in_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    SignedOut,
    SignedIn(SessionInfo),
}

impl Session {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn(_))
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        match self {
            Self::SignedIn(info) => Some(info),
            Self::SignedOut => None,
        }
    }
}

impl From<Option<SessionInfo>> for Session {
    fn from(value: Option<SessionInfo>) -> Self {
        value.map_or(Self::SignedOut, Self::SignedIn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    SignedIn,
    SignedOut,
}

impl Panel {
    pub fn for_session(session: &Session) -> Self {
        if session.is_signed_in() {
            Self::SignedIn
        } else {
            Self::SignedOut
        }
    }
}

/// One document of the remote collection. Fields are not validated; a
/// missing field renders as an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub bloom: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub song: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

impl Record {
    pub fn to_row(&self) -> TableRow {
        let cell = |value: &Option<String>| value.clone().unwrap_or_default();
        TableRow([
            self.id.clone(),
            cell(&self.bloom),
            cell(&self.first_name),
            cell(&self.song),
            cell(&self.year),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow(pub [String; 5]);

impl TableRow {
    pub fn cells(&self) -> &[String; 5] {
        &self.0
    }
}

/// Everything a view shows, derived from the latest session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub panel: Panel,
    pub greeting: Option<String>,
    pub rows: Vec<TableRow>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            panel: Panel::SignedOut,
            greeting: None,
            rows: Vec::new(),
        }
    }
}

pub fn welcome_greeting(display_name: &str) -> String {
    format!("Welcome, {display_name}!")
}
