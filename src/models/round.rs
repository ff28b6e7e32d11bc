//! Round model: one contribution and voting period.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::Word;

/// Lifecycle state of a round. Only the admin application moves a round
/// from `Active` to `Closed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Active,
    #[serde(alias = "completed")]
    Closed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Active => "active",
            RoundStatus::Closed => "closed",
        }
    }

    /// Parse a stored status. Older admin builds write `completed`.
    pub fn parse_stored(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RoundStatus::Active),
            "closed" | "completed" => Some(RoundStatus::Closed),
            _ => None,
        }
    }
}

/// One song produced by the generation process for a closed round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSong {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "audio_url")]
    pub audio_url: Option<String>,
}

/// A full round document, including its words.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: String,
    pub round_number: i64,
    pub prompt: String,
    pub character_limit: i64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub words: Vec<Word>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub songs: Vec<GeneratedSong>,
    pub song_vote_count: i64,
    /// Internal version, bumped on every write touching the round
    #[serde(default)]
    pub version: i64,
}

/// Lightweight round listing entry for history browsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub id: String,
    pub round_number: i64,
    pub prompt: String,
    pub character_limit: i64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub word_count: i64,
    pub used_chars: i64,
    pub has_song: bool,
    pub song_vote_count: i64,
}

/// Filter for round listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundFilter {
    pub status: Option<RoundStatus>,
}

/// Position in a round listing: the last row of the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundCursor {
    pub created_at: String,
    pub id: String,
}

impl RoundCursor {
    const SEPARATOR: char = '|';

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.created_at, Self::SEPARATOR, self.id)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (created_at, id) = raw.split_once(Self::SEPARATOR)?;
        DateTime::parse_from_rfc3339(created_at).ok()?;
        if id.is_empty() {
            return None;
        }
        Some(Self {
            created_at: created_at.to_string(),
            id: id.to_string(),
        })
    }
}

/// One page of a round listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPage {
    pub rounds: Vec<RoundSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Query parameters for round listings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRoundsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

pub const MAX_PAGE_LIMIT: u32 = 100;

fn default_page_limit() -> u32 {
    20
}

/// Query parameters identifying who is looking at a round.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    #[serde(default)]
    pub viewer_id: Option<String>,
}

/// Canonical stored form of a timestamp: RFC 3339, UTC, microseconds.
/// Fixed width so that text ordering matches time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accepts_legacy_completed() {
        let parse = RoundStatus::parse_stored;
        assert_eq!(parse("completed"), Some(RoundStatus::Closed));
        assert_eq!(parse("active"), Some(RoundStatus::Active));
        assert_eq!(parse("archived"), None);

        let status: RoundStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, RoundStatus::Closed);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"closed\"");
    }

    #[test]
    fn test_cursor_decode_rejects_garbage() {
        let cursor = RoundCursor {
            created_at: "2024-05-01T10:00:00.000000Z".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(RoundCursor::decode(&cursor.encode()), Some(cursor));
        assert_eq!(RoundCursor::decode("nonsense"), None);
        assert_eq!(RoundCursor::decode("yesterday|abc"), None);
        assert_eq!(RoundCursor::decode("2024-05-01T10:00:00.000000Z|"), None);
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
        let later = parse_timestamp("2024-05-01T10:00:00.5Z").unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(format_timestamp(&earlier), "2024-05-01T10:00:00.000000Z");
    }
}
