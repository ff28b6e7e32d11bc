//! Word model: a token contributed to a round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A word contributed to a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: String,
    pub round_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor_id: Option<String>,
    pub vote_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Word {
    /// Length counted against the round budget, in Unicode scalar values.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Request body for contributing a word.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddWordRequest {
    pub text: String,
    #[serde(default)]
    pub contributor_id: Option<String>,
}
