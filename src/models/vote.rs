//! Vote records and acknowledgements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for casting a vote (on a word or on a round's songs).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub voter_id: String,
}

/// Acknowledgement of a recorded vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteAck {
    pub round_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_id: Option<String>,
    pub voter_id: String,
    /// Vote total of the target after this vote
    pub vote_count: i64,
    pub created_at: DateTime<Utc>,
}
