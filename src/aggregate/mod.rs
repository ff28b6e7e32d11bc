//! Round aggregation.
//!
//! Pure derivation of display state from a round document. Nothing in here
//! touches the store; callers fetch the round first.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{GeneratedSong, Round, RoundStatus, Word};

/// Total characters consumed by the round's words.
pub fn used_chars(round: &Round) -> usize {
    round.words.iter().map(Word::char_len).sum()
}

/// Characters still available in the round, never negative.
///
/// A round whose words already exceed the limit was written by someone who
/// skipped the budget check; that is logged and reported as zero.
pub fn remaining_budget(round: &Round) -> usize {
    let limit = usize::try_from(round.character_limit).unwrap_or(0);
    let used = used_chars(round);
    if used > limit {
        tracing::warn!(
            round_id = %round.id,
            used,
            limit,
            "Round words exceed the character limit; clamping remaining budget to zero"
        );
        return 0;
    }
    limit - used
}

/// Words sorted for display: most votes first, earlier words first on ties.
pub fn ranked_words(round: &Round) -> Vec<&Word> {
    let mut words: Vec<&Word> = round.words.iter().collect();
    // Stable, so identical (votes, created_at) keep document order.
    words.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    words
}

pub fn is_open_for_contribution(round: &Round) -> bool {
    round.status == RoundStatus::Active && remaining_budget(round) > 0
}

/// The prompt handed to song generation: the round's base prompt followed by
/// its ranked words.
pub fn prompt_text(round: &Round) -> String {
    let words: Vec<&str> = ranked_words(round)
        .into_iter()
        .map(|w| w.text.as_str())
        .collect();
    if words.is_empty() {
        return round.prompt.clone();
    }
    format!("{}{}", round.prompt, words.join(" "))
}

/// What the store knows about one viewer's past actions in a round.
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub viewer_id: String,
    pub voted_word_ids: HashSet<String>,
    pub voted_song: bool,
}

/// A word as displayed to a particular viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordView {
    #[serde(flatten)]
    pub word: Word,
    pub voted_by_viewer: bool,
    pub contributed_by_viewer: bool,
}

/// Display state for a round.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub id: String,
    pub round_number: i64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub prompt: String,
    pub full_prompt: String,
    pub character_limit: i64,
    pub used_chars: usize,
    pub remaining_chars: usize,
    /// Fraction of the budget used, in `0.0..=1.0`
    pub progress: f64,
    pub open_for_contribution: bool,
    pub words: Vec<WordView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub songs: Vec<GeneratedSong>,
    pub song_vote_count: i64,
    pub viewer_voted_song: bool,
}

impl RoundView {
    pub fn build(round: &Round, viewer: Option<&ViewerContext>) -> Self {
        let used = used_chars(round);
        let remaining = remaining_budget(round);
        let progress = if round.character_limit > 0 {
            (used as f64 / round.character_limit as f64).min(1.0)
        } else {
            1.0
        };

        let words = ranked_words(round)
            .into_iter()
            .map(|word| {
                let (voted, contributed) = match viewer {
                    Some(v) => (
                        v.voted_word_ids.contains(&word.id),
                        word.contributor_id.as_deref() == Some(v.viewer_id.as_str()),
                    ),
                    None => (false, false),
                };
                WordView {
                    word: word.clone(),
                    voted_by_viewer: voted,
                    contributed_by_viewer: contributed,
                }
            })
            .collect();

        Self {
            id: round.id.clone(),
            round_number: round.round_number,
            status: round.status,
            created_at: round.created_at,
            prompt: round.prompt.clone(),
            full_prompt: prompt_text(round),
            character_limit: round.character_limit,
            used_chars: used,
            remaining_chars: remaining,
            progress,
            open_for_contribution: is_open_for_contribution(round),
            words,
            songs: round.songs.clone(),
            song_vote_count: round.song_vote_count,
            viewer_voted_song: viewer.is_some_and(|v| v.voted_song),
        }
    }
}
