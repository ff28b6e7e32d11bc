//! Store client for rounds, words and votes.
//!
//! Every guard (budget, round status, one vote per voter) is evaluated inside
//! the store so that concurrent requests and other client instances cannot
//! slip past it.

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::aggregate::ViewerContext;
use crate::errors::AppError;
use crate::models::{
    format_timestamp, parse_timestamp, GeneratedSong, RevisionInfo, Round, RoundCursor,
    RoundFilter, RoundPage, RoundStatus, RoundSummary, VoteAck, Word,
};

const ROUND_COLUMNS: &str = r#"
    r.id, r.round_number, r.prompt, r.character_limit, r.status, r.created_at,
    r.generated_songs, r.version,
    (SELECT COUNT(*) FROM round_votes v WHERE v.round_id = r.id) AS song_vote_count
"#;

const SUMMARY_COLUMNS: &str = r#"
    r.id, r.round_number, r.prompt, r.character_limit, r.status, r.created_at,
    r.generated_songs,
    (SELECT COUNT(*) FROM words w WHERE w.round_id = r.id) AS word_count,
    (SELECT COALESCE(SUM(length(w.text)), 0) FROM words w WHERE w.round_id = r.id) AS used_chars,
    (SELECT COUNT(*) FROM round_votes v WHERE v.round_id = r.id) AS song_vote_count
"#;

/// Stored statuses that count as closed.
const CLOSED_STATUS_SQL: &str = "r.status IN ('closed', 'completed')";

/// Store client for all round data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== REVISION ====================

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row =
            sqlx::query("SELECT schema_version, revision_id, generated_at FROM meta WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(RevisionInfo {
            schema_version: row.get("schema_version"),
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    // ==================== ROUND READS ====================

    /// Fetch the round currently open for contribution.
    ///
    /// This is always a fresh query; another client or the admin application
    /// may have switched rounds since the last call.
    pub async fn get_active_round(&self) -> Result<Round, AppError> {
        retry_transient("get_active_round", move || self.try_get_active_round()).await
    }

    async fn try_get_active_round(&self) -> Result<Round, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rounds r WHERE r.status = 'active' ORDER BY r.created_at DESC, r.id DESC LIMIT 2",
            ROUND_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let Some(row) = rows.first() else {
            return Err(AppError::NotFound("No round currently open".to_string()));
        };
        if rows.len() > 1 {
            tracing::warn!("More than one active round in the store; using the newest");
        }

        self.load_round(row).await
    }

    /// Fetch any round by ID.
    pub async fn get_round(&self, id: &str) -> Result<Option<Round>, AppError> {
        retry_transient("get_round", move || self.try_get_round(id)).await
    }

    async fn try_get_round(&self, id: &str) -> Result<Option<Round>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM rounds r WHERE r.id = ?",
            ROUND_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_round(&row).await?)),
            None => Ok(None),
        }
    }

    async fn load_round(&self, row: &SqliteRow) -> Result<Round, AppError> {
        let id: String = row.get("id");
        let word_rows = sqlx::query(
            "SELECT id, round_id, text, contributor_id, vote_count, created_at FROM words WHERE round_id = ? ORDER BY created_at, rowid",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let words = word_rows
            .iter()
            .map(word_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        round_from_row(row, words)
    }

    /// List round summaries, newest first, one page at a time.
    ///
    /// Pass the `next_cursor` of a page to get the following one; pass `None`
    /// to start over from the newest round.
    pub async fn list_rounds(
        &self,
        filter: RoundFilter,
        cursor: Option<&RoundCursor>,
        limit: u32,
    ) -> Result<RoundPage, AppError> {
        retry_transient("list_rounds", move || {
            self.try_list_rounds(filter, cursor, limit)
        })
        .await
    }

    async fn try_list_rounds(
        &self,
        filter: RoundFilter,
        cursor: Option<&RoundCursor>,
        limit: u32,
    ) -> Result<RoundPage, AppError> {
        let status_clause = match filter.status {
            None => "1 = 1".to_string(),
            Some(RoundStatus::Active) => "r.status = 'active'".to_string(),
            Some(RoundStatus::Closed) => CLOSED_STATUS_SQL.to_string(),
        };
        let limit = limit.max(1);

        let cursor_created_at = cursor.map(|c| c.created_at.as_str());
        let cursor_id = cursor.map(|c| c.id.as_str());

        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM rounds r
               WHERE {}
                 AND (? IS NULL OR r.created_at < ? OR (r.created_at = ? AND r.id < ?))
               ORDER BY r.created_at DESC, r.id DESC
               LIMIT ?"#,
            SUMMARY_COLUMNS, status_clause
        ))
        .bind(cursor_created_at)
        .bind(cursor_created_at)
        .bind(cursor_created_at)
        .bind(cursor_id)
        .bind(i64::from(limit) + 1)
        .fetch_all(&self.pool)
        .await?;

        let page_len = rows.len().min(limit as usize);
        let rounds = rows[..page_len]
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        // The keyset filter compares stored text, so the cursor must carry the
        // stored `created_at` verbatim rather than a reformatted timestamp.
        let next_cursor = if rows.len() > page_len {
            rows[..page_len].last().map(|last| {
                RoundCursor {
                    created_at: last.get("created_at"),
                    id: last.get("id"),
                }
                .encode()
            })
        } else {
            None
        };

        Ok(RoundPage {
            rounds,
            next_cursor,
        })
    }

    /// Closed rounds ordered by song votes, then by most recent round number.
    pub async fn previous_rounds_by_votes(&self) -> Result<Vec<RoundSummary>, AppError> {
        retry_transient("previous_rounds_by_votes", move || {
            self.try_previous_rounds_by_votes()
        })
        .await
    }

    async fn try_previous_rounds_by_votes(&self) -> Result<Vec<RoundSummary>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rounds r WHERE {} ORDER BY song_vote_count DESC, r.round_number DESC",
            SUMMARY_COLUMNS, CLOSED_STATUS_SQL
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    /// What a viewer has already done in a round.
    pub async fn viewer_context(
        &self,
        round_id: &str,
        viewer_id: &str,
    ) -> Result<ViewerContext, AppError> {
        retry_transient("viewer_context", move || {
            self.try_viewer_context(round_id, viewer_id)
        })
        .await
    }

    async fn try_viewer_context(
        &self,
        round_id: &str,
        viewer_id: &str,
    ) -> Result<ViewerContext, AppError> {
        let word_ids: Vec<String> = sqlx::query_scalar(
            "SELECT word_id FROM word_votes WHERE round_id = ? AND voter_id = ?",
        )
        .bind(round_id)
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        let voted_song: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM round_votes WHERE round_id = ? AND voter_id = ?",
        )
        .bind(round_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ViewerContext {
            viewer_id: viewer_id.to_string(),
            voted_word_ids: word_ids.into_iter().collect(),
            voted_song: voted_song > 0,
        })
    }

    // ==================== WORDS ====================

    /// Contribute a word to an active round.
    ///
    /// The budget check and the insert are a single statement, so two
    /// additions racing for the last characters cannot both succeed.
    pub async fn add_word(
        &self,
        round_id: &str,
        text: &str,
        contributor_id: Option<&str>,
    ) -> Result<Word, AppError> {
        let text = validate_word(text)?;
        let contributor_id = contributor_id.map(str::trim).filter(|c| !c.is_empty());

        retry_transient("add_word", move || {
            self.try_add_word(round_id, text, contributor_id)
        })
        .await
    }

    async fn try_add_word(
        &self,
        round_id: &str,
        text: &str,
        contributor_id: Option<&str>,
    ) -> Result<Word, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let requested = text.chars().count();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"INSERT INTO words (id, round_id, text, contributor_id, vote_count, created_at)
               SELECT ?, r.id, ?, ?, 0, ?
               FROM rounds r
               WHERE r.id = ? AND r.status = 'active'
                 AND r.character_limit
                     - (SELECT COALESCE(SUM(length(w.text)), 0) FROM words w WHERE w.round_id = r.id)
                     >= ?"#,
        )
        .bind(&id)
        .bind(text)
        .bind(contributor_id)
        .bind(format_timestamp(&now))
        .bind(round_id)
        .bind(requested as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.explain_rejected_word(round_id, requested).await?);
        }

        sqlx::query("UPDATE rounds SET version = version + 1 WHERE id = ?")
            .bind(round_id)
            .execute(&mut *tx)
            .await?;
        increment_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(round_id, word_id = %id, chars = requested, "Word added");

        Ok(Word {
            id,
            round_id: round_id.to_string(),
            text: text.to_string(),
            contributor_id: contributor_id.map(str::to_string),
            vote_count: 0,
            created_at: parse_timestamp(&format_timestamp(&now)).unwrap_or(now),
        })
    }

    /// Work out why a guarded insert matched no round.
    async fn explain_rejected_word(
        &self,
        round_id: &str,
        requested: usize,
    ) -> Result<AppError, AppError> {
        let row = sqlx::query(
            r#"SELECT r.status, r.character_limit,
                      (SELECT COALESCE(SUM(length(w.text)), 0) FROM words w WHERE w.round_id = r.id) AS used_chars
               FROM rounds r WHERE r.id = ?"#,
        )
        .bind(round_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(AppError::NotFound(format!("Round {} not found", round_id)));
        };

        let status: String = row.get("status");
        if status != RoundStatus::Active.as_str() {
            return Ok(AppError::RoundClosed(format!(
                "Round {} is closed for new words",
                round_id
            )));
        }

        let limit: i64 = row.get("character_limit");
        let used: i64 = row.get("used_chars");
        Ok(AppError::BudgetExceeded {
            remaining: usize::try_from(limit - used).unwrap_or(0),
            requested,
        })
    }

    // ==================== VOTES ====================

    /// Record a voter's endorsement of a word in the active round.
    pub async fn cast_vote(
        &self,
        round_id: &str,
        word_id: &str,
        voter_id: &str,
    ) -> Result<VoteAck, AppError> {
        let voter_id = validate_voter(voter_id)?;
        retry_transient("cast_vote", move || {
            self.try_cast_vote(round_id, word_id, voter_id)
        })
        .await
    }

    async fn try_cast_vote(
        &self,
        round_id: &str,
        word_id: &str,
        voter_id: &str,
    ) -> Result<VoteAck, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // The primary key on (word_id, voter_id) is the dedup check.
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO word_votes (round_id, word_id, voter_id, created_at)
               SELECT w.round_id, w.id, ?, ?
               FROM words w JOIN rounds r ON r.id = w.round_id
               WHERE w.id = ? AND w.round_id = ? AND r.status = 'active'"#,
        )
        .bind(voter_id)
        .bind(format_timestamp(&now))
        .bind(word_id)
        .bind(round_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.explain_rejected_vote(round_id, word_id).await?);
        }

        sqlx::query("UPDATE words SET vote_count = vote_count + 1 WHERE id = ?")
            .bind(word_id)
            .execute(&mut *tx)
            .await?;
        let vote_count: i64 = sqlx::query_scalar("SELECT vote_count FROM words WHERE id = ?")
            .bind(word_id)
            .fetch_one(&mut *tx)
            .await?;
        increment_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(round_id, word_id, vote_count, "Word vote recorded");

        Ok(VoteAck {
            round_id: round_id.to_string(),
            word_id: Some(word_id.to_string()),
            voter_id: voter_id.to_string(),
            vote_count,
            created_at: now,
        })
    }

    async fn explain_rejected_vote(
        &self,
        round_id: &str,
        word_id: &str,
    ) -> Result<AppError, AppError> {
        let row = sqlx::query(
            "SELECT r.status FROM words w JOIN rounds r ON r.id = w.round_id WHERE w.id = ? AND w.round_id = ?",
        )
        .bind(word_id)
        .bind(round_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(AppError::NotFound(format!(
                "Word {} not found in round {}",
                word_id, round_id
            )));
        };

        let status: String = row.get("status");
        if status != RoundStatus::Active.as_str() {
            return Ok(AppError::RoundClosed(format!(
                "Voting on words in round {} is closed",
                round_id
            )));
        }

        Ok(AppError::DuplicateVote(
            "You already voted for this word".to_string(),
        ))
    }

    /// Record a voter's endorsement of a closed round's generated songs.
    pub async fn cast_song_vote(
        &self,
        round_id: &str,
        voter_id: &str,
    ) -> Result<VoteAck, AppError> {
        let voter_id = validate_voter(voter_id)?;
        retry_transient("cast_song_vote", move || {
            self.try_cast_song_vote(round_id, voter_id)
        })
        .await
    }

    async fn try_cast_song_vote(
        &self,
        round_id: &str,
        voter_id: &str,
    ) -> Result<VoteAck, AppError> {
        let round = self
            .try_get_round(round_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Round {} not found", round_id)))?;

        if round.status == RoundStatus::Active {
            return Err(AppError::InvalidInput(
                "Song voting opens once the round is closed".to_string(),
            ));
        }
        if round.songs.is_empty() {
            return Err(AppError::InvalidInput(
                "Round has no generated song to vote on".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO round_votes (round_id, voter_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(round_id)
        .bind(voter_id)
        .bind(format_timestamp(&now))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::DuplicateVote(
                "You already voted for this round".to_string(),
            ));
        }

        let vote_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM round_votes WHERE round_id = ?")
                .bind(round_id)
                .fetch_one(&mut *tx)
                .await?;
        increment_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(round_id, vote_count, "Song vote recorded");

        Ok(VoteAck {
            round_id: round_id.to_string(),
            word_id: None,
            voter_id: voter_id.to_string(),
            vote_count,
            created_at: now,
        })
    }
}

/// Run a store operation, retrying it once if it failed transiently.
async fn retry_transient<T, F, Fut>(operation: &str, mut attempt: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    match attempt().await {
        Err(err) if err.is_transient() => {
            tracing::warn!("{} failed transiently, retrying once: {}", operation, err);
            attempt().await
        }
        other => other,
    }
}

/// Increment the revision ID inside the caller's transaction.
async fn increment_revision(conn: &mut SqliteConnection) -> Result<(), AppError> {
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Normalize and check a contributed word.
fn validate_word(text: &str) -> Result<&str, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::InvalidInput("Word must not be empty".to_string()));
    }
    if text.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(
            "Word must not contain control characters".to_string(),
        ));
    }
    Ok(text)
}

fn validate_voter(voter_id: &str) -> Result<&str, AppError> {
    let voter_id = voter_id.trim();
    if voter_id.is_empty() {
        return Err(AppError::InvalidInput("Voter ID is required".to_string()));
    }
    Ok(voter_id)
}

// Helper functions for row conversion

fn timestamp_from_row(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, AppError> {
    let raw: String = row.get(column);
    parse_timestamp(&raw)
        .ok_or_else(|| AppError::Database(format!("Malformed timestamp in {}: {:?}", column, raw)))
}

fn status_from_row(row: &SqliteRow) -> Result<RoundStatus, AppError> {
    let raw: String = row.get("status");
    RoundStatus::parse_stored(&raw)
        .ok_or_else(|| AppError::Database(format!("Unknown round status: {:?}", raw)))
}

/// Songs are written by the generation process, either as a list or as a
/// single song object.
fn parse_songs(raw: Option<String>) -> Vec<GeneratedSong> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Vec::new();
    };
    if let Ok(songs) = serde_json::from_str::<Vec<GeneratedSong>>(&raw) {
        return songs;
    }
    match serde_json::from_str::<GeneratedSong>(&raw) {
        Ok(song) => vec![song],
        Err(e) => {
            tracing::warn!("Ignoring unreadable generated songs: {}", e);
            Vec::new()
        }
    }
}

fn word_from_row(row: &SqliteRow) -> Result<Word, AppError> {
    Ok(Word {
        id: row.get("id"),
        round_id: row.get("round_id"),
        text: row.get("text"),
        contributor_id: row.get("contributor_id"),
        vote_count: row.get("vote_count"),
        created_at: timestamp_from_row(row, "created_at")?,
    })
}

fn round_from_row(row: &SqliteRow, words: Vec<Word>) -> Result<Round, AppError> {
    Ok(Round {
        id: row.get("id"),
        round_number: row.get("round_number"),
        prompt: row.get("prompt"),
        character_limit: row.get("character_limit"),
        status: status_from_row(row)?,
        created_at: timestamp_from_row(row, "created_at")?,
        words,
        songs: parse_songs(row.get("generated_songs")),
        song_vote_count: row.get("song_vote_count"),
        version: row.get("version"),
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<RoundSummary, AppError> {
    Ok(RoundSummary {
        id: row.get("id"),
        round_number: row.get("round_number"),
        prompt: row.get("prompt"),
        character_limit: row.get("character_limit"),
        status: status_from_row(row)?,
        created_at: timestamp_from_row(row, "created_at")?,
        word_count: row.get("word_count"),
        used_chars: row.get("used_chars"),
        has_song: !parse_songs(row.get("generated_songs")).is_empty(),
        song_vote_count: row.get("song_vote_count"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_word_trims_and_rejects_empty() {
        assert_eq!(validate_word("  flow ").unwrap(), "flow");
        assert!(matches!(
            validate_word("   "),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_word("a\tb"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_songs_accepts_list_or_single() {
        let list = parse_songs(Some(
            r#"[{"lyric":"yo","audio_url":"http://a"},{"lyric":"hey"}]"#.to_string(),
        ));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].audio_url.as_deref(), Some("http://a"));

        let single = parse_songs(Some(r#"{"lyric":"solo"}"#.to_string()));
        assert_eq!(single[0].lyric.as_deref(), Some("solo"));

        assert!(parse_songs(None).is_empty());
        assert!(parse_songs(Some("not json".to_string())).is_empty());
    }

    #[tokio::test]
    async fn test_retry_transient_retries_once() {
        let mut calls = 0;
        let result: Result<(), AppError> = retry_transient("op", || {
            calls += 1;
            async { Err(AppError::Transient("busy".to_string())) }
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls, 2);

        let mut calls = 0;
        let result: Result<(), AppError> = retry_transient("op", || {
            calls += 1;
            async { Err(AppError::DuplicateVote("again".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
