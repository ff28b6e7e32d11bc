//! Lazy, restartable walk over round history.

use crate::errors::AppError;
use crate::models::{RoundCursor, RoundFilter, RoundSummary};

use super::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Start,
    After(RoundCursor),
    Exhausted,
}

/// Pages through round summaries, newest first, fetching only on demand.
///
/// Each call to [`RoundHistory::next_page`] queries the store, so rounds the
/// admin application closes mid-walk show up on a restart.
#[derive(Clone)]
pub struct RoundHistory {
    repo: Repository,
    filter: RoundFilter,
    page_size: u32,
    position: Position,
}

impl RoundHistory {
    pub fn new(repo: Repository, filter: RoundFilter, page_size: u32) -> Self {
        Self {
            repo,
            filter,
            page_size: page_size.max(1),
            position: Position::Start,
        }
    }

    /// Fetch the next page, or `None` once the history is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RoundSummary>>, AppError> {
        let cursor = match &self.position {
            Position::Exhausted => return Ok(None),
            Position::Start => None,
            Position::After(cursor) => Some(cursor.clone()),
        };

        let page = self
            .repo
            .list_rounds(self.filter, cursor.as_ref(), self.page_size)
            .await?;

        self.position = match page.next_cursor.as_deref().and_then(RoundCursor::decode) {
            Some(next) => Position::After(next),
            None => Position::Exhausted,
        };

        if page.rounds.is_empty() {
            return Ok(None);
        }
        Ok(Some(page.rounds))
    }

    /// Go back to the newest round.
    pub fn restart(&mut self) {
        self.position = Position::Start;
    }
}
