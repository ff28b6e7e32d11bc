//! Round API endpoints: current round view, word contribution, voting, history.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::aggregate::RoundView;
use crate::errors::AppError;
use crate::models::{
    AddWordRequest, CastVoteRequest, ListRoundsQuery, Round, RoundCursor, RoundFilter, RoundPage,
    RoundStatus, RoundSummary, ViewerQuery, VoteAck, Word, MAX_PAGE_LIMIT,
};
use crate::AppState;

/// Derive the display state of a round for an optional viewer.
async fn round_view(
    state: &AppState,
    round: &Round,
    viewer_id: Option<&str>,
) -> Result<RoundView, AppError> {
    let viewer = match viewer_id.map(str::trim).filter(|v| !v.is_empty()) {
        Some(viewer_id) => Some(state.repo.viewer_context(&round.id, viewer_id).await?),
        None => None,
    };
    Ok(RoundView::build(round, viewer.as_ref()))
}

/// GET /api/rounds/active - Get the round currently open for contribution.
pub async fn get_active_round(
    State(state): State<AppState>,
    Query(viewer): Query<ViewerQuery>,
) -> ApiResult<RoundView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let round = match state.repo.get_active_round().await {
        Ok(round) => round,
        Err(e) => return error(e, revision_id),
    };

    match round_view(&state, &round, viewer.viewer_id.as_deref()).await {
        Ok(view) => success(view, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/rounds/:id - Get a single round, active or historical.
pub async fn get_round(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(viewer): Query<ViewerQuery>,
) -> ApiResult<RoundView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let round = match state.repo.get_round(&id).await {
        Ok(Some(round)) => round,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Round {} not found", id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    match round_view(&state, &round, viewer.viewer_id.as_deref()).await {
        Ok(view) => success(view, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/rounds - List rounds, newest first, with cursor pagination.
pub async fn list_rounds(
    State(state): State<AppState>,
    Query(params): Query<ListRoundsQuery>,
) -> ApiResult<RoundPage> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match RoundStatus::parse_stored(raw) {
            Some(status) => Some(status),
            None => {
                return error(
                    AppError::BadRequest(format!("Unknown round status: {}", raw)),
                    revision_id,
                )
            }
        },
    };

    let cursor = match params.cursor.as_deref().filter(|c| !c.is_empty()) {
        None => None,
        Some(raw) => match RoundCursor::decode(raw) {
            Some(cursor) => Some(cursor),
            None => {
                return error(
                    AppError::BadRequest("Malformed cursor".to_string()),
                    revision_id,
                )
            }
        },
    };

    // Limit the page size
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    match state
        .repo
        .list_rounds(RoundFilter { status }, cursor.as_ref(), limit)
        .await
    {
        Ok(page) => success(page, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/rounds/previous - Closed rounds, most endorsed songs first.
pub async fn list_previous_rounds(State(state): State<AppState>) -> ApiResult<Vec<RoundSummary>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.previous_rounds_by_votes().await {
        Ok(rounds) => success(rounds, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/rounds/:id/words - Contribute a word.
pub async fn add_word(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
    Json(request): Json<AddWordRequest>,
) -> ApiResult<Word> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .add_word(&round_id, &request.text, request.contributor_id.as_deref())
        .await
    {
        Ok(word) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(word, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/rounds/:id/words/:word_id/votes - Vote for a word.
pub async fn cast_vote(
    State(state): State<AppState>,
    Path((round_id, word_id)): Path<(String, String)>,
    Json(request): Json<CastVoteRequest>,
) -> ApiResult<VoteAck> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .cast_vote(&round_id, &word_id, &request.voter_id)
        .await
    {
        Ok(ack) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(ack, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/rounds/:id/votes - Vote for a closed round's generated songs.
pub async fn cast_song_vote(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
    Json(request): Json<CastVoteRequest>,
) -> ApiResult<VoteAck> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .cast_song_vote(&round_id, &request.voter_id)
        .await
    {
        Ok(ack) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(ack, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
