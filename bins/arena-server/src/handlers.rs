// HTTP route handlers for the arena API

use arena_common::types::{NewSubmission, SubmissionStatus};
use arena_judge::{leaderboard, metrics as judge_metrics};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 100;
const ANONYMOUS_USER: &str = "anonymous";
const DEFAULT_STUB_LANGUAGE: &str = "python";

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        judge_metrics::gather(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageParams {
    /// (offset, limit); missing or non-positive values fall back to page 1 of 100
    fn window(&self) -> (usize, usize) {
        let parse = |v: &Option<String>| {
            v.as_deref()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|n| *n >= 1)
                .map(|n| n as usize)
        };
        let page = parse(&self.page).unwrap_or(1);
        let limit = parse(&self.limit).unwrap_or(DEFAULT_PAGE_SIZE);
        (page.saturating_sub(1).saturating_mul(limit), limit)
    }
}

/// GET /api/problems?page&limit
pub async fn list_problems(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Response {
    let (offset, limit) = params.window();
    match state.store.list_problems(offset, limit).await {
        Ok(problems) => (StatusCode::OK, Json(problems)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list problems");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not fetch problems")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StubParams {
    pub language: Option<String>,
}

/// GET /api/problems/:id?language
pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<StubParams>,
) -> Response {
    let Ok(problem_id) = id.parse() else {
        return error_response(StatusCode::NOT_FOUND, "Problem not found");
    };

    match state.store.get_problem(problem_id, true).await {
        Ok(Some(problem)) => {
            let language = params
                .language
                .as_deref()
                .filter(|l| !l.is_empty())
                .unwrap_or(DEFAULT_STUB_LANGUAGE);
            let code_stub = problem.code_stub(language).to_string();
            (
                StatusCode::OK,
                Json(json!({ "problem": problem, "codeStub": code_stub })),
            )
                .into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Problem not found"),
        Err(e) => {
            error!(problem_id, error = %e, "Failed to load problem");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not fetch problem")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: u64,
    pub status: SubmissionStatus,
}

/// POST /api/problems/:id/submit
///
/// Persists a pending submission and queues its id. Waits while the queue
/// is full.
pub async fn submit_solution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let problem = match id.parse() {
        Ok(problem_id) => state.store.get_problem(problem_id, false).await,
        Err(_) => Ok(None),
    };
    let problem = match problem {
        Ok(Some(problem)) => problem,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Problem not found"),
        Err(e) => {
            error!(error = %e, "Failed to load problem");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not fetch problem");
        }
    };

    let user_id = headers
        .get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_USER)
        .to_string();

    let payload: SubmitRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected submission payload");
            return error_response(StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    let fields = NewSubmission {
        problem_id: problem.id,
        user_id,
        code: payload.code,
        language: payload.language,
        competition_id: state.default_competition.clone(),
    };
    let language = fields.language.clone();

    let submission_id = match state.store.create_submission(fields).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "Failed to save submission");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not save submission");
        }
    };

    if let Err(e) = state.queue.enqueue(submission_id).await {
        // Stays pending in the store; nothing will pick it up in this process
        error!(submission_id, error = %e, "Failed to queue submission");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down");
    }

    info!(
        submission_id,
        problem_id = problem.id,
        language = %language,
        "Submission queued"
    );

    (
        StatusCode::OK,
        Json(SubmitResponse {
            submission_id,
            status: SubmissionStatus::Pending,
        }),
    )
        .into_response()
}

/// GET /api/check/:id - poll a submission
pub async fn check_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(submission_id) = id.parse() else {
        return error_response(StatusCode::NOT_FOUND, "Submission not found");
    };

    match state.store.get_submission(submission_id).await {
        Ok(Some(submission)) => (StatusCode::OK, Json(submission)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Submission not found"),
        Err(e) => {
            error!(submission_id, error = %e, "Failed to fetch submission");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not fetch submission")
        }
    }
}

/// GET /api/leaderboard/:competition_id
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<String>,
) -> Response {
    match leaderboard::leaderboard(state.store.as_ref(), &competition_id).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => {
            error!(competition_id = %competition_id, error = %e, "Failed to compute leaderboard");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching leaderboard")
        }
    }
}
