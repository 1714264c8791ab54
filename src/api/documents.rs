//! Handlers operating on documents uploaded during the session.

use super::{ApiError, AppState, Payload, Scalar, session_id};
use crate::index::{DeleteError, delete_index_dir};
use crate::session::FlashLevel;
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

const DEFAULT_QUIZ_QUESTIONS: usize = 5;
const MAX_QUIZ_QUESTIONS: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub(super) struct SummaryQuery {
    #[serde(default)]
    filename: String,
}

/// Cached summary of a document; empty when unknown or not yet summarized.
pub(super) async fn summary(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<SummaryQuery>,
) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let summary = state
        .sessions
        .snapshot(&sid)
        .document(&query.filename)
        .and_then(|entry| entry.summary.clone())
        .unwrap_or_default();
    (jar, Json(json!({ "ok": true, "summary": summary })))
}

#[derive(Serialize)]
struct DocumentListing {
    filename: String,
    has_summary: bool,
}

/// Documents registered in the session.
pub(super) async fn list(State(state): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let documents: Vec<DocumentListing> = state
        .sessions
        .snapshot(&sid)
        .docs
        .values()
        .map(|entry| DocumentListing {
            filename: entry.filename.clone(),
            has_summary: entry.summary.is_some(),
        })
        .collect();
    (jar, Json(json!({ "ok": true, "documents": documents })))
}

/// Index directory of `filename`, provided it is registered and still on disk.
async fn indexed_dir(state: &AppState, sid: &str, filename: Option<&str>) -> Option<PathBuf> {
    let dir = state
        .sessions
        .snapshot(sid)
        .document(filename?)?
        .persist_dir
        .clone();
    tokio::fs::metadata(&dir)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
        .then_some(dir)
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct AskRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

/// Answer a question against one uploaded document.
pub(super) async fn ask(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Payload(request): Payload<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, sid) = session_id(jar);
    let question = request.question.unwrap_or_default().trim().to_string();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question is required.".into()));
    }
    let dir = indexed_dir(&state, &sid, request.filename.as_deref())
        .await
        .ok_or_else(|| {
            ApiError::BadRequest("Please select a Notebook before asking a Question.".into())
        })?;

    let answer = state
        .service
        .answer_question(&dir, &question)
        .await
        .map_err(|error| ApiError::Internal(error.to_string()))?;
    Ok((jar, Json(json!({ "ok": true, "answer": answer }))))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct QuizRequest {
    #[serde(default)]
    num_questions: Option<Scalar>,
    #[serde(default)]
    filename: Option<String>,
}

/// Generate a multiple-choice quiz from one uploaded document.
pub(super) async fn generate_quiz(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Payload(request): Payload<QuizRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, sid) = session_id(jar);
    let num_questions = match &request.num_questions {
        None => DEFAULT_QUIZ_QUESTIONS,
        Some(value) => value
            .as_i64()
            .filter(|count| *count > 0)
            .map(|count| (count as usize).min(MAX_QUIZ_QUESTIONS))
            .ok_or_else(|| {
                ApiError::BadRequest("num_questions must be a positive integer.".into())
            })?,
    };
    let dir = indexed_dir(&state, &sid, request.filename.as_deref())
        .await
        .ok_or_else(|| {
            ApiError::BadRequest("Please select a Notebook before generating Quiz.".into())
        })?;

    let quiz = state
        .service
        .generate_quiz(&dir, num_questions)
        .await
        .map_err(|error| ApiError::Internal(error.to_string()))?;
    Ok((jar, Json(json!({ "ok": true, "quiz": quiz }))))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct DeleteRequest {
    #[serde(default)]
    filename: Option<String>,
}

/// Remove a document's index from disk and forget it.
pub(super) async fn delete_doc(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Payload(request): Payload<DeleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, sid) = session_id(jar);
    let filename = request
        .filename
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Please select a document to delete.".into()))?;

    let entry = state
        .sessions
        .snapshot(&sid)
        .document(&filename)
        .cloned()
        .ok_or_else(|| ApiError::NotFound("Selected document not found.".into()))?;
    tracing::info!(filename = %filename, index_dir = %entry.persist_dir.display(), "Delete requested");

    delete_index_dir(
        &entry.persist_dir,
        state.settings.delete_retry_attempts,
        state.settings.delete_retry_delay,
    )
    .await
    .map_err(|error| match error {
        DeleteError::NotFound(path) => {
            ApiError::NotFound(format!("Database folder not found: {}", path.display()))
        }
        DeleteError::Failed { source, .. } => {
            ApiError::Internal(format!("Failed to delete database: {source}"))
        }
    })?;

    let message = format!("Deleted '{filename}' successfully.");
    state.sessions.with_session(&sid, |session| {
        session.remove_document(&filename);
        session.flash(FlashLevel::Success, message.clone());
    });
    Ok((jar, Json(json!({ "ok": true, "message": message }))))
}
