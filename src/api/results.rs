//! Quiz result storage.

use super::pages::{escape, layout};
use super::{ApiError, AppState, Payload, Scalar, session_id};
use crate::session::QuizResult;
use axum::{
    Json,
    extract::State,
    response::{Html, IntoResponse},
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write;

#[derive(Debug, Default, Deserialize)]
pub(super) struct SaveResultRequest {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    correct: Option<Scalar>,
    #[serde(default)]
    total: Option<Scalar>,
    #[serde(default)]
    percent: Option<Scalar>,
}

fn count(value: Option<&Scalar>) -> Option<u32> {
    value
        .and_then(Scalar::as_i64)
        .and_then(|value| u32::try_from(value).ok())
}

/// Store a finished quiz attempt on the session.
pub(super) async fn save_result(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Payload(request): Payload<SaveResultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (jar, sid) = session_id(jar);
    let missing = || ApiError::BadRequest("Missing result data".into());
    let filename = request
        .filename
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(missing)?;
    let correct = count(request.correct.as_ref()).ok_or_else(missing)?;
    let total = count(request.total.as_ref()).ok_or_else(missing)?;
    let percent = count(request.percent.as_ref());

    let result = QuizResult::new(filename, correct, total, percent);
    tracing::info!(
        filename = %result.filename,
        correct,
        total,
        percent = result.percent,
        "Quiz result saved"
    );
    state
        .sessions
        .with_session(&sid, |session| session.push_result(result));
    Ok((jar, Json(json!({ "ok": true }))))
}

/// Stored results as JSON, newest first.
pub(super) async fn results_json(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let results = state.sessions.snapshot(&sid).results;
    (jar, Json(results))
}

/// Stored results as an HTML table.
pub(super) async fn results_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let results = state.sessions.snapshot(&sid).results;
    (jar, Html(layout("Results", &render_table(&results))))
}

fn render_table(results: &[QuizResult]) -> String {
    if results.is_empty() {
        return "<p>No quiz results yet.</p>\n".to_string();
    }
    let mut html = String::from(
        "<table id=\"results\">\n<tr><th>Document</th><th>Score</th><th>Percent</th><th>Taken</th></tr>\n",
    );
    for result in results {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}/{}</td><td>{}%</td><td>{}</td></tr>",
            escape(&result.filename),
            result.correct,
            result.total,
            result.percent,
            escape(&result.test_datetime)
        );
    }
    html.push_str("</table>\n");
    html
}
