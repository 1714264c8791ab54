//! Minimal server-rendered pages.
//!
//! The pages are intentionally plain: the browser client drives everything else through the
//! JSON endpoints, and the notebook page only needs the current document, its summary, and a
//! job id to resume polling.

use super::{AppState, session_id};
use crate::jobs::JobPhase;
use crate::session::{Flash, FlashLevel, Session};
use axum::{
    Json,
    extract::State,
    response::{Html, IntoResponse},
};
use axum_extra::extract::cookie::SignedCookieJar;
use regex::Regex;
use serde_json::json;
use std::fmt::Write;
use std::sync::OnceLock;

/// Landing page with the upload form.
pub(super) async fn home(State(state): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let flashes = state.sessions.take_flashes(&sid);

    let mut body = String::new();
    render_flashes(&mut body, &flashes);
    body.push_str(
        r#"<form id="upload-form" action="/upload" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept=".pdf,.docx,.pptx,.txt">
<button type="submit">Upload</button>
</form>
"#,
    );
    (jar, Html(layout("StudyAssist", &body)))
}

/// Notebook page for the most recently uploaded document.
///
/// A terminal job is consumed here: a completed one fills in the document's summary, a failed
/// one turns into an error flash. Either way the session stops tracking it.
pub(super) async fn notebook(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let active_job = state.sessions.snapshot(&sid).job_id;
    let finished = active_job
        .as_deref()
        .and_then(|job_id| state.jobs.take_terminal(job_id));

    let rendered = state.sessions.with_existing(&sid, |session| {
        if let Some(status) = &finished {
            match status.phase {
                JobPhase::Completed => {
                    let filename = status
                        .filename
                        .clone()
                        .or_else(|| session.uploaded_filename.clone());
                    if let (Some(filename), Some(summary)) = (filename, &status.summary) {
                        session.apply_summary(&filename, summary);
                    }
                }
                _ => {
                    let error = status.error.as_deref().unwrap_or("unknown error");
                    session.flash(
                        FlashLevel::Error,
                        format!("Could not build index or generate summary: {error}"),
                    );
                }
            }
            session.job_id = None;
        }
        let flashes = session.take_flashes();
        (session.clone(), flashes)
    });
    let (session, flashes) = rendered.unwrap_or_else(|| (Session::default(), Vec::new()));

    let mut body = String::new();
    render_flashes(&mut body, &flashes);

    let running = session
        .job_id
        .as_deref()
        .filter(|job_id| state.jobs.contains(job_id));
    match running {
        Some(job_id) => {
            let _ = writeln!(
                body,
                r#"<div id="job" data-job-id="{}">Processing…</div>"#,
                escape(job_id)
            );
        }
        None => body.push_str("<div id=\"job\"></div>\n"),
    }

    if let Some(filename) = &session.uploaded_filename {
        let _ = writeln!(body, r#"<h2 id="filename">{}</h2>"#, escape(filename));
    }
    if let Some(summary) = &session.summary_text {
        let _ = writeln!(
            body,
            r#"<div id="summary">{}</div>"#,
            nl2br(&markdown_bold(&escape(summary)))
        );
    }

    body.push_str("<ul id=\"documents\">\n");
    for entry in session.docs.values() {
        let _ = writeln!(body, "<li>{}</li>", escape(&entry.filename));
    }
    body.push_str("</ul>\n");

    (jar, Html(layout("Notebook", &body)))
}

/// Clear all state held for the session.
pub(super) async fn reset(State(state): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    state.sessions.reset(&sid);
    tracing::info!("Session reset");
    (jar, Json(json!({ "ok": true })))
}

pub(super) fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{body}</body></html>\n",
        escape(title)
    )
}

fn render_flashes(out: &mut String, flashes: &[Flash]) {
    for flash in flashes {
        let level = match flash.level {
            FlashLevel::Success => "success",
            FlashLevel::Error => "error",
        };
        let _ = writeln!(
            out,
            r#"<p class="flash {level}">{}</p>"#,
            escape(&flash.message)
        );
    }
}

/// HTML-escape text for element content and double-quoted attributes.
pub(super) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Turn `**text**` into `<strong>text</strong>`. Input must already be escaped.
fn markdown_bold(text: &str) -> String {
    static BOLD: OnceLock<Option<Regex>> = OnceLock::new();
    match BOLD.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").ok()) {
        Some(bold) => bold.replace_all(text, "<strong>$1</strong>").into_owned(),
        None => text.to_string(),
    }
}

fn nl2br(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "<br>\n")
}
