//! Server-side session state keyed by the signed session cookie.
//!
//! The browser only holds an opaque id; everything else (uploaded documents, the active job,
//! quiz results, flash messages) lives in the [`SessionStore`]. Each [`Session`] keeps a
//! per-filename map of [`DocumentEntry`] values, which is the authoritative record. The
//! `uploaded_filename` / `summary_text` / `persist_directory` fields only remember the most
//! recently touched document for the notebook page.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::macros::format_description;

/// Name of the signed cookie carrying the session id.
pub const SESSION_COOKIE: &str = "studyassist_session";

/// Document uploaded during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntry {
    /// Sanitized display filename.
    pub filename: String,
    /// Directory holding the document's index.
    pub persist_dir: PathBuf,
    /// Summary, once the indexing job completed.
    pub summary: Option<String>,
}

/// Stored outcome of one quiz attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizResult {
    /// Document the quiz was generated from.
    pub filename: String,
    /// Number of correct answers.
    pub correct: u32,
    /// Number of questions.
    pub total: u32,
    /// Score in percent.
    pub percent: u32,
    /// When the result was saved, `YYYY-MM-DD HH:MM AM`.
    pub test_datetime: String,
}

impl QuizResult {
    /// Build a result stamped with the current time. `percent` defaults to the rounded ratio.
    pub fn new(filename: String, correct: u32, total: u32, percent: Option<u32>) -> Self {
        let percent = percent.unwrap_or_else(|| score_percent(correct, total));
        Self {
            filename,
            correct,
            total,
            percent,
            test_datetime: format_timestamp(OffsetDateTime::now_utc()),
        }
    }
}

fn score_percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(correct) / f64::from(total) * 100.0).round() as u32
}

fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour repr:12]:[minute] [period]");
    at.format(format).unwrap_or_default()
}

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    /// Severity.
    pub level: FlashLevel,
    /// Message text.
    pub message: String,
}

/// Everything the server remembers about one browser session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    /// Uploaded documents keyed by display filename.
    pub docs: BTreeMap<String, DocumentEntry>,
    /// Job currently shown on the notebook page.
    pub job_id: Option<String>,
    /// Filenames in upload order.
    pub uploaded_files: Vec<String>,
    /// Quiz results, newest first.
    pub results: Vec<QuizResult>,
    /// Most recently touched document.
    pub uploaded_filename: Option<String>,
    /// Summary of `uploaded_filename`, when known.
    pub summary_text: Option<String>,
    /// Index directory of `uploaded_filename`.
    pub persist_directory: Option<PathBuf>,
    #[serde(skip)]
    flashes: Vec<Flash>,
}

impl Session {
    /// Record a freshly uploaded document and make it the current one.
    ///
    /// Returns the entry previously stored under the same filename.
    pub fn register_document(
        &mut self,
        filename: &str,
        persist_dir: PathBuf,
    ) -> Option<DocumentEntry> {
        let replaced = self.docs.insert(
            filename.to_string(),
            DocumentEntry {
                filename: filename.to_string(),
                persist_dir: persist_dir.clone(),
                summary: None,
            },
        );
        if !self.uploaded_files.iter().any(|name| name == filename) {
            self.uploaded_files.push(filename.to_string());
        }
        self.uploaded_filename = Some(filename.to_string());
        self.summary_text = None;
        self.persist_directory = Some(persist_dir);
        replaced
    }

    /// Look up a document by filename.
    pub fn document(&self, filename: &str) -> Option<&DocumentEntry> {
        self.docs.get(filename)
    }

    /// Attach a summary to a known document and make it the current one.
    ///
    /// Returns `false` when the document is not (or no longer) registered.
    pub fn apply_summary(&mut self, filename: &str, summary: &str) -> bool {
        let Some(entry) = self.docs.get_mut(filename) else {
            return false;
        };
        entry.summary = Some(summary.to_string());
        self.persist_directory = Some(entry.persist_dir.clone());
        self.uploaded_filename = Some(filename.to_string());
        self.summary_text = Some(summary.to_string());
        true
    }

    /// Forget a document, clearing the current-document fields if they pointed at it.
    pub fn remove_document(&mut self, filename: &str) -> Option<DocumentEntry> {
        let removed = self.docs.remove(filename)?;
        self.uploaded_files.retain(|name| name != filename);
        if self.uploaded_filename.as_deref() == Some(filename) {
            self.uploaded_filename = None;
            self.summary_text = None;
            self.persist_directory = None;
        }
        Some(removed)
    }

    /// Store a quiz result at the front of the list.
    pub fn push_result(&mut self, result: QuizResult) {
        self.results.insert(0, result);
    }

    /// Queue a flash message for the next page render.
    pub fn flash(&mut self, level: FlashLevel, message: impl Into<String>) {
        self.flashes.push(Flash {
            level,
            message: message.into(),
        });
    }

    /// Drain pending flash messages.
    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }
}

/// Concurrent table of sessions keyed by session id.
///
/// Sessions are created by the first write, never by a read. Each access stamps the session so
/// [`SessionStore::sweep_idle`] can drop the ones whose browser went away.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    touched: DashMap<String, Instant>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the session, or an empty one when the id is unknown.
    pub fn snapshot(&self, session_id: &str) -> Session {
        let session = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone());
        match session {
            Some(session) => {
                self.touch(session_id);
                session
            }
            None => Session::default(),
        }
    }

    /// Run `f` against the session, creating it first when needed.
    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        let result = f(entry.value_mut());
        drop(entry);
        self.touch(session_id);
        result
    }

    /// Run `f` against an existing session. Unknown ids give `None` and create nothing.
    pub fn with_existing<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut entry = self.sessions.get_mut(session_id)?;
        let result = f(entry.value_mut());
        drop(entry);
        self.touch(session_id);
        Some(result)
    }

    /// Drain the session's pending flash messages without creating a session.
    pub fn take_flashes(&self, session_id: &str) -> Vec<Flash> {
        self.with_existing(session_id, Session::take_flashes)
            .unwrap_or_default()
    }

    /// Store a completed job's summary on the session's document entry.
    ///
    /// Does nothing when the session or the document no longer exists.
    pub fn record_summary(&self, session_id: &str, filename: &str, summary: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => session.apply_summary(filename, summary),
            None => false,
        }
    }

    /// Drop every piece of state held for the session.
    pub fn reset(&self, session_id: &str) {
        self.sessions.remove(session_id);
        self.touched.remove(session_id);
    }

    /// Drop sessions not accessed for at least `ttl`. Returns how many were dropped.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let stale: Vec<String> = self
            .touched
            .iter()
            .filter(|entry| entry.value().elapsed() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut dropped = 0;
        for session_id in stale {
            if self
                .touched
                .remove_if(&session_id, |_, at| at.elapsed() >= ttl)
                .is_some()
                && self.sessions.remove(&session_id).is_some()
            {
                dropped += 1;
            }
        }
        dropped
    }

    fn touch(&self, session_id: &str) {
        self.touched.insert(session_id.to_string(), Instant::now());
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
