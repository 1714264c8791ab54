//! HTTP surface for StudyAssist.
//!
//! The router serves a handful of minimal HTML pages plus the JSON endpoints the browser
//! client drives:
//!
//! - `POST /init_upload`, `POST /upload`, `GET /progress/{job_id}` – upload a document and
//!   poll the background indexing job (see [`crate::jobs`]).
//! - `GET /summary`, `GET /documents`, `POST /ask`, `POST /generate_quiz`, `POST /delete_doc`
//!   – work with documents uploaded during the session.
//! - `POST /save_result`, `GET /results`, `GET /results.json` – quiz scores.
//! - `POST /send-feedback`, `POST /reset`, `GET /metrics` – housekeeping.
//!
//! Per-browser state lives in the [`SessionStore`], keyed by a signed cookie.

mod documents;
mod feedback;
mod pages;
mod results;
mod upload;

use crate::completion::build_completion_client;
use crate::config::Config;
use crate::embedding::build_embedding_client;
use crate::feedback::{DisabledMailer, FeedbackMailer, SmtpMailer};
use crate::jobs::JobTable;
use crate::metrics::{IndexingMetrics, MetricsSnapshot};
use crate::processing::{JobRunner, ProcessingSettings, StudyApi, StudyService};
use crate::session::{SESSION_COOKIE, SessionStore};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRef, FromRequest, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha512};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Filesystem and pacing settings used by the handlers.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Directory receiving uploaded files.
    pub upload_dir: PathBuf,
    /// Directory under which per-document indexes are created.
    pub index_root: PathBuf,
    /// Minimum pause between upload progress updates.
    pub upload_progress_interval: Duration,
    /// Attempts made when removing an index directory.
    pub delete_retry_attempts: usize,
    /// Pause between removal attempts.
    pub delete_retry_delay: Duration,
    /// Upper bound on concurrently running indexing jobs.
    pub max_concurrent_jobs: usize,
}

impl AppSettings {
    /// Extract handler settings from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            index_root: config.index_root.clone(),
            upload_progress_interval: Duration::from_millis(config.upload_progress_interval_ms),
            delete_retry_attempts: config.delete_retry_attempts,
            delete_retry_delay: Duration::from_millis(config.delete_retry_delay_ms),
            max_concurrent_jobs: config.max_concurrent_jobs,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    service: Arc<dyn StudyApi>,
    jobs: Arc<JobTable>,
    sessions: Arc<SessionStore>,
    runner: JobRunner,
    mailer: Arc<dyn FeedbackMailer>,
    metrics: Arc<IndexingMetrics>,
    settings: Arc<AppSettings>,
    key: Key,
}

impl AppState {
    /// Wire the state from explicit collaborators.
    ///
    /// `secret` signs the session cookie; any length is accepted.
    pub fn new(
        service: Arc<dyn StudyApi>,
        mailer: Arc<dyn FeedbackMailer>,
        metrics: Arc<IndexingMetrics>,
        settings: AppSettings,
        secret: &str,
    ) -> Self {
        let jobs = Arc::new(JobTable::new());
        let sessions = Arc::new(SessionStore::new());
        let runner = JobRunner::new(
            service.clone(),
            jobs.clone(),
            sessions.clone(),
            metrics.clone(),
            settings.max_concurrent_jobs,
        );
        Self {
            service,
            jobs,
            sessions,
            runner,
            mailer,
            metrics,
            settings: Arc::new(settings),
            key: signing_key(secret),
        }
    }

    /// Build provider clients, the study service, and the mailer from `config`.
    pub fn from_config(config: &Config) -> Self {
        let metrics = Arc::new(IndexingMetrics::new());
        let service: Arc<dyn StudyApi> = Arc::new(StudyService::new(
            build_embedding_client(config),
            build_completion_client(config),
            ProcessingSettings::from_config(config),
            metrics.clone(),
        ));
        let mailer: Arc<dyn FeedbackMailer> = match SmtpMailer::from_settings(&config.mail) {
            Ok(mailer) => Arc::new(mailer),
            Err(error) => {
                tracing::warn!(error = %error, "Feedback mail disabled");
                Arc::new(DisabledMailer)
            }
        };
        Self::new(
            service,
            mailer,
            metrics,
            AppSettings::from_config(config),
            &config.secret_key,
        )
    }

    /// Job table shared with the background workers.
    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.jobs
    }

    /// Server-side session store.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Drop idle sessions and abandoned jobs. Returns `(sessions, jobs)` dropped.
    pub fn sweep_idle(&self, session_ttl: Duration, job_ttl: Duration) -> (usize, usize) {
        (
            self.sessions.sweep_idle(session_ttl),
            self.jobs.sweep_idle(job_ttl),
        )
    }

    /// Run [`AppState::sweep_idle`] every `period` on a background task.
    pub fn spawn_janitor(
        &self,
        period: Duration,
        session_ttl: Duration,
        job_ttl: Duration,
    ) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let (sessions, jobs) = state.sweep_idle(session_ttl, job_ttl);
                if sessions > 0 || jobs > 0 {
                    tracing::info!(sessions, jobs, "Dropped idle state");
                }
            }
        })
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

/// `Key::from` needs 64 bytes of material; stretch arbitrary secrets with SHA-512.
fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Build the HTTP router exposing the StudyAssist surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::home))
        .route("/home", get(pages::home))
        .route("/upload_notebook", get(pages::notebook))
        .route("/init_upload", post(upload::init_upload))
        .route("/upload", post(upload::upload))
        .route("/progress/:job_id", get(upload::progress))
        .route("/summary", get(documents::summary))
        .route("/documents", get(documents::list))
        .route("/ask", post(documents::ask))
        .route("/generate_quiz", post(documents::generate_quiz))
        .route("/delete_doc", post(documents::delete_doc))
        .route("/save_result", post(results::save_result))
        .route("/results", get(results::results_page))
        .route("/results.json", get(results::results_json))
        .route("/send-feedback", post(feedback::send_feedback))
        .route("/reset", post(pages::reset))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Return the indexing counters.
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Resolve the session id from the signed cookie, issuing a new one when absent.
fn session_id(jar: SignedCookieJar) -> (SignedCookieJar, String) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return (jar, cookie.value().to_string());
    }
    let id = Uuid::new_v4().simple().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), id)
}

/// JSON error returned by the API: `{ "ok": false, "error": "..." }`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Client sent an incomplete or invalid request.
    #[error("{0}")]
    BadRequest(String),
    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Server-side failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

/// Request payload accepted as JSON or as a URL-encoded form.
///
/// Bodies that fail to parse yield `T::default()`, so handlers validate fields themselves and
/// answer with their own messages.
pub(crate) struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            let value = axum::Form::<T>::from_request(req, state)
                .await
                .map(|axum::Form(value)| value)
                .unwrap_or_default();
            return Ok(Self(value));
        }
        let bytes = Bytes::from_request(req, state).await.unwrap_or_default();
        Ok(Self(serde_json::from_slice(&bytes).unwrap_or_default()))
    }
}

/// Scalar field sent either as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Integer value, parsing text and truncating floats.
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.is_finite() => Some(value.trunc() as i64),
            Self::Float(_) => None,
            Self::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|value| value.trunc() as i64))
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}
