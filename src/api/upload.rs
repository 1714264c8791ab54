//! Upload intake and job progress polling.

use super::{ApiError, AppState, session_id};
use crate::extract::{DocumentKind, extract_or_describe};
use crate::index::{DeleteError, delete_index_dir};
use crate::jobs::upload::UploadProgress;
use crate::jobs::{JobExtras, JobPhase, ProgressScale};
use crate::processing::IndexingJob;
use crate::processing::sanitize::{base_name, index_dir_name, secure_filename_or};
use crate::session::FlashLevel;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderMap,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde_json::json;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const NO_FILE_PART: &str = "No file part in request.";
const NO_FILE_SELECTED: &str = "No file selected.";
const UNSUPPORTED_TYPE: &str = "Unsupported file type. Please upload PDF, DOCX, PPTX or TXT.";

fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Allocate a job before the upload starts so the client can poll it while bytes are sent.
pub(super) async fn init_upload(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> impl IntoResponse {
    let (jar, sid) = session_id(jar);
    let job_id = new_job_id();
    state.jobs.create(&job_id);
    state
        .sessions
        .with_session(&sid, |session| session.job_id = Some(job_id.clone()));
    tracing::debug!(job_id = %job_id, "Upload job allocated");
    (jar, Json(json!({ "ok": true, "job_id": job_id })))
}

/// Current status of a job. Percentages never decrease between polls.
pub(super) async fn progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "no-store")],
        Json(state.jobs.progress(&job_id)),
    )
}

/// File saved to disk together with its extracted text.
struct SavedUpload {
    filename: String,
    text: String,
}

/// Accept a multipart `file`, extract its text, and start the indexing job.
pub(super) async fn upload(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let (jar, sid) = session_id(jar);
    let is_xhr = headers
        .get("x-requested-with")
        .is_some_and(|value| value == "XMLHttpRequest");
    let header_job = headers
        .get("x-job-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let previous_job = state.sessions.snapshot(&sid).job_id;
    let pending_job = previous_job
        .clone()
        .filter(|job_id| state.jobs.phase(job_id) == Some(JobPhase::Uploading));
    let job_id = header_job.or(pending_job).unwrap_or_else(new_job_id);
    let declared_len = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    tracing::info!(job_id = %job_id, content_length = ?declared_len, xhr = is_xhr, "Upload started");

    state
        .sessions
        .with_session(&sid, |session| session.job_id = Some(job_id.clone()));

    let saved = match receive_file(&state, &headers, body, &job_id, declared_len).await {
        Ok(saved) => saved,
        Err(error) => {
            tracing::warn!(job_id = %job_id, error = %error, "Upload rejected");
            // Jobs already handed to a worker belong to an earlier upload.
            let owned = matches!(state.jobs.phase(&job_id), None | Some(JobPhase::Uploading));
            if owned {
                state.jobs.remove(&job_id);
            }
            let message = error.to_string();
            state.sessions.with_session(&sid, |session| {
                if owned && session.job_id.as_deref() == Some(job_id.as_str()) {
                    session.job_id = previous_job
                        .filter(|previous| *previous != job_id && state.jobs.contains(previous));
                }
                if !is_xhr {
                    session.flash(FlashLevel::Error, message);
                }
            });
            if is_xhr {
                return (jar, error).into_response();
            }
            return (jar, Redirect::to("/upload_notebook")).into_response();
        }
    };

    let SavedUpload { filename, text } = saved;
    state.jobs.update(
        &job_id,
        JobPhase::Queued,
        ProgressScale::UPLOAD.end(),
        JobExtras::filename(filename.clone()),
    );

    let index_dir = state
        .settings
        .index_root
        .join(index_dir_name(base_name(&filename)));
    let index_dir = std::path::absolute(&index_dir).unwrap_or(index_dir);
    let replaced = state.sessions.with_session(&sid, |session| {
        session.job_id = Some(job_id.clone());
        session.register_document(&filename, index_dir.clone())
    });
    if let Some(previous) = replaced.filter(|entry| entry.persist_dir != index_dir) {
        discard_replaced_index(&state, &filename, &previous.persist_dir).await;
    }

    state.runner.spawn(IndexingJob {
        job_id: job_id.clone(),
        text,
        index_dir: index_dir.clone(),
        filename: filename.clone(),
        scale: ProgressScale::INDEXING,
        session_id: sid,
    });
    tracing::info!(
        job_id = %job_id,
        filename = %filename,
        index_dir = %index_dir.display(),
        "Upload accepted; indexing queued"
    );

    if is_xhr {
        return (
            jar,
            Json(json!({ "ok": true, "job_id": job_id, "filename": filename })),
        )
            .into_response();
    }
    (jar, Redirect::to("/upload_notebook")).into_response()
}

/// Remove the index of a document that was uploaded again under the same name.
async fn discard_replaced_index(state: &AppState, filename: &str, dir: &std::path::Path) {
    match delete_index_dir(
        dir,
        state.settings.delete_retry_attempts,
        state.settings.delete_retry_delay,
    )
    .await
    {
        Ok(()) => {
            tracing::info!(filename, index_dir = %dir.display(), "Replaced index removed");
        }
        Err(DeleteError::NotFound(_)) => {}
        Err(error) => {
            tracing::warn!(filename, error = %error, "Could not remove replaced index");
        }
    }
}

async fn receive_file(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
    job_id: &str,
    declared_len: Option<u64>,
) -> Result<SavedUpload, ApiError> {
    let boundary = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| multer::parse_boundary(value).ok())
        .ok_or_else(|| ApiError::BadRequest(NO_FILE_PART.into()))?;

    let stream = UploadProgress::new(
        body.into_data_stream(),
        state.jobs.clone(),
        job_id,
        declared_len,
        state.settings.upload_progress_interval,
    );
    let mut multipart = multer::Multipart::new(stream, boundary);

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|error| ApiError::BadRequest(format!("Malformed upload: {error}")))?;
        let Some(mut field) = field else {
            return Err(ApiError::BadRequest(NO_FILE_PART.into()));
        };
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.trim().is_empty() {
            return Err(ApiError::BadRequest(NO_FILE_SELECTED.into()));
        }
        let kind = DocumentKind::from_filename(&original)
            .ok_or_else(|| ApiError::BadRequest(UNSUPPORTED_TYPE.into()))?;
        let filename = secure_filename_or(&original, kind.extension());

        tokio::fs::create_dir_all(&state.settings.upload_dir)
            .await
            .map_err(|error| ApiError::Internal(format!("Could not prepare upload folder: {error}")))?;
        let path: PathBuf = state.settings.upload_dir.join(&filename);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|error| ApiError::Internal(format!("Could not save upload: {error}")))?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|error| ApiError::BadRequest(format!("Upload interrupted: {error}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|error| ApiError::Internal(format!("Could not save upload: {error}")))?;
        }
        file.flush()
            .await
            .map_err(|error| ApiError::Internal(format!("Could not save upload: {error}")))?;
        tracing::debug!(path = %path.display(), "Upload saved");

        let text = tokio::task::spawn_blocking(move || extract_or_describe(&path, kind))
            .await
            .map_err(|error| ApiError::Internal(format!("Text extraction aborted: {error}")))?;
        return Ok(SavedUpload { filename, text });
    }
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{Harness, json_body, text_body};
    use crate::jobs::{JobExtras, JobPhase};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};

    #[tokio::test]
    async fn init_upload_creates_uploading_job() {
        let harness = Harness::new();
        let body = json_body(harness.post_json("/init_upload", serde_json::json!({})).await).await;
        assert_eq!(body["ok"], true);
        let job_id = body["job_id"].as_str().unwrap().to_string();
        assert_eq!(job_id.len(), 32);

        let response = harness.get(&format!("/progress/{job_id}")).await;
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let status = json_body(response).await;
        assert_eq!(status["phase"], "Uploading");
        assert_eq!(status["pct"], 0);

        let session = harness.state.sessions().snapshot(&harness.session_id());
        assert_eq!(session.job_id.as_deref(), Some(job_id.as_str()));
    }

    #[tokio::test]
    async fn unknown_job_reports_queued_zero() {
        let harness = Harness::new();
        let status = json_body(harness.get("/progress/nope").await).await;
        assert_eq!(status, serde_json::json!({ "phase": "queued", "pct": 0 }));
    }

    #[tokio::test]
    async fn text_upload_runs_to_completion() {
        let harness = Harness::new();
        let init = json_body(harness.post_json("/init_upload", serde_json::json!({})).await).await;
        let job_id = init["job_id"].as_str().unwrap().to_string();

        let response = harness
            .upload("Cell Biology.txt", b"Cells are the unit of life.", Some(&job_id), true)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["job_id"], job_id.as_str());
        assert_eq!(body["filename"], "Cell_Biology.txt");

        let status = harness.wait_for_terminal(&job_id).await;
        assert_eq!(status["phase"], "completed");
        assert_eq!(status["pct"], 100);
        assert_eq!(status["filename"], "Cell_Biology.txt");
        assert!(status["summary"].as_str().unwrap().contains("Cell_Biology.txt"));

        let saved = harness.root.path().join("uploads").join("Cell_Biology.txt");
        assert_eq!(std::fs::read(saved).unwrap(), b"Cells are the unit of life.");

        let session = harness.state.sessions().snapshot(&harness.session_id());
        let entry = session.document("Cell_Biology.txt").unwrap();
        assert!(entry.persist_dir.is_absolute());
        assert!(entry.persist_dir.exists());
        assert!(entry.summary.is_some());
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_and_job_removed() {
        let harness = Harness::new();
        let init = json_body(harness.post_json("/init_upload", serde_json::json!({})).await).await;
        let job_id = init["job_id"].as_str().unwrap().to_string();

        let response = harness
            .upload("malware.exe", b"MZ", Some(&job_id), true)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(
            body["error"],
            "Unsupported file type. Please upload PDF, DOCX, PPTX or TXT."
        );

        assert!(!harness.state.jobs().contains(&job_id));
        let session = harness.state.sessions().snapshot(&harness.session_id());
        assert_eq!(session.job_id, None);
        assert!(session.docs.is_empty());
    }

    #[tokio::test]
    async fn empty_filename_is_rejected() {
        let harness = Harness::new();
        let response = harness.upload("", b"", None, true).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No file selected.");
        assert!(harness.state.jobs().is_empty());
    }

    fn json_upload(xhr: bool) -> Request<Body> {
        let mut builder = Request::post("/upload").header(header::CONTENT_TYPE, "application/json");
        if xhr {
            builder = builder.header("X-Requested-With", "XMLHttpRequest");
        }
        builder.body(Body::from(r#"{"file":"nope"}"#)).unwrap()
    }

    #[tokio::test]
    async fn missing_multipart_body_is_rejected() {
        let harness = Harness::new();
        let response = harness.send(json_upload(true)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No file part in request.");
        assert!(harness.state.jobs().is_empty());
    }

    #[tokio::test]
    async fn missing_multipart_form_post_redirects() {
        let harness = Harness::new();
        let response = harness.send(json_upload(false)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/upload_notebook");

        let page = text_body(harness.get("/upload_notebook").await).await;
        assert!(page.contains("No file part in request."));
    }

    #[tokio::test]
    async fn rejected_upload_leaves_running_job_alone() {
        let harness = Harness::new();
        let init = json_body(harness.post_json("/init_upload", serde_json::json!({})).await).await;
        let job_id = init["job_id"].as_str().unwrap().to_string();
        harness.state.jobs().update(
            &job_id,
            JobPhase::Processing,
            70,
            JobExtras::filename("first.txt"),
        );
        let status = json_body(harness.get(&format!("/progress/{job_id}")).await).await;
        assert_eq!(status["pct"], 70);

        let response = harness.upload("bad.exe", b"MZ", None, true).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let status = json_body(harness.get(&format!("/progress/{job_id}")).await).await;
        assert_eq!(status["phase"], "Processing");
        assert_eq!(status["pct"], 70);
        let session = harness.state.sessions().snapshot(&harness.session_id());
        assert_eq!(session.job_id.as_deref(), Some(job_id.as_str()));
    }

    #[tokio::test]
    async fn new_upload_never_reuses_a_running_job() {
        let harness = Harness::new();
        let init = json_body(harness.post_json("/init_upload", serde_json::json!({})).await).await;
        let running = init["job_id"].as_str().unwrap().to_string();
        harness
            .state
            .jobs()
            .update(&running, JobPhase::Summarizing, 94, JobExtras::default());

        let body = json_body(harness.upload("next.txt", b"More notes.", None, true).await).await;
        let job_id = body["job_id"].as_str().unwrap().to_string();
        assert_ne!(job_id, running);
        harness.wait_for_terminal(&job_id).await;
        assert_eq!(harness.state.jobs().read(&running).phase, JobPhase::Summarizing);
    }

    #[tokio::test]
    async fn reupload_discards_previous_index() {
        let harness = Harness::new();
        let first = json_body(harness.upload("notes.txt", b"First draft.", None, true).await).await;
        harness
            .wait_for_terminal(first["job_id"].as_str().unwrap())
            .await;
        let session = harness.state.sessions().snapshot(&harness.session_id());
        let old_dir = session.document("notes.txt").unwrap().persist_dir.clone();
        assert!(old_dir.exists());

        let second = json_body(harness.upload("notes.txt", b"Second draft.", None, true).await).await;
        harness
            .wait_for_terminal(second["job_id"].as_str().unwrap())
            .await;
        let session = harness.state.sessions().snapshot(&harness.session_id());
        let new_dir = session.document("notes.txt").unwrap().persist_dir.clone();
        assert_ne!(new_dir, old_dir);
        assert!(new_dir.exists());
        assert!(!old_dir.exists());
        assert_eq!(session.uploaded_files, vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn form_upload_redirects_with_flash_on_error() {
        let harness = Harness::new();
        let response = harness.upload("slides.key", b"data", None, false).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/upload_notebook");

        let page = text_body(harness.get("/upload_notebook").await).await;
        assert!(page.contains("Unsupported file type."));
    }
}
