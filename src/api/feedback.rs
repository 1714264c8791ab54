//! Feedback form submission.

use super::{AppState, Payload};
use crate::feedback::FeedbackMessage;
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Default, Deserialize)]
pub(super) struct FeedbackForm {
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn or_not_available(value: Option<String>) -> String {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "N/A".to_string())
}

fn reply(status: &str, message: &str) -> Json<Value> {
    Json(json!({ "status": status, "message": message }))
}

/// Relay feedback to the configured mailbox.
pub(super) async fn send_feedback(
    State(state): State<AppState>,
    Payload(form): Payload<FeedbackForm>,
) -> Json<Value> {
    let message = form.message.unwrap_or_default().trim().to_string();
    if message.is_empty() {
        return reply("error", "Message cannot be empty.");
    }
    let feedback = FeedbackMessage {
        rating: or_not_available(form.rating),
        category: or_not_available(form.category),
        message,
    };

    match state.mailer.send(&feedback).await {
        Ok(()) => reply("success", "Thank you! Your feedback has been sent."),
        Err(error) => {
            tracing::error!(error = %error, category = %feedback.category, "Feedback delivery failed");
            reply("error", "Unable to send feedback at this time.")
        }
    }
}
