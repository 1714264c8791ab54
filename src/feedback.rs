//! User feedback delivered by e-mail.
//!
//! Messages are rendered as UTF-8 plain text with `lettre` and relayed over SMTP with
//! STARTTLS. The sender is the authenticated account; the recipient is fixed by configuration.

use crate::config::MailSettings;
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;

/// Errors raised while composing or delivering feedback.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// Mail credentials are not configured.
    #[error("mail delivery is not configured (MAIL_USERNAME / MAIL_PASSWORD)")]
    NotConfigured,
    /// An address could not be parsed.
    #[error("invalid mail address \"{address}\": {source}")]
    Address {
        /// Offending address.
        address: String,
        /// Parser error.
        #[source]
        source: lettre::address::AddressError,
    },
    /// The MIME message could not be built.
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    /// The SMTP relay refused or could not be reached.
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Feedback submitted through the feedback form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackMessage {
    /// Star rating, or `N/A`.
    pub rating: String,
    /// Category picked by the user, or `N/A`.
    pub category: String,
    /// Free-form message; never empty once accepted.
    pub message: String,
}

impl FeedbackMessage {
    /// Subject line of the outgoing mail.
    pub fn subject(&self) -> String {
        format!("Studyassists Feedback — {}", self.category)
    }

    /// Plain-text body of the outgoing mail.
    pub fn body(&self) -> String {
        format!(
            "Rating: {}\nCategory: {}\n\nMessage:\n{}",
            self.rating, self.category, self.message
        )
    }
}

/// Delivery channel for feedback messages.
#[async_trait]
pub trait FeedbackMailer: Send + Sync {
    /// Deliver `feedback` to the configured recipient.
    async fn send(&self, feedback: &FeedbackMessage) -> Result<(), FeedbackError>;
}

/// SMTP-backed [`FeedbackMailer`].
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipient: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer from the configured relay and credentials.
    pub fn from_settings(settings: &MailSettings) -> Result<Self, FeedbackError> {
        let (Some(username), Some(password)) = (&settings.username, &settings.password) else {
            return Err(FeedbackError::NotConfigured);
        };
        let sender = parse_mailbox(username)?;
        let recipient = parse_mailbox(&settings.recipient)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?
            .port(settings.port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();
        Ok(Self {
            transport,
            sender,
            recipient,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, FeedbackError> {
    address.parse().map_err(|source| FeedbackError::Address {
        address: address.to_string(),
        source,
    })
}

/// Render `feedback` as a plain-text MIME message.
pub fn compose(
    feedback: &FeedbackMessage,
    sender: Mailbox,
    recipient: Mailbox,
) -> Result<Message, FeedbackError> {
    Ok(Message::builder()
        .from(sender)
        .to(recipient)
        .subject(feedback.subject())
        .header(ContentType::TEXT_PLAIN)
        .body(feedback.body())?)
}

#[async_trait]
impl FeedbackMailer for SmtpMailer {
    async fn send(&self, feedback: &FeedbackMessage) -> Result<(), FeedbackError> {
        let message = compose(feedback, self.sender.clone(), self.recipient.clone())?;
        self.transport.send(message).await?;
        tracing::info!(category = %feedback.category, "Feedback delivered");
        Ok(())
    }
}

/// Mailer used when SMTP is not configured; every send fails with
/// [`FeedbackError::NotConfigured`].
pub struct DisabledMailer;

#[async_trait]
impl FeedbackMailer for DisabledMailer {
    async fn send(&self, _feedback: &FeedbackMessage) -> Result<(), FeedbackError> {
        Err(FeedbackError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback() -> FeedbackMessage {
        FeedbackMessage {
            rating: "5".into(),
            category: "Bug".into(),
            message: "Quiz button froze.".into(),
        }
    }

    #[test]
    fn renders_subject_and_body() {
        let feedback = feedback();
        assert_eq!(feedback.subject(), "Studyassists Feedback — Bug");
        assert_eq!(
            feedback.body(),
            "Rating: 5\nCategory: Bug\n\nMessage:\nQuiz button froze."
        );
    }

    #[test]
    fn composes_plain_text_message() {
        let message = compose(
            &feedback(),
            "sender@example.com".parse().unwrap(),
            "info@studyassists.com".parse().unwrap(),
        )
        .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: info@studyassists.com"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("Quiz button froze."));
    }

    #[test]
    fn missing_credentials_are_not_configured() {
        let settings = MailSettings {
            server: "smtp.example.com".into(),
            port: 587,
            username: None,
            password: None,
            recipient: "info@studyassists.com".into(),
        };
        assert!(matches!(
            SmtpMailer::from_settings(&settings),
            Err(FeedbackError::NotConfigured)
        ));
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let settings = MailSettings {
            server: "smtp.example.com".into(),
            port: 587,
            username: Some("sender@example.com".into()),
            password: Some("secret".into()),
            recipient: "not an address".into(),
        };
        assert!(matches!(
            SmtpMailer::from_settings(&settings),
            Err(FeedbackError::Address { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_mailer_always_fails() {
        let error = DisabledMailer.send(&feedback()).await.unwrap_err();
        assert!(matches!(error, FeedbackError::NotConfigured));
    }
}
