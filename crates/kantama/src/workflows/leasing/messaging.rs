use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outbound e-mail ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub cc: Vec<String>,
}

/// Transport seam for e-mail delivery (SMTP, provider API, log sink).
pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("recipient rejected: {0}")]
    Rejected(String),
}

/// Outcome reported to callers; failures never propagate as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
}

impl Delivery {
    pub fn is_sent(self) -> bool {
        self == Delivery::Sent
    }
}

/// Wraps a [`Mailer`] so that delivery problems are logged and reported as
/// [`Delivery::Failed`] instead of failing the surrounding operation.
pub struct MessagingGateway<M> {
    mailer: Arc<M>,
}

impl<M> Clone for MessagingGateway<M> {
    fn clone(&self) -> Self {
        Self {
            mailer: Arc::clone(&self.mailer),
        }
    }
}

impl<M: Mailer> MessagingGateway<M> {
    pub fn new(mailer: Arc<M>) -> Self {
        Self { mailer }
    }

    pub fn send_email(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: Option<&str>,
        cc: &[String],
    ) -> Delivery {
        if to.trim().is_empty() {
            warn!(subject, "skipping e-mail without recipient");
            return Delivery::Failed;
        }

        let message = EmailMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            text_body: text_body.map(str::to_string),
            cc: cc.to_vec(),
        };

        match self.mailer.send(&message) {
            Ok(()) => {
                info!(to, subject, "e-mail sent");
                Delivery::Sent
            }
            Err(error) => {
                warn!(to, subject, %error, "e-mail delivery failed");
                Delivery::Failed
            }
        }
    }
}

/// Development transport that only logs the envelope.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            cc = message.cc.len(),
            "e-mail transport disabled; message logged only"
        );
        Ok(())
    }
}
