//! Alert delivery
//!
//! The worker decides whether and what to send; implementations of
//! [`Notifier`] only deliver. Failed deliveries are reported, never retried.

pub mod twilio;

pub use twilio::TwilioNotifier;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub const MAX_MESSAGE_LENGTH: usize = 1600;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid phone number: {0:?}")]
    InvalidPhone(String),
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Sends a text message to a phone number
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that only records alerts in the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        info!(%phone, "Alert: {}", message);
        Ok(())
    }
}
