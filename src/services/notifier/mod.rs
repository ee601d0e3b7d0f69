use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("admin notifications are not configured")]
    NotConfigured,
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("notification rejected with status {status}: {body}")]
    Api { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Outbound channel to the panel administrators.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn send_message_with_admin(&self, text: &str, markdown: bool) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod mock;
mod telegram;

#[cfg(test)]
pub use mock::MockNotifier;
pub use telegram::TelegramNotifier;
