use crate::services::notifier::{AdminNotifier, NotifyError};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotice {
    pub text: String,
    pub markdown: bool,
}

/// A notifier that records messages for testing purposes.
#[derive(Debug, Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<RecordedNotice>>,
    pub fail_send: bool,
    /// Sleeps before recording, to exercise the dispatch timeout.
    pub delay: Option<Duration>,
}

impl MockNotifier {
    pub fn failing() -> Self {
        Self {
            fail_send: true,
            ..Default::default()
        }
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|notice| notice.text.clone())
            .collect()
    }
}

#[async_trait]
impl AdminNotifier for MockNotifier {
    async fn send_message_with_admin(&self, text: &str, markdown: bool) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_send {
            return Err(NotifyError::Transport("mock failure".into()));
        }
        self.sent.lock().unwrap().push(RecordedNotice {
            text: text.to_string(),
            markdown,
        });
        Ok(())
    }
}
