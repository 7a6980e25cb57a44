use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),
    #[error("oracle returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("oracle session `{0}` is closed")]
    SessionClosed(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle call was cancelled")]
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Conversational capability the loop consults.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Opens a stateful session seeded with `system_prompt`.
    async fn create_session(
        &self,
        system_prompt: &str,
    ) -> Result<Box<dyn OracleSession>, OracleError>;

    /// Stateless single exchange. Does not create a session.
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, OracleError>;
}

#[async_trait]
pub trait OracleSession: Send + Sync {
    fn id(&self) -> &str;

    /// Sends a user turn and returns the reply; both are kept in the session history.
    async fn prompt(&self, message: &str) -> Result<String, OracleError>;

    /// Adds a turn to the history without asking for a reply.
    async fn append(&self, message: ChatMessage) -> Result<(), OracleError>;

    async fn destroy(&self) -> Result<(), OracleError>;

    /// Streams the reply as fragments. The default yields the whole reply at once.
    async fn prompt_streaming(&self, message: &str) -> Result<TextStream, OracleError> {
        let reply = self.prompt(message).await?;
        Ok(TextStream::from_text(reply))
    }
}

/// A lazy, finite, non-restartable sequence of text fragments.
pub struct TextStream {
    receiver: mpsc::Receiver<Result<String, OracleError>>,
}

pub type FragmentSender = mpsc::Sender<Result<String, OracleError>>;

impl TextStream {
    pub fn channel(buffer: usize) -> (FragmentSender, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let (sender, stream) = Self::channel(1);
        // Capacity is one and the channel is fresh, so this cannot be full.
        let _ = sender.try_send(Ok(text.into()));
        stream
    }

    pub async fn next_fragment(&mut self) -> Option<Result<String, OracleError>> {
        self.receiver.recv().await
    }

    /// Concatenates fragments until the producer finishes. Stops at the first error.
    pub async fn collect_text(mut self) -> Result<String, OracleError> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

/// Owns a live session and makes sure it is destroyed exactly once.
///
/// Call [`SessionGuard::destroy`] on every exit path. If the guard is dropped
/// without that (for example the owning future was aborted), destruction is
/// handed to the current tokio runtime.
pub struct SessionGuard {
    session: Option<Box<dyn OracleSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn OracleSession>) -> Self {
        Self { session: Some(session) }
    }

    pub fn session(&self) -> Result<&dyn OracleSession, OracleError> {
        self.session
            .as_deref()
            .ok_or_else(|| OracleError::SessionClosed("already destroyed".to_string()))
    }

    pub async fn destroy(mut self) -> Result<(), OracleError> {
        match self.session.take() {
            Some(session) => session.destroy().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        warn!(
            event_name = "agent.session.dropped_without_destroy",
            session_id = session.id(),
            "oracle session guard dropped before destroy; scheduling teardown"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(error) = session.destroy().await {
                    warn!(
                        event_name = "agent.session.destroy_failed",
                        session_id = session.id(),
                        error = %error,
                        "deferred oracle session teardown failed"
                    );
                }
            });
        }
    }
}

/// Sending half of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// Receiving half handed to a running loop.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelSignal { receiver })
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = CancelHandle::new();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{
        CancelHandle, CancelSignal, ChatMessage, OracleError, OracleSession, SessionGuard,
        TextStream,
    };

    struct CountingSession {
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OracleSession for CountingSession {
        fn id(&self) -> &str {
            "session-test"
        }

        async fn prompt(&self, message: &str) -> Result<String, OracleError> {
            Ok(format!("echo: {message}"))
        }

        async fn append(&self, _message: ChatMessage) -> Result<(), OracleError> {
            Ok(())
        }

        async fn destroy(&self) -> Result<(), OracleError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stream_concatenates_fragments_until_producer_finishes() {
        let (sender, stream) = TextStream::channel(4);
        tokio::spawn(async move {
            for fragment in ["Hel", "lo", ", world"] {
                if sender.send(Ok(fragment.to_string())).await.is_err() {
                    return;
                }
            }
        });

        assert_eq!(stream.collect_text().await, Ok("Hello, world".to_string()));
    }

    #[tokio::test]
    async fn stream_stops_at_first_error() {
        let (sender, stream) = TextStream::channel(4);
        sender.send(Ok("partial".to_string())).await.expect("send");
        sender.send(Err(OracleError::Request("reset".to_string()))).await.expect("send");
        drop(sender);

        assert_eq!(stream.collect_text().await, Err(OracleError::Request("reset".to_string())));
    }

    #[tokio::test]
    async fn default_streaming_yields_whole_reply() {
        let session = CountingSession { destroyed: Arc::new(AtomicUsize::new(0)) };
        let mut stream = session.prompt_streaming("hi").await.expect("stream");

        assert_eq!(stream.next_fragment().await, Some(Ok("echo: hi".to_string())));
        assert_eq!(stream.next_fragment().await, None);
    }

    #[tokio::test]
    async fn guard_destroys_once_when_destroy_is_called() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let guard = SessionGuard::new(Box::new(CountingSession { destroyed: destroyed.clone() }));

        assert!(guard.session().is_ok());
        guard.destroy().await.expect("destroy");
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_guard_schedules_teardown() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        {
            let _guard =
                SessionGuard::new(Box::new(CountingSession { destroyed: destroyed.clone() }));
        }

        for _ in 0..50 {
            if destroyed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_signal_fires_after_handle_cancels() {
        let (handle, mut signal) = CancelHandle::new();
        assert!(!signal.is_cancelled());

        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("cancellation should resolve");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn never_signal_does_not_fire() {
        let mut signal = CancelSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
