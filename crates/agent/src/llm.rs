//! HTTP-backed oracle for Ollama and OpenAI-compatible chat endpoints.
//!
//! Session history is held client side and replayed on every turn.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_core::config::{OracleConfig, OracleProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::oracle::{ChatMessage, Oracle, OracleError, OracleSession};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Clone)]
pub struct HttpOracle {
    inner: Arc<ChatClient>,
}

struct ChatClient {
    client: Client,
    provider: OracleProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpOracle {
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| OracleError::Request(format!("failed to build http client: {error}")))?;

        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, OracleProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (None, OracleProvider::Ollama) => {
                return Err(OracleError::Request("ollama requires a base_url".to_string()));
            }
        };

        Ok(Self {
            inner: Arc::new(ChatClient {
                client,
                provider: config.provider,
                base_url,
                model: config.model.clone(),
                api_key: config.api_key.clone(),
            }),
        })
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn create_session(
        &self,
        system_prompt: &str,
    ) -> Result<Box<dyn OracleSession>, OracleError> {
        let id = format!("session-{}", Uuid::new_v4());
        info!(
            event_name = "agent.oracle.session_created",
            session_id = %id,
            model = %self.inner.model,
            "opened oracle session"
        );
        Ok(Box::new(HttpSession {
            id,
            client: self.inner.clone(),
            history: Mutex::new(Some(vec![ChatMessage::system(system_prompt)])),
        }))
    }

    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, OracleError> {
        self.inner.chat(&[ChatMessage::system(system_prompt), ChatMessage::user(prompt)]).await
    }
}

impl ChatClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, OracleError> {
        debug!(
            event_name = "agent.oracle.request",
            turns = messages.len(),
            model = %self.model,
            "sending chat request"
        );

        let request = match self.provider {
            OracleProvider::Ollama => self
                .client
                .post(format!("{}/api/chat", self.base_url))
                .json(&ChatRequest { model: &self.model, messages, stream: false }),
            OracleProvider::OpenAi => {
                let request = self
                    .client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .json(&ChatRequest { model: &self.model, messages, stream: false });
                match &self.api_key {
                    Some(key) => request.bearer_auth(key.expose_secret()),
                    None => request,
                }
            }
        };

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                OracleError::Request(format!("chat request timed out: {error}"))
            } else {
                OracleError::Request(format!("chat request failed: {error}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Request(format!(
                "chat endpoint returned {status}: {}",
                truncate(&body, 200)
            )));
        }

        let body = response.text().await.map_err(|error| {
            OracleError::MalformedResponse(format!("failed to read chat response: {error}"))
        })?;
        reply_content(self.provider, &body)
    }
}

pub struct HttpSession {
    id: String,
    client: Arc<ChatClient>,
    /// `None` once destroyed.
    history: Mutex<Option<Vec<ChatMessage>>>,
}

impl HttpSession {
    async fn transcript(&self) -> Result<Vec<ChatMessage>, OracleError> {
        self.history.lock().await.clone().ok_or_else(|| OracleError::SessionClosed(self.id.clone()))
    }
}

#[async_trait]
impl OracleSession for HttpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prompt(&self, message: &str) -> Result<String, OracleError> {
        let mut turns = self.transcript().await?;
        turns.push(ChatMessage::user(message));

        let reply = self.client.chat(&turns).await?;

        let mut history = self.history.lock().await;
        let history = history.as_mut().ok_or_else(|| OracleError::SessionClosed(self.id.clone()))?;
        history.push(ChatMessage::user(message));
        history.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    async fn append(&self, message: ChatMessage) -> Result<(), OracleError> {
        let mut history = self.history.lock().await;
        let history = history.as_mut().ok_or_else(|| OracleError::SessionClosed(self.id.clone()))?;
        history.push(message);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), OracleError> {
        let released = self.history.lock().await.take();
        info!(
            event_name = "agent.oracle.session_destroyed",
            session_id = %self.id,
            turns = released.as_ref().map(Vec::len).unwrap_or(0),
            "closed oracle session"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaReply {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct OpenAiReply {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

fn reply_content(provider: OracleProvider, body: &str) -> Result<String, OracleError> {
    let content = match provider {
        OracleProvider::Ollama => serde_json::from_str::<OllamaReply>(body)
            .map_err(|error| OracleError::MalformedResponse(error.to_string()))?
            .message
            .content,
        OracleProvider::OpenAi => serde_json::from_str::<OpenAiReply>(body)
            .map_err(|error| OracleError::MalformedResponse(error.to_string()))?
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::MalformedResponse("reply had no choices".to_string()))?
            .message
            .content,
    };

    content.ok_or_else(|| OracleError::MalformedResponse("reply message had no content".to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pagepilot_core::config::{OracleConfig, OracleProvider};

    use super::{reply_content, truncate, HttpOracle};
    use crate::oracle::{ChatMessage, Oracle, OracleError};

    fn ollama_config() -> OracleConfig {
        OracleConfig {
            provider: OracleProvider::Ollama,
            api_key: None,
            base_url: Some("http://localhost:11434/".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn ollama_reply_content_is_extracted() {
        let body = r#"{"model":"llama3.1","message":{"role":"assistant","content":"hello"},"done":true}"#;
        assert_eq!(reply_content(OracleProvider::Ollama, body), Ok("hello".to_string()));
    }

    #[test]
    fn openai_reply_uses_first_choice() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"first"}},{"index":1,"message":{"role":"assistant","content":"second"}}]}"#;
        assert_eq!(reply_content(OracleProvider::OpenAi, body), Ok("first".to_string()));
    }

    #[test]
    fn empty_choices_and_missing_content_are_malformed() {
        assert!(matches!(
            reply_content(OracleProvider::OpenAi, r#"{"choices":[]}"#),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(matches!(
            reply_content(OracleProvider::Ollama, r#"{"message":{"role":"assistant"}}"#),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(matches!(
            reply_content(OracleProvider::Ollama, "not json"),
            Err(OracleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn ollama_without_base_url_is_rejected() {
        let mut config = ollama_config();
        config.base_url = None;
        assert!(HttpOracle::from_config(&config).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn destroyed_session_rejects_further_turns() {
        let oracle = HttpOracle::from_config(&ollama_config()).expect("client");
        let session = oracle.create_session("system").await.expect("session");

        session.append(ChatMessage::assistant("noted")).await.expect("append while open");
        session.destroy().await.expect("destroy");

        let error = session.prompt("anything").await.expect_err("closed");
        assert!(matches!(error, OracleError::SessionClosed(_)));
        assert!(matches!(
            session.append(ChatMessage::user("late")).await,
            Err(OracleError::SessionClosed(_))
        ));
    }
}
