//! HTTP client for the assistant backend's request/response API
//!
//! This is the fallback delivery path: when the realtime channel is not
//! connected, each turn becomes one `POST /chat/message` call. The client
//! also covers the session listing/history/deletion endpoints and the
//! health probe that drives the backend-availability banner.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::types::{Role, Source};

/// Response from POST /chat/message
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    /// Assistant reply text
    pub message: String,
    /// Citations used for the reply
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Session the reply belongs to
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One entry from GET /chat/history/{session_id}
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
}

/// Response from GET /chat/history/{session_id}
#[derive(Debug, Clone, Deserialize)]
pub struct ChatHistory {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

/// Response from GET /chat/sessions
#[derive(Debug, Deserialize)]
struct SessionsResponse {
    #[serde(default)]
    sessions: Vec<String>,
}

/// HTTP client for the backend chat API
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.http_base().to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Deliver one turn over the fallback channel and return the reply.
    pub async fn send_message(&self, request: &SendMessageRequest<'_>) -> Result<ChatReply> {
        let url = format!("{}/chat/message", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let reply: ChatReply = response
                .json()
                .await
                .map_err(|e| Error::RequestFailed(format!("failed to parse response: {}", e)))?;
            Ok(reply)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::RequestFailed(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// List session ids known to the backend.
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        let url = format!("{}/chat/sessions", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let result: SessionsResponse = response
                .json()
                .await
                .map_err(|e| Error::RequestFailed(format!("failed to parse response: {}", e)))?;
            Ok(result.sessions)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::RequestFailed(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Fetch the server-side transcript for a session.
    ///
    /// Returns None if the backend has no history for the session.
    pub async fn history(&self, session_id: &str) -> Result<Option<ChatHistory>> {
        let url = format!(
            "{}/chat/history/{}",
            self.base_url,
            urlencoding::encode(session_id)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let history: ChatHistory = response
                .json()
                .await
                .map_err(|e| Error::RequestFailed(format!("failed to parse response: {}", e)))?;
            Ok(Some(history))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::RequestFailed(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Delete a session on the backend.
    ///
    /// Returns true on success, false if the session did not exist.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let url = format!(
            "{}/chat/sessions/{}",
            self.base_url,
            urlencoding::encode(session_id)
        );

        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::RequestFailed(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Check whether the backend is reachable.
    ///
    /// Any failure reads as unavailable; this never errors.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// Request body for POST /chat/message
#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    /// User turn text
    pub message: &'a str,
    /// Session the turn belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    /// Whether retrieval should include web content
    pub include_web: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_valid_config() {
        let config = ServerConfig {
            http_base: "not-a-url".to_string(),
            ws_base: None,
            timeout_secs: 30,
        };
        assert!(BackendClient::new(&config).is_err());
    }

    #[test]
    fn test_client_with_valid_config() {
        let config = ServerConfig::default();
        assert!(BackendClient::new(&config).is_ok());
    }

    #[test]
    fn test_send_message_request_shape() {
        let request = SendMessageRequest {
            message: "help",
            session_id: Some("s1"),
            include_web: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"], "help");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["include_web"], true);

        let request = SendMessageRequest {
            message: "help",
            session_id: None,
            include_web: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_chat_reply_parses_with_and_without_sources() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"message":"Hello","sources":[],"session_id":"s1"}"#,
        )
        .unwrap();
        assert_eq!(reply.message, "Hello");
        assert!(reply.sources.is_empty());
        assert_eq!(reply.session_id.as_deref(), Some("s1"));

        let reply: ChatReply = serde_json::from_str(r#"{"message":"Hello"}"#).unwrap();
        assert!(reply.sources.is_empty());
        assert!(reply.session_id.is_none());
    }
}
