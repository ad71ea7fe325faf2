//! Remote processing backend client.
//!
//! The relay forwards user text to `POST <base>/process` and returns the
//! `output` field of the JSON reply. Every failure class maps to a
//! user-safe retry-later string; the caller skips quota consumption
//! whenever this call fails.

use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{AppError, Result};

const PROCESS_TIMEOUT: Duration = Duration::from_secs(60);
const RESET_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("backend network error: {0}")]
    Network(String),
    #[error("backend returned an unreadable response")]
    BadPayload,
    #[error("backend returned an empty output")]
    EmptyOutput,
}

impl BackendError {
    /// What the user sees. Raw error details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Timeout => {
                "❌ The backend took too long to answer. Try again later or simplify the request."
                    .to_string()
            }
            BackendError::Status(code) => {
                format!("❌ Backend error: status {code}. Try again later.")
            }
            BackendError::Network(_) => {
                "❌ Could not reach the processing backend. Try again later.".to_string()
            }
            BackendError::BadPayload => {
                "❌ Could not read the backend response. Try again later.".to_string()
            }
            BackendError::EmptyOutput => {
                "❌ The backend answered, but the reply was empty. Try rephrasing your request."
                    .to_string()
            }
        }
    }
}

/// The seam the relay talks through. Tests substitute a scripted stub;
/// production uses [`HttpBackend`].
pub trait Backend {
    fn process(
        &self,
        input: &str,
        user_id: i64,
    ) -> impl Future<Output = std::result::Result<String, BackendError>> + Send;

    /// Drop the conversation history kept on the backend side. Best
    /// effort: failures are reported as `false`, never surfaced.
    fn reset_dialog(&self, user_id: i64) -> impl Future<Output = bool> + Send;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    framework: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, framework: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            framework: framework.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn classify(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(e.to_string())
    }
}

impl Backend for HttpBackend {
    async fn process(&self, input: &str, user_id: i64) -> std::result::Result<String, BackendError> {
        let url = self.endpoint("process");
        tracing::debug!(user_id, %url, "forwarding message to backend");

        let response = self
            .client
            .post(&url)
            .timeout(PROCESS_TIMEOUT)
            .json(&json!({
                "framework": self.framework,
                "input": input,
                "user_id": user_id.to_string(),
                "state": { "chat_id": user_id.to_string() },
            }))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(user_id, status = status.as_u16(), "backend returned non-200");
            return Err(BackendError::Status(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(|e| {
            tracing::error!(user_id, error = %e, "unparseable backend response");
            BackendError::BadPayload
        })?;

        match body.get("output").and_then(Value::as_str) {
            Some(output) if !output.is_empty() => Ok(output.to_string()),
            _ => {
                tracing::warn!(user_id, "backend returned empty output");
                Err(BackendError::EmptyOutput)
            }
        }
    }

    async fn reset_dialog(&self, user_id: i64) -> bool {
        let url = self.endpoint("reset_dialog");

        let response = self
            .client
            .post(&url)
            .timeout(RESET_TIMEOUT)
            .json(&json!({
                "framework": self.framework,
                "user_id": user_id.to_string(),
            }))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::error!(user_id, status = r.status().as_u16(), "reset_dialog failed");
                return false;
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "reset_dialog request error");
                return false;
            }
        };

        match response.json::<Value>().await {
            Ok(body) => body.get("status").and_then(Value::as_str) == Some("ok"),
            Err(e) => {
                tracing::error!(user_id, error = %e, "unparseable reset_dialog response");
                false
            }
        }
    }
}
