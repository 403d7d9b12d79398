//! C7 — LLM client. OAuth-style token lifecycle: an access token is
//! exchanged once via Basic auth + scope, cached until it nears expiry, and
//! refreshed single-flight so concurrent callers share one exchange instead
//! of stampeding the auth endpoint.

use crate::config::LlmConfig;
use crate::error::LlmError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum TokenState {
    Unauthenticated,
    Authenticated { token: String, expires_at: DateTime<Utc> },
}

/// Talks to the configured LLM endpoint, handling its own OAuth-style
/// access-token exchange and refresh.
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    state: RwLock<TokenState>,
}

#[derive(Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct OauthResponse {
    access_token: String,
    expires_at: i64,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .map_err(LlmError::Network)?;
        Ok(LlmClient {
            client,
            config,
            state: RwLock::new(TokenState::Unauthenticated),
        })
    }

    /// Returns a valid bearer token, refreshing it if absent or near expiry.
    /// Concurrent callers serialize on the write lock during refresh, so a
    /// single exchange satisfies everyone waiting (single-flight).
    async fn ensure_token(&self) -> Result<String, LlmError> {
        {
            let state = self.state.read().await;
            if let TokenState::Authenticated { token, expires_at } = &*state {
                let margin = chrono::Duration::seconds(self.config.token_refresh_margin_sec);
                if *expires_at - margin > Utc::now() {
                    return Ok(token.clone());
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, LlmError> {
        let mut state = self.state.write().await;
        // Another waiter may have refreshed while we queued for the lock.
        if let TokenState::Authenticated { token, expires_at } = &*state {
            let margin = chrono::Duration::seconds(self.config.token_refresh_margin_sec);
            if *expires_at - margin > Utc::now() {
                return Ok(token.clone());
            }
        }

        debug!("exchanging credential for a fresh LLM access token");
        let response = self
            .client
            .post(&self.config.auth_endpoint)
            .header("Authorization", format!("Basic {}", self.config.credential))
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .form(&[("scope", self.config.scope.as_str())])
            .send()
            .await
            .map_err(LlmError::Network)?;

        if !response.status().is_success() {
            return Err(LlmError::Auth(format!(
                "token exchange failed with status {}",
                response.status()
            )));
        }

        let body: OauthResponse = response.json().await.map_err(LlmError::Network)?;
        let expires_at = DateTime::from_timestamp(body.expires_at, 0).unwrap_or_else(Utc::now);

        *state = TokenState::Authenticated {
            token: body.access_token.clone(),
            expires_at,
        };
        Ok(body.access_token)
    }

    /// Sends `prompt` to the LLM and returns `(text, tokens_used)`. On a
    /// 401-equivalent response, forces one token refresh and retries the
    /// call exactly once before giving up.
    pub async fn generate(&self, prompt: &str) -> Result<(String, u32), LlmError> {
        let token = self.ensure_token().await?;
        match self.send_once(prompt, &token).await {
            Err(LlmError::Auth(_)) => {
                warn!("LLM request unauthorized, forcing token refresh and retrying once");
                *self.state.write().await = TokenState::Unauthenticated;
                let token = self.refresh_token().await?;
                self.send_once(prompt, &token).await
            }
            other => other,
        }
    }

    async fn send_once(&self, prompt: &str, token: &str) -> Result<(String, u32), LlmError> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(LlmError::Auth("access token rejected".to_string()));
        }
        if status == reqwest::StatusCode::REQUEST_TIMEOUT {
            return Err(LlmError::Timeout);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(LlmError::Network)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let tokens_used = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok((text, tokens_used))
    }

    /// Lightweight liveness probe: confirms a token can be obtained without
    /// issuing a generation request.
    pub async fn health_check(&self) -> bool {
        self.ensure_token().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(auth_endpoint: String, endpoint: String) -> LlmConfig {
        LlmConfig {
            endpoint,
            auth_endpoint,
            scope: "TEST_SCOPE".to_string(),
            credential: "dGVzdDp0ZXN0".to_string(),
            max_tokens: 256,
            temperature: 0.3,
            timeout_sec: 5,
            token_refresh_margin_sec: 30,
        }
    }

    #[tokio::test]
    async fn exchanges_token_and_generates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_at": Utc::now().timestamp() + 3600,
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello"}}],
                "usage": {"total_tokens": 10},
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(test_config(
            format!("{}/oauth", server.uri()),
            format!("{}/chat", server.uri()),
        ))
        .unwrap();

        let (text, tokens) = client.generate("hi").await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(tokens, 10);
    }

    #[tokio::test]
    async fn retries_once_after_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_at": Utc::now().timestamp() + 3600,
            })))
            .mount(&server)
            .await;

        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(move |_: &wiremock::Request| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    ResponseTemplate::new(401)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "choices": [{"message": {"content": "recovered"}}],
                        "usage": {"total_tokens": 5},
                    }))
                }
            })
            .mount(&server)
            .await;

        let client = LlmClient::new(test_config(
            format!("{}/oauth", server.uri()),
            format!("{}/chat", server.uri()),
        ))
        .unwrap();

        let (text, _) = client.generate("hi").await.unwrap();
        assert_eq!(text, "recovered");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_flight_refresh_under_concurrency() {
        let server = MockServer::start().await;
        let oauth_calls = Arc::new(AtomicUsize::new(0));
        let counter = oauth_calls.clone();
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .respond_with(move |_: &wiremock::Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "tok-shared",
                    "expires_at": Utc::now().timestamp() + 3600,
                }))
            })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}],
                "usage": {"total_tokens": 1},
            })))
            .mount(&server)
            .await;

        let client = Arc::new(
            LlmClient::new(test_config(
                format!("{}/oauth", server.uri()),
                format!("{}/chat", server.uri()),
            ))
            .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..20 {
            let client = client.clone();
            handles.push(tokio::spawn(async move { client.generate("hi").await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(oauth_calls.load(Ordering::SeqCst), 1);
    }
}
