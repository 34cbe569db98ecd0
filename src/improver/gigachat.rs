use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ImproveOutcome, PromptImprover};
use crate::config::GigaChatSettings;
use crate::error::ImproveError;

const TOKEN_LEASE: Duration = Duration::from_secs(25 * 60);
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;

const SYSTEM_PROMPT: &str = concat!(
    "You are an expert at writing prompts for AI image generation.\n",
    "Improve and sharpen the user's prompt by adding:\n",
    "1. Details of the environment and atmosphere\n",
    "2. A description of the lighting\n",
    "3. An artistic style (if none is given)\n",
    "4. Quality and composition hints\n\n",
    "IMPORTANT: reply ONLY with the improved prompt in ENGLISH, without explanations or extra text.\n",
    "The prompt should be detailed but not too long (150-300 words)."
);

fn build_user_prompt(prompt: &str) -> String {
    format!(
        "Improve this prompt for image generation:\n\n{prompt}\n\n\
Make it more specific, add details and translate it into English."
    )
}

/// Strips whitespace and any surrounding quotation marks the model wraps its answer in.
pub fn clean_completion(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn leased(value: String, now: Instant) -> Self {
        Self {
            value,
            expires_at: now + TOKEN_LEASE,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// GigaChat chat-completions client with a cached OAuth bearer token.
pub struct GigaChatClient {
    http: Client,
    settings: GigaChatSettings,
    token: Mutex<Option<CachedToken>>,
}

async fn assert_ok_response(response: reqwest::Response) -> Result<reqwest::Response, ImproveError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ImproveError::Api { status, message })
}

impl GigaChatClient {
    pub fn new(settings: GigaChatSettings) -> Result<Self, ImproveError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()?;
        Ok(Self {
            http,
            settings,
            token: Mutex::new(None),
        })
    }

    /// Returns a bearer token, refreshing it once the lease has run out.
    /// The lock is held across the refresh so concurrent callers share one request.
    async fn access_token(&self) -> Result<String, ImproveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let key = self
            .settings
            .authorization_key
            .as_deref()
            .ok_or(ImproveError::MissingCredentials("GIGACHAT_AUTHORIZATION_KEY"))?;
        let rquid = self
            .settings
            .rquid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(auth_url = %self.settings.auth_url, "requesting GigaChat access token");
        let response = self
            .http
            .post(&self.settings.auth_url)
            .header(AUTHORIZATION, format!("Basic {key}"))
            .header(ACCEPT, "application/json")
            .header("RqUID", rquid)
            .form(&[("scope", self.settings.scope.as_str())])
            .timeout(AUTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| ImproveError::Auth(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ImproveError::Auth(format!("{status} {text}")));
        }
        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| ImproveError::Auth(err.to_string()))?;
        let value = payload
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ImproveError::Auth("response carried no access_token".to_string()))?;

        *cached = Some(CachedToken::leased(value.clone(), Instant::now()));
        info!("GigaChat access token refreshed");
        Ok(value)
    }

    pub async fn improve_prompt(&self, prompt: &str) -> Result<String, ImproveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(&json!({
                "model": self.settings.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": build_user_prompt(prompt)}
                ],
                "temperature": TEMPERATURE,
                "max_tokens": MAX_TOKENS
            }))
            .timeout(COMPLETION_TIMEOUT)
            .send()
            .await?;

        let response = assert_ok_response(response).await?;
        let payload: ChatCompletionResponse = response.json().await?;
        let content = payload
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|msg| msg.content)
            .ok_or(ImproveError::EmptyResponse)?;

        let improved = clean_completion(&content);
        if improved.is_empty() {
            return Err(ImproveError::EmptyResponse);
        }
        Ok(improved)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ImproveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/models", self.settings.base_url))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .timeout(AUTH_TIMEOUT)
            .send()
            .await?;
        let response = assert_ok_response(response).await?;
        let payload: ModelList = response.json().await?;
        Ok(payload.data)
    }

    /// Acquires a token and lists models; returns the model count.
    pub async fn check_connection(&self) -> Result<usize, ImproveError> {
        Ok(self.list_models().await?.len())
    }
}

#[async_trait]
impl PromptImprover for GigaChatClient {
    async fn improve(&self, text: &str) -> ImproveOutcome {
        match self.improve_prompt(text).await {
            Ok(improved) => ImproveOutcome::success(improved),
            Err(err) => {
                warn!(error = %err, "prompt improvement failed");
                ImproveOutcome::failure(text)
            }
        }
    }
}
