use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, info};

use super::{Artifact, GenerationRequest, ImageGenerator};
use crate::config::StabilitySettings;
use crate::error::GenerationError;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
    weight: f32,
}

#[derive(Debug, Serialize)]
struct TextToImageBody<'a> {
    text_prompts: Vec<TextPrompt<'a>>,
    width: u32,
    height: u32,
    steps: u32,
    cfg_scale: f32,
    samples: u32,
    seed: u64,
}

#[derive(Debug, Deserialize)]
struct TextToImageResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Stability AI text-to-image client.
pub struct StabilityClient {
    http: Client,
    settings: StabilitySettings,
}

/// Prefers the JSON `message` field of an error body and falls back to the raw text.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "Unknown error".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

async fn assert_ok_response(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::Upstream {
        status,
        message: upstream_message(&body),
    })
}

impl StabilityClient {
    pub fn new(settings: StabilitySettings) -> Self {
        Self {
            http: Client::new(),
            settings,
        }
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.settings
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredentials("STABILITY_KEY"))
    }

    fn text_to_image_url(&self) -> String {
        format!(
            "{}/v1/generation/{}/text-to-image",
            self.settings.host.trim_end_matches('/'),
            self.settings.engine
        )
    }

    /// Checks the key against the account endpoint.
    pub async fn check_connection(&self) -> Result<(), GenerationError> {
        let response = self
            .http
            .get(format!("{}/v1/account", self.settings.host.trim_end_matches('/')))
            .bearer_auth(self.api_key()?)
            .header(ACCEPT, "application/json")
            .timeout(CHECK_TIMEOUT)
            .send()
            .await?;
        assert_ok_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageGenerator for StabilityClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Artifact>, GenerationError> {
        let mut text_prompts = vec![TextPrompt {
            text: &request.prompt,
            weight: 1.0,
        }];
        if let Some(negative) = request.negative_prompt.as_deref() {
            if !negative.trim().is_empty() {
                text_prompts.push(TextPrompt {
                    text: negative,
                    weight: -1.0,
                });
            }
        }
        let body = TextToImageBody {
            text_prompts,
            width: request.width,
            height: request.height,
            steps: self.settings.steps,
            cfg_scale: self.settings.cfg_scale,
            samples: request.samples,
            seed: 0,
        };

        debug!(
            engine = %self.settings.engine,
            width = request.width,
            height = request.height,
            samples = request.samples,
            "calling text-to-image"
        );
        let response = self
            .http
            .post(self.text_to_image_url())
            .bearer_auth(self.api_key()?)
            .header(ACCEPT, "application/json")
            .json(&body)
            .timeout(GENERATION_TIMEOUT)
            .send()
            .await?;

        let response = assert_ok_response(response).await?;
        let payload: TextToImageResponse = response.json().await?;
        info!(artifacts = payload.artifacts.len(), "text-to-image returned");
        Ok(payload.artifacts)
    }
}
