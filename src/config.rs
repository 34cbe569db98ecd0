use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::improver::FallbackPolicy;

const DEFAULT_STABILITY_HOST: &str = "https://api.stability.ai";
const DEFAULT_STABILITY_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";
const DEFAULT_GIGACHAT_BASE_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1";
const DEFAULT_GIGACHAT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
const DEFAULT_GIGACHAT_SCOPE: &str = "GIGACHAT_API_PERS";
const DEFAULT_GIGACHAT_MODEL: &str = "GigaChat";

/// How finished images are handed back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// `data:image/png;base64,...` URIs embedded in the job record.
    Inline,
    /// PNG files in the output directory plus a `metadata.json` sidecar.
    Files,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" | "base64" => Ok(Self::Inline),
            "files" | "file" | "disk" => Ok(Self::Files),
            other => Err(format!("expected inline or files, got {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilitySettings {
    pub api_key: Option<String>,
    pub host: String,
    pub engine: String,
    pub steps: u32,
    pub cfg_scale: f32,
}

#[derive(Debug, Clone)]
pub struct GigaChatSettings {
    pub authorization_key: Option<String>,
    /// Fixed `RqUID` header value; a fresh UUID is sent per token request when unset.
    pub rquid: Option<String>,
    pub scope: String,
    pub model: String,
    pub base_url: String,
    pub auth_url: String,
    pub verify_tls: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub stability: StabilitySettings,
    pub gigachat: GigaChatSettings,
    pub output_dir: PathBuf,
    pub delivery: DeliveryMode,
    pub task_ttl: Duration,
    pub queue_capacity: usize,
    pub improve_fallback: FallbackPolicy,
    pub port: u16,
}

impl Settings {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let stability = StabilitySettings {
            api_key: var_any(&["STABILITY_KEY", "Stability_key"]),
            host: var("STABILITY_HOST").unwrap_or_else(|| DEFAULT_STABILITY_HOST.to_string()),
            engine: var("STABILITY_ENGINE").unwrap_or_else(|| DEFAULT_STABILITY_ENGINE.to_string()),
            steps: parse_var("STABILITY_STEPS")?.unwrap_or(30),
            cfg_scale: parse_var("STABILITY_CFG_SCALE")?.unwrap_or(7.0),
        };

        let gigachat = GigaChatSettings {
            authorization_key: var_any(&["GIGACHAT_AUTHORIZATION_KEY", "AUTHORIZATION_KEY"]),
            rquid: var("GIGACHAT_RQUID"),
            scope: var("GIGACHAT_SCOPE").unwrap_or_else(|| DEFAULT_GIGACHAT_SCOPE.to_string()),
            model: var("GIGACHAT_MODEL").unwrap_or_else(|| DEFAULT_GIGACHAT_MODEL.to_string()),
            base_url: var("GIGACHAT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GIGACHAT_BASE_URL.to_string()),
            auth_url: var("GIGACHAT_AUTH_URL")
                .unwrap_or_else(|| DEFAULT_GIGACHAT_AUTH_URL.to_string()),
            verify_tls: parse_bool_var("GIGACHAT_VERIFY_TLS")?.unwrap_or(true),
        };

        let delivery = match var("DELIVERY_MODE") {
            Some(value) => value.parse::<DeliveryMode>().map_err(|reason| ConfigError::Invalid {
                name: "DELIVERY_MODE",
                value,
                reason,
            })?,
            None => DeliveryMode::Inline,
        };

        let improve_fallback = match var("IMPROVE_FALLBACK") {
            Some(value) => value.parse::<FallbackPolicy>().map_err(|reason| ConfigError::Invalid {
                name: "IMPROVE_FALLBACK",
                value,
                reason,
            })?,
            None => FallbackPolicy::Passthrough,
        };

        let queue_capacity: usize = parse_var("QUEUE_CAPACITY")?.unwrap_or(256);
        if queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "QUEUE_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            stability,
            gigachat,
            output_dir: resolve_output_dir(),
            delivery,
            task_ttl: Duration::from_secs(parse_var("TASK_TTL_SECS")?.unwrap_or(3600)),
            queue_capacity,
            improve_fallback,
            port: parse_var("PORT")?.unwrap_or(5000),
        })
    }

    /// Names of the credentials that are not configured.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.stability.api_key.is_none() {
            missing.push("STABILITY_KEY (Stability AI API key)");
        }
        if self.gigachat.authorization_key.is_none() {
            missing.push("GIGACHAT_AUTHORIZATION_KEY (GigaChat)");
        }
        missing
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn var_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| var(name))
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::Invalid {
                name,
                reason: err.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn parse_bool_var(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match var(name) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                name,
                value,
                reason: "expected a boolean".to_string(),
            }),
        },
        None => Ok(None),
    }
}

fn resolve_output_dir() -> PathBuf {
    if let Some(dir) = var("IMAGE_OUTPUT_DIR") {
        return PathBuf::from(dir);
    }
    let mut base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("prompt-studio");
    base
}
