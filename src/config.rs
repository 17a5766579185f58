use crate::error::{AvsError, Result};
use secrecy::SecretBox;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ENDPOINT_URL: &str = "https://avs-alexa-na.amazon.com/v20160207";
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-amzn-requestid";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
    #[error("Invalid access token: {0}")]
    InvalidToken(String),
}

impl From<ConfigError> for AvsError {
    fn from(err: ConfigError) -> Self {
        AvsError::Config(err.to_string())
    }
}

/// Settings shared by every operation of a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL; `/events`, `/directives` and `/ping` are appended to it.
    pub endpoint_url: Url,
    pub user_agent: String,
    /// Response header carrying the request identifier.
    pub request_id_header: String,
    /// Chunks buffered between the audio producer and the transport.
    pub conduit_capacity: usize,
    pub audio_chunk_size: usize,
    /// Only connection setup is bounded; downchannels stay open indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: Url::parse(DEFAULT_ENDPOINT_URL).expect("default endpoint is a valid URL"),
            user_agent: format!("avs-client/{}", env!("CARGO_PKG_VERSION")),
            request_id_header: DEFAULT_REQUEST_ID_HEADER.to_string(),
            conduit_capacity: 8,
            audio_chunk_size: 4096,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint_url: &str) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            endpoint_url: parse_url("endpoint_url", endpoint_url)?,
            ..Default::default()
        })
    }

    /// Load overrides from the environment (and `.env`, if present).
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = env::var("AVS_ENDPOINT_URL") {
            config.endpoint_url = parse_url("AVS_ENDPOINT_URL", &url)?;
        }
        if let Ok(user_agent) = env::var("AVS_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Ok(capacity) = env::var("AVS_CONDUIT_CAPACITY") {
            config.conduit_capacity = match capacity.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "AVS_CONDUIT_CAPACITY".to_string(),
                        reason: "expected a positive integer".to_string(),
                    })
                }
            };
        }

        log::info!("Using voice service endpoint {}", config.endpoint_url);
        Ok(config)
    }

    /// Full URL for an operation path.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.endpoint_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| AvsError::Config(format!("invalid endpoint for {}: {}", path, e)))
    }
}

fn parse_url(var: &str, value: &str) -> std::result::Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Load the access token from `AVS_ACCESS_TOKEN`.
pub fn load_access_token() -> std::result::Result<SecretBox<String>, ConfigError> {
    dotenvy::dotenv().ok();

    let token = env::var("AVS_ACCESS_TOKEN")
        .map_err(|_| ConfigError::MissingEnvVar("AVS_ACCESS_TOKEN".to_string()))?;
    if token.trim().is_empty() {
        return Err(ConfigError::InvalidToken(
            "access token cannot be empty".to_string(),
        ));
    }

    Ok(SecretBox::new(Box::new(token)))
}
