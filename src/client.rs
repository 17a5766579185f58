use crate::config::ClientConfig;
use crate::downchannel::{Downchannel, DIRECTIVES_PATH};
use crate::error::{AvsError, Result};
use crate::exchange::{self, Request, Response};
use crate::status::{self, Checked};
use serde::Serialize;

pub const PING_PATH: &str = "/ping";

/// Entry point for all operations against one service endpoint.
///
/// Cheap to clone and safe to share: every call owns its own request,
/// conduit and buffers, while connections come from the shared
/// [`reqwest::Client`] pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    /// Use an existing HTTP client, e.g. one with custom TLS or proxy setup.
    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Post an event and parse the multipart response.
    ///
    /// Audio, when present, is streamed while the request is in flight.
    pub async fn send<M: Serialize>(&self, request: Request<M>) -> Result<Response> {
        exchange::send(&self.http, &self.config, request).await
    }

    /// Open the downchannel for `token`.
    ///
    /// A non-success status is returned as an error. A `204` yields a
    /// downchannel that has already ended.
    pub async fn open_downchannel(&self, token: &str) -> Result<Downchannel> {
        if token.is_empty() {
            return Err(AvsError::MissingToken);
        }

        let url = self.config.endpoint(DIRECTIVES_PATH)?;
        log::info!("Downchannel: opening {}", url);
        let response = self.http.get(url).bearer_auth(token).send().await?;

        match status::check_status(response).await? {
            Checked::Content(response) => Ok(Downchannel::spawn(response)),
            Checked::NoContent(_) => {
                log::info!("Downchannel: server returned no content");
                Ok(Downchannel::ended())
            }
        }
    }

    /// Check that the session for `token` is alive.
    pub async fn ping(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(AvsError::MissingToken);
        }

        let url = self.config.endpoint(PING_PATH)?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        status::check_status(response).await?;
        log::debug!("Ping: ok");
        Ok(())
    }
}
