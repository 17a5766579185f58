//! Event exchange: one multipart request out, one multipart response back.

use crate::audio::{self, AudioSource, Producer};
use crate::config::ClientConfig;
use crate::error::{AvsError, Result};
use crate::message::{self, Directive};
use crate::multipart::{self, PartReader};
use crate::status::{self, Checked};
use bytes::Bytes;
use reqwest::multipart::{Form, Part as FormPart};
use secrecy::{ExposeSecret, SecretBox};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio::io::AsyncRead;

pub const EVENTS_PATH: &str = "/events";
pub const METADATA_FIELD: &str = "metadata";
pub const AUDIO_FIELD: &str = "audio";
pub const AUDIO_FILE_NAME: &str = "audio.wav";

/// An event to send: access token, metadata document and optional audio.
pub struct Request<M = Value> {
    token: SecretBox<String>,
    metadata: M,
    audio: Option<AudioSource>,
}

impl<M: Serialize> Request<M> {
    pub fn new(token: impl Into<String>, metadata: M) -> Self {
        Self {
            token: SecretBox::new(Box::new(token.into())),
            metadata,
            audio: None,
        }
    }

    /// Stream `audio` as the `audio` form file. It is read once, to the end.
    pub fn with_audio(mut self, audio: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.audio = Some(Box::new(audio));
        self
    }

    pub fn with_audio_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.audio = Some(audio::from_bytes(data));
        self
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

impl<M: fmt::Debug> fmt::Debug for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("token", &"[REDACTED]")
            .field("metadata", &self.metadata)
            .field("audio", &self.audio.is_some())
            .finish()
    }
}

/// Parsed result of an event exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub request_id: String,
    /// Directives in arrival order.
    pub directives: Vec<Directive>,
    /// Attachments keyed by Content-ID, delimiters stripped.
    pub content: HashMap<String, Bytes>,
}

impl Response {
    pub fn empty(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    /// Look up an attachment by id. Accepts the `cid:` form used inside
    /// directive payloads.
    pub fn content(&self, id: &str) -> Option<&Bytes> {
        self.content.get(id.strip_prefix("cid:").unwrap_or(id))
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.content.is_empty()
    }
}

pub(crate) async fn send<M: Serialize>(
    http: &reqwest::Client,
    config: &ClientConfig,
    request: Request<M>,
) -> Result<Response> {
    let Request {
        token,
        metadata,
        audio,
    } = request;
    if token.expose_secret().is_empty() {
        return Err(AvsError::MissingToken);
    }

    let url = config.endpoint(EVENTS_PATH)?;
    let mut form = multipart::encode_json(Form::new(), METADATA_FIELD, &metadata)?;

    let mut producer = None;
    if let Some(audio) = audio {
        let (body, conduit) =
            audio::spawn_conduit(audio, config.conduit_capacity, config.audio_chunk_size);
        let part = FormPart::stream(body)
            .file_name(AUDIO_FILE_NAME)
            .mime_str("application/octet-stream")
            .map_err(|e| AvsError::Encoding(format!("failed to build audio part: {}", e)))?;
        form = form.part(AUDIO_FIELD, part);
        producer = Some(conduit);
    }

    log::debug!("Exchange: posting event to {}", url);
    let sent = http
        .post(url)
        .bearer_auth(token.expose_secret())
        .multipart(form)
        .send()
        .await;

    let response = match sent {
        Ok(response) => response,
        // A failed audio read aborts the body, so it explains the transport error.
        Err(e) => return Err(producer.and_then(Producer::abort).unwrap_or(e.into())),
    };

    let request_id = request_id(&response, &config.request_id_header);
    let checked = match status::check_status(response).await {
        Ok(checked) => checked,
        Err(e) => {
            if let Some(producer) = producer {
                producer.abort();
            }
            return Err(e);
        }
    };

    let result = parse_checked(checked, request_id).await;
    if let Some(producer) = producer {
        settle(producer).await?;
    }
    result
}

/// Surface an audio read failure once the response is in. A producer still
/// waiting on its source is stopped instead.
async fn settle(producer: Producer) -> Result<()> {
    if producer.is_finished() {
        producer.finish().await?;
    } else {
        log::debug!("Exchange: response complete before audio source ended");
        producer.abort();
    }
    Ok(())
}

fn request_id(response: &reqwest::Response, request_id_header: &str) -> String {
    response
        .headers()
        .get(request_id_header)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Classify and parse an event response into directives and content.
pub async fn parse_response(
    response: reqwest::Response,
    request_id_header: &str,
) -> Result<Response> {
    let request_id = request_id(&response, request_id_header);
    let checked = status::check_status(response).await?;
    parse_checked(checked, request_id).await
}

async fn parse_checked(checked: Checked, request_id: String) -> Result<Response> {
    let response = match checked {
        Checked::Content(response) => response,
        Checked::NoContent(_) => {
            log::debug!("Exchange: empty response for request {:?}", request_id);
            return Ok(Response::empty(request_id));
        }
    };

    let mut parts = PartReader::from_response(response)?;
    let mut result = Response::empty(request_id);

    while let Some(part) = parts.next_part().await? {
        let content_id = match part.content_id() {
            Some(raw) => Some(multipart::strip_content_id(raw)?.to_string()),
            None => None,
        };

        if let Some(id) = content_id {
            log::debug!("Exchange: content {:?} ({} bytes)", id, part.body().len());
            result.content.insert(id, part.into_body());
        } else if part.is_json() {
            result.directives.push(message::decode_envelope(part.body())?);
        } else {
            return Err(AvsError::Protocol(format!(
                "unhandled part {:?}",
                part.headers()
            )));
        }
    }

    log::debug!(
        "Exchange: request {:?} returned {} directives, {} attachments",
        result.request_id,
        result.directives.len(),
        result.content.len()
    );
    Ok(result)
}
