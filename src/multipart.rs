//! Multipart codec: JSON form fields on the way out, sequential part reading
//! on the way in.

use crate::error::{AvsError, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use mime::Mime;
use reqwest::multipart::{Form, Part as FormPart};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Serialize `value` to JSON and append it to `form` as the field `name`.
pub fn encode_json<T: Serialize + ?Sized>(form: Form, name: &str, value: &T) -> Result<Form> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AvsError::Encoding(format!("failed to serialize {}: {}", name, e)))?;
    let part = FormPart::bytes(json)
        .mime_str(JSON_CONTENT_TYPE)
        .map_err(|e| AvsError::Encoding(format!("failed to build {} part: {}", name, e)))?;
    Ok(form.part(name.to_string(), part))
}

/// Extract the boundary from a multipart content type.
pub fn boundary(content_type: Option<&str>) -> Result<String> {
    let content_type =
        content_type.ok_or_else(|| AvsError::Protocol("missing content type".to_string()))?;
    let media: Mime = content_type.parse().map_err(|e| {
        AvsError::Protocol(format!("malformed content type {:?}: {}", content_type, e))
    })?;
    if media.type_() != mime::MULTIPART {
        return Err(AvsError::Protocol(format!(
            "expected multipart content, got {}",
            media.essence_str()
        )));
    }
    media
        .get_param(mime::BOUNDARY)
        .map(|b| b.as_str().to_string())
        .ok_or_else(|| AvsError::Protocol(format!("no boundary in {:?}", content_type)))
}

/// Strip the enclosing delimiters (`<...>`) from a Content-ID value.
pub fn strip_content_id(raw: &str) -> Result<&str> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(_), Some(_)) => Ok(chars.as_str()),
        _ => Err(AvsError::Protocol(format!("malformed Content-ID {:?}", raw))),
    }
}

/// One fully drained part of a multipart message.
#[derive(Debug, Clone)]
pub struct Part {
    headers: HeaderMap,
    name: Option<String>,
    file_name: Option<String>,
    body: Bytes,
}

impl Part {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Form field name from `Content-Disposition`, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Declared media type; `None` when missing or unparseable.
    pub fn media_type(&self) -> Option<Mime> {
        self.headers
            .get(CONTENT_TYPE)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    pub fn is_json(&self) -> bool {
        self.media_type()
            .map(|m| m.type_() == mime::APPLICATION && m.subtype() == mime::JSON)
            .unwrap_or(false)
    }

    /// Raw `Content-ID` header value, delimiters included.
    pub fn content_id(&self) -> Option<&str> {
        self.headers
            .get("content-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Sequential reader over the parts of one multipart body.
///
/// Parts share the underlying byte stream, so each one is drained before the
/// next is requested.
///
/// A transport error ends the byte stream as seen by the parser and is held
/// back, so parts already received are still returned before it.
pub struct PartReader {
    multipart: multer::Multipart<'static>,
    failure: Arc<Mutex<Option<String>>>,
}

impl PartReader {
    pub fn new<S, O, E>(content_type: Option<&str>, stream: S) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let boundary = boundary(content_type)?;
        let failure = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&failure);
        let chunks = stream.scan((), move |_, item| {
            let next = match item {
                Ok(chunk) => Some(Ok::<Bytes, Infallible>(chunk.into())),
                Err(e) => {
                    let e: Box<dyn std::error::Error + Send + Sync> = e.into();
                    if let Ok(mut failure) = slot.lock() {
                        *failure = Some(e.to_string());
                    }
                    None
                }
            };
            futures_util::future::ready(next)
        });

        Ok(Self {
            multipart: multer::Multipart::new(chunks, boundary),
            failure,
        })
    }

    /// Reader over an HTTP response body, using its `Content-Type` boundary.
    pub fn from_response(response: reqwest::Response) -> Result<Self> {
        let content_type = match response.headers().get(CONTENT_TYPE) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| AvsError::Protocol("non-ASCII content type".to_string()))?
                    .to_string(),
            ),
            None => None,
        };
        Self::new(content_type.as_deref(), response.bytes_stream())
    }

    /// Next part, or `None` once the body is exhausted.
    pub async fn next_part(&mut self) -> Result<Option<Part>> {
        match self.read_part().await {
            Ok(Some(part)) => Ok(Some(part)),
            other => match self.take_failure() {
                Some(cause) => Err(AvsError::Stream(cause)),
                None => other,
            },
        }
    }

    fn take_failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|mut failure| failure.take())
    }

    async fn read_part(&mut self) -> Result<Option<Part>> {
        let Some(field) = self.multipart.next_field().await? else {
            return Ok(None);
        };
        let headers = field.headers().clone();
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let body = field.bytes().await?;
        Ok(Some(Part {
            headers,
            name,
            file_name,
            body,
        }))
    }

    /// Lazy sequence of parts. Ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Part>> + Send {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_part().await {
                Ok(Some(part)) => Some((Ok(part), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
