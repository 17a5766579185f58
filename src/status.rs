//! Status classification for service responses.
//!
//! Must run before any other part of the body is read: on failure the body is
//! consumed to look for a structured exception.

use crate::error::{AvsError, Result};
use crate::message::Exception;
use reqwest::StatusCode;

/// Outcome of a successful status check.
#[derive(Debug)]
pub enum Checked {
    /// 200: a multipart body follows.
    Content(reqwest::Response),
    /// 204: nothing to parse; the response is kept for its headers.
    NoContent(reqwest::Response),
}

impl Checked {
    pub fn has_body(&self) -> bool {
        matches!(self, Checked::Content(_))
    }

    pub fn into_response(self) -> reqwest::Response {
        match self {
            Checked::Content(response) | Checked::NoContent(response) => response,
        }
    }
}

/// Classify `response` by status, decoding an exception body on failure.
pub async fn check_status(response: reqwest::Response) -> Result<Checked> {
    match response.status() {
        StatusCode::OK => Ok(Checked::Content(response)),
        StatusCode::NO_CONTENT => Ok(Checked::NoContent(response)),
        status => {
            // A body that cannot be read is treated like an undecodable one.
            let body = response.bytes().await.unwrap_or_default();
            Err(failure(status, &body))
        }
    }
}

/// Build the error for a non-success `status` with the given body.
pub fn failure(status: StatusCode, body: &[u8]) -> AvsError {
    match serde_json::from_slice::<Exception>(body) {
        Ok(exception) if !exception.code().is_empty() => {
            log::debug!("Service exception ({}): {}", status, exception);
            AvsError::Server(exception)
        }
        _ => AvsError::Status(status.to_string()),
    }
}
