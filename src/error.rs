use crate::message::Exception;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AvsError>;

#[derive(Error, Debug)]
pub enum AvsError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server exception: {0}")]
    Server(Exception),

    /// Non-success status without a decodable exception body.
    #[error("request failed with {0}")]
    Status(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Missing access token")]
    MissingToken,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AvsError {
    /// The structured server exception, if this error carries one.
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            AvsError::Server(exception) => Some(exception),
            _ => None,
        }
    }

    pub fn is_server_exception(&self) -> bool {
        self.exception().is_some()
    }
}

impl From<multer::Error> for AvsError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::StreamReadFailed(inner) => AvsError::Stream(inner.to_string()),
            other => AvsError::Protocol(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AvsError {
    fn from(err: serde_json::Error) -> Self {
        AvsError::Protocol(format!("Invalid JSON: {}", err))
    }
}
