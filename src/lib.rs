//! Client engine for a multipart-over-HTTP voice service.
//!
//! Events go out as `multipart/form-data` (JSON metadata plus optional
//! streamed audio) and come back as multipart responses carrying directives
//! and attachments. A separate downchannel delivers directives the service
//! pushes on its own.

pub mod audio;
pub mod client;
pub mod config;
pub mod downchannel;
pub mod error;
pub mod exchange;
pub mod message;
pub mod multipart;
pub mod status;

pub use client::Client;
pub use config::ClientConfig;
pub use downchannel::{Downchannel, StreamEnd};
pub use error::{AvsError, Result};
pub use exchange::{Request, Response};
pub use message::{Directive, Event, Exception};
