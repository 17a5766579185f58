//! Long-lived stream of directives pushed by the service.
//!
//! A single background task owns the response body and reads parts strictly in
//! order. Delivery stops silently on end of stream, on any read or decode
//! error, or when the consumer closes or drops the [`Downchannel`]. Why it
//! stopped is available from [`Downchannel::end_reason`] for diagnostics.

use crate::error::AvsError;
use crate::message::{self, Directive};
use crate::multipart::PartReader;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

pub const DIRECTIVES_PATH: &str = "/directives";

/// Why a downchannel stopped delivering directives.
#[derive(Debug)]
pub enum StreamEnd {
    /// The server finished the multipart body.
    Closed,
    /// The consumer closed or dropped the stream.
    Cancelled,
    /// A transport, framing or decode error ended delivery.
    Failed(AvsError),
}

/// Receiving side of a downchannel.
pub struct Downchannel {
    directives: mpsc::UnboundedReceiver<Directive>,
    end: Option<oneshot::Receiver<StreamEnd>>,
    end_reason: Option<StreamEnd>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl Downchannel {
    /// Start reading `response` (already classified as having a body) in the
    /// background.
    pub(crate) fn spawn(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (end_tx, end_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let end = deliver(response, tx, task_cancel).await;
            match &end {
                StreamEnd::Closed => log::info!("Downchannel: closed by server"),
                StreamEnd::Cancelled => log::debug!("Downchannel: cancelled by consumer"),
                StreamEnd::Failed(e) => log::warn!("Downchannel: terminated: {}", e),
            }
            let _ = end_tx.send(end);
        });

        Self::with_parts(rx, Some(end_rx), cancel)
    }

    /// A downchannel that has already ended (the server sent no body).
    pub(crate) fn ended() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        let mut channel = Self::with_parts(rx, None, CancellationToken::new());
        channel.end_reason = Some(StreamEnd::Closed);
        channel
    }

    fn with_parts(
        directives: mpsc::UnboundedReceiver<Directive>,
        end: Option<oneshot::Receiver<StreamEnd>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            directives,
            end,
            end_reason: None,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Next directive, or `None` once delivery has stopped.
    pub async fn recv(&mut self) -> Option<Directive> {
        self.directives.recv().await
    }

    /// Stop the background reader and release the connection.
    ///
    /// Directives already received stay available to `recv`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Why delivery stopped; `None` while the stream is still live.
    pub fn end_reason(&mut self) -> Option<&StreamEnd> {
        if self.end_reason.is_none() {
            if let Some(end) = self.end.as_mut() {
                if let Ok(reason) = end.try_recv() {
                    self.end_reason = Some(reason);
                    self.end = None;
                }
            }
        }
        self.end_reason.as_ref()
    }
}

impl Stream for Downchannel {
    type Item = Directive;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.directives.poll_recv(cx)
    }
}

async fn deliver(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<Directive>,
    cancel: CancellationToken,
) -> StreamEnd {
    let parts = match PartReader::from_response(response) {
        Ok(reader) => reader.into_stream(),
        Err(e) => return StreamEnd::Failed(e),
    };
    tokio::pin!(parts);

    let mut delivered = 0u64;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            next = parts.next() => next,
        };

        let part = match next {
            None => return StreamEnd::Closed,
            Some(Err(e)) => return StreamEnd::Failed(e),
            Some(Ok(part)) => part,
        };

        let directive = match message::decode_envelope(part.body()) {
            Ok(directive) => directive,
            Err(e) => return StreamEnd::Failed(e),
        };

        delivered += 1;
        log::debug!(
            "Downchannel: directive {} ({:?}.{:?})",
            delivered,
            directive.namespace(),
            directive.name()
        );
        if tx.send(directive).is_err() {
            return StreamEnd::Cancelled;
        }
    }
}
