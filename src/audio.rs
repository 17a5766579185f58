//! Outgoing audio: the bounded conduit that feeds a streamed request body,
//! plus helpers to turn captured samples into `audio.wav` payloads.

use crate::error::{AvsError, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use std::io;
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;

/// Audio input for an event; read once, in order.
pub type AudioSource = Box<dyn AsyncRead + Send + Unpin>;

pub const SAMPLE_RATE: u32 = 16_000;

/// What the producer side of a conduit managed to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pumped {
    /// Bytes read from the audio source.
    pub bytes: u64,
    /// `false` when the transport stopped reading before the source was exhausted.
    pub complete: bool,
}

/// Handle on a running audio producer.
pub struct Producer {
    handle: JoinHandle<io::Result<Pumped>>,
    read_error: Arc<OnceLock<String>>,
}

impl Producer {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the source to be drained. Read failures become `Encoding` errors.
    pub async fn finish(self) -> Result<Pumped> {
        let pumped = self
            .handle
            .await
            .map_err(|e| AvsError::Encoding(format!("audio producer failed: {}", e)))?
            .map_err(|e| AvsError::Encoding(format!("failed to read audio: {}", e)))?;
        log::debug!(
            "Exchange: audio producer done after {} bytes (complete: {})",
            pumped.bytes,
            pumped.complete
        );
        Ok(pumped)
    }

    /// Stop the producer without waiting for the source. Returns the read
    /// error that failed the request body, if there was one.
    pub fn abort(self) -> Option<AvsError> {
        self.handle.abort();
        self.read_error
            .get()
            .map(|e| AvsError::Encoding(format!("failed to read audio: {}", e)))
    }
}

/// Spawn a producer that streams `source` into a request body through a
/// channel holding at most `capacity` chunks.
pub fn spawn_conduit(
    source: AudioSource,
    capacity: usize,
    chunk_size: usize,
) -> (reqwest::Body, Producer) {
    let (stream, producer) = conduit(source, capacity, chunk_size);
    (reqwest::Body::wrap_stream(stream), producer)
}

fn conduit(
    source: AudioSource,
    capacity: usize,
    chunk_size: usize,
) -> (ReceiverStream<io::Result<Bytes>>, Producer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let read_error = Arc::new(OnceLock::new());
    let handle = tokio::spawn(pump(
        source,
        tx,
        chunk_size.max(1),
        Arc::clone(&read_error),
    ));
    (ReceiverStream::new(rx), Producer { handle, read_error })
}

async fn pump(
    source: AudioSource,
    tx: mpsc::Sender<io::Result<Bytes>>,
    chunk_size: usize,
    read_error: Arc<OnceLock<String>>,
) -> io::Result<Pumped> {
    let mut chunks = ReaderStream::with_capacity(source, chunk_size);
    let mut bytes = 0u64;

    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => {
                bytes += chunk.len() as u64;
                if tx.send(Ok(chunk)).await.is_err() {
                    log::debug!("Exchange: audio conduit closed by transport after {} bytes", bytes);
                    return Ok(Pumped {
                        bytes,
                        complete: false,
                    });
                }
            }
            Err(e) => {
                log::warn!("Exchange: audio read failed after {} bytes: {}", bytes, e);
                // Recorded before the body fails, so the transport error can be attributed.
                let _ = read_error.set(e.to_string());
                let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                return Err(e);
            }
        }
    }

    log::debug!("Exchange: streamed {} audio bytes", bytes);
    Ok(Pumped {
        bytes,
        complete: true,
    })
}

/// In-memory audio source.
pub fn from_bytes(data: impl Into<Vec<u8>>) -> AudioSource {
    Box::new(io::Cursor::new(data.into()))
}

/// Convert 16-bit samples to little-endian PCM bytes
pub fn pcm_from_samples(samples: &[i16]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    pcm
}

/// Wrap mono 16-bit samples in a WAV container.
pub fn wav_from_samples(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AvsError::Encoding(format!("WAV header: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| AvsError::Encoding(format!("WAV sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AvsError::Encoding(format!("WAV finalize: {}", e)))?;
    }

    Ok(cursor.into_inner())
}
