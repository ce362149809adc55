//! Single-writer transport: the only code that touches the output connection.
//!
//! Ticks hand serialized reports to a [`TransportHandle`]; one background task owns the
//! stream and writes reports in queue order, one contiguous write each, so two reports'
//! bytes never interleave on the wire.

use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::TransportError;

const QUEUE_CAPACITY: usize = 16;

/// How report boundaries are marked on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Bare JSON objects back to back (what existing receivers expect).
    #[default]
    None,
    /// Each report followed by `\n`.
    Newline,
    /// Each report preceded by its length as a big-endian u32.
    LengthPrefix,
}

impl Framing {
    pub fn frame(self, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        match self {
            Framing::None => Ok(payload),
            Framing::Newline => {
                let mut buf = payload;
                buf.push(b'\n');
                Ok(buf)
            }
            Framing::LengthPrefix => {
                let len = u32::try_from(payload.len())
                    .map_err(|_| TransportError::FrameTooLarge(payload.len()))?;
                let mut buf = Vec::with_capacity(4 + payload.len());
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(&payload);
                Ok(buf)
            }
        }
    }
}

type Ack = oneshot::Sender<Result<(), TransportError>>;

/// Cloneable producer side of the writer queue.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<(Vec<u8>, Ack)>,
}

impl TransportHandle {
    /// Queue one report and wait until it has been written and flushed (or failed).
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((payload, ack_tx))
            .await
            .map_err(|_| TransportError::Closed)?;
        ack_rx.await.map_err(|_| TransportError::Closed)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct TransportWriter;

impl TransportWriter {
    /// Spawn the writer task over an already connected stream.
    ///
    /// The task ends when every handle is dropped (the stream is shut down after the
    /// queue drains) or on the first failed write. It yields the number of reports written.
    pub fn spawn<W>(stream: W, framing: Framing) -> (TransportHandle, JoinHandle<u64>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(run_writer(stream, framing, rx));
        (TransportHandle { tx }, task)
    }
}

async fn run_writer<W>(
    mut stream: W,
    framing: Framing,
    mut rx: mpsc::Receiver<(Vec<u8>, Ack)>,
) -> u64
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;

    while let Some((payload, ack)) = rx.recv().await {
        let buf = match framing.frame(payload) {
            Ok(buf) => buf,
            Err(e) => {
                // nothing hit the wire, the connection is still usable
                let _ = ack.send(Err(e));
                continue;
            }
        };

        match write_frame(&mut stream, &buf).await {
            Ok(()) => {
                written += 1;
                let _ = ack.send(Ok(()));
            }
            Err(e) => {
                error!(error = %e, "output connection write failed, closing writer");
                let _ = ack.send(Err(TransportError::Write(e)));
                rx.close();
                // queued reports learn the connection is gone
                while let Some((_, pending)) = rx.recv().await {
                    let _ = pending.send(Err(TransportError::Closed));
                }
                return written;
            }
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "output connection shutdown failed");
    }
    written
}

async fn write_frame<W>(stream: &mut W, buf: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(buf).await?;
    stream.flush().await
}
