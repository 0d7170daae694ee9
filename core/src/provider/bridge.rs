/// Provider that relays EIP-1193 requests to a browser-extension bridge.
///
/// Wire format is the Chrome Native Messaging framing: a 4-byte little-endian
/// length followed by a UTF-8 JSON object. Requests carry a string `id`; the
/// bridge answers with the same `id` and either `result` or `error`. Frames
/// that carry `event` instead of `id` are wallet events (`accountsChanged`,
/// `chainChanged`).
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{EventSender, Listeners, Provider, ProviderError, ProviderEvent, RpcRequest, SubscriptionId};
use crate::chain::ChainId;

const MAX_FRAME_LEN: usize = 1_048_576;

// -- Protocol types --

#[derive(Debug, Serialize)]
struct OutboundRequest<'a> {
    id: String,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ProviderError>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

// -- Wire format IO --

/// Read one frame. Returns `Ok(None)` on clean EOF.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid frame length: {len}"),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Frame too large: {} bytes", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

// -- Provider --

type Pending = Mutex<HashMap<String, oneshot::Sender<Result<Value, ProviderError>>>>;

struct Shared {
    pending: Pending,
    listeners: Listeners,
    closed: AtomicBool,
}

impl Shared {
    /// Fail every outstanding request; called once the stream is gone.
    /// `closed` flips under the `pending` lock so no waiter slips in after the drain.
    fn close(&self, reason: &str) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
            pending.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(ProviderError::disconnected(reason)));
        }
    }

    /// Register a waiter for `id`, unless the stream is already gone.
    fn register(&self, id: &str) -> Result<oneshot::Receiver<Result<Value, ProviderError>>, ProviderError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::disconnected("Wallet bridge is closed."));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id.to_string(), tx);
        Ok(rx)
    }

    fn dispatch(&self, frame: InboundFrame) {
        if let Some(id) = frame.id {
            let waiter = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            match waiter {
                Some(tx) => {
                    let outcome = match frame.error {
                        Some(err) => Err(err),
                        None => Ok(frame.result),
                    };
                    let _ = tx.send(outcome);
                }
                None => debug!(%id, "bridge: response for unknown request"),
            }
            return;
        }

        match frame.event.as_deref() {
            Some("accountsChanged") => match serde_json::from_value::<Vec<String>>(frame.data) {
                Ok(accounts) => self.listeners.emit(&ProviderEvent::AccountsChanged(accounts)),
                Err(e) => warn!("bridge: malformed accountsChanged payload: {e}"),
            },
            Some("chainChanged") => match ChainId::from_json(&frame.data) {
                Ok(chain_id) => self.listeners.emit(&ProviderEvent::ChainChanged(chain_id)),
                Err(e) => warn!("bridge: malformed chainChanged payload: {e}"),
            },
            Some(other) => debug!(event = other, "bridge: ignoring event"),
            None => warn!("bridge: frame without id or event"),
        }
    }
}

pub struct BridgeProvider<S> {
    writer: tokio::sync::Mutex<WriteHalf<S>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl<S> BridgeProvider<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Take ownership of a connected stream and start the reader task.
    /// Must be called from within a tokio runtime.
    pub fn spawn(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            listeners: Listeners::default(),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_loop(read_half, shared.clone()));
        Self {
            writer: tokio::sync::Mutex::new(write_half),
            shared,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn round_trip(&self, request: RpcRequest) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let payload = serde_json::to_vec(&OutboundRequest {
            id: id.clone(),
            method: &request.method,
            params: &request.params,
        })
        .map_err(|e| ProviderError::invalid_params(format!("Cannot encode request: {e}")))?;

        let rx = self.shared.register(&id)?;

        debug!(%id, method = %request.method, "bridge: request");
        let written = {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &payload).await
        };
        if let Err(e) = written {
            self.shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(ProviderError::disconnected(format!("Wallet bridge write failed: {e}")));
        }

        rx.await
            .unwrap_or_else(|_| Err(ProviderError::disconnected("Wallet bridge closed.")))
    }
}

async fn read_loop<S: AsyncRead>(mut reader: ReadHalf<S>, shared: Arc<Shared>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(buf)) => match serde_json::from_slice::<InboundFrame>(&buf) {
                Ok(frame) => shared.dispatch(frame),
                Err(e) => warn!("bridge: dropping malformed frame: {e}"),
            },
            Ok(None) => {
                debug!("bridge: stream closed");
                shared.close("Wallet bridge closed.");
                return;
            }
            Err(e) => {
                warn!("bridge: read error: {e}");
                shared.close(&format!("Wallet bridge read failed: {e}"));
                return;
            }
        }
    }
}

impl<S> Drop for BridgeProvider<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl<S> Provider for BridgeProvider<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn request(&self, request: RpcRequest) -> BoxFuture<'_, Result<Value, ProviderError>> {
        Box::pin(self.round_trip(request))
    }

    fn subscribe(&self, sender: EventSender) -> SubscriptionId {
        self.shared.listeners.add(sender)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.listeners.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"id":"1","result":null}"#).await.unwrap();
        assert_eq!(&buf[..4], &24u32.to_le_bytes());

        let mut cursor = io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        let parsed: InboundFrame = serde_json::from_slice(&frame).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("1"));
        assert!(parsed.result.is_null());
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_length_frame_is_invalid() {
        let mut cursor = io::Cursor::new(0u32.to_le_bytes().to_vec());
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn closed_bridge_refuses_new_waiters() {
        let shared = Shared {
            pending: Mutex::new(HashMap::new()),
            listeners: Listeners::default(),
            closed: AtomicBool::new(false),
        };
        let mut early = shared.register("1").unwrap();

        shared.close("gone");
        let err = early.try_recv().unwrap().unwrap_err();
        assert_eq!(err.code, ProviderError::DISCONNECTED);

        let err = shared.register("2").unwrap_err();
        assert_eq!(err.code, ProviderError::DISCONNECTED);
        assert!(shared.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn error_frame_parses_code() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"id":"7","error":{"code":4902,"message":"Unrecognized chain"}}"#,
        )
        .unwrap();
        assert_eq!(frame.error.unwrap().code, ProviderError::UNRECOGNIZED_CHAIN);
    }
}
