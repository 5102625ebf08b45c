//! Host-side JSON-RPC channel.
//!
//! [`RpcClient`] multiplexes concurrent calls over one pair of byte streams
//! (typically a plugin's stdout and stdin). A reader task routes responses
//! to waiting calls by request id; a writer task serializes outgoing lines.
//! When the stream ends the session context is cancelled before waiting
//! calls are failed, so callers always see the session as ended.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::framing::{read_message, write_message};
use super::protocol::{
    AttributesResponse, CancelParams, FinalizeRequest, FinalizeResponse, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LoadRequest, LoadResponse, NullRequest,
    RequestId, ValidateRequest, ValidateResponse, METHOD_ATTRIBUTES, METHOD_CANCEL,
    METHOD_FINALIZE, METHOD_LOAD, METHOD_VALIDATE,
};
use super::service::ConfigService;
use crate::context::{CancelHandle, Context};
use crate::settings::TransportSettings;

const CONNECTION_CLOSED: &str = "connection to plugin closed";

type Reply = Result<Value, JsonRpcError>;

/// State shared between the client and its background tasks.
struct Shared {
    pending: Mutex<HashMap<i64, oneshot::Sender<Reply>>>,
    session: Context,
    session_handle: CancelHandle,
}

impl Shared {
    /// End the session and fail every waiting call.
    fn shutdown(&self, cause: &str) {
        if self.session_handle.cancel_with(cause) {
            tracing::debug!(cause, "plugin session ended");
        }
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, waiter) in drained {
            let _ = waiter.send(Err(JsonRpcError::transport(cause)));
        }
    }
}

/// Config service client speaking line-delimited JSON-RPC.
pub struct RpcClient {
    shared: Arc<Shared>,
    writer_tx: mpsc::Sender<String>,
    next_id: AtomicI64,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl RpcClient {
    /// Start a client over the given streams.
    ///
    /// Returns the client and the session context, which is done once the
    /// connection is gone. Must be called from within a tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W, settings: &TransportSettings) -> (Self, Context)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (session, session_handle) = Context::background().with_cancel();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            session: session.clone(),
            session_handle,
        });

        let (writer_tx, writer_rx) = mpsc::channel(settings.write_queue.max(1));
        let writer_handle = tokio::spawn(Self::writer_loop(writer, writer_rx, Arc::clone(&shared)));
        let reader_handle = tokio::spawn(Self::reader_loop(
            BufReader::new(reader),
            Arc::clone(&shared),
            settings.max_message_bytes,
        ));

        let client =
            Self { shared, writer_tx, next_id: AtomicI64::new(1), reader_handle, writer_handle };
        (client, session)
    }

    /// The session context.
    pub fn session(&self) -> &Context {
        &self.shared.session
    }

    /// End the session from the host side.
    pub fn close(&self) {
        self.shared.shutdown("session closed by host");
    }

    async fn writer_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>, shared: Arc<Shared>)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_message(&mut writer, &line).await {
                tracing::warn!(error = %e, "failed to write to plugin");
                shared.shutdown(&format!("write to plugin failed: {e}"));
                break;
            }
        }
    }

    async fn reader_loop<R>(mut reader: BufReader<R>, shared: Arc<Shared>, max_message_bytes: usize)
    where
        R: AsyncRead + Unpin,
    {
        let cause = loop {
            let line = match read_message(&mut reader, max_message_bytes).await {
                Ok(Some(line)) => line,
                Ok(None) => break "plugin closed the connection".to_string(),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!(error = %e, "discarding unreadable message from plugin");
                    continue;
                }
                Err(e) => break format!("read from plugin failed: {e}"),
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) => Self::route(&shared, response),
                Err(e) => tracing::warn!(error = %e, "discarding malformed response"),
            }
        };
        shared.shutdown(&cause);
    }

    fn route(shared: &Shared, response: JsonRpcResponse) {
        let Some(RequestId::Number(id)) = response.id else {
            tracing::warn!(id = ?response.id, "response without a request id");
            return;
        };
        let Some(waiter) = shared.pending.lock().remove(&id) else {
            tracing::debug!(id, "response for unknown or cancelled request");
            return;
        };

        let reply = match response.error {
            Some(error) => Err(error),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        let _ = waiter.send(reply);
    }

    /// Issue one call and wait for its reply or for `ctx` to finish.
    async fn call<P, T>(&self, ctx: &Context, method: &'static str, params: &P) -> Result<T, JsonRpcError>
    where
        P: Serialize + Sync,
        T: DeserializeOwned,
    {
        if let Some(cause) = ctx.err() {
            return Err(JsonRpcError::cancelled(cause));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let params = serde_json::to_value(params).map_err(JsonRpcError::internal)?;
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, Some(params)))
            .map_err(JsonRpcError::internal)?;

        let (waiter, reply) = oneshot::channel();
        self.shared.pending.lock().insert(id, waiter);
        if let Some(cause) = self.shared.session.err() {
            self.shared.pending.lock().remove(&id);
            return Err(JsonRpcError::transport(cause));
        }

        tracing::debug!(id, method, "sending request");
        let exchange = async {
            if self.writer_tx.send(line).await.is_err() {
                return Err(JsonRpcError::transport(CONNECTION_CLOSED));
            }
            match reply.await {
                Ok(reply) => reply,
                Err(_) => Err(JsonRpcError::transport(CONNECTION_CLOSED)),
            }
        };

        let value = tokio::select! {
            biased;
            cause = ctx.done() => {
                self.shared.pending.lock().remove(&id);
                self.notify_cancel(id);
                tracing::debug!(id, method, %cause, "call cancelled");
                return Err(JsonRpcError::cancelled(cause));
            }
            value = exchange => value?,
        };

        serde_json::from_value(value)
            .map_err(|e| JsonRpcError::internal(format!("Failed to parse result: {}", e)))
    }

    /// Tell the plugin to stop working on `id`. Best effort.
    fn notify_cancel(&self, id: i64) {
        let params = serde_json::to_value(CancelParams { id: RequestId::Number(id) }).ok();
        let notification = JsonRpcNotification::new(METHOD_CANCEL, params);
        match serde_json::to_string(&notification) {
            Ok(line) => match self.writer_tx.try_send(line) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(line)) => {
                    tracing::warn!(id, "write queue full, deferring cancel notification");
                    let tx = self.writer_tx.clone();
                    tokio::spawn(async move {
                        if tx.send(line).await.is_err() {
                            tracing::debug!(id, "session closed before cancel notification was sent");
                        }
                    });
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(id, "session closed, cancel notification dropped");
                }
            },
            Err(e) => tracing::debug!(id, error = %e, "could not encode cancel notification"),
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.shutdown("session closed by host");
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

#[async_trait]
impl ConfigService for RpcClient {
    async fn config_attributes(
        &self,
        ctx: &Context,
        req: NullRequest,
    ) -> Result<AttributesResponse, JsonRpcError> {
        self.call(ctx, METHOD_ATTRIBUTES, &req).await
    }

    async fn config_load(
        &self,
        ctx: &Context,
        req: LoadRequest,
    ) -> Result<LoadResponse, JsonRpcError> {
        self.call(ctx, METHOD_LOAD, &req).await
    }

    async fn config_validate(
        &self,
        ctx: &Context,
        req: ValidateRequest,
    ) -> Result<ValidateResponse, JsonRpcError> {
        self.call(ctx, METHOD_VALIDATE, &req).await
    }

    async fn config_finalize(
        &self,
        ctx: &Context,
        req: FinalizeRequest,
    ) -> Result<FinalizeResponse, JsonRpcError> {
        self.call(ctx, METHOD_FINALIZE, &req).await
    }
}
