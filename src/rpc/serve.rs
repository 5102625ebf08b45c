//! Plugin-side JSON-RPC dispatch loop.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use super::framing::{read_message, write_message};
use super::protocol::{
    CancelParams, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, INVALID_REQUEST, METHOD_ATTRIBUTES, METHOD_CANCEL,
    METHOD_FINALIZE, METHOD_LOAD, METHOD_NOT_FOUND, METHOD_VALIDATE, PARSE_ERROR,
};
use super::service::ConfigService;
use crate::context::{CancelHandle, Context};
use crate::error::Result;
use crate::settings::TransportSettings;

type InFlight = Arc<Mutex<HashMap<RequestId, CancelHandle>>>;

/// Serve `service` over a pair of byte streams until the reader ends.
///
/// Every request runs on its own task under a context of its own, which is
/// cancelled by a `$/cancelRequest` notification for its id or when the
/// connection closes. Returns once the reader is exhausted and in-flight
/// requests have answered.
pub async fn serve<S, R, W>(
    service: Arc<S>,
    reader: R,
    writer: W,
    settings: &TransportSettings,
) -> Result<()>
where
    S: ConfigService,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (connection, connection_handle) = Context::background().with_cancel();
    let (tx, rx) = mpsc::channel::<String>(settings.write_queue.max(1));
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let mut reader = BufReader::new(reader);

    tracing::debug!("serving config plugin");
    let result = loop {
        let line = match read_message(&mut reader, settings.max_message_bytes).await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(error = %e, "rejecting unreadable message");
                reply(&tx, JsonRpcResponse::failure(None, JsonRpcError::new(PARSE_ERROR, e.to_string())))
                    .await;
                continue;
            }
            Err(e) => break Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }

        match IncomingMessage::parse(&line) {
            Ok(IncomingMessage::Request(request)) if request.jsonrpc != "2.0" => {
                let error = JsonRpcError::new(INVALID_REQUEST, "Unsupported JSON-RPC version");
                reply(&tx, JsonRpcResponse::failure(Some(request.id), error)).await;
            }
            Ok(IncomingMessage::Request(request)) => {
                let (ctx, handle) = connection.with_cancel();
                let admitted = match in_flight.lock().entry(request.id.clone()) {
                    Entry::Occupied(_) => false,
                    Entry::Vacant(slot) => {
                        slot.insert(handle);
                        true
                    }
                };
                if !admitted {
                    tracing::warn!(id = %request.id, "rejecting request with an id already in flight");
                    let error = JsonRpcError::new(
                        INVALID_REQUEST,
                        format!("Request id {} is already in flight", request.id),
                    );
                    reply(&tx, JsonRpcResponse::failure(Some(request.id), error)).await;
                    continue;
                }
                tokio::spawn(handle_request(
                    Arc::clone(&service),
                    ctx,
                    request,
                    tx.clone(),
                    Arc::clone(&in_flight),
                ));
            }
            Ok(IncomingMessage::Notification(notification)) => {
                handle_notification(&in_flight, notification);
            }
            Err(error) => {
                tracing::warn!(%error, "rejecting malformed message");
                reply(&tx, JsonRpcResponse::failure(None, error)).await;
            }
        }
    };

    connection_handle.cancel_with("connection to host closed");
    drop(tx);
    if let Err(e) = writer_task.await {
        tracing::warn!(error = %e, "writer task failed");
    }
    tracing::debug!("config plugin connection finished");
    result
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = write_message(&mut writer, &line).await {
            tracing::warn!(error = %e, "failed to write to host");
            break;
        }
    }
}

async fn reply(tx: &mpsc::Sender<String>, response: JsonRpcResponse) {
    match serde_json::to_string(&response) {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                tracing::debug!(id = ?response.id, "connection closed before reply");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode reply"),
    }
}

async fn handle_request<S: ConfigService>(
    service: Arc<S>,
    ctx: Context,
    request: JsonRpcRequest,
    tx: mpsc::Sender<String>,
    in_flight: InFlight,
) {
    let id = request.id.clone();
    tracing::debug!(%id, method = %request.method, "dispatching request");
    let response = match dispatch(&*service, &ctx, request).await {
        Ok(result) => JsonRpcResponse::success(id.clone(), result),
        Err(error) => JsonRpcResponse::failure(Some(id.clone()), error),
    };
    in_flight.lock().remove(&id);
    reply(&tx, response).await;
}

async fn dispatch<S: ConfigService>(
    service: &S,
    ctx: &Context,
    request: JsonRpcRequest,
) -> std::result::Result<Value, JsonRpcError> {
    match request.method.as_str() {
        METHOD_ATTRIBUTES => invoke(request.params, |req| service.config_attributes(ctx, req)).await,
        METHOD_LOAD => invoke(request.params, |req| service.config_load(ctx, req)).await,
        METHOD_VALIDATE => invoke(request.params, |req| service.config_validate(ctx, req)).await,
        METHOD_FINALIZE => invoke(request.params, |req| service.config_finalize(ctx, req)).await,
        other => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("Unknown method: {}", other))),
    }
}

/// Decode params, run the call and encode its response.
async fn invoke<P, T, F, Fut>(params: Option<Value>, call: F) -> std::result::Result<Value, JsonRpcError>
where
    P: DeserializeOwned + Default,
    T: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = std::result::Result<T, JsonRpcError>>,
{
    let req = match params {
        None | Some(Value::Null) => P::default(),
        Some(params) => serde_json::from_value(params).map_err(JsonRpcError::invalid_params)?,
    };
    let resp = call(req).await?;
    serde_json::to_value(resp).map_err(JsonRpcError::internal)
}

fn handle_notification(in_flight: &InFlight, notification: JsonRpcNotification) {
    if notification.method != METHOD_CANCEL {
        tracing::debug!(method = %notification.method, "ignoring notification");
        return;
    }

    let params = notification.params.map(serde_json::from_value::<CancelParams>);
    match params {
        Some(Ok(CancelParams { id })) => match in_flight.lock().get(&id) {
            Some(handle) => {
                handle.cancel_with("cancelled by host");
                tracing::debug!(%id, "request cancelled by host");
            }
            None => tracing::debug!(%id, "cancel for a request that is not in flight"),
        },
        _ => tracing::warn!("malformed cancel notification"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt};

    use super::*;
    use crate::rpc::{
        AttributesResponse, FinalizeRequest, FinalizeResponse, LoadRequest, LoadResponse,
        NullRequest, ValidateRequest, ValidateResponse, INVALID_PARAMS, REQUEST_CANCELLED,
    };

    /// Service whose load waits for cancellation and reports the cause.
    struct Patient;

    #[async_trait]
    impl ConfigService for Patient {
        async fn config_attributes(
            &self,
            _ctx: &Context,
            _req: NullRequest,
        ) -> std::result::Result<AttributesResponse, JsonRpcError> {
            Ok(AttributesResponse { attributes: vec!["memory".to_string()] })
        }

        async fn config_load(
            &self,
            ctx: &Context,
            _req: LoadRequest,
        ) -> std::result::Result<LoadResponse, JsonRpcError> {
            Err(JsonRpcError::cancelled(ctx.done().await))
        }

        async fn config_validate(
            &self,
            _ctx: &Context,
            req: ValidateRequest,
        ) -> std::result::Result<ValidateResponse, JsonRpcError> {
            Ok(ValidateResponse { errors: vec![req.data] })
        }

        async fn config_finalize(
            &self,
            _ctx: &Context,
            req: FinalizeRequest,
        ) -> std::result::Result<FinalizeResponse, JsonRpcError> {
            Ok(FinalizeResponse { data: req.data })
        }
    }

    async fn exchange(input: &str) -> Vec<JsonRpcResponse> {
        let (mut host_out, plugin_in) = duplex(4096);
        let (plugin_out, host_in) = duplex(4096);
        let server = tokio::spawn(async move {
            serve(Arc::new(Patient), plugin_in, plugin_out, &TransportSettings::default()).await
        });

        host_out.write_all(input.as_bytes()).await.unwrap();
        drop(host_out);
        server.await.unwrap().unwrap();

        let mut lines = tokio::io::BufReader::new(host_in).lines();
        let mut responses = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str(&line).unwrap());
        }
        responses
    }

    #[tokio::test]
    async fn test_dispatches_by_method() {
        let responses = exchange(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ConfigAttributes\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ConfigFinalize\",\"params\":{\"data\":\"{}\"}}\n",
        )
        .await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(JsonRpcResponse::is_success));
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_params() {
        let responses = exchange(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ConfigExplode\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ConfigFinalize\",\"params\":{\"data\":7}}\n",
        )
        .await;
        let codes: Vec<_> = {
            let mut by_id: Vec<_> = responses
                .iter()
                .map(|r| (r.id.clone(), r.error.as_ref().map(|e| e.code)))
                .collect();
            by_id.sort_by_key(|(id, _)| id.as_ref().map(ToString::to_string));
            by_id.into_iter().map(|(_, code)| code).collect()
        };
        assert_eq!(codes, vec![Some(METHOD_NOT_FOUND), Some(INVALID_PARAMS)]);
    }

    #[tokio::test]
    async fn test_garbage_gets_parse_error() {
        let responses = exchange("this is not json\n").await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].id.is_none());
        assert_eq!(responses[0].error.as_ref().map(|e| e.code), Some(PARSE_ERROR));
    }

    #[tokio::test]
    async fn test_unusable_id_gets_invalid_request() {
        let responses = exchange(
            "{\"jsonrpc\":\"2.0\",\"id\":1.5,\"method\":\"ConfigAttributes\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":{},\"method\":\"ConfigAttributes\"}\n",
        )
        .await;
        assert_eq!(responses.len(), 2);
        for response in &responses {
            assert!(response.id.is_none());
            assert_eq!(response.error.as_ref().map(|e| e.code), Some(INVALID_REQUEST));
        }
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_is_rejected() {
        let responses = exchange(
            "{\"jsonrpc\":\"2.0\",\"id\":\"dup\",\"method\":\"ConfigLoad\",\"params\":{\"data\":\"{}\"}}\n\
             {\"jsonrpc\":\"2.0\",\"id\":\"dup\",\"method\":\"ConfigAttributes\"}\n",
        )
        .await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.id == Some(RequestId::from("dup"))));

        let mut codes: Vec<_> = responses.iter().filter_map(|r| r.error.as_ref().map(|e| e.code)).collect();
        codes.sort_unstable();
        assert_eq!(codes, vec![REQUEST_CANCELLED, INVALID_REQUEST]);
    }

    #[tokio::test]
    async fn test_cancel_still_reaches_request_after_duplicate() {
        let (mut host_out, plugin_in) = duplex(4096);
        let (plugin_out, host_in) = duplex(4096);
        let _server = tokio::spawn(async move {
            serve(Arc::new(Patient), plugin_in, plugin_out, &TransportSettings::default()).await
        });

        host_out
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"ConfigLoad\",\"params\":{\"data\":\"{}\"}}\n\
                  {\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"ConfigLoad\",\"params\":{\"data\":\"{}\"}}\n",
            )
            .await
            .unwrap();
        let mut lines = tokio::io::BufReader::new(host_in).lines();
        let rejected: JsonRpcResponse = serde_json::from_str(
            &tokio::time::timeout(Duration::from_secs(5), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rejected.error.map(|e| e.code), Some(INVALID_REQUEST));

        host_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"$/cancelRequest\",\"params\":{\"id\":4}}\n")
            .await
            .unwrap();
        let cancelled: JsonRpcResponse = serde_json::from_str(
            &tokio::time::timeout(Duration::from_secs(5), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(cancelled.id, Some(RequestId::Number(4)));
        assert_eq!(cancelled.error.map(|e| e.code), Some(REQUEST_CANCELLED));
    }

    #[tokio::test]
    async fn test_connection_close_cancels_in_flight() {
        let responses = exchange(
            "{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ConfigLoad\",\"params\":{\"data\":\"{}\"}}\n",
        )
        .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].error.as_ref().map(|e| e.code), Some(REQUEST_CANCELLED));
    }

    #[tokio::test]
    async fn test_cancel_notification_cancels_request() {
        let (mut host_out, plugin_in) = duplex(4096);
        let (plugin_out, host_in) = duplex(4096);
        let _server = tokio::spawn(async move {
            serve(Arc::new(Patient), plugin_in, plugin_out, &TransportSettings::default()).await
        });

        host_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":\"slow\",\"method\":\"ConfigLoad\",\"params\":{\"data\":\"{}\"}}\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        host_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"$/cancelRequest\",\"params\":{\"id\":\"slow\"}}\n")
            .await
            .unwrap();

        let mut lines = tokio::io::BufReader::new(host_in).lines();
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, Some(RequestId::from("slow")));
        let error = response.error.unwrap();
        assert_eq!(error.code, REQUEST_CANCELLED);
        assert!(error.message.contains("cancelled by host"));
    }
}
