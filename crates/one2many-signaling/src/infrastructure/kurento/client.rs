//! WebSocket JSON-RPC client for a Kurento media server.
//!
//! The connection is opened lazily on the first request and shared by every
//! later request.  A reader task routes each response to the request that is
//! waiting for it.  If the socket closes, every pending request fails with
//! [`PipelineError::ConnectionClosed`] and the next request reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use one2many_core::{EndpointId, PipelineId};

use super::rpc::{self, Incoming, RpcResult};
use crate::application::pipeline::{PipelineClient, PipelineError};

type KmsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<RpcResult, PipelineError>>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One live WebSocket to the media server.
struct RpcConnection {
    sink: tokio::sync::Mutex<SplitSink<KmsStream, WsMessage>>,
    pending: Pending,
    session_id: Arc<Mutex<Option<String>>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl RpcConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn forget(&self, id: u64) {
        lock(&self.pending).remove(&id);
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// [`PipelineClient`] backed by a Kurento media server.
pub struct KurentoClient {
    uri: String,
    request_timeout: Duration,
    next_id: AtomicU64,
    conn: tokio::sync::Mutex<Option<Arc<RpcConnection>>>,
}

impl KurentoClient {
    pub fn new(uri: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            request_timeout,
            next_id: AtomicU64::new(1),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the live connection, opening a new one if there is none.
    async fn connection(&self) -> Result<Arc<RpcConnection>, PipelineError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref().filter(|c| !c.is_closed()) {
            return Ok(Arc::clone(conn));
        }

        let (stream, _) = connect_async(self.uri.as_str())
            .await
            .map_err(|e| PipelineError::Unavailable {
                uri: self.uri.clone(),
                reason: e.to_string(),
            })?;
        info!("connected to media server at {}", self.uri);

        let (sink, source) = stream.split();
        let pending: Pending = Arc::default();
        let session_id = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_responses(
            source,
            Arc::clone(&pending),
            Arc::clone(&session_id),
            Arc::clone(&closed),
        ));

        let conn = Arc::new(RpcConnection {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            session_id,
            closed,
            reader,
        });
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Sends one request and waits for its response.
    async fn call(&self, method: &'static str, params: Value) -> Result<RpcResult, PipelineError> {
        let conn = self.connection().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        lock(&conn.pending).insert(id, tx);

        let session = lock(&conn.session_id).clone();
        let frame = rpc::encode_request(id, method, params, session.as_deref());
        debug!("media server request {id}: {method}");

        let sent = conn.sink.lock().await.send(WsMessage::Text(frame)).await;
        if let Err(e) = sent {
            warn!("media server send failed: {e}");
            conn.forget(id);
            conn.closed.store(true, Ordering::Release);
            return Err(PipelineError::ConnectionClosed);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PipelineError::ConnectionClosed),
            Err(_) => {
                conn.forget(id);
                Err(PipelineError::Timeout { method })
            }
        }
    }
}

/// Routes inbound frames to pending requests until the socket closes.
async fn read_responses(
    mut source: SplitStream<KmsStream>,
    pending: Pending,
    session_id: Arc<Mutex<Option<String>>>,
    closed: Arc<AtomicBool>,
) {
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("media server connection error: {e}");
                break;
            }
        };

        match rpc::parse_incoming(&text) {
            Ok(Incoming::Response { id, result }) => {
                if let Ok(RpcResult {
                    session_id: Some(session),
                    ..
                }) = &result
                {
                    *lock(&session_id) = Some(session.clone());
                }
                match lock(&pending).remove(&id) {
                    Some(waiter) => {
                        let _ = waiter.send(result);
                    }
                    None => debug!("media server response {id} has no waiter"),
                }
            }
            Ok(Incoming::Notification { method }) => {
                debug!("media server notification: {method}");
            }
            Err(e) => warn!("{e}"),
        }
    }

    closed.store(true, Ordering::Release);
    let waiters: Vec<_> = lock(&pending).drain().map(|(_, tx)| tx).collect();
    if !waiters.is_empty() {
        warn!(
            "media server connection closed with {} request(s) pending",
            waiters.len()
        );
    }
    for waiter in waiters {
        let _ = waiter.send(Err(PipelineError::ConnectionClosed));
    }
}

#[async_trait]
impl PipelineClient for KurentoClient {
    async fn create_pipeline(&self) -> Result<PipelineId, PipelineError> {
        let params = rpc::create_params(rpc::TYPE_MEDIA_PIPELINE, json!({}));
        let value = self
            .call(rpc::METHOD_CREATE, params)
            .await?
            .string_value(rpc::METHOD_CREATE)?;
        Ok(PipelineId::new(value))
    }

    async fn create_endpoint(&self, pipeline: &PipelineId) -> Result<EndpointId, PipelineError> {
        let params = rpc::create_params(
            rpc::TYPE_WEBRTC_ENDPOINT,
            json!({ "mediaPipeline": pipeline.as_str() }),
        );
        let value = self
            .call(rpc::METHOD_CREATE, params)
            .await?
            .string_value(rpc::METHOD_CREATE)?;
        Ok(EndpointId::new(value))
    }

    async fn process_offer(
        &self,
        endpoint: &EndpointId,
        sdp_offer: &str,
    ) -> Result<String, PipelineError> {
        let params = rpc::invoke_params(
            endpoint.as_str(),
            "processOffer",
            json!({ "offer": sdp_offer }),
        );
        self.call(rpc::METHOD_INVOKE, params)
            .await?
            .string_value("processOffer")
    }

    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> Result<(), PipelineError> {
        let params = rpc::invoke_params(
            source.as_str(),
            "connect",
            json!({ "sink": sink.as_str() }),
        );
        self.call(rpc::METHOD_INVOKE, params).await?;
        Ok(())
    }

    async fn release_pipeline(&self, pipeline: PipelineId) -> Result<(), PipelineError> {
        self.call(rpc::METHOD_RELEASE, rpc::release_params(pipeline.as_str()))
            .await?;
        Ok(())
    }

    async fn release_endpoint(&self, endpoint: EndpointId) -> Result<(), PipelineError> {
        self.call(rpc::METHOD_RELEASE, rpc::release_params(endpoint.as_str()))
            .await?;
        Ok(())
    }
}
