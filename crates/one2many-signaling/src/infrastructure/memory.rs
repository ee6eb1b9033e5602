//! In-process [`PipelineClient`] with no real media.
//!
//! Selected with `--media-server memory`.  Besides letting the signaling
//! protocol be exercised without a media server, it keeps enough accounting
//! to check the coordinator's bookkeeping:
//!
//! - every handle it issues is unique,
//! - every release is recorded, and releasing an unknown or already released
//!   handle is recorded as a double release and reported as an error,
//! - a failure can be injected into the next call of any operation,
//! - the next call of any operation can be paused until the test resumes it,
//!   which makes the interleavings of concurrent setup chains deterministic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use one2many_core::{EndpointId, PipelineId};

use crate::application::pipeline::{PipelineClient, PipelineError};

/// Error code reported for injected failures and unknown handles.
const MEMORY_ERROR_CODE: i64 = 40101;

/// Pipeline operations that can be failed or paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineOp {
    CreatePipeline,
    CreateEndpoint,
    ProcessOffer,
    Connect,
    ReleasePipeline,
    ReleaseEndpoint,
}

/// A call held at the start of a pipeline operation.
///
/// Returned by [`InMemoryPipeline::pause_next`].  Dropping it without
/// calling [`resume`](PausedCall::resume) also lets the call continue.
pub struct PausedCall {
    reached: oneshot::Receiver<()>,
    resume: oneshot::Sender<()>,
}

impl PausedCall {
    /// Waits until a call of the paused operation has started.
    pub async fn reached(&mut self) {
        let _ = (&mut self.reached).await;
    }

    /// Lets the held call continue.
    pub fn resume(self) {
        let _ = self.resume.send(());
    }
}

struct PauseSlot {
    reached: oneshot::Sender<()>,
    resume: oneshot::Receiver<()>,
}

#[derive(Default)]
struct MemoryState {
    live_pipelines: HashSet<PipelineId>,
    live_endpoints: HashMap<EndpointId, PipelineId>,
    connections: Vec<(EndpointId, EndpointId)>,
    released: Vec<String>,
    double_releases: Vec<String>,
    pipelines_created: usize,
    endpoints_created: usize,
    failures: HashMap<PipelineOp, String>,
    pauses: HashMap<PipelineOp, VecDeque<PauseSlot>>,
}

#[derive(Default)]
pub struct InMemoryPipeline {
    state: Mutex<MemoryState>,
}

impl InMemoryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: PipelineOp, message: impl Into<String>) {
        self.state().failures.insert(op, message.into());
    }

    /// Holds the next call of `op` until the returned [`PausedCall`] is
    /// resumed or dropped.  Pauses for the same operation queue up.
    pub fn pause_next(&self, op: PipelineOp) -> PausedCall {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        self.state().pauses.entry(op).or_default().push_back(PauseSlot {
            reached: reached_tx,
            resume: resume_rx,
        });
        PausedCall {
            reached: reached_rx,
            resume: resume_tx,
        }
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.state().live_pipelines.len()
    }

    pub fn live_endpoints(&self) -> Vec<EndpointId> {
        let mut live: Vec<EndpointId> = self.state().live_endpoints.keys().cloned().collect();
        live.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        live
    }

    pub fn pipelines_created(&self) -> usize {
        self.state().pipelines_created
    }

    pub fn endpoints_created(&self) -> usize {
        self.state().endpoints_created
    }

    /// `(source, sink)` pairs in connection order.
    pub fn connections(&self) -> Vec<(EndpointId, EndpointId)> {
        self.state().connections.clone()
    }

    /// Handles in release order.
    pub fn released(&self) -> Vec<String> {
        self.state().released.clone()
    }

    /// Handles that were released while unknown or already released.
    pub fn double_releases(&self) -> Vec<String> {
        self.state().double_releases.clone()
    }

    /// `true` when no pipeline or endpoint is live.
    pub fn is_clean(&self) -> bool {
        let state = self.state();
        state.live_pipelines.is_empty() && state.live_endpoints.is_empty()
    }

    /// Waits at a queued pause for `op`, then applies any injected failure.
    async fn enter(&self, op: PipelineOp) -> Result<(), PipelineError> {
        let slot = self
            .state()
            .pauses
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        if let Some(slot) = slot {
            debug!("in-memory pipeline: holding {op:?}");
            let _ = slot.reached.send(());
            let _ = slot.resume.await;
        }

        match self.state().failures.remove(&op) {
            Some(message) => Err(PipelineError::Rpc {
                code: MEMORY_ERROR_CODE,
                message,
            }),
            None => Ok(()),
        }
    }
}

fn unknown_object(handle: &str) -> PipelineError {
    PipelineError::Rpc {
        code: MEMORY_ERROR_CODE,
        message: format!("Object '{handle}' not found"),
    }
}

#[async_trait]
impl PipelineClient for InMemoryPipeline {
    async fn create_pipeline(&self) -> Result<PipelineId, PipelineError> {
        self.enter(PipelineOp::CreatePipeline).await?;
        let pipeline = PipelineId::new(format!("{}_memory.MediaPipeline", Uuid::new_v4()));
        let mut state = self.state();
        state.pipelines_created += 1;
        state.live_pipelines.insert(pipeline.clone());
        Ok(pipeline)
    }

    async fn create_endpoint(&self, pipeline: &PipelineId) -> Result<EndpointId, PipelineError> {
        self.enter(PipelineOp::CreateEndpoint).await?;
        let mut state = self.state();
        if !state.live_pipelines.contains(pipeline) {
            return Err(unknown_object(pipeline.as_str()));
        }
        let endpoint = EndpointId::new(format!(
            "{pipeline}/{}_memory.WebRtcEndpoint",
            Uuid::new_v4()
        ));
        state.endpoints_created += 1;
        state.live_endpoints.insert(endpoint.clone(), pipeline.clone());
        Ok(endpoint)
    }

    async fn process_offer(
        &self,
        endpoint: &EndpointId,
        sdp_offer: &str,
    ) -> Result<String, PipelineError> {
        self.enter(PipelineOp::ProcessOffer).await?;
        if !self.state().live_endpoints.contains_key(endpoint) {
            return Err(unknown_object(endpoint.as_str()));
        }
        Ok(format!("answer:{sdp_offer}"))
    }

    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> Result<(), PipelineError> {
        self.enter(PipelineOp::Connect).await?;
        let mut state = self.state();
        for endpoint in [source, sink] {
            if !state.live_endpoints.contains_key(endpoint) {
                return Err(unknown_object(endpoint.as_str()));
            }
        }
        state.connections.push((source.clone(), sink.clone()));
        Ok(())
    }

    async fn release_pipeline(&self, pipeline: PipelineId) -> Result<(), PipelineError> {
        self.enter(PipelineOp::ReleasePipeline).await?;
        let mut state = self.state();
        if state.live_pipelines.remove(&pipeline) {
            state.released.push(pipeline.to_string());
            Ok(())
        } else {
            state.double_releases.push(pipeline.to_string());
            Err(unknown_object(pipeline.as_str()))
        }
    }

    async fn release_endpoint(&self, endpoint: EndpointId) -> Result<(), PipelineError> {
        self.enter(PipelineOp::ReleaseEndpoint).await?;
        let mut state = self.state();
        if state.live_endpoints.remove(&endpoint).is_some() {
            state.released.push(endpoint.to_string());
            Ok(())
        } else {
            state.double_releases.push(endpoint.to_string());
            Err(unknown_object(endpoint.as_str()))
        }
    }
}
