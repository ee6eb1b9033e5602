//! BroadcastCoordinator: turns participant requests into registry mutations
//! and pipeline calls.
//!
//! Every operation is a *setup chain*: a short critical section on the
//! registry, an asynchronous pipeline call with the lock released, another
//! critical section that re-checks the world, and so on.  The registry lock
//! is never held across a pipeline call.
//!
//! # Checkpoints
//!
//! Master chains capture the epoch returned by `try_set_master`; viewer
//! chains capture the master's epoch plus their own [`ViewerTicket`].  After
//! every pipeline call the chain re-checks those values.  If the world has
//! moved on, the chain stops mutating shared state and releases only what it
//! still owns:
//!
//! ```text
//!  create_pipeline ─► bind_pipeline ─┬─ Ok  ─► registry owns it
//!                                    └─ Err ─► chain owns it ─► release
//! ```
//!
//! Handles removed from the registry by `stop` are released by `stop`.  A
//! handle is therefore released by exactly one party.
//!
//! # Admission
//!
//! `start_master` and `start_viewer` are each split into an admission step
//! (`admit_*`, one critical section, no pipeline call) and the chain that
//! finishes it (`complete_*`).  A connection runs admission inline, before it
//! reads its next frame, so a `stop` or close that follows a request always
//! finds the role that request registered.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use one2many_core::domain::{
    BroadcastError, BroadcastState, EndpointId, Epoch, EvictedViewer, MasterInfo, MasterTeardown,
    PipelineId, SessionId, SessionRegistry, ViewerState, ViewerTicket,
};
use one2many_core::ServerMessage;

use super::pipeline::{PipelineClient, PipelineError};

/// Outbound queue of one participant connection.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Result of removing a session's role under the lock.
enum Removed {
    Master(MasterTeardown<Outbound>),
    Viewer(EvictedViewer<Outbound>),
    Nothing,
}

/// A master tenure registered by [`BroadcastCoordinator::admit_master`].
#[derive(Debug)]
pub struct MasterAdmission {
    id: SessionId,
    epoch: Epoch,
}

/// A viewer registered by [`BroadcastCoordinator::admit_viewer`], with the
/// master state it was admitted against.
#[derive(Debug)]
pub struct ViewerAdmission {
    id: SessionId,
    ticket: ViewerTicket,
    epoch: Epoch,
    pipeline: PipelineId,
    master_endpoint: EndpointId,
}

/// Process-wide coordinator for the single broadcast.
pub struct BroadcastCoordinator {
    registry: Mutex<SessionRegistry<Outbound>>,
    pipeline: Arc<dyn PipelineClient>,
}

impl BroadcastCoordinator {
    pub fn new(pipeline: Arc<dyn PipelineClient>) -> Self {
        Self {
            registry: Mutex::new(SessionRegistry::new()),
            pipeline,
        }
    }

    // ── Master ────────────────────────────────────────────────────────────────

    /// Makes `id` the broadcaster and returns the SDP answer for its offer.
    ///
    /// # Errors
    ///
    /// - [`BroadcastError::AlreadyMaster`] if a master exists or is being set up.
    /// - [`BroadcastError::Cancelled`] if the tenure ended while the chain was
    ///   suspended.
    /// - [`BroadcastError::Pipeline`] if a pipeline call failed; the tenure
    ///   has then been torn down.
    pub async fn start_master(
        &self,
        id: SessionId,
        sdp_offer: &str,
    ) -> Result<String, BroadcastError> {
        let admission = self.admit_master(id).await?;
        self.complete_master(admission, sdp_offer).await
    }

    /// Registers `id` as the provisional master without touching the
    /// pipeline.
    ///
    /// # Errors
    ///
    /// [`BroadcastError::AlreadyMaster`] if a master exists or is being set up.
    pub async fn admit_master(&self, id: SessionId) -> Result<MasterAdmission, BroadcastError> {
        let epoch = self.registry.lock().await.try_set_master(id)?;
        info!("session {id}: registered as master (epoch {epoch})");
        Ok(MasterAdmission { id, epoch })
    }

    /// Runs the pipeline chain for an admitted master.
    ///
    /// # Errors
    ///
    /// As [`start_master`](Self::start_master), minus `AlreadyMaster`.
    pub async fn complete_master(
        &self,
        admission: MasterAdmission,
        sdp_offer: &str,
    ) -> Result<String, BroadcastError> {
        let MasterAdmission { id, epoch } = admission;
        match self.run_master_chain(id, epoch, sdp_offer).await {
            Ok(answer) => {
                info!("session {id}: master active");
                Ok(answer)
            }
            Err(BroadcastError::Cancelled) => {
                info!("session {id}: master setup cancelled");
                Err(BroadcastError::Cancelled)
            }
            Err(e) => {
                if self.end_master_tenure(id, epoch).await {
                    warn!("session {id}: master setup failed: {e}");
                    Err(e)
                } else {
                    // The tenure ended first; the failure is a consequence.
                    info!("session {id}: master setup cancelled ({e})");
                    Err(BroadcastError::Cancelled)
                }
            }
        }
    }

    async fn run_master_chain(
        &self,
        id: SessionId,
        epoch: Epoch,
        sdp_offer: &str,
    ) -> Result<String, BroadcastError> {
        // A pipeline never outlives its master, so every tenure creates one.
        let pipeline = self.pipeline.create_pipeline().await?;
        debug!("session {id}: created pipeline {pipeline}");
        let bound = self
            .registry
            .lock()
            .await
            .bind_pipeline(epoch, pipeline.clone());
        if let Err(stale) = bound {
            self.release_pipeline(stale).await;
            return Err(BroadcastError::Cancelled);
        }

        let endpoint = self.pipeline.create_endpoint(&pipeline).await?;
        debug!("session {id}: created master endpoint {endpoint}");
        let bound = self
            .registry
            .lock()
            .await
            .bind_master_endpoint(epoch, endpoint.clone());
        if let Err(stale) = bound {
            self.release_endpoint(stale).await;
            return Err(BroadcastError::Cancelled);
        }

        let answer = self.pipeline.process_offer(&endpoint, sdp_offer).await?;

        if !self.registry.lock().await.is_current_master(id, epoch) {
            return Err(BroadcastError::Cancelled);
        }
        Ok(answer)
    }

    /// Tears down the master tenure `(id, epoch)` if it is still current.
    ///
    /// Returns `false` when the tenure had already ended.
    async fn end_master_tenure(&self, id: SessionId, epoch: Epoch) -> bool {
        let teardown = {
            let mut reg = self.registry.lock().await;
            if !reg.is_current_master(id, epoch) {
                return false;
            }
            reg.clear_master()
        };
        self.finish_master_teardown(teardown).await;
        true
    }

    // ── Viewer ────────────────────────────────────────────────────────────────

    /// Attaches `id` as a viewer and returns the SDP answer for its offer.
    ///
    /// `conn` is the viewer's outbound queue; it receives `stopCommunication`
    /// if the master goes away.
    ///
    /// # Errors
    ///
    /// - [`BroadcastError::NoActiveSender`] if no master is active, or it
    ///   stopped while this viewer was being set up.
    /// - [`BroadcastError::DuplicateViewer`] if `id` is already viewing.
    /// - [`BroadcastError::Cancelled`] if the viewer stopped during setup.
    /// - [`BroadcastError::Pipeline`] if a pipeline call failed.
    pub async fn start_viewer(
        &self,
        id: SessionId,
        sdp_offer: &str,
        conn: Outbound,
    ) -> Result<String, BroadcastError> {
        let admission = self.admit_viewer(id, conn).await?;
        self.complete_viewer(admission, sdp_offer).await
    }

    /// Registers `id` as a provisional viewer of the active master.
    ///
    /// # Errors
    ///
    /// [`BroadcastError::NoActiveSender`] or
    /// [`BroadcastError::DuplicateViewer`]; nothing is registered then.
    pub async fn admit_viewer(
        &self,
        id: SessionId,
        conn: Outbound,
    ) -> Result<ViewerAdmission, BroadcastError> {
        let mut reg = self.registry.lock().await;
        let (epoch, master_endpoint) = reg.master_ready().ok_or(BroadcastError::NoActiveSender)?;
        let pipeline = reg
            .pipeline()
            .cloned()
            .ok_or(BroadcastError::NoActiveSender)?;
        let ticket = reg.add_viewer(id, conn)?;
        debug!("session {id}: registered as viewer");
        Ok(ViewerAdmission {
            id,
            ticket,
            epoch,
            pipeline,
            master_endpoint,
        })
    }

    /// Runs the pipeline chain for an admitted viewer.
    ///
    /// # Errors
    ///
    /// As [`start_viewer`](Self::start_viewer), minus the admission
    /// rejections.
    pub async fn complete_viewer(
        &self,
        admission: ViewerAdmission,
        sdp_offer: &str,
    ) -> Result<String, BroadcastError> {
        let ViewerAdmission {
            id,
            ticket,
            epoch,
            pipeline,
            master_endpoint,
        } = admission;
        let result = self
            .run_viewer_chain(id, ticket, epoch, &pipeline, &master_endpoint, sdp_offer)
            .await;

        match result {
            Ok(answer) => {
                info!("session {id}: viewer active");
                Ok(answer)
            }
            Err(e) => {
                info!("session {id}: viewer setup ended: {e}");
                self.evict_viewer(id, ticket).await;
                Err(e)
            }
        }
    }

    async fn run_viewer_chain(
        &self,
        id: SessionId,
        ticket: ViewerTicket,
        epoch: Epoch,
        pipeline: &PipelineId,
        master_endpoint: &EndpointId,
        sdp_offer: &str,
    ) -> Result<String, BroadcastError> {
        let endpoint = match self.pipeline.create_endpoint(pipeline).await {
            Ok(endpoint) => endpoint,
            Err(e) => return Err(self.viewer_failure(id, ticket, epoch, e).await),
        };
        debug!("session {id}: created viewer endpoint {endpoint}");

        let bound = {
            let mut reg = self.registry.lock().await;
            if reg.is_master_active_at(epoch) {
                reg.bind_viewer_endpoint(id, ticket, endpoint.clone())
                    .map_err(|stale| (stale, BroadcastError::Cancelled))
            } else {
                Err((endpoint.clone(), BroadcastError::NoActiveSender))
            }
        };
        if let Err((stale, e)) = bound {
            self.release_endpoint(stale).await;
            return Err(e);
        }

        let answer = match self.pipeline.process_offer(&endpoint, sdp_offer).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.viewer_failure(id, ticket, epoch, e).await),
        };
        self.viewer_checkpoint(id, ticket, epoch).await?;

        if let Err(e) = self.pipeline.connect(master_endpoint, &endpoint).await {
            return Err(self.viewer_failure(id, ticket, epoch, e).await);
        }
        self.viewer_checkpoint(id, ticket, epoch).await?;

        Ok(answer)
    }

    /// Reports a superseded chain as such, even when the pipeline call failed
    /// because its handles were already released.
    async fn viewer_failure(
        &self,
        id: SessionId,
        ticket: ViewerTicket,
        epoch: Epoch,
        e: PipelineError,
    ) -> BroadcastError {
        match self.viewer_checkpoint(id, ticket, epoch).await {
            Err(superseded) => superseded,
            Ok(()) => e.into(),
        }
    }

    async fn viewer_checkpoint(
        &self,
        id: SessionId,
        ticket: ViewerTicket,
        epoch: Epoch,
    ) -> Result<(), BroadcastError> {
        let reg = self.registry.lock().await;
        if !reg.is_master_active_at(epoch) {
            Err(BroadcastError::NoActiveSender)
        } else if !reg.has_viewer_ticket(id, ticket) {
            Err(BroadcastError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Removes the viewer registration `ticket` if it is still present and
    /// releases the endpoint it held.
    async fn evict_viewer(&self, id: SessionId, ticket: ViewerTicket) {
        let evicted = self.registry.lock().await.remove_viewer_if(id, ticket);
        if let Some(endpoint) = evicted.and_then(|v| v.endpoint) {
            self.release_endpoint(endpoint).await;
        }
    }

    // ── Stop ──────────────────────────────────────────────────────────────────

    /// Ends whatever role `id` holds.  Unknown ids are ignored.
    ///
    /// Stopping the master notifies every viewer with `stopCommunication` and
    /// releases all endpoints and the pipeline.  Stopping a viewer releases
    /// only its endpoint.
    pub async fn stop(&self, id: SessionId) {
        let removed = {
            let mut reg = self.registry.lock().await;
            if reg.is_master(id) {
                Removed::Master(reg.clear_master())
            } else if let Some(viewer) = reg.remove_viewer(id) {
                Removed::Viewer(viewer)
            } else {
                Removed::Nothing
            }
        };

        match removed {
            Removed::Master(teardown) => {
                info!(
                    "session {id}: master stopped, notifying {} viewer(s)",
                    teardown.viewers.len()
                );
                self.finish_master_teardown(teardown).await;
            }
            Removed::Viewer(viewer) => {
                info!("session {id}: viewer stopped");
                if let Some(endpoint) = viewer.endpoint {
                    self.release_endpoint(endpoint).await;
                }
            }
            Removed::Nothing => debug!("session {id}: stop with no role"),
        }
    }

    /// Tears everything down for process shutdown.
    pub async fn shutdown(&self) {
        let teardown = self.registry.lock().await.drain();
        if !teardown.is_empty() {
            info!("shutting down broadcast");
            self.finish_master_teardown(teardown).await;
        }
    }

    /// Notifies evicted viewers and releases every handle in `teardown`.
    ///
    /// Endpoints are released before the pipeline that contains them.
    async fn finish_master_teardown(&self, teardown: MasterTeardown<Outbound>) {
        let MasterTeardown {
            master_endpoint,
            pipeline,
            viewers,
            ..
        } = teardown;

        let mut endpoints = Vec::with_capacity(viewers.len() + 1);
        for viewer in viewers {
            if let Err(e) = viewer.conn.try_send(ServerMessage::StopCommunication) {
                debug!("session {}: stopCommunication not delivered: {e}", viewer.id);
            }
            endpoints.extend(viewer.endpoint);
        }
        endpoints.extend(master_endpoint);

        join_all(endpoints.into_iter().map(|e| self.release_endpoint(e))).await;

        if let Some(pipeline) = pipeline {
            self.release_pipeline(pipeline).await;
        }
    }

    async fn release_endpoint(&self, endpoint: EndpointId) {
        let name = endpoint.to_string();
        if let Err(e) = self.pipeline.release_endpoint(endpoint).await {
            warn!("failed to release endpoint {name}: {e}");
        }
    }

    async fn release_pipeline(&self, pipeline: PipelineId) {
        let name = pipeline.to_string();
        if let Err(e) = self.pipeline.release_pipeline(pipeline).await {
            warn!("failed to release pipeline {name}: {e}");
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub async fn state(&self) -> BroadcastState {
        self.registry.lock().await.state()
    }

    pub async fn current_master(&self) -> Option<MasterInfo> {
        self.registry.lock().await.current_master()
    }

    pub async fn viewer_state(&self, id: SessionId) -> Option<ViewerState> {
        self.registry.lock().await.viewer_state(id)
    }

    pub async fn viewers(&self) -> Vec<SessionId> {
        self.registry.lock().await.all_viewers()
    }
}
