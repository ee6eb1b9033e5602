//! SessionRegistry: who is broadcasting, who is watching, and which pipeline
//! handles belong to them.
//!
//! The registry is pure state.  It performs no I/O and never awaits; the
//! coordinator owns it behind a single lock and calls into it between
//! asynchronous pipeline calls.
//!
//! # Ownership of pipeline handles
//!
//! A pipeline or endpoint handle is always owned by exactly one party:
//!
//! - the registry, once it has been bound to a master or viewer record, or
//! - the caller that just created it or just removed it from the registry.
//!
//! Every method that removes a record returns the handles it held, and every
//! `bind_*` method hands the handle back when the record it targets is gone.
//! Whoever ends up holding a handle releases it, which gives "released
//! exactly once" without any extra bookkeeping.
//!
//! # Epochs
//!
//! ```text
//!             try_set_master            bind_master_endpoint
//!   Idle  ───────────────────►  MasterSettingUp  ──────────────►  MasterActive
//!    ▲                                 │                              │
//!    └─────────────── clear_master (epoch += 1) ◄─────────────────────┘
//! ```
//!
//! A master tenure is identified by the epoch captured in `try_set_master`.
//! `clear_master` bumps the epoch, so a setup chain holding an old epoch can
//! detect that it has been superseded no matter what happened in between.

use std::collections::HashMap;
use std::fmt;

use super::error::BroadcastError;
use super::handle::{EndpointId, PipelineId};
use super::session::SessionId;

/// Generation marker for master tenures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one viewer registration.
///
/// A session may stop viewing and request again while the first setup chain
/// is still suspended; the ticket lets the old chain recognise that the
/// record it created is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerTicket(u64);

/// Process-wide broadcast state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastState {
    Idle,
    /// A master is registered but its endpoint is not bound yet.
    MasterSettingUp,
    /// The master's endpoint is bound; viewers may attach.
    MasterActive,
}

/// Per-viewer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    SettingUp,
    Active,
}

/// Snapshot of the current master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterInfo {
    pub id: SessionId,
    pub epoch: Epoch,
    pub endpoint: Option<EndpointId>,
}

/// A viewer record removed from the registry, with everything it owned.
#[derive(Debug)]
pub struct EvictedViewer<C> {
    pub id: SessionId,
    pub conn: C,
    pub endpoint: Option<EndpointId>,
}

/// Everything that left the registry when the master was cleared.
///
/// The receiver owns every handle in here and must release each one.
#[derive(Debug)]
pub struct MasterTeardown<C> {
    pub master: Option<SessionId>,
    pub master_endpoint: Option<EndpointId>,
    pub pipeline: Option<PipelineId>,
    pub viewers: Vec<EvictedViewer<C>>,
}

impl<C> MasterTeardown<C> {
    /// `true` when nothing was removed.
    pub fn is_empty(&self) -> bool {
        self.master.is_none()
            && self.master_endpoint.is_none()
            && self.pipeline.is_none()
            && self.viewers.is_empty()
    }
}

#[derive(Debug)]
struct MasterRecord {
    id: SessionId,
    epoch: Epoch,
    endpoint: Option<EndpointId>,
}

#[derive(Debug)]
struct ViewerRecord<C> {
    ticket: ViewerTicket,
    conn: C,
    endpoint: Option<EndpointId>,
}

/// The single source of truth for master, pipeline and viewers.
///
/// `C` is the viewer's connection handle, used by the coordinator to notify
/// viewers when the master goes away.
#[derive(Debug)]
pub struct SessionRegistry<C> {
    master: Option<MasterRecord>,
    pipeline: Option<(Epoch, PipelineId)>,
    viewers: HashMap<SessionId, ViewerRecord<C>>,
    epoch: Epoch,
    next_ticket: u64,
}

impl<C> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self {
            master: None,
            pipeline: None,
            viewers: HashMap::new(),
            epoch: Epoch::default(),
            next_ticket: 0,
        }
    }
}

impl<C> SessionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Master ────────────────────────────────────────────────────────────────

    /// Registers `id` as the provisional master.
    ///
    /// # Errors
    ///
    /// [`BroadcastError::AlreadyMaster`] if any master exists, including one
    /// still being set up.
    pub fn try_set_master(&mut self, id: SessionId) -> Result<Epoch, BroadcastError> {
        if self.master.is_some() {
            return Err(BroadcastError::AlreadyMaster);
        }
        self.master = Some(MasterRecord {
            id,
            epoch: self.epoch,
            endpoint: None,
        });
        Ok(self.epoch)
    }

    /// Removes the master, the pipeline and every viewer, and bumps the epoch.
    pub fn clear_master(&mut self) -> MasterTeardown<C> {
        self.epoch = Epoch(self.epoch.0.wrapping_add(1));
        let master = self.master.take();
        let viewers = self
            .viewers
            .drain()
            .map(|(id, record)| EvictedViewer {
                id,
                conn: record.conn,
                endpoint: record.endpoint,
            })
            .collect();
        MasterTeardown {
            master: master.as_ref().map(|m| m.id),
            master_endpoint: master.and_then(|m| m.endpoint),
            pipeline: self.pipeline.take().map(|(_, p)| p),
            viewers,
        }
    }

    /// Empties the registry for process shutdown.
    pub fn drain(&mut self) -> MasterTeardown<C> {
        self.clear_master()
    }

    pub fn current_master(&self) -> Option<MasterInfo> {
        self.master.as_ref().map(|m| MasterInfo {
            id: m.id,
            epoch: m.epoch,
            endpoint: m.endpoint.clone(),
        })
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_master(&self, id: SessionId) -> bool {
        self.master.as_ref().is_some_and(|m| m.id == id)
    }

    /// Checkpoint predicate for master setup chains: is `(id, epoch)` still
    /// the live tenure?
    pub fn is_current_master(&self, id: SessionId, epoch: Epoch) -> bool {
        self.epoch == epoch
            && self
                .master
                .as_ref()
                .is_some_and(|m| m.id == id && m.epoch == epoch)
    }

    /// Epoch and endpoint of a master whose endpoint is bound.
    pub fn master_ready(&self) -> Option<(Epoch, EndpointId)> {
        self.master
            .as_ref()
            .filter(|m| m.epoch == self.epoch)
            .and_then(|m| m.endpoint.clone().map(|e| (m.epoch, e)))
    }

    /// Checkpoint predicate for viewer setup chains: is the master admitted
    /// at `epoch` still present with a bound endpoint?
    pub fn is_master_active_at(&self, epoch: Epoch) -> bool {
        self.master_ready().is_some_and(|(e, _)| e == epoch)
    }

    pub fn pipeline(&self) -> Option<&PipelineId> {
        self.pipeline.as_ref().map(|(_, p)| p)
    }

    /// Attaches a freshly created pipeline to the master tenure `epoch`.
    ///
    /// # Errors
    ///
    /// Hands the pipeline back when the tenure is gone or a pipeline is
    /// already bound; the caller then owns it and must release it.
    pub fn bind_pipeline(&mut self, epoch: Epoch, pipeline: PipelineId) -> Result<(), PipelineId> {
        let live = self.epoch == epoch && self.master.as_ref().is_some_and(|m| m.epoch == epoch);
        if !live || self.pipeline.is_some() {
            return Err(pipeline);
        }
        self.pipeline = Some((epoch, pipeline));
        Ok(())
    }

    /// Attaches the master's endpoint, moving the broadcast to `MasterActive`.
    ///
    /// # Errors
    ///
    /// Hands the endpoint back when the tenure is gone or already has one.
    pub fn bind_master_endpoint(
        &mut self,
        epoch: Epoch,
        endpoint: EndpointId,
    ) -> Result<(), EndpointId> {
        if self.epoch != epoch {
            return Err(endpoint);
        }
        match self.master.as_mut() {
            Some(m) if m.epoch == epoch && m.endpoint.is_none() => {
                m.endpoint = Some(endpoint);
                Ok(())
            }
            _ => Err(endpoint),
        }
    }

    pub fn state(&self) -> BroadcastState {
        match &self.master {
            None => BroadcastState::Idle,
            Some(m) if m.endpoint.is_some() => BroadcastState::MasterActive,
            Some(_) => BroadcastState::MasterSettingUp,
        }
    }

    // ── Viewers ───────────────────────────────────────────────────────────────

    /// Registers a provisional viewer.
    ///
    /// # Errors
    ///
    /// [`BroadcastError::DuplicateViewer`] if `id` already has a registration.
    pub fn add_viewer(&mut self, id: SessionId, conn: C) -> Result<ViewerTicket, BroadcastError> {
        if self.viewers.contains_key(&id) {
            return Err(BroadcastError::DuplicateViewer);
        }
        let ticket = ViewerTicket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.viewers.insert(
            id,
            ViewerRecord {
                ticket,
                conn,
                endpoint: None,
            },
        );
        Ok(ticket)
    }

    /// Attaches an endpoint to the viewer registration `ticket`.
    ///
    /// # Errors
    ///
    /// Hands the endpoint back when the registration is gone.
    pub fn bind_viewer_endpoint(
        &mut self,
        id: SessionId,
        ticket: ViewerTicket,
        endpoint: EndpointId,
    ) -> Result<(), EndpointId> {
        match self.viewers.get_mut(&id) {
            Some(v) if v.ticket == ticket && v.endpoint.is_none() => {
                v.endpoint = Some(endpoint);
                Ok(())
            }
            _ => Err(endpoint),
        }
    }

    /// Removes whatever viewer registration `id` has.
    pub fn remove_viewer(&mut self, id: SessionId) -> Option<EvictedViewer<C>> {
        self.viewers.remove(&id).map(|record| EvictedViewer {
            id,
            conn: record.conn,
            endpoint: record.endpoint,
        })
    }

    /// Removes the viewer registration only if it is still `ticket`.
    pub fn remove_viewer_if(
        &mut self,
        id: SessionId,
        ticket: ViewerTicket,
    ) -> Option<EvictedViewer<C>> {
        if self.has_viewer_ticket(id, ticket) {
            self.remove_viewer(id)
        } else {
            None
        }
    }

    pub fn has_viewer_ticket(&self, id: SessionId, ticket: ViewerTicket) -> bool {
        self.viewers.get(&id).is_some_and(|v| v.ticket == ticket)
    }

    pub fn is_viewer(&self, id: SessionId) -> bool {
        self.viewers.contains_key(&id)
    }

    pub fn viewer_state(&self, id: SessionId) -> Option<ViewerState> {
        self.viewers.get(&id).map(|v| {
            if v.endpoint.is_some() {
                ViewerState::Active
            } else {
                ViewerState::SettingUp
            }
        })
    }

    /// Identifiers of every registered viewer, in ascending order.
    pub fn all_viewers(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.viewers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u64) -> SessionId {
        SessionId::new(n)
    }

    fn pipeline() -> PipelineId {
        PipelineId::new("p")
    }

    fn endpoint(name: &str) -> EndpointId {
        EndpointId::new(name)
    }

    /// Registry with master 1 active (pipeline and endpoint bound).
    fn active_registry() -> (SessionRegistry<&'static str>, Epoch) {
        let mut reg = SessionRegistry::new();
        let epoch = reg.try_set_master(sid(1)).unwrap();
        reg.bind_pipeline(epoch, pipeline()).unwrap();
        reg.bind_master_endpoint(epoch, endpoint("m")).unwrap();
        (reg, epoch)
    }

    #[test]
    fn test_registry_starts_idle() {
        let reg: SessionRegistry<()> = SessionRegistry::new();
        assert_eq!(reg.state(), BroadcastState::Idle);
        assert_eq!(reg.current_epoch(), Epoch::default());
        assert!(reg.current_master().is_none());
        assert!(reg.pipeline().is_none());
        assert!(reg.all_viewers().is_empty());
    }

    #[test]
    fn test_try_set_master_captures_current_epoch() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        let epoch = reg.try_set_master(sid(1)).unwrap();
        assert_eq!(epoch, reg.current_epoch());
        assert_eq!(reg.state(), BroadcastState::MasterSettingUp);
        assert!(reg.is_current_master(sid(1), epoch));
    }

    #[test]
    fn test_second_master_rejected_while_first_is_setting_up() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        reg.try_set_master(sid(1)).unwrap();
        assert_eq!(reg.try_set_master(sid(2)), Err(BroadcastError::AlreadyMaster));
        assert_eq!(reg.current_master().unwrap().id, sid(1));
    }

    #[test]
    fn test_clear_master_bumps_epoch_and_returns_handles() {
        // Arrange
        let (mut reg, epoch) = active_registry();
        reg.add_viewer(sid(2), "conn-2").unwrap();

        // Act
        let teardown = reg.clear_master();

        // Assert
        assert_eq!(teardown.master, Some(sid(1)));
        assert_eq!(teardown.master_endpoint, Some(endpoint("m")));
        assert_eq!(teardown.pipeline, Some(pipeline()));
        assert_eq!(teardown.viewers.len(), 1);
        assert_eq!(teardown.viewers[0].conn, "conn-2");
        assert!(reg.current_epoch() > epoch);
        assert_eq!(reg.state(), BroadcastState::Idle);
        assert!(reg.pipeline().is_none());
        assert_eq!(reg.viewer_count(), 0);
    }

    #[test]
    fn test_stale_epoch_no_longer_current_after_new_master() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        let old = reg.try_set_master(sid(1)).unwrap();
        reg.clear_master();
        let new = reg.try_set_master(sid(1)).unwrap();

        // Same session id, different tenure.
        assert_ne!(old, new);
        assert!(!reg.is_current_master(sid(1), old));
        assert!(reg.is_current_master(sid(1), new));
    }

    #[test]
    fn test_bind_pipeline_with_stale_epoch_hands_it_back() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        let epoch = reg.try_set_master(sid(1)).unwrap();
        reg.clear_master();

        let result = reg.bind_pipeline(epoch, pipeline());

        assert_eq!(result, Err(pipeline()));
        assert!(reg.pipeline().is_none());
    }

    #[test]
    fn test_bind_pipeline_twice_hands_second_back() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        let epoch = reg.try_set_master(sid(1)).unwrap();
        reg.bind_pipeline(epoch, pipeline()).unwrap();
        let second = PipelineId::new("p2");
        assert_eq!(reg.bind_pipeline(epoch, second.clone()), Err(second));
        assert_eq!(reg.pipeline(), Some(&pipeline()));
    }

    #[test]
    fn test_bind_master_endpoint_activates_broadcast() {
        let (reg, epoch) = active_registry();
        assert_eq!(reg.state(), BroadcastState::MasterActive);
        assert_eq!(reg.master_ready(), Some((epoch, endpoint("m"))));
        assert!(reg.is_master_active_at(epoch));
    }

    #[test]
    fn test_bind_master_endpoint_after_clear_hands_it_back() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        let epoch = reg.try_set_master(sid(1)).unwrap();
        reg.clear_master();
        reg.try_set_master(sid(2)).unwrap();

        // The old chain must not attach its endpoint to the new master.
        let result = reg.bind_master_endpoint(epoch, endpoint("old"));

        assert_eq!(result, Err(endpoint("old")));
        assert_eq!(reg.state(), BroadcastState::MasterSettingUp);
    }

    #[test]
    fn test_master_not_ready_before_endpoint_bound() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        let epoch = reg.try_set_master(sid(1)).unwrap();
        assert!(reg.master_ready().is_none());
        assert!(!reg.is_master_active_at(epoch));
    }

    #[test]
    fn test_add_viewer_rejects_duplicates() {
        let (mut reg, _) = active_registry();
        reg.add_viewer(sid(2), "a").unwrap();
        assert_eq!(reg.add_viewer(sid(2), "b"), Err(BroadcastError::DuplicateViewer));
        assert_eq!(reg.viewer_count(), 1);
    }

    #[test]
    fn test_viewer_state_follows_endpoint_binding() {
        let (mut reg, _) = active_registry();
        let ticket = reg.add_viewer(sid(2), "a").unwrap();
        assert_eq!(reg.viewer_state(sid(2)), Some(ViewerState::SettingUp));

        reg.bind_viewer_endpoint(sid(2), ticket, endpoint("v2")).unwrap();

        assert_eq!(reg.viewer_state(sid(2)), Some(ViewerState::Active));
    }

    #[test]
    fn test_bind_viewer_endpoint_for_stale_ticket_hands_it_back() {
        // Arrange: register, remove, and register the same id again
        let (mut reg, _) = active_registry();
        let old = reg.add_viewer(sid(2), "a").unwrap();
        reg.remove_viewer(sid(2));
        let new = reg.add_viewer(sid(2), "b").unwrap();
        assert_ne!(old, new);

        // Act
        let result = reg.bind_viewer_endpoint(sid(2), old, endpoint("stale"));

        // Assert
        assert_eq!(result, Err(endpoint("stale")));
        assert_eq!(reg.viewer_state(sid(2)), Some(ViewerState::SettingUp));
    }

    #[test]
    fn test_remove_viewer_if_ignores_other_ticket() {
        let (mut reg, _) = active_registry();
        let old = reg.add_viewer(sid(2), "a").unwrap();
        reg.remove_viewer(sid(2));
        reg.add_viewer(sid(2), "b").unwrap();

        assert!(reg.remove_viewer_if(sid(2), old).is_none());
        assert!(reg.is_viewer(sid(2)));
    }

    #[test]
    fn test_remove_viewer_returns_bound_endpoint() {
        let (mut reg, _) = active_registry();
        let ticket = reg.add_viewer(sid(2), "a").unwrap();
        reg.bind_viewer_endpoint(sid(2), ticket, endpoint("v2")).unwrap();

        let evicted = reg.remove_viewer_if(sid(2), ticket).unwrap();

        assert_eq!(evicted.id, sid(2));
        assert_eq!(evicted.endpoint, Some(endpoint("v2")));
        assert!(!reg.is_viewer(sid(2)));
    }

    #[test]
    fn test_remove_unknown_viewer_is_noop() {
        let (mut reg, _) = active_registry();
        assert!(reg.remove_viewer(sid(9)).is_none());
    }

    #[test]
    fn test_all_viewers_sorted() {
        let (mut reg, _) = active_registry();
        for n in [5, 2, 9] {
            reg.add_viewer(sid(n), "c").unwrap();
        }
        assert_eq!(reg.all_viewers(), vec![sid(2), sid(5), sid(9)]);
    }

    #[test]
    fn test_new_master_never_inherits_a_pipeline() {
        // Arrange
        let (mut reg, old_epoch) = active_registry();
        reg.clear_master();

        // Act
        let epoch = reg.try_set_master(sid(7)).unwrap();
        let stale = reg.bind_pipeline(old_epoch, pipeline());

        // Assert
        assert!(reg.pipeline().is_none());
        assert_eq!(stale, Err(pipeline()));
        assert!(reg.bind_pipeline(epoch, pipeline()).is_ok());
    }

    #[test]
    fn test_teardown_of_empty_registry_is_empty() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        assert!(reg.drain().is_empty());
    }
}
