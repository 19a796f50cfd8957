use crate::authority::{AuthorityMode, AuthorityReconciler};
use crate::debug::{log_message, trace_teleport, trace_underrun};
use crate::dirty::{DirtyConfig, DirtyDetector};
use crate::error::{Result, SyncError};
use crate::protocol::{EntityId, Message, MessagePayload};
use crate::rate_limit::SendRateLimiter;
use crate::snapshot::SnapshotBuffer;
use crate::timesync::{TimeSync, TimeSyncConfig};
use crate::transform::TransformState;
use crate::transport::Transport;
use ahash::AHashMap;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub dirty: DirtyConfig,
    pub time: TimeSyncConfig,
    /// Send cap for client-authoritative entities, in updates per second.
    pub client_sync_rate: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dirty: DirtyConfig::default(),
            time: TimeSyncConfig::default(),
            client_sync_rate: 20.0,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position_precision(mut self, x: f32, y: f32, z: f32) -> Self {
        self.dirty = self.dirty.with_position_precision(x, y, z);
        self
    }

    pub fn with_rotation_precision(mut self, radians: f32) -> Self {
        self.dirty = self.dirty.with_rotation_precision(radians);
        self
    }

    pub fn with_client_delay(mut self, delay: f64) -> Self {
        self.time = self.time.with_client_delay(delay);
        self
    }

    pub fn with_catch_up_bounds(mut self, min: f64, max: f64) -> Self {
        self.time = self.time.with_catch_up_bounds(min, max);
        self
    }

    pub fn with_client_sync_rate(mut self, rate: f64) -> Self {
        self.client_sync_rate = rate;
        self
    }
}

/// Anything a processed message can mean to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A snapshot was buffered for interpolation.
    SnapshotBuffered { entity_id: EntityId },
    /// A snapshot arrived but was not usable (unknown entity, stale, or the
    /// local side owns the entity and renders itself directly).
    SnapshotIgnored { entity_id: EntityId },
    /// A client-authoritative update was accepted as ground truth and
    /// rebroadcast.
    ClientUpdateAccepted { entity_id: EntityId },
    /// A peer sent something it had no authority to send. Signalled for
    /// external enforcement; synchronization itself carries on.
    ProtocolViolation { entity_id: EntityId, reason: String },
    Teleported { entity_id: EntityId },
    AuthorityGranted { entity_id: EntityId },
    AuthorityRevoked { entity_id: EntityId },
}

struct ServerEntity {
    reconciler: AuthorityReconciler,
    dirty: DirtyDetector,
    /// Co-located view of a client-controlled entity: the server buffers and
    /// interpolates the owner's snapshots like any remote observer, keeping
    /// its local render consistent with theirs.
    buffer: SnapshotBuffer,
    last_applied: Option<TransformState>,
    /// Timestamp of the last discontinuity (teleport or authority handoff).
    /// Snapshots sampled before it are stale and must not repopulate the
    /// cleared history.
    teleport_barrier: Option<f64>,
}

/// Authoritative endpoint: samples server-owned entities, decides what is
/// worth broadcasting, and reconciles client-owned updates.
pub struct ServerSync<T: Transport> {
    transport: T,
    config: SyncConfig,
    entities: AHashMap<EntityId, ServerEntity>,
    time: TimeSync,
    snapshots_sent: u64,
    snapshots_ignored: u64,
    teleports_sent: u64,
    violations: u64,
    underruns: u64,
}

impl<T: Transport> ServerSync<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        let time = TimeSync::new(config.time.clone());

        Self {
            transport,
            config,
            entities: AHashMap::new(),
            time,
            snapshots_sent: 0,
            snapshots_ignored: 0,
            teleports_sent: 0,
            violations: 0,
            underruns: 0,
        }
    }

    /// Begin synchronizing an entity under the given authority mode.
    /// Re-registration resets all per-entity state.
    pub fn register_entity(&mut self, entity_id: EntityId, mode: AuthorityMode) {
        self.entities.insert(
            entity_id,
            ServerEntity {
                reconciler: AuthorityReconciler::new(mode),
                dirty: DirtyDetector::new(self.config.dirty.clone()),
                buffer: SnapshotBuffer::new(),
                last_applied: None,
                teleport_barrier: None,
            },
        );
    }

    pub fn unregister_entity(&mut self, entity_id: EntityId) -> Result<()> {
        self.entities
            .remove(&entity_id)
            .map(|_| ())
            .ok_or(SyncError::MissingRegistration(entity_id))
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.entities.contains_key(&entity_id)
    }

    pub fn authority_mode(&self, entity_id: EntityId) -> Result<AuthorityMode> {
        self.entities
            .get(&entity_id)
            .map(|e| e.reconciler.mode())
            .ok_or(SyncError::MissingRegistration(entity_id))
    }

    /// Feed the server's own transform sample for a server-controlled
    /// entity. Broadcasts a snapshot only when the dirty detector decides
    /// the divergence is worth the bandwidth; returns whether one was sent.
    pub fn update_transform(
        &mut self,
        entity_id: EntityId,
        state: TransformState,
        now: f64,
    ) -> Result<bool> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        if !entity.reconciler.samples_locally(true) {
            return Err(SyncError::NotAuthoritative(entity_id));
        }

        entity.last_applied = Some(state);

        if !entity.dirty.check(state) {
            return Ok(false);
        }
        entity.dirty.clear_needs_update();

        let message = Message::snapshot(entity_id, state, now);
        log_message("->", &message);
        self.transport.send(&message)?;
        self.snapshots_sent += 1;

        Ok(true)
    }

    /// Explicit discontinuity: delivered reliably and ordered ahead of any
    /// later snapshot, applied exactly, and every observer's history for the
    /// entity is invalidated.
    pub fn teleport(&mut self, entity_id: EntityId, state: TransformState, now: f64) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        entity.buffer.clear();
        entity.dirty.rebase(state);
        entity.last_applied = Some(state);
        entity.teleport_barrier = Some(now);

        let message = Message::teleport(entity_id, state, now);
        log_message("->", &message);
        self.transport.send(&message)?;
        self.teleports_sent += 1;
        trace_teleport(entity_id, now);

        Ok(())
    }

    /// Hand the entity to client control. The co-located view starts fresh
    /// from the owner's samples.
    pub fn grant_authority(&mut self, entity_id: EntityId, now: f64) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        if !entity.reconciler.grant() {
            return Ok(());
        }
        entity.buffer.clear();
        entity.teleport_barrier = Some(now);

        let message = Message::authority_grant(entity_id, now);
        log_message("->", &message);
        self.transport.send(&message)
    }

    /// Take the entity back under server control. Interpolation history from
    /// the old authority is discarded; the dirty baseline rebases to the
    /// last known state so the first server sample after the handoff is
    /// compared against where the entity actually is.
    pub fn revoke_authority(&mut self, entity_id: EntityId, now: f64) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        if !entity.reconciler.revoke() {
            return Ok(());
        }
        entity.buffer.clear();
        entity.teleport_barrier = Some(now);
        if let Some(state) = entity.last_applied {
            entity.dirty.rebase(state);
        }

        let message = Message::authority_revoke(entity_id, now);
        log_message("->", &message);
        self.transport.send(&message)
    }

    /// Pull one message from the transport and process it. Returns `None`
    /// when the transport has nothing pending.
    pub fn receive(&mut self) -> Result<Option<SyncEvent>> {
        match self.transport.receive()? {
            Some(message) => {
                log_message("<-", &message);
                Ok(Some(self.process_message(message)?))
            }
            None => Ok(None),
        }
    }

    fn process_message(&mut self, message: Message) -> Result<SyncEvent> {
        let entity_id = message.entity_id();
        let timestamp = message.header.timestamp;

        match message.payload {
            MessagePayload::Snapshot { entity_id, state } => {
                let Some(entity) = self.entities.get_mut(&entity_id) else {
                    self.violations += 1;
                    return Ok(SyncEvent::ProtocolViolation {
                        entity_id,
                        reason: "update for unregistered entity".to_string(),
                    });
                };

                if !entity.reconciler.accepts_client_updates() {
                    self.violations += 1;
                    return Ok(SyncEvent::ProtocolViolation {
                        entity_id,
                        reason: "authoritative update without granted authority".to_string(),
                    });
                }

                // Sampled before the last discontinuity: the cleared history
                // must not be repopulated with pre-teleport state.
                if entity.teleport_barrier.is_some_and(|barrier| timestamp < barrier) {
                    self.snapshots_ignored += 1;
                    return Ok(SyncEvent::SnapshotIgnored { entity_id });
                }

                // Ground truth as-is: no physics re-validation, immediate
                // rebroadcast to other observers, and the same sample feeds
                // the co-located view for interpolated local rendering.
                self.time.observe(timestamp);
                entity.buffer.push(timestamp, state);
                entity.dirty.mark_dirty(state);
                entity.dirty.clear_needs_update();

                let rebroadcast = Message::snapshot(entity_id, state, timestamp);
                self.transport.send(&rebroadcast)?;
                self.snapshots_sent += 1;

                Ok(SyncEvent::ClientUpdateAccepted { entity_id })
            }
            _ => {
                // Clients have no business sending control messages.
                self.violations += 1;
                Ok(SyncEvent::ProtocolViolation {
                    entity_id,
                    reason: "control message from non-authoritative peer".to_string(),
                })
            }
        }
    }

    /// Advance the co-located render clock and prune history no future
    /// query can reach.
    pub fn tick(&mut self, dt: f64) {
        self.time.advance(dt);
        let cutoff = self.time.interpolation_time();
        for entity in self.entities.values_mut() {
            entity.buffer.remove_older_than(cutoff);
        }
    }

    /// Local render view of an entity. Server-controlled entities are ground
    /// truth here and need no buffering; client-controlled entities are
    /// interpolated like any remote observer would.
    pub fn sample(&mut self, entity_id: EntityId) -> Result<Option<TransformState>> {
        let query_time = self.time.interpolation_time();
        self.sample_at(entity_id, query_time)
    }

    /// Render view at an explicit query time.
    pub fn sample_at(
        &mut self,
        entity_id: EntityId,
        query_time: f64,
    ) -> Result<Option<TransformState>> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        match entity.reconciler.mode() {
            AuthorityMode::ServerControlled => Ok(entity.last_applied),
            AuthorityMode::ClientControlled => {
                if let Some(latest) = entity.buffer.latest() {
                    if query_time > latest.timestamp {
                        self.underruns += 1;
                        trace_underrun(entity_id, query_time);
                    }
                }

                let state = entity.buffer.sample(query_time).or(entity.last_applied);
                if let Some(state) = state {
                    entity.last_applied = Some(state);
                }
                Ok(state)
            }
        }
    }

    pub fn stats(&self) -> ServerSyncStats {
        ServerSyncStats {
            snapshots_sent: self.snapshots_sent,
            snapshots_ignored: self.snapshots_ignored,
            teleports_sent: self.teleports_sent,
            violations: self.violations,
            underruns: self.underruns,
            entity_count: self.entities.len(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerSyncStats {
    pub snapshots_sent: u64,
    pub snapshots_ignored: u64,
    pub teleports_sent: u64,
    pub violations: u64,
    pub underruns: u64,
    pub entity_count: usize,
}

struct ClientEntity {
    reconciler: AuthorityReconciler,
    buffer: SnapshotBuffer,
    dirty: DirtyDetector,
    limiter: SendRateLimiter,
    last_applied: Option<TransformState>,
    /// Timestamp of the last discontinuity (teleport or authority handoff).
    /// The snapshot channel tolerates reordering, so samples sent before
    /// the discontinuity can arrive after it; they must not land in the
    /// cleared buffer and drag the render back to pre-teleport positions.
    teleport_barrier: Option<f64>,
}

/// Observing endpoint: buffers server snapshots behind a smoothed render
/// clock and, for entities it was granted authority over, samples itself and
/// transmits at a capped rate.
pub struct ClientSync<T: Transport> {
    transport: T,
    config: SyncConfig,
    entities: AHashMap<EntityId, ClientEntity>,
    time: TimeSync,
    snapshots_buffered: u64,
    snapshots_ignored: u64,
    underruns: u64,
}

impl<T: Transport> ClientSync<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        let time = TimeSync::new(config.time.clone());

        Self {
            transport,
            config,
            entities: AHashMap::new(),
            time,
            snapshots_buffered: 0,
            snapshots_ignored: 0,
            underruns: 0,
        }
    }

    /// Begin interpolating an entity. Entities start server-controlled;
    /// authority arrives by grant message.
    pub fn register_entity(&mut self, entity_id: EntityId) {
        self.entities.insert(
            entity_id,
            ClientEntity {
                reconciler: AuthorityReconciler::new(AuthorityMode::ServerControlled),
                buffer: SnapshotBuffer::new(),
                dirty: DirtyDetector::new(self.config.dirty.clone()),
                limiter: SendRateLimiter::new(self.config.client_sync_rate),
                last_applied: None,
                teleport_barrier: None,
            },
        );
    }

    pub fn unregister_entity(&mut self, entity_id: EntityId) -> Result<()> {
        self.entities
            .remove(&entity_id)
            .map(|_| ())
            .ok_or(SyncError::MissingRegistration(entity_id))
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.entities.contains_key(&entity_id)
    }

    pub fn has_authority(&self, entity_id: EntityId) -> Result<bool> {
        self.entities
            .get(&entity_id)
            .map(|e| e.reconciler.mode() == AuthorityMode::ClientControlled)
            .ok_or(SyncError::MissingRegistration(entity_id))
    }

    /// Pull one message from the transport and process it. Returns `None`
    /// when the transport has nothing pending.
    pub fn receive(&mut self) -> Result<Option<SyncEvent>> {
        match self.transport.receive()? {
            Some(message) => {
                log_message("<-", &message);
                Ok(Some(self.process_message(message)))
            }
            None => Ok(None),
        }
    }

    fn process_message(&mut self, message: Message) -> SyncEvent {
        let timestamp = message.header.timestamp;

        match message.payload {
            MessagePayload::Snapshot { entity_id, state } => {
                let Some(entity) = self.entities.get_mut(&entity_id) else {
                    self.snapshots_ignored += 1;
                    return SyncEvent::SnapshotIgnored { entity_id };
                };

                // Sampled before the last discontinuity: dropping it keeps
                // the cleared history clear.
                if entity.teleport_barrier.is_some_and(|barrier| timestamp < barrier) {
                    self.snapshots_ignored += 1;
                    return SyncEvent::SnapshotIgnored { entity_id };
                }

                self.time.observe(timestamp);

                // An authoritative owner renders its input-driven transform
                // directly; buffering its own echoes would only add latency.
                let is_owner = entity.reconciler.mode() == AuthorityMode::ClientControlled;
                if !entity.reconciler.interpolates_locally(is_owner) {
                    self.snapshots_ignored += 1;
                    return SyncEvent::SnapshotIgnored { entity_id };
                }

                if entity.buffer.push(timestamp, state) {
                    self.snapshots_buffered += 1;
                    SyncEvent::SnapshotBuffered { entity_id }
                } else {
                    self.snapshots_ignored += 1;
                    SyncEvent::SnapshotIgnored { entity_id }
                }
            }
            MessagePayload::Teleport { entity_id, state } => {
                let Some(entity) = self.entities.get_mut(&entity_id) else {
                    self.snapshots_ignored += 1;
                    return SyncEvent::SnapshotIgnored { entity_id };
                };

                self.time.observe(timestamp);
                entity.buffer.clear();
                entity.last_applied = Some(state);
                entity.dirty.rebase(state);
                entity.teleport_barrier = Some(timestamp);
                trace_teleport(entity_id, timestamp);

                SyncEvent::Teleported { entity_id }
            }
            MessagePayload::AuthorityGrant { entity_id } => {
                let Some(entity) = self.entities.get_mut(&entity_id) else {
                    self.snapshots_ignored += 1;
                    return SyncEvent::SnapshotIgnored { entity_id };
                };

                if entity.reconciler.grant() {
                    // Seed direct rendering from the current interpolated
                    // view so the handoff has no visual discontinuity.
                    let seed = entity
                        .buffer
                        .sample(self.time.interpolation_time())
                        .or(entity.last_applied);
                    if let Some(state) = seed {
                        entity.last_applied = Some(state);
                        entity.dirty.rebase(state);
                    }
                    entity.buffer.clear();
                    entity.teleport_barrier = Some(timestamp);
                    entity.limiter.reset();
                }

                SyncEvent::AuthorityGranted { entity_id }
            }
            MessagePayload::AuthorityRevoke { entity_id } => {
                let Some(entity) = self.entities.get_mut(&entity_id) else {
                    self.snapshots_ignored += 1;
                    return SyncEvent::SnapshotIgnored { entity_id };
                };

                if entity.reconciler.revoke() {
                    // Held last state covers the gap until fresh server
                    // snapshots arrive; samples the old authority produced
                    // before the handoff stay out of the new history.
                    entity.buffer.clear();
                    entity.teleport_barrier = Some(timestamp);
                }

                SyncEvent::AuthorityRevoked { entity_id }
            }
        }
    }

    /// Feed this client's own transform sample for an entity it was granted
    /// authority over. Sends when the dirty detector triggers (or an earlier
    /// trigger is still pending), but never faster than the configured sync
    /// rate. Returns whether a snapshot went out.
    pub fn update_owned(
        &mut self,
        entity_id: EntityId,
        state: TransformState,
        now: f64,
    ) -> Result<bool> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        if !entity.reconciler.samples_locally(false) {
            return Err(SyncError::NotAuthoritative(entity_id));
        }

        entity.last_applied = Some(state);

        let triggered = entity.dirty.check(state);
        if !triggered && !entity.dirty.needs_update() {
            return Ok(false);
        }

        if !entity.limiter.try_acquire(now) {
            // Keep the pending flag; the next allowed tick transmits the
            // state current at that point.
            return Ok(false);
        }

        entity.dirty.rebase(state);

        let message = Message::snapshot(entity_id, state, now);
        log_message("->", &message);
        self.transport.send(&message)?;

        Ok(true)
    }

    /// Advance the render clock and prune history no future query can reach.
    pub fn tick(&mut self, dt: f64) {
        self.time.advance(dt);
        let cutoff = self.time.interpolation_time();
        for entity in self.entities.values_mut() {
            entity.buffer.remove_older_than(cutoff);
        }
    }

    /// Interpolated render state at the current render clock. Underruns
    /// (stalls) hold the last known state and are counted, never surfaced as
    /// errors; an unregistered entity is a caller bug and fails loudly.
    pub fn sample(&mut self, entity_id: EntityId) -> Result<Option<TransformState>> {
        let query_time = self.time.interpolation_time();
        self.sample_at(entity_id, query_time)
    }

    /// Render state at an explicit query time.
    pub fn sample_at(
        &mut self,
        entity_id: EntityId,
        query_time: f64,
    ) -> Result<Option<TransformState>> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::MissingRegistration(entity_id))?;

        if entity.reconciler.mode() == AuthorityMode::ClientControlled {
            return Ok(entity.last_applied);
        }

        if let Some(latest) = entity.buffer.latest() {
            if query_time > latest.timestamp {
                self.underruns += 1;
                trace_underrun(entity_id, query_time);
            }
        }

        let state = entity.buffer.sample(query_time).or(entity.last_applied);
        if let Some(state) = state {
            entity.last_applied = Some(state);
        }
        Ok(state)
    }

    pub fn interpolation_time(&self) -> f64 {
        self.time.interpolation_time()
    }

    pub fn stats(&self) -> ClientSyncStats {
        ClientSyncStats {
            snapshots_buffered: self.snapshots_buffered,
            snapshots_ignored: self.snapshots_ignored,
            underruns: self.underruns,
            entity_count: self.entities.len(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientSyncStats {
    pub snapshots_buffered: u64,
    pub snapshots_ignored: u64,
    pub underruns: u64,
    pub entity_count: usize,
}
