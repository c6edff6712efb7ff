//! The cluster bridge: merged local+remote room views and relay tasks.

use std::sync::Arc;
use std::time::Duration;

use huddle_core::{ConnectionId, Participant, ReplicaId, RetroId, ServerFrame, UserId};
use huddle_hub::HubHandle;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::envelope::{ClusterEnvelope, EnvelopeKind, PresencePayload, PresenceSyncPayload};
use crate::presence::RemotePresence;
use crate::substrate::{Substrate, SubstrateResult};

/// A silent replica's presence ages out after this many missed syncs.
const REAP_MULTIPLIER: u32 = 3;

/// Relay between the local hub and the cluster substrate.
///
/// All broadcast entry points deliver locally first and treat substrate
/// failures as non-fatal: a publish is retried once, then logged and
/// dropped. Divergence heals on the next snapshot fetch.
pub struct ClusterBridge {
    replica_id: ReplicaId,
    hub: HubHandle,
    substrate: Arc<dyn Substrate>,
    remote: Mutex<RemotePresence>,
    sync_interval: Duration,
}

impl ClusterBridge {
    /// Create a bridge for this replica.
    #[must_use]
    pub fn new(
        replica_id: ReplicaId,
        hub: HubHandle,
        substrate: Arc<dyn Substrate>,
        sync_interval: Duration,
    ) -> Self {
        Self {
            replica_id,
            hub,
            substrate,
            remote: Mutex::new(RemotePresence::default()),
            sync_interval,
        }
    }

    /// This replica's id.
    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Deliver a frame to every participant of a room, cluster-wide.
    pub async fn broadcast_to_room(&self, room: RetroId, frame: &ServerFrame) {
        self.broadcast_to_room_except(room, frame, None).await;
    }

    /// Same as [`Self::broadcast_to_room`], minus one local client
    /// (typically the originator).
    pub async fn broadcast_to_room_except(
        &self,
        room: RetroId,
        frame: &ServerFrame,
        except: Option<ConnectionId>,
    ) {
        if let Err(e) = self.hub.broadcast_local(room, frame.clone(), except).await {
            warn!(room = %room, error = %e, "Local broadcast failed");
        }
        match ClusterEnvelope::broadcast(self.replica_id, room, frame) {
            Ok(envelope) => self.publish_with_retry(&envelope).await,
            Err(e) => warn!(room = %room, error = %e, "Unencodable broadcast frame"),
        }
    }

    /// Announce a user's presence to the other replicas.
    pub async fn publish_presence_join(&self, room: RetroId, user: UserId, user_name: &str) {
        match ClusterEnvelope::presence_join(self.replica_id, room, user, user_name) {
            Ok(envelope) => self.publish_with_retry(&envelope).await,
            Err(e) => warn!(room = %room, error = %e, "Unencodable presence join"),
        }
    }

    /// Announce a user's departure to the other replicas.
    pub async fn publish_presence_leave(&self, room: RetroId, user: UserId) {
        match ClusterEnvelope::presence_leave(self.replica_id, room, user) {
            Ok(envelope) => self.publish_with_retry(&envelope).await,
            Err(e) => warn!(room = %room, error = %e, "Unencodable presence leave"),
        }
    }

    /// The merged (local + remote) participant set of a room.
    pub async fn room_participants(&self, room: RetroId) -> Vec<Participant> {
        let mut participants = self.hub.room_members(room).await.unwrap_or_default();
        let remote = self.remote.lock().users_in(room);
        for participant in remote {
            if !participants.iter().any(|p| p.user_id == participant.user_id) {
                participants.push(participant);
            }
        }
        participants.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        participants
    }

    /// Merged membership check.
    pub async fn is_user_in_room(&self, room: RetroId, user: UserId) -> bool {
        if self.hub.is_user_in_room(room, user).await.unwrap_or(false) {
            return true;
        }
        self.remote.lock().contains(room, user)
    }

    /// Run the substrate subscriber until shutdown.
    ///
    /// Envelopes originating from this replica are discarded; everything
    /// else updates the remote presence view or fans out locally.
    pub async fn run_subscriber(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SubstrateResult<()> {
        let mut rx = self.substrate.subscribe().await?;
        info!(replica_id = %self.replica_id, "Cluster subscriber started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Cluster subscriber shutting down");
                    return Ok(());
                }
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else {
                        warn!("Substrate subscription closed");
                        return Ok(());
                    };
                    self.handle_envelope(envelope).await;
                }
            }
        }
    }

    /// Run the periodic presence sync publisher and reaper until shutdown.
    pub async fn run_presence_sync(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let max_age = self.sync_interval * REAP_MULTIPLIER;
        // Jitter the first sync so replicas restarted together do not
        // publish in lockstep.
        let jitter = self
            .sync_interval
            .mul_f64(f64::from(fastrand::u32(0..1000)) / 1000.0);
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            () = tokio::time::sleep(jitter) => {}
        }
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return,
                () = tokio::time::sleep(self.sync_interval) => {}
            }

            let rooms = self.hub.local_rooms().await.unwrap_or_default();
            for (room, users) in rooms {
                match ClusterEnvelope::presence_sync(self.replica_id, room, users) {
                    Ok(envelope) => {
                        if let Err(e) = self.substrate.publish(&envelope).await {
                            warn!(room = %room, error = %e, "Presence sync publish failed");
                        }
                    },
                    Err(e) => warn!(room = %room, error = %e, "Unencodable presence sync"),
                }
            }
            self.remote.lock().reap(max_age);
        }
    }

    async fn handle_envelope(&self, envelope: ClusterEnvelope) {
        if envelope.origin_replica_id == self.replica_id {
            // Never echo our own traffic back into the hub.
            return;
        }
        trace!(
            room = %envelope.room_id,
            origin = %envelope.origin_replica_id,
            kind = ?envelope.kind,
            "Cluster envelope received"
        );
        match envelope.kind {
            EnvelopeKind::Broadcast => {
                match serde_json::from_value::<ServerFrame>(envelope.payload) {
                    Ok(frame) => {
                        if let Err(e) =
                            self.hub.broadcast_local(envelope.room_id, frame, None).await
                        {
                            warn!(room = %envelope.room_id, error = %e, "Remote fan-out failed");
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "Undecodable remote broadcast frame, skipping");
                    },
                }
            },
            EnvelopeKind::PresenceJoin => {
                match serde_json::from_value::<PresencePayload>(envelope.payload) {
                    Ok(p) => {
                        debug!(room = %envelope.room_id, user_id = %p.user_id, "Remote presence join");
                        self.remote.lock().join(
                            envelope.room_id,
                            envelope.origin_replica_id,
                            p.user_id,
                            p.user_name,
                        );
                    },
                    Err(e) => warn!(error = %e, "Undecodable presence join"),
                }
            },
            EnvelopeKind::PresenceLeave => {
                match serde_json::from_value::<PresencePayload>(envelope.payload) {
                    Ok(p) => {
                        debug!(room = %envelope.room_id, user_id = %p.user_id, "Remote presence leave");
                        self.remote.lock().leave(
                            envelope.room_id,
                            envelope.origin_replica_id,
                            p.user_id,
                        );
                    },
                    Err(e) => warn!(error = %e, "Undecodable presence leave"),
                }
            },
            EnvelopeKind::PresenceSync => {
                match serde_json::from_value::<PresenceSyncPayload>(envelope.payload) {
                    Ok(p) => {
                        self.remote.lock().sync(
                            envelope.room_id,
                            envelope.origin_replica_id,
                            p.users,
                        );
                    },
                    Err(e) => warn!(error = %e, "Undecodable presence sync"),
                }
            },
        }
    }

    async fn publish_with_retry(&self, envelope: &ClusterEnvelope) {
        if let Err(first) = self.substrate.publish(envelope).await {
            warn!(error = %first, "Substrate publish failed, retrying once");
            if let Err(second) = self.substrate.publish(envelope).await {
                warn!(error = %second, "Substrate publish failed permanently, dropping envelope");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::MemorySubstrate;
    use huddle_hub::{ClientInfo, Hub, HubEvent};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const SYNC_INTERVAL: Duration = Duration::from_millis(100);

    struct Replica {
        bridge: Arc<ClusterBridge>,
        hub: HubHandle,
        _events_rx: mpsc::Receiver<HubEvent>,
    }

    fn replica(substrate: &MemorySubstrate, shutdown: &broadcast::Sender<()>) -> Replica {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (hub, _task) = Hub::spawn(Duration::from_secs(10), events_tx);
        let bridge = Arc::new(ClusterBridge::new(
            ReplicaId::new(),
            hub.clone(),
            Arc::new(substrate.clone()),
            SYNC_INTERVAL,
        ));
        tokio::spawn(bridge.clone().run_subscriber(shutdown.subscribe()));
        Replica { bridge, hub, _events_rx: events_rx }
    }

    async fn attach_client(
        hub: &HubHandle,
        room: RetroId,
        name: &str,
    ) -> (UserId, mpsc::Receiver<ServerFrame>) {
        let user = UserId::new();
        let (tx, rx) = mpsc::channel(64);
        let info = ClientInfo {
            conn_id: ConnectionId::new(),
            user_id: user,
            user_name: name.to_string(),
            sender: tx,
            closed: CancellationToken::new(),
        };
        hub.register(info.clone()).await.unwrap();
        hub.join(info.conn_id, room).await.unwrap();
        (user, rx)
    }

    #[tokio::test]
    async fn cross_replica_broadcast_without_echo() {
        let substrate = MemorySubstrate::new();
        let (shutdown, _) = broadcast::channel(1);
        let x = replica(&substrate, &shutdown);
        let y = replica(&substrate, &shutdown);
        // Let both subscribers attach before publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let room = RetroId::new();
        let (_ua, mut rx_a) = attach_client(&x.hub, room, "alice").await;
        let (_ub, mut rx_b) = attach_client(&y.hub, room, "bob").await;

        let frame = ServerFrame::TimerPaused { remaining_seconds: 7 };
        x.bridge.broadcast_to_room(room, &frame).await;

        let got_a = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        let got_b = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got_a.kind(), "timer_paused");
        assert_eq!(got_b.kind(), "timer_paused");

        // The origin replica must not see its own envelope again.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx_a.try_recv().is_err(), "duplicate delivery on origin");
    }

    #[tokio::test]
    async fn remote_presence_merges_into_room_view() {
        let substrate = MemorySubstrate::new();
        let (shutdown, _) = broadcast::channel(1);
        let x = replica(&substrate, &shutdown);
        let y = replica(&substrate, &shutdown);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let room = RetroId::new();
        let (user_a, _rx_a) = attach_client(&x.hub, room, "alice").await;
        x.bridge.publish_presence_join(room, user_a, "alice").await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(y.bridge.is_user_in_room(room, user_a).await);
        let participants = y.bridge.room_participants(room).await;
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].user_name, "alice");

        x.bridge.publish_presence_leave(room, user_a).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!y.bridge.is_user_in_room(room, user_a).await);
    }

    #[tokio::test]
    async fn presence_sync_publishes_and_heals_the_view() {
        let substrate = MemorySubstrate::new();
        let (shutdown, _) = broadcast::channel(1);
        let x = replica(&substrate, &shutdown);
        let y = replica(&substrate, &shutdown);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let room = RetroId::new();
        let (user_a, _rx_a) = attach_client(&x.hub, room, "alice").await;
        // No explicit presence join: the periodic sync alone must teach Y.
        tokio::spawn(x.bridge.clone().run_presence_sync(shutdown.subscribe()));

        tokio::time::sleep(SYNC_INTERVAL * 3).await;
        assert!(y.bridge.is_user_in_room(room, user_a).await);
    }
}
