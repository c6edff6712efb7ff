//! The hub actor: rooms, presence refcounts, delayed-leave timers, and
//! local broadcast fan-out.

use std::collections::HashMap;
use std::time::Duration;

use huddle_core::{ConnectionId, Participant, RetroId, ServerFrame, UserId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::client::ClientInfo;

/// Capacity of the hub's command channel.
const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Errors talking to the hub actor.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub task has stopped.
    #[error("hub is shut down")]
    Closed,

    /// The connection is not registered.
    #[error("unknown connection")]
    UnknownConnection,
}

/// Result of a join.
#[derive(Debug, Clone, Copy)]
pub struct JoinOutcome {
    /// Whether the user was already locally present in the room (including
    /// a presence held open by a pending grace timer).
    pub already_present_local: bool,
}

/// Events the hub pushes out of band.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A user's grace period elapsed with no rejoin; they have left the
    /// room as far as this replica is concerned.
    UserLeft {
        /// The room left.
        room: RetroId,
        /// Who left.
        user: UserId,
        /// Display name at leave time.
        user_name: String,
    },
}

enum HubCommand {
    Register {
        client: ClientInfo,
    },
    Unregister {
        conn_id: ConnectionId,
    },
    Join {
        conn_id: ConnectionId,
        room: RetroId,
        reply: oneshot::Sender<Result<JoinOutcome, HubError>>,
    },
    Leave {
        conn_id: ConnectionId,
        reply: oneshot::Sender<Option<RetroId>>,
    },
    Broadcast {
        room: RetroId,
        frame: ServerFrame,
        except: Option<ConnectionId>,
    },
    SendTo {
        conn_id: ConnectionId,
        frame: ServerFrame,
    },
    IsUserInRoom {
        room: RetroId,
        user: UserId,
        reply: oneshot::Sender<bool>,
    },
    RoomMembers {
        room: RetroId,
        reply: oneshot::Sender<Vec<Participant>>,
    },
    LocalRooms {
        reply: oneshot::Sender<Vec<(RetroId, Vec<Participant>)>>,
    },
    LeaveTimerFired {
        room: RetroId,
        user: UserId,
        generation: u64,
    },
    CloseAll,
}

struct ClientEntry {
    user_id: UserId,
    user_name: String,
    sender: mpsc::Sender<ServerFrame>,
    closed: tokio_util::sync::CancellationToken,
    room: Option<RetroId>,
}

#[derive(Default)]
struct Room {
    /// Local connections currently attached.
    members: HashMap<ConnectionId, UserId>,
    /// Live-connection count per user.
    refcounts: HashMap<UserId, usize>,
    /// Pending delayed-leave timers: user → (generation, display name).
    /// A user in this map still counts as present (grace period).
    leave_timers: HashMap<UserId, (u64, String)>,
}

impl Room {
    fn is_empty(&self) -> bool {
        self.members.is_empty() && self.leave_timers.is_empty()
    }

    fn user_present(&self, user: UserId) -> bool {
        self.refcounts.get(&user).is_some_and(|c| *c > 0)
            || self.leave_timers.contains_key(&user)
    }
}

struct HubState {
    clients: HashMap<ConnectionId, ClientEntry>,
    rooms: HashMap<RetroId, Room>,
    next_generation: u64,
    grace: Duration,
    cmd_tx: mpsc::Sender<HubCommand>,
    events_tx: mpsc::Sender<HubEvent>,
}

/// The hub actor. Construct with [`Hub::spawn`].
pub struct Hub;

impl Hub {
    /// Spawn the hub task.
    ///
    /// `grace` is the delay between a user's presence dropping to zero and
    /// the `UserLeft` event firing. Events are delivered on `events_tx`.
    #[must_use]
    pub fn spawn(
        grace: Duration,
        events_tx: mpsc::Sender<HubEvent>,
    ) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let state = HubState {
            clients: HashMap::new(),
            rooms: HashMap::new(),
            next_generation: 0,
            grace,
            cmd_tx: cmd_tx.clone(),
            events_tx,
        };
        let task = tokio::spawn(run_hub(state, cmd_rx));
        (HubHandle { cmd_tx }, task)
    }
}

async fn run_hub(mut state: HubState, mut cmd_rx: mpsc::Receiver<HubCommand>) {
    info!("Hub actor started");
    while let Some(cmd) = cmd_rx.recv().await {
        state.handle(cmd);
    }
    info!("Hub actor stopped");
}

impl HubState {
    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { client } => self.register(client),
            HubCommand::Unregister { conn_id } => self.unregister(conn_id),
            HubCommand::Join { conn_id, room, reply } => {
                let _ = reply.send(self.join(conn_id, room));
            },
            HubCommand::Leave { conn_id, reply } => {
                let _ = reply.send(self.leave(conn_id));
            },
            HubCommand::Broadcast { room, frame, except } => {
                self.broadcast(room, &frame, except);
            },
            HubCommand::SendTo { conn_id, frame } => self.send_to(conn_id, frame),
            HubCommand::IsUserInRoom { room, user, reply } => {
                let present = self
                    .rooms
                    .get(&room)
                    .is_some_and(|r| r.user_present(user));
                let _ = reply.send(present);
            },
            HubCommand::RoomMembers { room, reply } => {
                let _ = reply.send(self.room_members(room));
            },
            HubCommand::LocalRooms { reply } => {
                let rooms = self
                    .rooms
                    .keys()
                    .copied()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|room| (room, self.room_members(room)))
                    .collect();
                let _ = reply.send(rooms);
            },
            HubCommand::LeaveTimerFired { room, user, generation } => {
                self.leave_timer_fired(room, user, generation);
            },
            HubCommand::CloseAll => {
                info!(clients = self.clients.len(), "Closing all clients");
                for entry in self.clients.values() {
                    entry.closed.cancel();
                }
            },
        }
    }

    fn register(&mut self, client: ClientInfo) {
        trace!(conn_id = %client.conn_id, user_id = %client.user_id, "Client registered");
        self.clients.insert(
            client.conn_id,
            ClientEntry {
                user_id: client.user_id,
                user_name: client.user_name,
                sender: client.sender,
                closed: client.closed,
                room: None,
            },
        );
    }

    fn unregister(&mut self, conn_id: ConnectionId) {
        // Idempotent: a slow-consumer drop may already have removed the
        // entry when the read pump reports the disconnect.
        if self.clients.contains_key(&conn_id) {
            self.leave(conn_id);
            if let Some(entry) = self.clients.remove(&conn_id) {
                entry.closed.cancel();
                trace!(conn_id = %conn_id, "Client unregistered");
            }
        }
    }

    fn join(&mut self, conn_id: ConnectionId, room: RetroId) -> Result<JoinOutcome, HubError> {
        let entry = self
            .clients
            .get(&conn_id)
            .ok_or(HubError::UnknownConnection)?;
        let (user_id, prior_room) = (entry.user_id, entry.room);

        // One room per client: leave any prior room first.
        if let Some(prior) = prior_room {
            if prior == room {
                // Re-join of the same room is a no-op for membership.
                return Ok(JoinOutcome { already_present_local: true });
            }
            self.leave(conn_id);
        }

        let room_state = self.rooms.entry(room).or_default();
        let already_present_local = room_state.user_present(user_id);
        room_state.members.insert(conn_id, user_id);
        *room_state.refcounts.entry(user_id).or_insert(0) += 1;
        // Cancel any pending delayed-leave timer for this user. Removing
        // the entry invalidates the generation the sleeping task carries.
        if room_state.leave_timers.remove(&user_id).is_some() {
            debug!(room = %room, user_id = %user_id, "Cancelled delayed-leave timer on rejoin");
        }

        if let Some(entry) = self.clients.get_mut(&conn_id) {
            entry.room = Some(room);
        }
        debug!(room = %room, user_id = %user_id, already_present_local, "Client joined room");
        Ok(JoinOutcome { already_present_local })
    }

    fn leave(&mut self, conn_id: ConnectionId) -> Option<RetroId> {
        let entry = self.clients.get_mut(&conn_id)?;
        let room = entry.room.take()?;
        let (user_id, user_name) = (entry.user_id, entry.user_name.clone());

        let Some(room_state) = self.rooms.get_mut(&room) else {
            return Some(room);
        };
        room_state.members.remove(&conn_id);
        let remaining = match room_state.refcounts.get_mut(&user_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            },
            None => 0,
        };
        if remaining == 0 {
            room_state.refcounts.remove(&user_id);
            // Last connection gone: do not announce the leave yet. Park a
            // delayed-leave timer so a reload can rejoin unnoticed.
            self.next_generation += 1;
            let generation = self.next_generation;
            room_state
                .leave_timers
                .insert(user_id, (generation, user_name));
            let cmd_tx = self.cmd_tx.clone();
            let grace = self.grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = cmd_tx
                    .send(HubCommand::LeaveTimerFired { room, user: user_id, generation })
                    .await;
            });
            debug!(room = %room, user_id = %user_id, "Scheduled delayed-leave timer");
        }
        Some(room)
    }

    fn leave_timer_fired(&mut self, room: RetroId, user: UserId, generation: u64) {
        let Some(room_state) = self.rooms.get_mut(&room) else {
            return;
        };
        // The timer only counts if its generation is still the stored one;
        // a rejoin (which removes the entry) or a newer leave supersedes it.
        let current = room_state.leave_timers.get(&user).map(|(g, _)| *g);
        if current != Some(generation) {
            trace!(room = %room, user_id = %user, "Stale delayed-leave timer ignored");
            return;
        }
        if room_state.refcounts.get(&user).is_some_and(|c| *c > 0) {
            return;
        }
        let Some((_, user_name)) = room_state.leave_timers.remove(&user) else {
            return;
        };
        if room_state.is_empty() {
            self.rooms.remove(&room);
        }
        info!(room = %room, user_id = %user, "Grace period elapsed, user left");
        // Non-blocking: the actor must never wait on its own consumers.
        // A dropped event only loses the notification; membership state
        // is already updated and presence syncs heal the cluster view.
        if let Err(e) = self
            .events_tx
            .try_send(HubEvent::UserLeft { room, user, user_name })
        {
            warn!(room = %room, user_id = %user, error = %e, "Hub event queue full, leave notification dropped");
        }
    }

    fn broadcast(&mut self, room: RetroId, frame: &ServerFrame, except: Option<ConnectionId>) {
        let Some(room_state) = self.rooms.get(&room) else {
            return;
        };
        let targets: Vec<ConnectionId> = room_state
            .members
            .keys()
            .copied()
            .filter(|id| Some(*id) != except)
            .collect();
        trace!(room = %room, kind = frame.kind(), targets = targets.len(), "Local broadcast");
        for conn_id in targets {
            self.send_to(conn_id, frame.clone());
        }
    }

    fn send_to(&mut self, conn_id: ConnectionId, frame: ServerFrame) {
        let Some(entry) = self.clients.get(&conn_id) else {
            return;
        };
        if let Err(err) = entry.sender.try_send(frame) {
            // Full or closed: the consumer is too slow or already gone.
            // Drop the client rather than stall everyone else.
            warn!(
                conn_id = %conn_id,
                user_id = %entry.user_id,
                error = %err,
                "Outbound queue unavailable, dropping client"
            );
            self.unregister(conn_id);
        }
    }

    fn room_members(&self, room: RetroId) -> Vec<Participant> {
        let Some(room_state) = self.rooms.get(&room) else {
            return Vec::new();
        };
        let mut seen: HashMap<UserId, String> = HashMap::new();
        for (conn_id, user_id) in &room_state.members {
            if let Some(entry) = self.clients.get(conn_id) {
                seen.entry(*user_id).or_insert_with(|| entry.user_name.clone());
            }
        }
        // Users inside their grace window still count as present.
        for (user_id, (_, name)) in &room_state.leave_timers {
            seen.entry(*user_id).or_insert_with(|| name.clone());
        }
        let mut members: Vec<Participant> = seen
            .into_iter()
            .map(|(user_id, user_name)| Participant { user_id, user_name })
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        members
    }
}

/// Cloneable handle to the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a new client connection.
    pub async fn register(&self, client: ClientInfo) -> Result<(), HubError> {
        self.send(HubCommand::Register { client }).await
    }

    /// Remove a client; runs the leave path exactly once per connection.
    pub async fn unregister(&self, conn_id: ConnectionId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { conn_id }).await
    }

    /// Attach a client to a room, leaving any prior room first.
    pub async fn join(&self, conn_id: ConnectionId, room: RetroId) -> Result<JoinOutcome, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Join { conn_id, room, reply }).await?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Detach a client from its room, starting the grace timer when it was
    /// the user's last local connection. Returns the room left, if any.
    pub async fn leave(&self, conn_id: ConnectionId) -> Result<Option<RetroId>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Leave { conn_id, reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Enqueue a frame to every local member of a room.
    pub async fn broadcast_local(
        &self,
        room: RetroId,
        frame: ServerFrame,
        except: Option<ConnectionId>,
    ) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast { room, frame, except }).await
    }

    /// Enqueue a frame to one client.
    pub async fn send_to(&self, conn_id: ConnectionId, frame: ServerFrame) -> Result<(), HubError> {
        self.send(HubCommand::SendTo { conn_id, frame }).await
    }

    /// Local presence check (live connections or an open grace window).
    pub async fn is_user_in_room(&self, room: RetroId, user: UserId) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::IsUserInRoom { room, user, reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Snapshot of a room's local participants.
    pub async fn room_members(&self, room: RetroId) -> Result<Vec<Participant>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::RoomMembers { room, reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Snapshot of all local rooms and their participants.
    pub async fn local_rooms(&self) -> Result<Vec<(RetroId, Vec<Participant>)>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::LocalRooms { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Signal every connected client to close (server shutdown). The
    /// write pumps flush their queues before the transports drop.
    pub async fn close_all(&self) -> Result<(), HubError> {
        self.send(HubCommand::CloseAll).await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.cmd_tx.send(cmd).await.map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    const TEST_GRACE: Duration = Duration::from_millis(50);

    struct TestClient {
        info: ClientInfo,
        rx: mpsc::Receiver<ServerFrame>,
    }

    fn client(user_id: UserId, name: &str, capacity: usize) -> TestClient {
        let (tx, rx) = mpsc::channel(capacity);
        TestClient {
            info: ClientInfo {
                conn_id: ConnectionId::new(),
                user_id,
                user_name: name.to_string(),
                sender: tx,
                closed: CancellationToken::new(),
            },
            rx,
        }
    }

    fn spawn_hub() -> (HubHandle, mpsc::Receiver<HubEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (handle, _task) = Hub::spawn(TEST_GRACE, events_tx);
        (handle, events_rx)
    }

    #[tokio::test]
    async fn leave_then_rejoin_within_grace_emits_no_leave_event() {
        let (hub, mut events) = spawn_hub();
        let room = RetroId::new();
        let user = UserId::new();
        let a = client(user, "alice", 8);
        hub.register(a.info.clone()).await.unwrap();
        hub.join(a.info.conn_id, room).await.unwrap();

        hub.unregister(a.info.conn_id).await.unwrap();

        // Reload: new connection, same user, well inside the grace window.
        let b = client(user, "alice", 8);
        hub.register(b.info.clone()).await.unwrap();
        let outcome = hub.join(b.info.conn_id, room).await.unwrap();
        assert!(outcome.already_present_local);

        tokio::time::sleep(TEST_GRACE * 3).await;
        assert!(
            events.try_recv().is_err(),
            "no UserLeft may fire after a rejoin within grace"
        );
        assert!(hub.is_user_in_room(room, user).await.unwrap());
    }

    #[tokio::test]
    async fn grace_expiry_emits_exactly_one_leave_event() {
        let (hub, mut events) = spawn_hub();
        let room = RetroId::new();
        let user = UserId::new();
        let a = client(user, "alice", 8);
        hub.register(a.info.clone()).await.unwrap();
        hub.join(a.info.conn_id, room).await.unwrap();
        hub.unregister(a.info.conn_id).await.unwrap();

        // Presence holds through the grace window...
        assert!(hub.is_user_in_room(room, user).await.unwrap());

        let event = tokio::time::timeout(TEST_GRACE * 10, events.recv())
            .await
            .expect("leave event within grace bound")
            .expect("events channel open");
        let HubEvent::UserLeft { room: r, user: u, user_name } = event;
        assert_eq!((r, u, user_name.as_str()), (room, user, "alice"));

        // ...and drops after it.
        assert!(!hub.is_user_in_room(room, user).await.unwrap());
        tokio::time::sleep(TEST_GRACE * 2).await;
        assert!(events.try_recv().is_err(), "only one leave event");
    }

    #[tokio::test]
    async fn second_connection_keeps_presence_alive() {
        let (hub, mut events) = spawn_hub();
        let room = RetroId::new();
        let user = UserId::new();
        let tab1 = client(user, "alice", 8);
        let tab2 = client(user, "alice", 8);
        hub.register(tab1.info.clone()).await.unwrap();
        hub.register(tab2.info.clone()).await.unwrap();
        hub.join(tab1.info.conn_id, room).await.unwrap();
        let outcome = hub.join(tab2.info.conn_id, room).await.unwrap();
        assert!(outcome.already_present_local);

        hub.unregister(tab1.info.conn_id).await.unwrap();
        tokio::time::sleep(TEST_GRACE * 3).await;
        assert!(events.try_recv().is_err(), "tab2 still holds the presence");
        assert!(hub.is_user_in_room(room, user).await.unwrap());
    }

    #[tokio::test]
    async fn broadcast_skips_the_excepted_client() {
        let (hub, _events) = spawn_hub();
        let room = RetroId::new();
        let mut a = client(UserId::new(), "alice", 8);
        let mut b = client(UserId::new(), "bob", 8);
        hub.register(a.info.clone()).await.unwrap();
        hub.register(b.info.clone()).await.unwrap();
        hub.join(a.info.conn_id, room).await.unwrap();
        hub.join(b.info.conn_id, room).await.unwrap();

        let frame = ServerFrame::ParticipantLeft { user_id: UserId::new() };
        hub.broadcast_local(room, frame, Some(a.info.conn_id))
            .await
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), b.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.kind(), "participant_left");
        assert!(a.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped() {
        let (hub, _events) = spawn_hub();
        let room = RetroId::new();
        let user = UserId::new();
        // Capacity 1 and nobody draining: the second frame overflows.
        let a = client(user, "alice", 1);
        hub.register(a.info.clone()).await.unwrap();
        hub.join(a.info.conn_id, room).await.unwrap();

        let frame = ServerFrame::TimerReset {};
        hub.broadcast_local(room, frame.clone(), None).await.unwrap();
        hub.broadcast_local(room, frame, None).await.unwrap();

        // Give the actor a beat to process both commands.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(a.info.closed.is_cancelled(), "slow client must be closed");
    }

    #[tokio::test]
    async fn joining_a_second_room_leaves_the_first() {
        let (hub, _events) = spawn_hub();
        let room1 = RetroId::new();
        let room2 = RetroId::new();
        let user = UserId::new();
        let a = client(user, "alice", 8);
        hub.register(a.info.clone()).await.unwrap();
        hub.join(a.info.conn_id, room1).await.unwrap();
        hub.join(a.info.conn_id, room2).await.unwrap();

        let members1 = hub.room_members(room1).await.unwrap();
        let members2 = hub.room_members(room2).await.unwrap();
        // room1 retains the user only through the grace window entry.
        assert_eq!(members1.len(), 1);
        assert_eq!(members2.len(), 1);

        tokio::time::sleep(TEST_GRACE * 3).await;
        assert!(hub.room_members(room1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn room_members_merge_connections_per_user() {
        let (hub, _events) = spawn_hub();
        let room = RetroId::new();
        let user = UserId::new();
        let tab1 = client(user, "alice", 8);
        let tab2 = client(user, "alice", 8);
        let bob = client(UserId::new(), "bob", 8);
        for c in [&tab1, &tab2, &bob] {
            hub.register(c.info.clone()).await.unwrap();
            hub.join(c.info.conn_id, room).await.unwrap();
        }
        let members = hub.room_members(room).await.unwrap();
        assert_eq!(members.len(), 2);
    }
}
