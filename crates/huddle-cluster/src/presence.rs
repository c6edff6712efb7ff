//! Remote presence: per-replica snapshots of who is where.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use huddle_core::{Participant, ReplicaId, RetroId, UserId};
use tracing::debug;

/// One replica's contribution to one room.
struct ReplicaRoom {
    users: HashMap<UserId, String>,
    last_seen: Instant,
}

/// Presence reported by other replicas, keyed (room, origin replica).
///
/// Deltas (join/leave) keep the view fresh between syncs; the periodic
/// sync envelope replaces the snapshot wholesale and refreshes the
/// liveness timestamp used for tombstoning dead replicas.
#[derive(Default)]
pub(crate) struct RemotePresence {
    rooms: HashMap<(RetroId, ReplicaId), ReplicaRoom>,
}

impl RemotePresence {
    pub(crate) fn join(
        &mut self,
        room: RetroId,
        origin: ReplicaId,
        user: UserId,
        user_name: String,
    ) {
        let entry = self
            .rooms
            .entry((room, origin))
            .or_insert_with(|| ReplicaRoom { users: HashMap::new(), last_seen: Instant::now() });
        entry.users.insert(user, user_name);
        entry.last_seen = Instant::now();
    }

    pub(crate) fn leave(&mut self, room: RetroId, origin: ReplicaId, user: UserId) {
        if let Some(entry) = self.rooms.get_mut(&(room, origin)) {
            entry.users.remove(&user);
            entry.last_seen = Instant::now();
            if entry.users.is_empty() {
                self.rooms.remove(&(room, origin));
            }
        }
    }

    pub(crate) fn sync(&mut self, room: RetroId, origin: ReplicaId, users: Vec<Participant>) {
        if users.is_empty() {
            self.rooms.remove(&(room, origin));
            return;
        }
        self.rooms.insert(
            (room, origin),
            ReplicaRoom {
                users: users
                    .into_iter()
                    .map(|p| (p.user_id, p.user_name))
                    .collect(),
                last_seen: Instant::now(),
            },
        );
    }

    pub(crate) fn contains(&self, room: RetroId, user: UserId) -> bool {
        self.rooms
            .iter()
            .any(|((r, _), entry)| *r == room && entry.users.contains_key(&user))
    }

    pub(crate) fn users_in(&self, room: RetroId) -> Vec<Participant> {
        let mut users: HashMap<UserId, String> = HashMap::new();
        for ((r, _), entry) in &self.rooms {
            if *r == room {
                for (user_id, name) in &entry.users {
                    users.entry(*user_id).or_insert_with(|| name.clone());
                }
            }
        }
        users
            .into_iter()
            .map(|(user_id, user_name)| Participant { user_id, user_name })
            .collect()
    }

    /// Drop contributions from replicas that stopped syncing.
    pub(crate) fn reap(&mut self, max_age: Duration) {
        let now = Instant::now();
        let before = self.rooms.len();
        self.rooms
            .retain(|_, entry| now.duration_since(entry.last_seen) <= max_age);
        let reaped = before - self.rooms.len();
        if reaped > 0 {
            debug!(reaped, "Aged out presence from silent replicas");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_leave_round_trip() {
        let mut presence = RemotePresence::default();
        let room = RetroId::new();
        let origin = ReplicaId::new();
        let user = UserId::new();

        presence.join(room, origin, user, "alice".into());
        assert!(presence.contains(room, user));
        assert_eq!(presence.users_in(room).len(), 1);

        presence.leave(room, origin, user);
        assert!(!presence.contains(room, user));
        assert!(presence.users_in(room).is_empty());
    }

    #[test]
    fn sync_replaces_the_replica_snapshot() {
        let mut presence = RemotePresence::default();
        let room = RetroId::new();
        let origin = ReplicaId::new();
        let stale = UserId::new();
        let fresh = UserId::new();

        presence.join(room, origin, stale, "old".into());
        presence.sync(
            room,
            origin,
            vec![Participant { user_id: fresh, user_name: "new".into() }],
        );
        assert!(!presence.contains(room, stale));
        assert!(presence.contains(room, fresh));
    }

    #[test]
    fn empty_sync_tombstones_the_replica() {
        let mut presence = RemotePresence::default();
        let room = RetroId::new();
        let origin = ReplicaId::new();
        presence.join(room, origin, UserId::new(), "x".into());
        presence.sync(room, origin, Vec::new());
        assert!(presence.users_in(room).is_empty());
    }

    #[test]
    fn users_merge_across_replicas() {
        let mut presence = RemotePresence::default();
        let room = RetroId::new();
        let user = UserId::new();
        presence.join(room, ReplicaId::new(), user, "a".into());
        presence.join(room, ReplicaId::new(), user, "a".into());
        assert_eq!(presence.users_in(room).len(), 1);
    }

    #[test]
    fn reap_drops_stale_entries() {
        let mut presence = RemotePresence::default();
        let room = RetroId::new();
        presence.join(room, ReplicaId::new(), UserId::new(), "a".into());
        presence.reap(Duration::from_secs(60));
        assert_eq!(presence.users_in(room).len(), 1);
        presence.reap(Duration::ZERO);
        assert!(presence.users_in(room).is_empty());
    }
}
