//! The intra-cluster wire format.

use huddle_core::{Participant, ReplicaId, RetroId, ServerFrame, UserId};
use serde::{Deserialize, Serialize};

/// What an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    /// An opaque wire frame to fan out to the room's local clients.
    Broadcast,
    /// A user became present on the origin replica.
    PresenceJoin,
    /// A user's grace period elapsed on the origin replica.
    PresenceLeave,
    /// Periodic full snapshot of the origin replica's presence in a room;
    /// doubles as the liveness signal for tombstoning dead replicas.
    PresenceSync,
}

/// Payload of presence join/leave envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    /// The user.
    pub user_id: UserId,
    /// Display name; empty on leave.
    #[serde(default)]
    pub user_name: String,
}

/// Payload of presence sync envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSyncPayload {
    /// Everyone the origin replica holds for the room.
    pub users: Vec<Participant>,
}

/// One message on the cluster substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEnvelope {
    /// The publishing replica. Receivers discard their own envelopes.
    pub origin_replica_id: ReplicaId,
    /// The room the envelope concerns.
    pub room_id: RetroId,
    /// Payload discriminant.
    pub kind: EnvelopeKind,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

impl ClusterEnvelope {
    /// Wrap a wire frame for remote fan-out.
    pub fn broadcast(
        origin: ReplicaId,
        room: RetroId,
        frame: &ServerFrame,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            origin_replica_id: origin,
            room_id: room,
            kind: EnvelopeKind::Broadcast,
            payload: serde_json::to_value(frame)?,
        })
    }

    /// Build a presence-join envelope.
    pub fn presence_join(
        origin: ReplicaId,
        room: RetroId,
        user_id: UserId,
        user_name: &str,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            origin_replica_id: origin,
            room_id: room,
            kind: EnvelopeKind::PresenceJoin,
            payload: serde_json::to_value(PresencePayload {
                user_id,
                user_name: user_name.to_string(),
            })?,
        })
    }

    /// Build a presence-leave envelope.
    pub fn presence_leave(
        origin: ReplicaId,
        room: RetroId,
        user_id: UserId,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            origin_replica_id: origin,
            room_id: room,
            kind: EnvelopeKind::PresenceLeave,
            payload: serde_json::to_value(PresencePayload {
                user_id,
                user_name: String::new(),
            })?,
        })
    }

    /// Build a presence-sync envelope.
    pub fn presence_sync(
        origin: ReplicaId,
        room: RetroId,
        users: Vec<Participant>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            origin_replica_id: origin,
            room_id: room,
            kind: EnvelopeKind::PresenceSync,
            payload: serde_json::to_value(PresenceSyncPayload { users })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let origin = ReplicaId::new();
        let room = RetroId::new();
        let frame = ServerFrame::ParticipantLeft { user_id: UserId::new() };
        let envelope = ClusterEnvelope::broadcast(origin, room, &frame).unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["kind"], "broadcast");
        assert!(json["originReplicaId"].is_string());
        assert!(json["roomId"].is_string());
        assert_eq!(json["payload"]["type"], "participant_left");
    }

    #[test]
    fn broadcast_payload_round_trips() {
        let frame = ServerFrame::TimerPaused { remaining_seconds: 30 };
        let envelope =
            ClusterEnvelope::broadcast(ReplicaId::new(), RetroId::new(), &frame).unwrap();
        let decoded: ServerFrame = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(decoded.kind(), "timer_paused");
    }
}
