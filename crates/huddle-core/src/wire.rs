//! Wire protocol: the frames exchanged between clients and the server.
//!
//! Both directions share the envelope `{"type": <string>, "payload": <object>}`.
//! Inbound text decodes in two steps — envelope first, then the typed
//! payload — so the server can tell an *unknown* type (logged and ignored)
//! apart from a *malformed* payload (answered with an `error` frame).
//! Outbound frames are a single tagged enum, serialized once per broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ActionId, ColumnId, ItemId, RetroId, UserId};
use crate::model::{
    ActionPriority, LcDiscussionState, MoodEntry, Participant, Retro, RetroAction, RetroItem,
    RotiResults, TeamMemberStatus,
};
use crate::phase::Phase;

/// Maximum accepted mood key length.
pub const MAX_MOOD_LEN: usize = 32;

/// The raw wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque payload; decoded per type.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    /// Parse a text frame into the envelope.
    pub fn parse(text: &str) -> Result<Self, FrameDecodeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Errors decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    /// The envelope or a typed payload failed to deserialize.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

macro_rules! payload {
    ($frame:expr) => {
        serde_json::from_value($frame.payload.clone())?
    };
}

/// Single-field payload wrappers for the commands that carry one id or
/// scalar. Keeps every payload an object on the wire.
mod single {
    use super::{ActionId, ColumnId, Deserialize, ItemId, Phase, RetroId, UserId};

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct RetroRef {
        pub(super) retro_id: RetroId,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ItemRef {
        pub(super) item_id: ItemId,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ActionRef {
        pub(super) action_id: ActionId,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ColumnRef {
        pub(super) column_id: ColumnId,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct UserRef {
        pub(super) user_id: UserId,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct DurationArg {
        pub(super) duration_seconds: u32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SecondsArg {
        pub(super) seconds: u32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PhaseArg {
        pub(super) phase: Phase,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct MoodArg {
        pub(super) mood: String,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct RatingArg {
        pub(super) rating: u8,
    }
}

/// A decoded client command.
///
/// Payload field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientCommand {
    /// Join (or re-join) a room.
    JoinRetro {
        /// Target retro.
        retro_id: RetroId,
    },
    /// Leave the current room.
    LeaveRetro,
    /// Keepalive; no effect beyond resetting the read deadline.
    Heartbeat,
    /// Create an item in a column.
    ItemCreate {
        /// Target column.
        column_id: ColumnId,
        /// Item text.
        content: String,
    },
    /// Edit an item's text.
    ItemUpdate {
        /// Target item.
        item_id: ItemId,
        /// New text.
        content: String,
    },
    /// Delete an item.
    ItemDelete {
        /// Target item.
        item_id: ItemId,
    },
    /// Group items under a parent, flattening grandchildren.
    ItemGroup {
        /// New group root.
        parent_id: ItemId,
        /// Items to re-parent.
        child_ids: Vec<ItemId>,
    },
    /// Cast a vote on an item.
    VoteAdd {
        /// Target item.
        item_id: ItemId,
    },
    /// Remove one (the oldest) of the caller's votes on an item.
    VoteRemove {
        /// Target item.
        item_id: ItemId,
    },
    /// Start the session timer.
    TimerStart {
        /// Timer duration.
        duration_seconds: u32,
    },
    /// Pause the running timer.
    TimerPause,
    /// Resume the paused timer.
    TimerResume,
    /// Add time to the running or paused timer.
    TimerAddTime {
        /// Seconds to add.
        seconds: u32,
    },
    /// Reset the timer to idle.
    TimerReset,
    /// Advance to the next phase.
    PhaseNext,
    /// Jump to an explicit phase.
    PhaseSet {
        /// Target phase.
        phase: Phase,
    },
    /// Create an action item.
    ActionCreate {
        /// What to do.
        title: String,
        /// Optional assignee.
        #[serde(default)]
        assignee_id: Option<serde_json::Value>,
        /// Optional source item.
        #[serde(default)]
        item_id: Option<serde_json::Value>,
        /// Optional due date.
        #[serde(default)]
        due_date: Option<DateTime<Utc>>,
        /// Optional priority.
        #[serde(default)]
        priority: Option<ActionPriority>,
    },
    /// Update an action item's fields.
    ActionUpdate {
        /// Target action.
        action_id: ActionId,
        /// New title.
        #[serde(default)]
        title: Option<String>,
        /// New assignee.
        #[serde(default)]
        assignee_id: Option<UserId>,
        /// New due date.
        #[serde(default)]
        due_date: Option<DateTime<Utc>>,
        /// New priority.
        #[serde(default)]
        priority: Option<ActionPriority>,
    },
    /// Mark an action completed.
    ActionComplete {
        /// Target action.
        action_id: ActionId,
    },
    /// Clear an action's completion.
    ActionUncomplete {
        /// Target action.
        action_id: ActionId,
    },
    /// Delete an action.
    ActionDelete {
        /// Target action.
        action_id: ActionId,
    },
    /// End the session.
    RetroEnd,
    /// Set the caller's icebreaker mood.
    MoodSet {
        /// Mood key.
        mood: String,
    },
    /// Cast a ROTI rating.
    RotiVote {
        /// Rating in `1..=5`.
        rating: u8,
    },
    /// Reveal aggregate ROTI results.
    RotiReveal,
    /// Typing indicator while drafting an item.
    DraftTyping {
        /// Column being typed into.
        column_id: ColumnId,
        /// Length of the draft so far.
        content_length: u32,
    },
    /// Clear the typing indicator.
    DraftClear {
        /// Column the draft was in.
        column_id: ColumnId,
    },
    /// Claim facilitation (waiting phase, team admins only).
    FacilitatorClaim,
    /// Hand facilitation to another participant.
    FacilitatorTransfer {
        /// New facilitator.
        user_id: UserId,
    },
    /// Navigate discussion to an item (drives the LC queue).
    DiscussSetItem {
        /// Item to discuss.
        item_id: ItemId,
    },
    /// Extend the current Lean Coffee topic's timebox.
    DiscussExtend {
        /// Seconds to add.
        seconds: u32,
    },
}

impl ClientCommand {
    /// Decode a typed command from an envelope.
    ///
    /// Returns `Ok(None)` for unknown message types — the caller logs and
    /// ignores those without closing the connection. A recognized type with
    /// a malformed payload is an error.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>, FrameDecodeError> {
        let cmd = match frame.kind.as_str() {
            "join_retro" => {
                let p: single::RetroRef = payload!(frame);
                Self::JoinRetro { retro_id: p.retro_id }
            },
            "leave_retro" => Self::LeaveRetro,
            "heartbeat" => Self::Heartbeat,
            "item_create" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct P {
                    column_id: ColumnId,
                    content: String,
                }
                let p: P = payload!(frame);
                Self::ItemCreate { column_id: p.column_id, content: p.content }
            },
            "item_update" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct P {
                    item_id: ItemId,
                    content: String,
                }
                let p: P = payload!(frame);
                Self::ItemUpdate { item_id: p.item_id, content: p.content }
            },
            "item_delete" => {
                let p: single::ItemRef = payload!(frame);
                Self::ItemDelete { item_id: p.item_id }
            },
            "item_group" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct P {
                    parent_id: ItemId,
                    child_ids: Vec<ItemId>,
                }
                let p: P = payload!(frame);
                Self::ItemGroup { parent_id: p.parent_id, child_ids: p.child_ids }
            },
            "vote_add" => {
                let p: single::ItemRef = payload!(frame);
                Self::VoteAdd { item_id: p.item_id }
            },
            "vote_remove" => {
                let p: single::ItemRef = payload!(frame);
                Self::VoteRemove { item_id: p.item_id }
            },
            "timer_start" => {
                let p: single::DurationArg = payload!(frame);
                Self::TimerStart { duration_seconds: p.duration_seconds }
            },
            "timer_pause" => Self::TimerPause,
            "timer_resume" => Self::TimerResume,
            "timer_add_time" => {
                let p: single::SecondsArg = payload!(frame);
                Self::TimerAddTime { seconds: p.seconds }
            },
            "timer_reset" => Self::TimerReset,
            "phase_next" => Self::PhaseNext,
            "phase_set" => {
                let p: single::PhaseArg = payload!(frame);
                Self::PhaseSet { phase: p.phase }
            },
            "action_create" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct P {
                    title: String,
                    #[serde(default)]
                    assignee_id: Option<serde_json::Value>,
                    #[serde(default)]
                    item_id: Option<serde_json::Value>,
                    #[serde(default)]
                    due_date: Option<DateTime<Utc>>,
                    #[serde(default)]
                    priority: Option<ActionPriority>,
                }
                let p: P = payload!(frame);
                Self::ActionCreate {
                    title: p.title,
                    assignee_id: p.assignee_id,
                    item_id: p.item_id,
                    due_date: p.due_date,
                    priority: p.priority,
                }
            },
            "action_update" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct P {
                    action_id: ActionId,
                    #[serde(default)]
                    title: Option<String>,
                    #[serde(default)]
                    assignee_id: Option<UserId>,
                    #[serde(default)]
                    due_date: Option<DateTime<Utc>>,
                    #[serde(default)]
                    priority: Option<ActionPriority>,
                }
                let p: P = payload!(frame);
                Self::ActionUpdate {
                    action_id: p.action_id,
                    title: p.title,
                    assignee_id: p.assignee_id,
                    due_date: p.due_date,
                    priority: p.priority,
                }
            },
            "action_complete" => {
                let p: single::ActionRef = payload!(frame);
                Self::ActionComplete { action_id: p.action_id }
            },
            "action_uncomplete" => {
                let p: single::ActionRef = payload!(frame);
                Self::ActionUncomplete { action_id: p.action_id }
            },
            "action_delete" => {
                let p: single::ActionRef = payload!(frame);
                Self::ActionDelete { action_id: p.action_id }
            },
            "retro_end" => Self::RetroEnd,
            "mood_set" => {
                let p: single::MoodArg = payload!(frame);
                Self::MoodSet { mood: p.mood }
            },
            "roti_vote" => {
                let p: single::RatingArg = payload!(frame);
                Self::RotiVote { rating: p.rating }
            },
            "roti_reveal" => Self::RotiReveal,
            "draft_typing" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct P {
                    column_id: ColumnId,
                    content_length: u32,
                }
                let p: P = payload!(frame);
                Self::DraftTyping { column_id: p.column_id, content_length: p.content_length }
            },
            "draft_clear" => {
                let p: single::ColumnRef = payload!(frame);
                Self::DraftClear { column_id: p.column_id }
            },
            "facilitator_claim" => Self::FacilitatorClaim,
            "facilitator_transfer" => {
                let p: single::UserRef = payload!(frame);
                Self::FacilitatorTransfer { user_id: p.user_id }
            },
            "discuss_set_item" => {
                let p: single::ItemRef = payload!(frame);
                Self::DiscussSetItem { item_id: p.item_id }
            },
            "discuss_extend" => {
                let p: single::SecondsArg = payload!(frame);
                Self::DiscussExtend { seconds: p.seconds }
            },
            _ => return Ok(None),
        };
        Ok(Some(cmd))
    }
}

/// Typed error codes carried by `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed payload or missing required field.
    InvalidPayload,
    /// The retro id did not parse or does not exist.
    InvalidRetroId,
    /// Caller is not allowed to perform the action.
    Forbidden,
    /// The command is not legal in the current phase or timer state.
    PhaseInvalid,
    /// The caller hit the per-user vote cap.
    VoteLimitReached,
    /// The caller hit the per-item vote cap.
    ItemVoteLimitReached,
    /// Referenced entity does not exist.
    NotFound,
    /// Joining the room failed.
    JoinFailed,
    /// Transient server-side failure.
    Internal,
}

/// Direction of a vote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    /// A vote was added.
    Add,
    /// A vote was removed.
    Remove,
}

/// The authoritative snapshot sent to a client on join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetroStatePayload {
    /// The session row.
    pub retro: Retro,
    /// All items with vote counts.
    pub items: Vec<RetroItem>,
    /// All action items.
    pub actions: Vec<RetroAction>,
    /// All moods.
    pub moods: Vec<MoodEntry>,
    /// ROTI aggregate (unrevealed results carry counts only).
    pub roti: RotiResults,
    /// Merged (local + remote) participant set.
    pub participants: Vec<Participant>,
    /// The joining user's total vote count.
    pub user_vote_count: u32,
    /// Team member presence; only populated in the waiting phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_members: Option<Vec<TeamMemberStatus>>,
    /// Lean Coffee discussion state; only for LC sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion: Option<LcDiscussionState>,
}

/// A server-to-client frame.
///
/// Serializes to the `{"type", "payload"}` envelope directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Authoritative snapshot, sent to the joining client only.
    RetroState(Box<RetroStatePayload>),
    /// Targeted error, sent to the offending client only.
    Error {
        /// Error code.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },
    /// A user became present in the room.
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        /// Who joined.
        user_id: UserId,
        /// Display name.
        user_name: String,
    },
    /// A user left the room (after the grace period).
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        /// Who left.
        user_id: UserId,
    },
    /// Waiting-phase roster update.
    #[serde(rename_all = "camelCase")]
    TeamMembersUpdated {
        /// Full roster with presence flags.
        team_members: Vec<TeamMemberStatus>,
    },
    /// An item was created.
    ItemCreated(RetroItem),
    /// An item was edited.
    ItemUpdated(RetroItem),
    /// An item was deleted.
    #[serde(rename_all = "camelCase")]
    ItemDeleted {
        /// Which item.
        item_id: ItemId,
    },
    /// Items were grouped under a parent.
    #[serde(rename_all = "camelCase")]
    ItemsGrouped {
        /// Group root.
        parent_id: ItemId,
        /// Every item whose `group_id` changed, grandchildren included.
        affected_child_ids: Vec<ItemId>,
    },
    /// A vote was added or removed.
    #[serde(rename_all = "camelCase")]
    VoteUpdated {
        /// Target item.
        item_id: ItemId,
        /// Add or remove.
        action: VoteAction,
        /// Voting user.
        user_id: UserId,
        /// That user's new total vote count.
        user_vote_count: u32,
    },
    /// Timer started.
    #[serde(rename_all = "camelCase")]
    TimerStarted {
        /// Wall-clock start.
        started_at: DateTime<Utc>,
        /// Timer duration.
        duration_seconds: u32,
        /// Deadline; clients render against their local clock.
        ends_at: DateTime<Utc>,
    },
    /// Timer paused.
    #[serde(rename_all = "camelCase")]
    TimerPaused {
        /// Seconds left at pause time.
        remaining_seconds: u32,
    },
    /// Timer resumed.
    #[serde(rename_all = "camelCase")]
    TimerResumed {
        /// New deadline.
        ends_at: DateTime<Utc>,
        /// Remaining duration at resume time.
        duration_seconds: u32,
    },
    /// Time was added to the timer.
    #[serde(rename_all = "camelCase")]
    TimerUpdated {
        /// New deadline, when running.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ends_at: Option<DateTime<Utc>>,
        /// New remaining seconds, when paused.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remaining_seconds: Option<u32>,
    },
    /// Timer reset to idle.
    TimerReset {},
    /// Timer reached its deadline.
    TimerExpired {},
    /// Phase transition.
    #[serde(rename_all = "camelCase")]
    PhaseChanged {
        /// Phase before the transition.
        previous: Phase,
        /// Phase after the transition.
        current: Phase,
    },
    /// An action item was created.
    ActionCreated(RetroAction),
    /// An action item was updated (fields or completion).
    ActionUpdated(RetroAction),
    /// An action item was deleted.
    #[serde(rename_all = "camelCase")]
    ActionDeleted {
        /// Which action.
        action_id: ActionId,
    },
    /// The session ended; final snapshots attached.
    #[serde(rename_all = "camelCase")]
    RetroEnded {
        /// Final session row.
        retro: Retro,
        /// Final items.
        items: Vec<RetroItem>,
        /// Final actions.
        actions: Vec<RetroAction>,
        /// Final ROTI aggregate.
        roti_results: RotiResults,
    },
    /// A mood was set or changed.
    #[serde(rename_all = "camelCase")]
    MoodUpdated {
        /// Whose mood.
        user_id: UserId,
        /// The mood key.
        mood: String,
        /// Users with a mood so far.
        mood_count: u32,
        /// Merged participant count.
        participant_count: u32,
    },
    /// A ROTI rating was cast (counts only; ratings stay secret).
    #[serde(rename_all = "camelCase")]
    RotiVoteSubmitted {
        /// Ratings cast so far.
        vote_count: u32,
        /// Merged participant count.
        participant_count: u32,
    },
    /// ROTI results were revealed.
    RotiResultsRevealed(RotiResults),
    /// Relay of a peer's typing indicator.
    #[serde(rename_all = "camelCase")]
    DraftTyping {
        /// Who is typing.
        user_id: UserId,
        /// Column being typed into.
        column_id: ColumnId,
        /// Draft length so far.
        content_length: u32,
    },
    /// Relay of a peer clearing their typing indicator.
    #[serde(rename_all = "camelCase")]
    DraftClear {
        /// Who cleared.
        user_id: UserId,
        /// Column the draft was in.
        column_id: ColumnId,
    },
    /// Facilitation changed hands.
    #[serde(rename_all = "camelCase")]
    FacilitatorChanged {
        /// The new facilitator.
        user_id: UserId,
    },
    /// Discussion navigated to a new item.
    #[serde(rename_all = "camelCase")]
    DiscussItemChanged {
        /// The item now under discussion.
        item_id: ItemId,
    },
}

impl ServerFrame {
    /// Convenience constructor for error frames.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }

    /// The wire type tag of this frame.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RetroState(_) => "retro_state",
            Self::Error { .. } => "error",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::TeamMembersUpdated { .. } => "team_members_updated",
            Self::ItemCreated(_) => "item_created",
            Self::ItemUpdated(_) => "item_updated",
            Self::ItemDeleted { .. } => "item_deleted",
            Self::ItemsGrouped { .. } => "items_grouped",
            Self::VoteUpdated { .. } => "vote_updated",
            Self::TimerStarted { .. } => "timer_started",
            Self::TimerPaused { .. } => "timer_paused",
            Self::TimerResumed { .. } => "timer_resumed",
            Self::TimerUpdated { .. } => "timer_updated",
            Self::TimerReset {} => "timer_reset",
            Self::TimerExpired {} => "timer_expired",
            Self::PhaseChanged { .. } => "phase_changed",
            Self::ActionCreated(_) => "action_created",
            Self::ActionUpdated(_) => "action_updated",
            Self::ActionDeleted { .. } => "action_deleted",
            Self::RetroEnded { .. } => "retro_ended",
            Self::MoodUpdated { .. } => "mood_updated",
            Self::RotiVoteSubmitted { .. } => "roti_vote_submitted",
            Self::RotiResultsRevealed(_) => "roti_results_revealed",
            Self::DraftTyping { .. } => "draft_typing",
            Self::DraftClear { .. } => "draft_clear",
            Self::FacilitatorChanged { .. } => "facilitator_changed",
            Self::DiscussItemChanged { .. } => "discuss_item_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_decodes_to_none() {
        let frame = Frame::parse(r#"{"type":"no_such_command","payload":{}}"#).unwrap();
        assert!(ClientCommand::from_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn known_type_with_bad_payload_is_an_error() {
        let frame =
            Frame::parse(r#"{"type":"join_retro","payload":{"retroId":"not-a-uuid"}}"#).unwrap();
        assert!(ClientCommand::from_frame(&frame).is_err());
    }

    #[test]
    fn join_retro_decodes() {
        let retro = RetroId::new();
        let text = format!(r#"{{"type":"join_retro","payload":{{"retroId":"{retro}"}}}}"#);
        let frame = Frame::parse(&text).unwrap();
        let cmd = ClientCommand::from_frame(&frame).unwrap().unwrap();
        assert_eq!(cmd, ClientCommand::JoinRetro { retro_id: retro });
    }

    #[test]
    fn scalar_commands_use_object_payloads() {
        let frame =
            Frame::parse(r#"{"type":"timer_start","payload":{"durationSeconds":300}}"#).unwrap();
        assert_eq!(
            ClientCommand::from_frame(&frame).unwrap(),
            Some(ClientCommand::TimerStart { duration_seconds: 300 })
        );

        let frame = Frame::parse(r#"{"type":"roti_vote","payload":{"rating":4}}"#).unwrap();
        assert_eq!(
            ClientCommand::from_frame(&frame).unwrap(),
            Some(ClientCommand::RotiVote { rating: 4 })
        );
    }

    #[test]
    fn item_create_decodes_camel_case() {
        let column = ColumnId::new();
        let text = format!(
            r#"{{"type":"item_create","payload":{{"columnId":"{column}","content":"slow builds"}}}}"#
        );
        let frame = Frame::parse(&text).unwrap();
        let cmd = ClientCommand::from_frame(&frame).unwrap().unwrap();
        assert_eq!(
            cmd,
            ClientCommand::ItemCreate { column_id: column, content: "slow builds".into() }
        );
    }

    #[test]
    fn payloadless_commands_ignore_payload() {
        let frame = Frame::parse(r#"{"type":"phase_next"}"#).unwrap();
        assert_eq!(
            ClientCommand::from_frame(&frame).unwrap(),
            Some(ClientCommand::PhaseNext)
        );
    }

    #[test]
    fn server_frame_envelope_shape() {
        let frame = ServerFrame::ParticipantLeft { user_id: UserId::new() };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "participant_left");
        assert!(json["payload"]["userId"].is_string());
    }

    #[test]
    fn server_frame_round_trips_through_cluster_payload() {
        let frame = ServerFrame::VoteUpdated {
            item_id: ItemId::new(),
            action: VoteAction::Add,
            user_id: UserId::new(),
            user_vote_count: 2,
        };
        let value = serde_json::to_value(&frame).unwrap();
        let back: ServerFrame = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), "vote_updated");
    }

    #[test]
    fn error_frame_codes_are_snake_case() {
        let frame = ServerFrame::error(ErrorCode::VoteLimitReached, "limit");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["payload"]["code"], "vote_limit_reached");
    }
}
