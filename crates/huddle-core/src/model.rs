//! Domain model types shared by the store contract and the wire protocol.
//!
//! These are the shapes the durable store hands back and the snapshot
//! payloads carry; persistence itself is opaque to the engine. Field names
//! serialize in camelCase because the same structs appear verbatim inside
//! wire frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::id::{
    ActionId, ColumnId, ItemId, RetroId, TeamId, TemplateId, TopicHistoryId, UserId,
};
use crate::phase::{Phase, SessionKind};

/// Immutable per-retro voting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingPolicy {
    /// Maximum total votes one user may cast in the retro.
    pub max_per_user: u32,
    /// Maximum votes one user may place on a single item.
    pub max_per_item: u32,
    /// Whether votes may be removed once cast.
    pub allow_change: bool,
}

impl Default for VotingPolicy {
    fn default() -> Self {
        Self {
            max_per_user: 5,
            max_per_item: 3,
            allow_change: true,
        }
    }
}

/// Lifecycle status of a retrospective row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetroStatus {
    /// Session is live (or not yet started).
    Active,
    /// Session reached the `ended` phase.
    Ended,
}

/// A retrospective (or Lean Coffee) session row.
///
/// Carries the persisted slice of session state: phase, facilitator, and
/// the timer fields the engine uses to reconstruct in-memory timers after
/// a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retro {
    /// Retro id; doubles as the room id.
    pub id: RetroId,
    /// Owning team.
    pub team_id: TeamId,
    /// Template providing columns and per-phase timer durations.
    pub template_id: TemplateId,
    /// Session kind.
    pub kind: SessionKind,
    /// Display name.
    pub name: String,
    /// Current phase (authoritative copy; replicas mirror it in memory).
    pub phase: Phase,
    /// Current facilitator, if one has been claimed.
    pub facilitator_id: Option<UserId>,
    /// Voting limits, fixed at creation.
    pub policy: VotingPolicy,
    /// Wall-clock start of the currently running timer.
    pub timer_started_at: Option<DateTime<Utc>>,
    /// Duration of the currently running timer.
    pub timer_duration_seconds: Option<u32>,
    /// When the timer was paused, if paused.
    pub timer_paused_at: Option<DateTime<Utc>>,
    /// Seconds remaining at pause time, if paused.
    pub timer_remaining_seconds: Option<u32>,
    /// When the session left the waiting phase.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Row status.
    pub status: RetroStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A template column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateColumn {
    /// Column id.
    pub id: ColumnId,
    /// Display name (e.g. "Went well").
    pub name: String,
    /// Ordering position.
    pub position: u32,
}

/// A retro template: column layout plus per-phase timer durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Template id.
    pub id: TemplateId,
    /// Display name.
    pub name: String,
    /// Columns, ordered by position.
    pub columns: Vec<TemplateColumn>,
    /// Phases that auto-start a timer on entry, with the duration in
    /// seconds. A zero or absent entry means no timer for that phase.
    #[serde(default)]
    pub phase_timers: HashMap<Phase, u32>,
}

/// An item on the board (a card, or a Lean Coffee topic).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetroItem {
    /// Item id.
    pub id: ItemId,
    /// Owning retro.
    pub retro_id: RetroId,
    /// Column the item lives in.
    pub column_id: ColumnId,
    /// Author.
    pub author_id: UserId,
    /// Item text.
    pub content: String,
    /// Position within the column.
    pub position: u32,
    /// Group parent. Forms a forest: a parent never has a `group_id` of
    /// its own (grouping flattens grandchildren onto the new root).
    pub group_id: Option<ItemId>,
    /// Denormalized vote count, maintained by the store.
    pub vote_count: u32,
    /// Creation time. Breaks vote-count ties in the Lean Coffee queue.
    pub created_at: DateTime<Utc>,
}

/// Priority of an action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    /// Nice to have.
    Low,
    /// Should be done.
    Medium,
    /// Must be done.
    High,
}

/// An action item captured during the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetroAction {
    /// Action id.
    pub id: ActionId,
    /// Owning retro.
    pub retro_id: RetroId,
    /// What to do.
    pub title: String,
    /// Assigned user, if any.
    pub assignee_id: Option<UserId>,
    /// Source item, if the action was derived from one.
    pub item_id: Option<ItemId>,
    /// Due date, if set.
    pub due_date: Option<DateTime<Utc>>,
    /// Priority, if set.
    pub priority: Option<ActionPriority>,
    /// Set when completed; cleared when un-completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One user's icebreaker mood.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    /// Who.
    pub user_id: UserId,
    /// Mood key chosen by the client (e.g. "energized").
    pub mood: String,
}

/// Aggregate ROTI results for a retro.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotiResults {
    /// Mean rating over all votes, 0 when there are none.
    pub average: f64,
    /// Number of ratings cast.
    pub total_votes: u32,
    /// Count of ratings 1 through 5, index 0 holding rating 1.
    pub distribution: [u32; 5],
    /// Whether the facilitator has revealed the results.
    pub revealed: bool,
}

impl RotiResults {
    /// Empty, unrevealed results.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            average: 0.0,
            total_votes: 0,
            distribution: [0; 5],
            revealed: false,
        }
    }
}

/// Attendance record for one team member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Team member.
    pub user_id: UserId,
    /// Whether they were present in the merged room at session start.
    pub attended: bool,
}

/// Role of a user within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    /// May claim facilitation in the waiting phase.
    Admin,
    /// Regular member.
    Member,
}

/// A team membership row with display info.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    /// Member user id.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
    /// Role in the team.
    pub role: TeamRole,
}

/// A team member plus live presence, broadcast while in the waiting phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberStatus {
    /// Member user id.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
    /// Role in the team.
    pub role: TeamRole,
    /// Present in the merged (local + remote) room right now.
    pub present: bool,
}

/// A user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
}

/// One participant in the merged room view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// User id.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
}

/// Per-topic discussion history for Lean Coffee sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicHistory {
    /// Row id.
    pub id: TopicHistoryId,
    /// Owning retro.
    pub retro_id: RetroId,
    /// The discussed topic.
    pub item_id: ItemId,
    /// Discussion order (1-based).
    pub order: u32,
    /// When discussion of the topic began.
    pub started_at: DateTime<Utc>,
    /// When discussion closed; `None` while the topic is current.
    pub ended_at: Option<DateTime<Utc>>,
    /// Accumulated discussion time.
    pub total_discussion_seconds: u32,
    /// How many times the timebox was extended.
    pub extension_count: u32,
}

/// Lean Coffee discussion sub-state as carried in the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LcDiscussionState {
    /// Topics awaiting discussion, ordered by vote count (ties by
    /// creation time).
    pub queue: Vec<ItemId>,
    /// Topic currently under discussion.
    pub current: Option<ItemId>,
    /// Topics already discussed.
    pub done: Vec<ItemId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voting_policy_serializes_camel_case() {
        let json = serde_json::to_value(VotingPolicy::default()).unwrap();
        assert!(json.get("maxPerUser").is_some());
        assert!(json.get("maxPerItem").is_some());
        assert!(json.get("allowChange").is_some());
    }

    #[test]
    fn roti_empty_distribution() {
        let roti = RotiResults::empty();
        assert_eq!(roti.total_votes, 0);
        assert_eq!(roti.distribution, [0; 5]);
        assert!(!roti.revealed);
    }
}
