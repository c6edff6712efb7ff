//! The store contract: one narrow trait per aggregate.
//!
//! Handlers consume these through the [`Store`] bundle. Tests provide
//! [`crate::MemoryStore`]; production wires a SQL adapter. Multi-row
//! effects (grouping flatten, attendance snapshot) go through the batch
//! operations so an adapter can wrap them in a single transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::{
    ActionId, Attendee, ColumnId, ItemId, MoodEntry, Phase, Retro, RetroAction, RetroItem,
    RetroId, RotiResults, TeamId, TeamMember, Template, TemplateId, TopicHistory, TopicHistoryId,
    User, UserId,
};

use crate::error::StoreResult;

/// The timer columns of a retrospective row, written as one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerColumns {
    /// Wall-clock start of the running timer.
    pub started_at: Option<DateTime<Utc>>,
    /// Duration of the running timer.
    pub duration_seconds: Option<u32>,
    /// When the timer was paused.
    pub paused_at: Option<DateTime<Utc>>,
    /// Seconds remaining at pause time.
    pub remaining_seconds: Option<u32>,
}

/// Retrospective rows.
#[async_trait]
pub trait RetroStore: Send + Sync {
    /// Fetch a retro by id.
    async fn get_by_id(&self, id: RetroId) -> StoreResult<Retro>;

    /// List a team's retros, newest first.
    async fn list_by_team(&self, team: TeamId) -> StoreResult<Vec<Retro>>;

    /// Insert a new retro row.
    async fn create(&self, retro: Retro) -> StoreResult<Retro>;

    /// Overwrite a retro row (phase, facilitator, timestamps, status).
    async fn update(&self, retro: &Retro) -> StoreResult<()>;

    /// Update only the phase column.
    async fn update_phase(&self, id: RetroId, phase: Phase) -> StoreResult<()>;

    /// Update only the timer columns.
    async fn update_timer(&self, id: RetroId, timer: TimerColumns) -> StoreResult<()>;

    /// Delete a retro and its dependents.
    async fn delete(&self, id: RetroId) -> StoreResult<()>;
}

/// Retro templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Fetch a template with its column list and phase-timer map.
    async fn get_by_id(&self, id: TemplateId) -> StoreResult<Template>;
}

/// Board items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch an item by id.
    async fn get_by_id(&self, id: ItemId) -> StoreResult<RetroItem>;

    /// List a retro's items with current vote counts, ordered by position.
    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<RetroItem>>;

    /// Insert a new item.
    async fn create(&self, item: RetroItem) -> StoreResult<RetroItem>;

    /// Update an item's content.
    async fn update(&self, item: &RetroItem) -> StoreResult<()>;

    /// Delete an item.
    ///
    /// Cascades to grouped children and to votes on every removed item.
    /// Returns the ids of all removed items, the target first.
    async fn delete(&self, id: ItemId) -> StoreResult<Vec<ItemId>>;

    /// Next free position in a column (max + 1).
    async fn next_position(&self, retro: RetroId, column: ColumnId) -> StoreResult<u32>;

    /// Set one item's group parent.
    async fn reparent(&self, child: ItemId, parent: Option<ItemId>) -> StoreResult<()>;

    /// Re-parent several items onto `parent` as one transaction.
    async fn reparent_batch(&self, parent: ItemId, children: &[ItemId]) -> StoreResult<()>;
}

/// Item votes.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Record one vote.
    async fn create(&self, retro: RetroId, item: ItemId, user: UserId) -> StoreResult<()>;

    /// Remove the user's oldest vote on the item; not-found when none exist.
    async fn delete_oldest_for_user(&self, item: ItemId, user: UserId) -> StoreResult<()>;

    /// Total votes the user has cast in the retro.
    async fn count_by_user_in_retro(&self, retro: RetroId, user: UserId) -> StoreResult<u32>;

    /// Votes the user has placed on one item.
    async fn count_by_user_on_item(&self, item: ItemId, user: UserId) -> StoreResult<u32>;
}

/// Action items.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Fetch an action by id.
    async fn get_by_id(&self, id: ActionId) -> StoreResult<RetroAction>;

    /// List a retro's actions in creation order.
    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<RetroAction>>;

    /// Insert a new action.
    async fn create(&self, action: RetroAction) -> StoreResult<RetroAction>;

    /// Overwrite an action row (title, assignee, due date, priority,
    /// completion).
    async fn update(&self, action: &RetroAction) -> StoreResult<()>;

    /// Delete an action.
    async fn delete(&self, id: ActionId) -> StoreResult<()>;
}

/// Icebreaker moods.
#[async_trait]
pub trait MoodStore: Send + Sync {
    /// Insert or replace the user's mood for the retro.
    async fn upsert(&self, retro: RetroId, user: UserId, mood: &str) -> StoreResult<()>;

    /// List all moods for a retro.
    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<MoodEntry>>;

    /// Number of users with a mood set.
    async fn count(&self, retro: RetroId) -> StoreResult<u32>;
}

/// ROTI ratings.
#[async_trait]
pub trait RotiStore: Send + Sync {
    /// Insert or replace the user's rating (`1..=5`).
    async fn upsert_vote(&self, retro: RetroId, user: UserId, rating: u8) -> StoreResult<()>;

    /// Aggregate results including the revealed flag.
    async fn results(&self, retro: RetroId) -> StoreResult<RotiResults>;

    /// Number of ratings cast.
    async fn count_votes(&self, retro: RetroId) -> StoreResult<u32>;

    /// Mark results revealed.
    async fn reveal(&self, retro: RetroId) -> StoreResult<()>;
}

/// Attendance records.
#[async_trait]
pub trait AttendeeStore: Send + Sync {
    /// Record attendance for one member.
    async fn record(&self, retro: RetroId, user: UserId, attended: bool) -> StoreResult<()>;

    /// Record the whole team's attendance as one transaction.
    async fn record_batch(&self, retro: RetroId, attendees: &[Attendee]) -> StoreResult<()>;

    /// List recorded attendance.
    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<Attendee>>;
}

/// Team membership.
#[async_trait]
pub trait TeamMemberStore: Send + Sync {
    /// List a team's members with display info.
    async fn list_by_team(&self, team: TeamId) -> StoreResult<Vec<TeamMember>>;

    /// Role lookup for one member; not-found when the user is not on the
    /// team.
    async fn get_by_team_and_user(&self, team: TeamId, user: UserId) -> StoreResult<TeamMember>;
}

/// User rows.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by id.
    async fn get_by_id(&self, id: UserId) -> StoreResult<User>;
}

/// Lean Coffee per-topic discussion history.
#[async_trait]
pub trait TopicHistoryStore: Send + Sync {
    /// Insert a new history row (opens a topic).
    async fn create(&self, history: TopicHistory) -> StoreResult<TopicHistory>;

    /// Update a row's accumulated time, extension count, and close time.
    async fn update(
        &self,
        id: TopicHistoryId,
        total_discussion_seconds: u32,
        extension_count: u32,
        ended_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// The open (un-ended) row for a retro, if any.
    async fn find_current(&self, retro: RetroId) -> StoreResult<Option<TopicHistory>>;

    /// The row for a specific topic, if it was ever opened.
    async fn find_by_topic(&self, retro: RetroId, item: ItemId)
        -> StoreResult<Option<TopicHistory>>;

    /// All rows for a retro in discussion order.
    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<TopicHistory>>;

    /// Next discussion order value (max + 1, starting at 1).
    async fn next_order(&self, retro: RetroId) -> StoreResult<u32>;
}

/// The capability bundle handlers consume.
///
/// Each field is an `Arc<dyn Trait>` so tests can swap individual
/// aggregates for fakes while keeping the rest real.
#[derive(Clone)]
pub struct Store {
    /// Retrospective rows.
    pub retros: Arc<dyn RetroStore>,
    /// Templates.
    pub templates: Arc<dyn TemplateStore>,
    /// Board items.
    pub items: Arc<dyn ItemStore>,
    /// Votes.
    pub votes: Arc<dyn VoteStore>,
    /// Action items.
    pub actions: Arc<dyn ActionStore>,
    /// Moods.
    pub moods: Arc<dyn MoodStore>,
    /// ROTI ratings.
    pub roti: Arc<dyn RotiStore>,
    /// Attendance.
    pub attendees: Arc<dyn AttendeeStore>,
    /// Team membership.
    pub team_members: Arc<dyn TeamMemberStore>,
    /// Users.
    pub users: Arc<dyn UserStore>,
    /// Lean Coffee topic history.
    pub topic_history: Arc<dyn TopicHistoryStore>,
}

impl Store {
    /// Build a bundle where every aggregate is served by one
    /// [`crate::MemoryStore`].
    #[must_use]
    pub fn in_memory() -> (Self, Arc<crate::MemoryStore>) {
        let mem = Arc::new(crate::MemoryStore::new());
        let store = Self {
            retros: mem.clone(),
            templates: mem.clone(),
            items: mem.clone(),
            votes: mem.clone(),
            actions: mem.clone(),
            moods: mem.clone(),
            roti: mem.clone(),
            attendees: mem.clone(),
            team_members: mem.clone(),
            users: mem.clone(),
            topic_history: mem.clone(),
        };
        (store, mem)
    }
}
