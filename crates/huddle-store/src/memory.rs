//! Complete in-memory store used by tests and single-node dev runs.
//!
//! One mutex guards all tables, so every operation — including the batch
//! operations — is atomic, matching the transaction discipline a SQL
//! adapter provides.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::{
    ActionId, Attendee, ColumnId, ItemId, MoodEntry, Phase, Retro, RetroAction, RetroItem,
    RetroId, RotiResults, TeamId, TeamMember, Template, TemplateId, TopicHistory, TopicHistoryId,
    User, UserId,
};
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    ActionStore, AttendeeStore, ItemStore, MoodStore, RetroStore, RotiStore, TeamMemberStore,
    TemplateStore, TimerColumns, TopicHistoryStore, UserStore, VoteStore,
};

/// One recorded vote. `seq` orders votes so the oldest can be removed.
#[derive(Debug, Clone)]
struct VoteRow {
    seq: u64,
    retro: RetroId,
    item: ItemId,
    user: UserId,
}

#[derive(Default)]
struct Inner {
    retros: HashMap<RetroId, Retro>,
    templates: HashMap<TemplateId, Template>,
    items: HashMap<ItemId, RetroItem>,
    votes: Vec<VoteRow>,
    vote_seq: u64,
    actions: HashMap<ActionId, RetroAction>,
    moods: HashMap<RetroId, HashMap<UserId, String>>,
    roti_votes: HashMap<RetroId, HashMap<UserId, u8>>,
    roti_revealed: HashMap<RetroId, bool>,
    attendees: HashMap<RetroId, HashMap<UserId, bool>>,
    team_members: HashMap<TeamId, Vec<TeamMember>>,
    users: HashMap<UserId, User>,
    topic_history: HashMap<TopicHistoryId, TopicHistory>,
}

impl Inner {
    fn item_vote_count(&self, item: ItemId) -> u32 {
        u32::try_from(self.votes.iter().filter(|v| v.item == item).count()).unwrap_or(u32::MAX)
    }

    fn with_vote_count(&self, mut item: RetroItem) -> RetroItem {
        item.vote_count = self.item_vote_count(item.id);
        item
    }
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user row.
    pub fn insert_user(&self, user: User) {
        self.inner.lock().users.insert(user.id, user);
    }

    /// Seed a team membership row (also seeds the user).
    pub fn insert_team_member(&self, team: TeamId, member: TeamMember) {
        let mut inner = self.inner.lock();
        inner.users.insert(
            member.user_id,
            User { id: member.user_id, name: member.user_name.clone() },
        );
        let members = inner.team_members.entry(team).or_default();
        members.retain(|m| m.user_id != member.user_id);
        members.push(member);
    }

    /// Seed a template.
    pub fn insert_template(&self, template: Template) {
        self.inner.lock().templates.insert(template.id, template);
    }
}

#[async_trait]
impl RetroStore for MemoryStore {
    async fn get_by_id(&self, id: RetroId) -> StoreResult<Retro> {
        self.inner
            .lock()
            .retros
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("retro", id))
    }

    async fn list_by_team(&self, team: TeamId) -> StoreResult<Vec<Retro>> {
        let inner = self.inner.lock();
        let mut retros: Vec<Retro> = inner
            .retros
            .values()
            .filter(|r| r.team_id == team)
            .cloned()
            .collect();
        retros.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(retros)
    }

    async fn create(&self, retro: Retro) -> StoreResult<Retro> {
        self.inner.lock().retros.insert(retro.id, retro.clone());
        Ok(retro)
    }

    async fn update(&self, retro: &Retro) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.retros.contains_key(&retro.id) {
            return Err(StoreError::not_found("retro", retro.id));
        }
        inner.retros.insert(retro.id, retro.clone());
        Ok(())
    }

    async fn update_phase(&self, id: RetroId, phase: Phase) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let retro = inner
            .retros
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("retro", id))?;
        retro.phase = phase;
        Ok(())
    }

    async fn update_timer(&self, id: RetroId, timer: TimerColumns) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let retro = inner
            .retros
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("retro", id))?;
        retro.timer_started_at = timer.started_at;
        retro.timer_duration_seconds = timer.duration_seconds;
        retro.timer_paused_at = timer.paused_at;
        retro.timer_remaining_seconds = timer.remaining_seconds;
        Ok(())
    }

    async fn delete(&self, id: RetroId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner
            .retros
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("retro", id))?;
        inner.items.retain(|_, i| i.retro_id != id);
        inner.votes.retain(|v| v.retro != id);
        inner.actions.retain(|_, a| a.retro_id != id);
        inner.moods.remove(&id);
        inner.roti_votes.remove(&id);
        inner.roti_revealed.remove(&id);
        inner.attendees.remove(&id);
        inner.topic_history.retain(|_, h| h.retro_id != id);
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn get_by_id(&self, id: TemplateId) -> StoreResult<Template> {
        self.inner
            .lock()
            .templates
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", id))
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get_by_id(&self, id: ItemId) -> StoreResult<RetroItem> {
        let inner = self.inner.lock();
        let item = inner
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("item", id))?;
        Ok(inner.with_vote_count(item))
    }

    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<RetroItem>> {
        let inner = self.inner.lock();
        let mut items: Vec<RetroItem> = inner
            .items
            .values()
            .filter(|i| i.retro_id == retro)
            .cloned()
            .map(|i| inner.with_vote_count(i))
            .collect();
        items.sort_by(|a, b| (a.column_id, a.position).cmp(&(b.column_id, b.position)));
        Ok(items)
    }

    async fn create(&self, item: RetroItem) -> StoreResult<RetroItem> {
        self.inner.lock().items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update(&self, item: &RetroItem) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.items.contains_key(&item.id) {
            return Err(StoreError::not_found("item", item.id));
        }
        inner.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete(&self, id: ItemId) -> StoreResult<Vec<ItemId>> {
        let mut inner = self.inner.lock();
        if !inner.items.contains_key(&id) {
            return Err(StoreError::not_found("item", id));
        }
        let mut removed = vec![id];
        removed.extend(
            inner
                .items
                .values()
                .filter(|i| i.group_id == Some(id))
                .map(|i| i.id),
        );
        for item in &removed {
            inner.items.remove(item);
        }
        inner.votes.retain(|v| !removed.contains(&v.item));
        Ok(removed)
    }

    async fn next_position(&self, retro: RetroId, column: ColumnId) -> StoreResult<u32> {
        let inner = self.inner.lock();
        let max = inner
            .items
            .values()
            .filter(|i| i.retro_id == retro && i.column_id == column)
            .map(|i| i.position)
            .max();
        Ok(max.map_or(0, |m| m + 1))
    }

    async fn reparent(&self, child: ItemId, parent: Option<ItemId>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let item = inner
            .items
            .get_mut(&child)
            .ok_or_else(|| StoreError::not_found("item", child))?;
        item.group_id = parent;
        Ok(())
    }

    async fn reparent_batch(&self, parent: ItemId, children: &[ItemId]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.items.contains_key(&parent) {
            return Err(StoreError::not_found("item", parent));
        }
        for child in children {
            if !inner.items.contains_key(child) {
                return Err(StoreError::not_found("item", child));
            }
        }
        for child in children {
            if let Some(item) = inner.items.get_mut(child) {
                item.group_id = Some(parent);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn create(&self, retro: RetroId, item: ItemId, user: UserId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.vote_seq += 1;
        let seq = inner.vote_seq;
        inner.votes.push(VoteRow { seq, retro, item, user });
        Ok(())
    }

    async fn delete_oldest_for_user(&self, item: ItemId, user: UserId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let oldest = inner
            .votes
            .iter()
            .filter(|v| v.item == item && v.user == user)
            .min_by_key(|v| v.seq)
            .map(|v| v.seq)
            .ok_or_else(|| StoreError::not_found("vote", item))?;
        inner.votes.retain(|v| v.seq != oldest);
        Ok(())
    }

    async fn count_by_user_in_retro(&self, retro: RetroId, user: UserId) -> StoreResult<u32> {
        let inner = self.inner.lock();
        let count = inner
            .votes
            .iter()
            .filter(|v| v.retro == retro && v.user == user)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn count_by_user_on_item(&self, item: ItemId, user: UserId) -> StoreResult<u32> {
        let inner = self.inner.lock();
        let count = inner
            .votes
            .iter()
            .filter(|v| v.item == item && v.user == user)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn get_by_id(&self, id: ActionId) -> StoreResult<RetroAction> {
        self.inner
            .lock()
            .actions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("action", id))
    }

    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<RetroAction>> {
        let inner = self.inner.lock();
        let mut actions: Vec<RetroAction> = inner
            .actions
            .values()
            .filter(|a| a.retro_id == retro)
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(actions)
    }

    async fn create(&self, action: RetroAction) -> StoreResult<RetroAction> {
        self.inner.lock().actions.insert(action.id, action.clone());
        Ok(action)
    }

    async fn update(&self, action: &RetroAction) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.actions.contains_key(&action.id) {
            return Err(StoreError::not_found("action", action.id));
        }
        inner.actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn delete(&self, id: ActionId) -> StoreResult<()> {
        self.inner
            .lock()
            .actions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("action", id))
    }
}

#[async_trait]
impl MoodStore for MemoryStore {
    async fn upsert(&self, retro: RetroId, user: UserId, mood: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .moods
            .entry(retro)
            .or_default()
            .insert(user, mood.to_string());
        Ok(())
    }

    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<MoodEntry>> {
        let inner = self.inner.lock();
        Ok(inner
            .moods
            .get(&retro)
            .map(|m| {
                m.iter()
                    .map(|(user, mood)| MoodEntry { user_id: *user, mood: mood.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, retro: RetroId) -> StoreResult<u32> {
        let inner = self.inner.lock();
        let count = inner.moods.get(&retro).map_or(0, HashMap::len);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl RotiStore for MemoryStore {
    async fn upsert_vote(&self, retro: RetroId, user: UserId, rating: u8) -> StoreResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(StoreError::Internal(format!("rating out of range: {rating}")));
        }
        self.inner
            .lock()
            .roti_votes
            .entry(retro)
            .or_default()
            .insert(user, rating);
        Ok(())
    }

    async fn results(&self, retro: RetroId) -> StoreResult<RotiResults> {
        let inner = self.inner.lock();
        let mut results = RotiResults::empty();
        results.revealed = inner.roti_revealed.get(&retro).copied().unwrap_or(false);
        if let Some(votes) = inner.roti_votes.get(&retro) {
            let mut sum: u32 = 0;
            for rating in votes.values() {
                sum += u32::from(*rating);
                results.distribution[usize::from(rating - 1)] += 1;
            }
            results.total_votes = u32::try_from(votes.len()).unwrap_or(u32::MAX);
            if results.total_votes > 0 {
                results.average = f64::from(sum) / f64::from(results.total_votes);
            }
        }
        Ok(results)
    }

    async fn count_votes(&self, retro: RetroId) -> StoreResult<u32> {
        let inner = self.inner.lock();
        let count = inner.roti_votes.get(&retro).map_or(0, HashMap::len);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn reveal(&self, retro: RetroId) -> StoreResult<()> {
        self.inner.lock().roti_revealed.insert(retro, true);
        Ok(())
    }
}

#[async_trait]
impl AttendeeStore for MemoryStore {
    async fn record(&self, retro: RetroId, user: UserId, attended: bool) -> StoreResult<()> {
        self.inner
            .lock()
            .attendees
            .entry(retro)
            .or_default()
            .insert(user, attended);
        Ok(())
    }

    async fn record_batch(&self, retro: RetroId, attendees: &[Attendee]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let table = inner.attendees.entry(retro).or_default();
        for attendee in attendees {
            table.insert(attendee.user_id, attendee.attended);
        }
        Ok(())
    }

    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<Attendee>> {
        let inner = self.inner.lock();
        Ok(inner
            .attendees
            .get(&retro)
            .map(|m| {
                m.iter()
                    .map(|(user, attended)| Attendee { user_id: *user, attended: *attended })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl TeamMemberStore for MemoryStore {
    async fn list_by_team(&self, team: TeamId) -> StoreResult<Vec<TeamMember>> {
        Ok(self
            .inner
            .lock()
            .team_members
            .get(&team)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_by_team_and_user(&self, team: TeamId, user: UserId) -> StoreResult<TeamMember> {
        self.inner
            .lock()
            .team_members
            .get(&team)
            .and_then(|members| members.iter().find(|m| m.user_id == user))
            .cloned()
            .ok_or_else(|| StoreError::not_found("team member", user))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_id(&self, id: UserId) -> StoreResult<User> {
        self.inner
            .lock()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }
}

#[async_trait]
impl TopicHistoryStore for MemoryStore {
    async fn create(&self, history: TopicHistory) -> StoreResult<TopicHistory> {
        self.inner
            .lock()
            .topic_history
            .insert(history.id, history.clone());
        Ok(history)
    }

    async fn update(
        &self,
        id: TopicHistoryId,
        total_discussion_seconds: u32,
        extension_count: u32,
        ended_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let row = inner
            .topic_history
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("topic history", id))?;
        row.total_discussion_seconds = total_discussion_seconds;
        row.extension_count = extension_count;
        row.ended_at = ended_at;
        Ok(())
    }

    async fn find_current(&self, retro: RetroId) -> StoreResult<Option<TopicHistory>> {
        let inner = self.inner.lock();
        Ok(inner
            .topic_history
            .values()
            .find(|h| h.retro_id == retro && h.ended_at.is_none())
            .cloned())
    }

    async fn find_by_topic(
        &self,
        retro: RetroId,
        item: ItemId,
    ) -> StoreResult<Option<TopicHistory>> {
        let inner = self.inner.lock();
        Ok(inner
            .topic_history
            .values()
            .find(|h| h.retro_id == retro && h.item_id == item)
            .cloned())
    }

    async fn list_by_retro(&self, retro: RetroId) -> StoreResult<Vec<TopicHistory>> {
        let inner = self.inner.lock();
        let mut rows: Vec<TopicHistory> = inner
            .topic_history
            .values()
            .filter(|h| h.retro_id == retro)
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.order);
        Ok(rows)
    }

    async fn next_order(&self, retro: RetroId) -> StoreResult<u32> {
        let inner = self.inner.lock();
        let max = inner
            .topic_history
            .values()
            .filter(|h| h.retro_id == retro)
            .map(|h| h.order)
            .max();
        Ok(max.map_or(1, |m| m + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::{RetroStatus, SessionKind, VotingPolicy};

    fn sample_retro() -> Retro {
        Retro {
            id: RetroId::new(),
            team_id: TeamId::new(),
            template_id: TemplateId::new(),
            kind: SessionKind::Retro,
            name: "sprint 12".into(),
            phase: Phase::Waiting,
            facilitator_id: None,
            policy: VotingPolicy::default(),
            timer_started_at: None,
            timer_duration_seconds: None,
            timer_paused_at: None,
            timer_remaining_seconds: None,
            started_at: None,
            ended_at: None,
            status: RetroStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn sample_item(retro: RetroId, column: ColumnId, position: u32) -> RetroItem {
        RetroItem {
            id: ItemId::new(),
            retro_id: retro,
            column_id: column,
            author_id: UserId::new(),
            content: "item".into(),
            position,
            group_id: None,
            vote_count: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn retro_round_trip_and_not_found() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        let got = RetroStore::get_by_id(&store, retro.id).await.unwrap();
        assert_eq!(got.name, "sprint 12");

        let missing = RetroStore::get_by_id(&store, RetroId::new()).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn vote_counts_and_oldest_removal() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        let column = ColumnId::new();
        let item = sample_item(retro.id, column, 0);
        let user = UserId::new();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        ItemStore::create(&store, item.clone()).await.unwrap();

        VoteStore::create(&store, retro.id, item.id, user).await.unwrap();
        VoteStore::create(&store, retro.id, item.id, user).await.unwrap();
        assert_eq!(
            VoteStore::count_by_user_on_item(&store, item.id, user).await.unwrap(),
            2
        );
        assert_eq!(
            VoteStore::count_by_user_in_retro(&store, retro.id, user).await.unwrap(),
            2
        );

        VoteStore::delete_oldest_for_user(&store, item.id, user).await.unwrap();
        assert_eq!(
            VoteStore::count_by_user_on_item(&store, item.id, user).await.unwrap(),
            1
        );

        let listed = ItemStore::list_by_retro(&store, retro.id).await.unwrap();
        assert_eq!(listed[0].vote_count, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_grouped_children_and_votes() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        let column = ColumnId::new();
        let parent = sample_item(retro.id, column, 0);
        let mut child = sample_item(retro.id, column, 1);
        child.group_id = Some(parent.id);
        let user = UserId::new();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        ItemStore::create(&store, parent.clone()).await.unwrap();
        ItemStore::create(&store, child.clone()).await.unwrap();
        VoteStore::create(&store, retro.id, child.id, user).await.unwrap();

        let removed = ItemStore::delete(&store, parent.id).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&child.id));
        assert_eq!(
            VoteStore::count_by_user_in_retro(&store, retro.id, user).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn next_position_is_max_plus_one_per_column() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        let column = ColumnId::new();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        assert_eq!(
            ItemStore::next_position(&store, retro.id, column).await.unwrap(),
            0
        );
        ItemStore::create(&store, sample_item(retro.id, column, 0)).await.unwrap();
        ItemStore::create(&store, sample_item(retro.id, column, 1)).await.unwrap();
        assert_eq!(
            ItemStore::next_position(&store, retro.id, column).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn roti_aggregate_distribution() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        RotiStore::upsert_vote(&store, retro.id, UserId::new(), 4).await.unwrap();
        RotiStore::upsert_vote(&store, retro.id, UserId::new(), 5).await.unwrap();
        RotiStore::upsert_vote(&store, retro.id, UserId::new(), 4).await.unwrap();

        let results = RotiStore::results(&store, retro.id).await.unwrap();
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.distribution, [0, 0, 0, 2, 1]);
        assert!((results.average - 13.0 / 3.0).abs() < 1e-9);
        assert!(!results.revealed);

        RotiStore::reveal(&store, retro.id).await.unwrap();
        assert!(RotiStore::results(&store, retro.id).await.unwrap().revealed);
    }

    #[tokio::test]
    async fn roti_upsert_replaces_rating() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        let user = UserId::new();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        RotiStore::upsert_vote(&store, retro.id, user, 2).await.unwrap();
        RotiStore::upsert_vote(&store, retro.id, user, 5).await.unwrap();
        let results = RotiStore::results(&store, retro.id).await.unwrap();
        assert_eq!(results.total_votes, 1);
        assert_eq!(results.distribution, [0, 0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn topic_history_current_and_order() {
        let store = MemoryStore::new();
        let retro = sample_retro();
        RetroStore::create(&store, retro.clone()).await.unwrap();
        assert_eq!(
            TopicHistoryStore::next_order(&store, retro.id).await.unwrap(),
            1
        );

        let topic = ItemId::new();
        let row = TopicHistory {
            id: TopicHistoryId::new(),
            retro_id: retro.id,
            item_id: topic,
            order: 1,
            started_at: Utc::now(),
            ended_at: None,
            total_discussion_seconds: 0,
            extension_count: 0,
        };
        TopicHistoryStore::create(&store, row.clone()).await.unwrap();

        let current = TopicHistoryStore::find_current(&store, retro.id).await.unwrap();
        assert_eq!(current.map(|h| h.item_id), Some(topic));

        TopicHistoryStore::update(&store, row.id, 300, 1, Some(Utc::now()))
            .await
            .unwrap();
        assert!(
            TopicHistoryStore::find_current(&store, retro.id)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            TopicHistoryStore::next_order(&store, retro.id).await.unwrap(),
            2
        );
    }
}
