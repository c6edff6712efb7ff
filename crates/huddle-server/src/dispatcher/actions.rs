//! Action item commands.

use chrono::{DateTime, Utc};
use huddle_core::{ActionId, ActionPriority, ItemId, RetroAction, ServerFrame, UserId};
use tracing::warn;

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

/// Longest accepted action title.
const MAX_ACTION_TITLE_LEN: usize = 500;

impl Dispatcher {
    /// `action_create`: any phase while in the room.
    ///
    /// A malformed `assigneeId`/`itemId` is dropped with a warning rather
    /// than failing the command.
    pub(super) async fn action_create(
        &self,
        ctx: &ClientCtx,
        title: String,
        assignee_id: Option<serde_json::Value>,
        item_id: Option<serde_json::Value>,
        due_date: Option<DateTime<Utc>>,
        priority: Option<ActionPriority>,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let title = validate_title(title)?;

        let assignee_id = lenient_id::<UserId>(assignee_id, "assigneeId");
        let item_id = lenient_id::<ItemId>(item_id, "itemId");

        let action = RetroAction {
            id: ActionId::new(),
            retro_id: room,
            title,
            assignee_id,
            item_id,
            due_date,
            priority,
            completed_at: None,
            created_at: Utc::now(),
        };
        let action = self.store.actions.create(action).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ActionCreated(action))
            .await;
        Ok(())
    }

    /// `action_update`: overwrite the provided fields.
    pub(super) async fn action_update(
        &self,
        ctx: &ClientCtx,
        action_id: ActionId,
        title: Option<String>,
        assignee_id: Option<UserId>,
        due_date: Option<DateTime<Utc>>,
        priority: Option<ActionPriority>,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let mut action = self.room_action(room, action_id).await?;
        if let Some(title) = title {
            action.title = validate_title(title)?;
        }
        if assignee_id.is_some() {
            action.assignee_id = assignee_id;
        }
        if due_date.is_some() {
            action.due_date = due_date;
        }
        if priority.is_some() {
            action.priority = priority;
        }
        self.store.actions.update(&action).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ActionUpdated(action))
            .await;
        Ok(())
    }

    /// `action_complete` / `action_uncomplete`: toggle `completed_at`.
    pub(super) async fn action_set_completed(
        &self,
        ctx: &ClientCtx,
        action_id: ActionId,
        completed: bool,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let mut action = self.room_action(room, action_id).await?;
        action.completed_at = completed.then(Utc::now);
        self.store.actions.update(&action).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ActionUpdated(action))
            .await;
        Ok(())
    }

    /// `action_delete`.
    pub(super) async fn action_delete(&self, ctx: &ClientCtx, action_id: ActionId) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.room_action(room, action_id).await?;
        self.store.actions.delete(action_id).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ActionDeleted { action_id })
            .await;
        Ok(())
    }

    async fn room_action(
        &self,
        room: huddle_core::RetroId,
        action_id: ActionId,
    ) -> Result<RetroAction, CommandError> {
        let action = self.store.actions.get_by_id(action_id).await?;
        if action.retro_id != room {
            return Err(CommandError::not_found("action not in this retro"));
        }
        Ok(action)
    }
}

/// Decode an optional id leniently: a value that fails to parse is
/// dropped, not fatal.
fn lenient_id<T: serde::de::DeserializeOwned>(
    value: Option<serde_json::Value>,
    field: &str,
) -> Option<T> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(field, error = %e, "Dropping malformed id field on action");
            None
        },
    }
}

fn validate_title(title: String) -> Result<String, CommandError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CommandError::invalid_payload("title must not be empty"));
    }
    if trimmed.len() > MAX_ACTION_TITLE_LEN {
        return Err(CommandError::invalid_payload("title too long"));
    }
    Ok(trimmed.to_string())
}
