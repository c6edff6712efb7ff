//! Item commands: create, update, delete, group.

use chrono::Utc;
use huddle_core::{ColumnId, ItemId, Phase, RetroItem, ServerFrame};

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

/// Longest accepted item text.
const MAX_ITEM_CONTENT_LEN: usize = 2000;

impl Dispatcher {
    /// `item_create`: brainstorm phase; author is the sender.
    pub(super) async fn item_create(
        &self,
        ctx: &ClientCtx,
        column_id: ColumnId,
        content: String,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Brainstorm).await?;
        let content = validate_content(content)?;

        let position = self.store.items.next_position(room, column_id).await?;
        let item = RetroItem {
            id: ItemId::new(),
            retro_id: room,
            column_id,
            author_id: ctx.user_id,
            content,
            position,
            group_id: None,
            vote_count: 0,
            created_at: Utc::now(),
        };
        let item = self.store.items.create(item).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ItemCreated(item))
            .await;
        Ok(())
    }

    /// `item_update`: brainstorm phase, author only.
    pub(super) async fn item_update(
        &self,
        ctx: &ClientCtx,
        item_id: ItemId,
        content: String,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Brainstorm).await?;
        let content = validate_content(content)?;

        let mut item = self.owned_item(ctx, room, item_id).await?;
        item.content = content;
        self.store.items.update(&item).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ItemUpdated(item))
            .await;
        Ok(())
    }

    /// `item_delete`: brainstorm phase, author only; cascades to grouped
    /// children.
    pub(super) async fn item_delete(&self, ctx: &ClientCtx, item_id: ItemId) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Brainstorm).await?;
        self.owned_item(ctx, room, item_id).await?;

        let removed = self.store.items.delete(item_id).await?;
        for id in removed {
            self.bridge
                .broadcast_to_room(room, &ServerFrame::ItemDeleted { item_id: id })
                .await;
        }
        Ok(())
    }

    /// `item_group`: group phase, facilitator only. Re-parents the
    /// children AND any grandchildren onto the new root (the group
    /// relation stays a flat forest).
    pub(super) async fn item_group(
        &self,
        ctx: &ClientCtx,
        parent_id: ItemId,
        child_ids: Vec<ItemId>,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Group).await?;
        if !handle.lock().await.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may group items"));
        }
        if child_ids.is_empty() {
            return Err(CommandError::invalid_payload("no children to group"));
        }
        if child_ids.contains(&parent_id) {
            return Err(CommandError::invalid_payload("an item cannot be its own parent"));
        }

        let parent = self.store.items.get_by_id(parent_id).await?;
        if parent.retro_id != room {
            return Err(CommandError::not_found("parent item not in this retro"));
        }

        let all = self.store.items.list_by_retro(room).await?;
        let mut affected: Vec<ItemId> = Vec::new();
        for child_id in &child_ids {
            if !all.iter().any(|i| i.id == *child_id) {
                return Err(CommandError::not_found(format!("item {child_id}")));
            }
            if !affected.contains(child_id) {
                affected.push(*child_id);
            }
            // Flatten: anything grouped under the child moves to the new
            // root alongside it.
            for grandchild in all.iter().filter(|i| i.group_id == Some(*child_id)) {
                if grandchild.id != parent_id && !affected.contains(&grandchild.id) {
                    affected.push(grandchild.id);
                }
            }
        }

        // The new root never keeps a stale parent of its own.
        if parent.group_id.is_some() {
            self.store.items.reparent(parent_id, None).await?;
        }
        self.store.items.reparent_batch(parent_id, &affected).await?;

        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::ItemsGrouped { parent_id, affected_child_ids: affected },
            )
            .await;
        Ok(())
    }

    /// Fetch an item, checking room ownership and authorship.
    async fn owned_item(
        &self,
        ctx: &ClientCtx,
        room: huddle_core::RetroId,
        item_id: ItemId,
    ) -> Result<RetroItem, CommandError> {
        let item = self.store.items.get_by_id(item_id).await?;
        if item.retro_id != room {
            return Err(CommandError::not_found("item not in this retro"));
        }
        if item.author_id != ctx.user_id {
            return Err(CommandError::forbidden("only the author may edit an item"));
        }
        Ok(item)
    }
}

fn validate_content(content: String) -> Result<String, CommandError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CommandError::invalid_payload("content must not be empty"));
    }
    if trimmed.len() > MAX_ITEM_CONTENT_LEN {
        return Err(CommandError::invalid_payload("content too long"));
    }
    Ok(trimmed.to_string())
}
