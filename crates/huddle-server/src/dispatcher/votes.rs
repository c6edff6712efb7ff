//! Voting commands, enforcing the per-user and per-item caps.

use huddle_core::{ErrorCode, ItemId, Phase, ServerFrame, VoteAction};
use huddle_store::StoreError;

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

impl Dispatcher {
    /// `vote_add`: vote phase; rejects past either cap with a typed error
    /// and no store write.
    pub(super) async fn vote_add(&self, ctx: &ClientCtx, item_id: ItemId) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Vote).await?;
        let policy = handle.lock().await.policy;

        let item = self.store.items.get_by_id(item_id).await?;
        if item.retro_id != room {
            return Err(CommandError::not_found("item not in this retro"));
        }

        let user_total = self
            .store
            .votes
            .count_by_user_in_retro(room, ctx.user_id)
            .await?;
        if user_total >= policy.max_per_user {
            return Err(CommandError::new(
                ErrorCode::VoteLimitReached,
                format!("vote limit of {} reached", policy.max_per_user),
            ));
        }
        let on_item = self
            .store
            .votes
            .count_by_user_on_item(item_id, ctx.user_id)
            .await?;
        if on_item >= policy.max_per_item {
            return Err(CommandError::new(
                ErrorCode::ItemVoteLimitReached,
                format!("item vote limit of {} reached", policy.max_per_item),
            ));
        }

        self.store.votes.create(room, item_id, ctx.user_id).await?;
        let user_vote_count = self
            .store
            .votes
            .count_by_user_in_retro(room, ctx.user_id)
            .await?;

        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::VoteUpdated {
                    item_id,
                    action: VoteAction::Add,
                    user_id: ctx.user_id,
                    user_vote_count,
                },
            )
            .await;
        Ok(())
    }

    /// `vote_remove`: vote phase; removes the caller's oldest vote on the
    /// item.
    pub(super) async fn vote_remove(&self, ctx: &ClientCtx, item_id: ItemId) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Vote).await?;
        let policy = handle.lock().await.policy;
        if !policy.allow_change {
            return Err(CommandError::forbidden("votes cannot be changed in this retro"));
        }

        match self
            .store
            .votes
            .delete_oldest_for_user(item_id, ctx.user_id)
            .await
        {
            Ok(()) => {},
            Err(StoreError::NotFound(_)) => {
                return Err(CommandError::not_found("no vote to remove"));
            },
            Err(e) => return Err(e.into()),
        }
        let user_vote_count = self
            .store
            .votes
            .count_by_user_in_retro(room, ctx.user_id)
            .await?;

        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::VoteUpdated {
                    item_id,
                    action: VoteAction::Remove,
                    user_id: ctx.user_id,
                    user_vote_count,
                },
            )
            .await;
        Ok(())
    }
}
