//! Room membership, drafts relay, and facilitation commands.

use huddle_core::{ColumnId, ErrorCode, Phase, RetroId, ServerFrame, TeamRole, UserId};
use huddle_store::StoreError;
use tracing::{debug, info};

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};
use crate::snapshot;

impl Dispatcher {
    /// `join_retro`: attach to a room and send the authoritative snapshot.
    pub(super) async fn join_retro(&self, ctx: &mut ClientCtx, retro_id: RetroId) -> CommandResult {
        let retro = match self.store.retros.get_by_id(retro_id).await {
            Ok(retro) => retro,
            Err(StoreError::NotFound(_)) => {
                return Err(CommandError::new(ErrorCode::JoinFailed, "retro not found"));
            },
            Err(e) => return Err(e.into()),
        };

        // Merged presence BEFORE the join decides whether peers see a
        // participant_joined; a reload within grace must stay silent.
        let already_in_room = self.bridge.is_user_in_room(retro_id, ctx.user_id).await;

        self.hub.join(ctx.conn_id, retro_id).await?;
        ctx.room = Some(retro_id);

        let handle = self.sessions.get_or_load(&retro);
        let payload =
            snapshot::build(&self.store, &self.bridge, &handle, &retro, ctx.user_id).await?;
        self.hub
            .send_to(ctx.conn_id, ServerFrame::RetroState(Box::new(payload)))
            .await?;

        if !already_in_room {
            info!(room = %retro_id, user_id = %ctx.user_id, "Participant joined");
            self.bridge
                .broadcast_to_room_except(
                    retro_id,
                    &ServerFrame::ParticipantJoined {
                        user_id: ctx.user_id,
                        user_name: ctx.user_name.clone(),
                    },
                    Some(ctx.conn_id),
                )
                .await;
            self.bridge
                .publish_presence_join(retro_id, ctx.user_id, &ctx.user_name)
                .await;

            let phase = handle.lock().await.phase;
            if phase == Phase::Waiting {
                self.broadcast_team_members(retro_id, retro.team_id).await?;
            }
        } else {
            debug!(room = %retro_id, user_id = %ctx.user_id, "Rejoin within presence, staying silent");
        }
        Ok(())
    }

    /// `leave_retro`: detach; the leave is announced only once the grace
    /// period elapses without a rejoin (see `handle_user_left`).
    pub(super) async fn leave_retro(&self, ctx: &mut ClientCtx) -> CommandResult {
        Self::require_room(ctx)?;
        self.hub.leave(ctx.conn_id).await?;
        ctx.room = None;
        Ok(())
    }

    /// `draft_typing`: relay to the other participants only.
    pub(super) async fn draft_typing(
        &self,
        ctx: &ClientCtx,
        column_id: ColumnId,
        content_length: u32,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Brainstorm).await?;
        self.bridge
            .broadcast_to_room_except(
                room,
                &ServerFrame::DraftTyping { user_id: ctx.user_id, column_id, content_length },
                Some(ctx.conn_id),
            )
            .await;
        Ok(())
    }

    /// `draft_clear`: relay to the other participants only.
    pub(super) async fn draft_clear(&self, ctx: &ClientCtx, column_id: ColumnId) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Brainstorm).await?;
        self.bridge
            .broadcast_to_room_except(
                room,
                &ServerFrame::DraftClear { user_id: ctx.user_id, column_id },
                Some(ctx.conn_id),
            )
            .await;
        Ok(())
    }

    /// `facilitator_claim`: waiting phase, team admins only.
    pub(super) async fn facilitator_claim(&self, ctx: &ClientCtx) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Waiting).await?;

        let team = handle.lock().await.team_id;
        let member = match self
            .store
            .team_members
            .get_by_team_and_user(team, ctx.user_id)
            .await
        {
            Ok(member) => member,
            Err(StoreError::NotFound(_)) => {
                return Err(CommandError::forbidden("not a member of this team"));
            },
            Err(e) => return Err(e.into()),
        };
        if member.role != TeamRole::Admin {
            return Err(CommandError::forbidden("only team admins may claim facilitation"));
        }

        self.set_facilitator(room, &handle, ctx.user_id).await
    }

    /// `facilitator_transfer`: waiting phase, current facilitator only,
    /// target must be in the merged room.
    pub(super) async fn facilitator_transfer(
        &self,
        ctx: &ClientCtx,
        target: UserId,
    ) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Waiting).await?;
        if !handle.lock().await.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may transfer"));
        }
        if !self.bridge.is_user_in_room(room, target).await {
            return Err(CommandError::forbidden("target is not in the room"));
        }
        self.set_facilitator(room, &handle, target).await
    }

    async fn set_facilitator(
        &self,
        room: RetroId,
        handle: &huddle_session::SessionHandle,
        user: UserId,
    ) -> CommandResult {
        {
            let mut state = handle.lock().await;
            state.facilitator = Some(user);
        }
        let mut retro = self.load_retro(room).await?;
        retro.facilitator_id = Some(user);
        self.store.retros.update(&retro).await?;

        info!(room = %room, user_id = %user, "Facilitator changed");
        self.bridge
            .broadcast_to_room(room, &ServerFrame::FacilitatorChanged { user_id: user })
            .await;
        Ok(())
    }
}
