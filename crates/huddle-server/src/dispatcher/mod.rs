//! The command dispatcher.
//!
//! Every inbound command runs the same shape: **gate** (room membership,
//! phase, facilitator), **validate** (payload and domain limits),
//! **apply** (durable store mutation), **broadcast** (via the cluster
//! bridge). Failures turn into a targeted `error` frame to the origin
//! client only — never a misleading success broadcast.

mod actions;
mod discuss;
mod items;
mod phase;
mod presence;
mod social;
mod timer;
mod votes;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use huddle_cluster::ClusterBridge;
use huddle_core::{
    ClientCommand, ConnectionId, ErrorCode, Phase, Retro, RetroId, ServerFrame, UserId,
};
use huddle_hub::{HubError, HubHandle};
use huddle_session::{SessionError, SessionHandle, SessionRegistry};
use huddle_store::{Store, StoreError};
use tracing::{debug, warn};

/// Per-connection dispatch context, owned by the connection's read pump.
#[derive(Debug)]
pub struct ClientCtx {
    /// This connection.
    pub conn_id: ConnectionId,
    /// Authenticated user.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
    /// Room this connection is attached to, if any.
    pub room: Option<RetroId>,
}

/// A handler failure, rendered as an `error` frame to the origin client.
#[derive(Debug)]
pub(crate) struct CommandError {
    pub(crate) code: ErrorCode,
    pub(crate) message: String,
}

impl CommandError {
    pub(crate) fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub(crate) fn phase_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PhaseInvalid, message)
    }

    pub(crate) fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPayload, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            Self::not_found(err.to_string())
        } else {
            warn!(error = %err, "Store failure in handler");
            Self::internal("internal error")
        }
    }
}

impl From<HubError> for CommandError {
    fn from(err: HubError) -> Self {
        warn!(error = %err, "Hub failure in handler");
        Self::internal("internal error")
    }
}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        Self::phase_invalid(err.to_string())
    }
}

pub(crate) type CommandResult = Result<(), CommandError>;

/// Maps inbound commands to their handlers.
pub struct Dispatcher {
    pub(crate) store: Store,
    pub(crate) hub: HubHandle,
    pub(crate) bridge: Arc<ClusterBridge>,
    pub(crate) sessions: Arc<SessionRegistry>,
    command_deadline: Duration,
}

impl Dispatcher {
    /// Build a dispatcher over the engine's shared parts.
    #[must_use]
    pub fn new(
        store: Store,
        hub: HubHandle,
        bridge: Arc<ClusterBridge>,
        sessions: Arc<SessionRegistry>,
        command_deadline: Duration,
    ) -> Self {
        Self { store, hub, bridge, sessions, command_deadline }
    }

    /// Run one command to completion, converting failures, deadline
    /// overruns, and handler panics into a targeted `error` frame.
    pub async fn dispatch(&self, ctx: &mut ClientCtx, cmd: ClientCommand) {
        let conn_id = ctx.conn_id;
        let outcome =
            AssertUnwindSafe(tokio::time::timeout(self.command_deadline, self.handle(ctx, cmd)))
                .catch_unwind()
                .await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(CommandError::internal("deadline exceeded")),
            Err(_panic) => {
                warn!(conn_id = %conn_id, "Handler panicked; converted to internal error");
                Err(CommandError::internal("internal error"))
            },
        };
        if let Err(err) = result {
            debug!(
                conn_id = %ctx.conn_id,
                code = ?err.code,
                message = %err.message,
                "Command rejected"
            );
            let frame = ServerFrame::error(err.code, err.message);
            if let Err(e) = self.hub.send_to(ctx.conn_id, frame).await {
                warn!(conn_id = %ctx.conn_id, error = %e, "Failed to deliver error frame");
            }
        }
    }

    async fn handle(&self, ctx: &mut ClientCtx, cmd: ClientCommand) -> CommandResult {
        match cmd {
            ClientCommand::JoinRetro { retro_id } => self.join_retro(ctx, retro_id).await,
            ClientCommand::LeaveRetro => self.leave_retro(ctx).await,
            ClientCommand::Heartbeat => Ok(()),
            ClientCommand::ItemCreate { column_id, content } => {
                self.item_create(ctx, column_id, content).await
            },
            ClientCommand::ItemUpdate { item_id, content } => {
                self.item_update(ctx, item_id, content).await
            },
            ClientCommand::ItemDelete { item_id } => self.item_delete(ctx, item_id).await,
            ClientCommand::ItemGroup { parent_id, child_ids } => {
                self.item_group(ctx, parent_id, child_ids).await
            },
            ClientCommand::VoteAdd { item_id } => self.vote_add(ctx, item_id).await,
            ClientCommand::VoteRemove { item_id } => self.vote_remove(ctx, item_id).await,
            ClientCommand::TimerStart { duration_seconds } => {
                self.timer_start(ctx, duration_seconds).await
            },
            ClientCommand::TimerPause => self.timer_pause(ctx).await,
            ClientCommand::TimerResume => self.timer_resume(ctx).await,
            ClientCommand::TimerAddTime { seconds } => self.timer_add_time(ctx, seconds).await,
            ClientCommand::TimerReset => self.timer_reset(ctx).await,
            ClientCommand::PhaseNext => self.phase_next(ctx).await,
            ClientCommand::PhaseSet { phase } => self.phase_set(ctx, phase).await,
            ClientCommand::ActionCreate { title, assignee_id, item_id, due_date, priority } => {
                self.action_create(ctx, title, assignee_id, item_id, due_date, priority)
                    .await
            },
            ClientCommand::ActionUpdate { action_id, title, assignee_id, due_date, priority } => {
                self.action_update(ctx, action_id, title, assignee_id, due_date, priority)
                    .await
            },
            ClientCommand::ActionComplete { action_id } => {
                self.action_set_completed(ctx, action_id, true).await
            },
            ClientCommand::ActionUncomplete { action_id } => {
                self.action_set_completed(ctx, action_id, false).await
            },
            ClientCommand::ActionDelete { action_id } => self.action_delete(ctx, action_id).await,
            ClientCommand::RetroEnd => self.retro_end(ctx).await,
            ClientCommand::MoodSet { mood } => self.mood_set(ctx, mood).await,
            ClientCommand::RotiVote { rating } => self.roti_vote(ctx, rating).await,
            ClientCommand::RotiReveal => self.roti_reveal(ctx).await,
            ClientCommand::DraftTyping { column_id, content_length } => {
                self.draft_typing(ctx, column_id, content_length).await
            },
            ClientCommand::DraftClear { column_id } => self.draft_clear(ctx, column_id).await,
            ClientCommand::FacilitatorClaim => self.facilitator_claim(ctx).await,
            ClientCommand::FacilitatorTransfer { user_id } => {
                self.facilitator_transfer(ctx, user_id).await
            },
            ClientCommand::DiscussSetItem { item_id } => self.discuss_set_item(ctx, item_id).await,
            ClientCommand::DiscussExtend { seconds } => self.discuss_extend(ctx, seconds).await,
        }
    }

    // -----------------------------------------------------------------
    // Shared gates and helpers
    // -----------------------------------------------------------------

    /// In-room gate.
    pub(crate) fn require_room(ctx: &ClientCtx) -> Result<RetroId, CommandError> {
        ctx.room
            .ok_or_else(|| CommandError::forbidden("not in a room"))
    }

    pub(crate) async fn load_retro(&self, room: RetroId) -> Result<Retro, CommandError> {
        Ok(self.store.retros.get_by_id(room).await?)
    }

    /// Fetch the session mirror, reconstructing it from the store when
    /// this replica has not touched the session yet.
    pub(crate) async fn session_handle(&self, room: RetroId) -> Result<SessionHandle, CommandError> {
        if let Some(handle) = self.sessions.get(room) {
            return Ok(handle);
        }
        let retro = self.load_retro(room).await?;
        Ok(self.sessions.get_or_load(&retro))
    }

    /// Phase gate against the session mirror.
    pub(crate) async fn require_phase(
        &self,
        room: RetroId,
        expected: Phase,
    ) -> Result<SessionHandle, CommandError> {
        let handle = self.session_handle(room).await?;
        let phase = handle.lock().await.phase;
        if phase == expected {
            Ok(handle)
        } else {
            Err(CommandError::phase_invalid(format!(
                "not allowed in phase {phase}"
            )))
        }
    }

    /// Persist the current timer state of a session.
    pub(crate) async fn persist_timer(
        &self,
        room: RetroId,
        timer: &huddle_session::TimerState,
    ) -> Result<(), CommandError> {
        let columns = timer.to_columns(Utc::now());
        Ok(self.store.retros.update_timer(room, columns).await?)
    }

    /// Recompute and broadcast the waiting-phase roster.
    pub(crate) async fn broadcast_team_members(
        &self,
        room: RetroId,
        team: huddle_core::TeamId,
    ) -> Result<(), CommandError> {
        let roster = crate::snapshot::team_member_statuses(
            &self.store,
            &self.bridge,
            room,
            team,
        )
        .await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::TeamMembersUpdated { team_members: roster })
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Out-of-band events (hub grace timers, timer scheduler)
    // -----------------------------------------------------------------

    /// Post-leave callback: a user's grace period elapsed locally.
    ///
    /// Announces the leave only when no other replica still holds the
    /// user, then refreshes the waiting-phase roster.
    pub async fn handle_user_left(&self, room: RetroId, user: UserId) {
        if self.bridge.is_user_in_room(room, user).await {
            debug!(room = %room, user_id = %user, "User still present on a peer replica");
            return;
        }
        self.bridge
            .broadcast_to_room(room, &ServerFrame::ParticipantLeft { user_id: user })
            .await;
        self.bridge.publish_presence_leave(room, user).await;

        match self.session_handle(room).await {
            Ok(handle) => {
                let (phase, team) = {
                    let state = handle.lock().await;
                    (state.phase, state.team_id)
                };
                if phase == Phase::Waiting {
                    if let Err(e) = self.broadcast_team_members(room, team).await {
                        warn!(room = %room, code = ?e.code, "Roster refresh after leave failed");
                    }
                }
            },
            Err(e) => {
                debug!(room = %room, code = ?e.code, "No session for leave follow-up");
            },
        }
    }

    /// Timer scheduler callback: a session timer hit its deadline.
    pub async fn handle_timer_expired(&self, room: RetroId) {
        if let Err(e) = self
            .store
            .retros
            .update_timer(room, huddle_store::TimerColumns::default())
            .await
        {
            warn!(room = %room, error = %e, "Failed to persist expired timer");
        }
        self.bridge
            .broadcast_to_room(room, &ServerFrame::TimerExpired {})
            .await;
    }
}
