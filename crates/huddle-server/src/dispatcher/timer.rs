//! Timer commands. All of them require the facilitator: the timer is
//! shared session state, not a personal stopwatch.

use chrono::Utc;
use huddle_core::{RetroId, ServerFrame};
use huddle_session::SessionHandle;

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

impl Dispatcher {
    pub(super) async fn timer_start(&self, ctx: &ClientCtx, duration_seconds: u32) -> CommandResult {
        if duration_seconds == 0 {
            return Err(CommandError::invalid_payload("duration must be positive"));
        }
        let (room, handle) = self.timer_gate(ctx).await?;
        let mut state = handle.lock().await;
        let now = Utc::now();
        let ends_at = state.timer.start(now, duration_seconds);
        let timer = state.timer;
        drop(state);

        self.persist_timer(room, &timer).await?;
        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::TimerStarted { started_at: now, duration_seconds, ends_at },
            )
            .await;
        Ok(())
    }

    pub(super) async fn timer_pause(&self, ctx: &ClientCtx) -> CommandResult {
        let (room, handle) = self.timer_gate(ctx).await?;
        let mut state = handle.lock().await;
        let remaining_seconds = state.timer.pause(Utc::now())?;
        let timer = state.timer;
        drop(state);

        self.persist_timer(room, &timer).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::TimerPaused { remaining_seconds })
            .await;
        Ok(())
    }

    pub(super) async fn timer_resume(&self, ctx: &ClientCtx) -> CommandResult {
        let (room, handle) = self.timer_gate(ctx).await?;
        let mut state = handle.lock().await;
        let (ends_at, duration_seconds) = state.timer.resume(Utc::now())?;
        let timer = state.timer;
        drop(state);

        self.persist_timer(room, &timer).await?;
        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::TimerResumed { ends_at, duration_seconds },
            )
            .await;
        Ok(())
    }

    pub(super) async fn timer_add_time(&self, ctx: &ClientCtx, seconds: u32) -> CommandResult {
        if seconds == 0 {
            return Err(CommandError::invalid_payload("seconds must be positive"));
        }
        let (room, handle) = self.timer_gate(ctx).await?;
        let mut state = handle.lock().await;
        let (ends_at, remaining_seconds) = state.timer.add_time(seconds)?;
        let timer = state.timer;
        drop(state);

        self.persist_timer(room, &timer).await?;
        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::TimerUpdated { ends_at, remaining_seconds },
            )
            .await;
        Ok(())
    }

    pub(super) async fn timer_reset(&self, ctx: &ClientCtx) -> CommandResult {
        let (room, handle) = self.timer_gate(ctx).await?;
        let mut state = handle.lock().await;
        state.timer.reset();
        let timer = state.timer;
        drop(state);

        self.persist_timer(room, &timer).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::TimerReset {})
            .await;
        Ok(())
    }

    /// Common gate: in-room and facilitator.
    async fn timer_gate(&self, ctx: &ClientCtx) -> Result<(RetroId, SessionHandle), CommandError> {
        let room = Self::require_room(ctx)?;
        let handle = self.session_handle(room).await?;
        if !handle.lock().await.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may drive the timer"));
        }
        Ok((room, handle))
    }
}
