//! Phase transitions, the attendance snapshot, timer auto-start, and
//! session end.

use chrono::Utc;
use huddle_core::{Attendee, Phase, Retro, RetroId, RetroStatus, ServerFrame, TeamId};
use huddle_store::StoreError;
use tracing::{debug, info, warn};

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

impl Dispatcher {
    /// `phase_next`: advance along the session kind's sequence.
    pub(super) async fn phase_next(&self, ctx: &ClientCtx) -> CommandResult {
        self.change_phase(ctx, None).await
    }

    /// `phase_set`: jump to an explicit phase within the sequence.
    pub(super) async fn phase_set(&self, ctx: &ClientCtx, target: Phase) -> CommandResult {
        self.change_phase(ctx, Some(target)).await
    }

    /// `retro_end`: close the session from any phase.
    pub(super) async fn retro_end(&self, ctx: &ClientCtx) -> CommandResult {
        self.change_phase(ctx, Some(Phase::Ended)).await
    }

    /// The single phase-transition path.
    ///
    /// Holds the session lock for the whole mutation so two concurrent
    /// transitions can never observe the same "previous" phase.
    async fn change_phase(&self, ctx: &ClientCtx, target: Option<Phase>) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.session_handle(room).await?;
        let mut state = handle.lock().await;
        if !state.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may change phase"));
        }

        let (previous, current) = match target {
            Some(phase) => state.set_phase(phase)?,
            None => state.advance_phase()?,
        };
        info!(room = %room, %previous, %current, "Phase changed");

        // Leaving the lobby: the one-shot attendance snapshot (everyone in
        // the merged room right now counts as attending).
        if previous == Phase::Waiting && !state.attendance_taken {
            self.record_attendance(room, state.team_id).await?;
            state.attendance_taken = true;
        }

        let now = Utc::now();
        let mut retro = self.load_retro(room).await?;
        retro.phase = current;
        if previous == Phase::Waiting && retro.started_at.is_none() {
            retro.started_at = Some(now);
        }
        if current == Phase::Ended {
            retro.ended_at = Some(now);
            retro.status = RetroStatus::Ended;
        }
        self.store.retros.update(&retro).await?;

        // Entering discussion on a Lean Coffee board seeds the topic queue
        // from the vote results.
        if current == Phase::Discuss {
            let items = self.store.items.list_by_retro(room).await?;
            if let Some(lc) = state.lc_state_mut() {
                lc.rebuild_queue(&items);
            }
        }

        self.bridge
            .broadcast_to_room(room, &ServerFrame::PhaseChanged { previous, current })
            .await;

        if current == Phase::Ended {
            state.timer.reset();
            let timer = state.timer;
            drop(state);
            self.persist_timer(room, &timer).await?;
            self.broadcast_retro_ended(room, retro).await?;
            return Ok(());
        }

        // Timer auto-start for phases the template binds a duration to.
        let template_id = state.template_id;
        let configured = match self.store.templates.get_by_id(template_id).await {
            Ok(template) => template.phase_timers.get(&current).copied().filter(|d| *d > 0),
            Err(StoreError::NotFound(_)) => {
                debug!(room = %room, "No template; skipping timer auto-start");
                None
            },
            Err(e) => return Err(e.into()),
        };
        if let Some(duration_seconds) = configured {
            let started_at = Utc::now();
            let ends_at = state.timer.start(started_at, duration_seconds);
            let timer = state.timer;
            drop(state);
            self.persist_timer(room, &timer).await?;
            self.bridge
                .broadcast_to_room(
                    room,
                    &ServerFrame::TimerStarted { started_at, duration_seconds, ends_at },
                )
                .await;
        }
        Ok(())
    }

    async fn record_attendance(&self, room: RetroId, team: TeamId) -> Result<(), CommandError> {
        let members = self.store.team_members.list_by_team(team).await?;
        let present = self.bridge.room_participants(room).await;
        let attendees: Vec<Attendee> = members
            .iter()
            .map(|member| Attendee {
                user_id: member.user_id,
                attended: present.iter().any(|p| p.user_id == member.user_id),
            })
            .collect();
        info!(
            room = %room,
            total = attendees.len(),
            present = attendees.iter().filter(|a| a.attended).count(),
            "Attendance recorded"
        );
        self.store.attendees.record_batch(room, &attendees).await?;
        Ok(())
    }

    async fn broadcast_retro_ended(&self, room: RetroId, retro: Retro) -> Result<(), CommandError> {
        let items = self.store.items.list_by_retro(room).await?;
        let actions = self.store.actions.list_by_retro(room).await?;
        let roti_results = match self.store.roti.results(room).await {
            Ok(results) => results,
            Err(e) => {
                warn!(room = %room, error = %e, "ROTI fetch for final snapshot failed");
                huddle_core::RotiResults::empty()
            },
        };
        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::RetroEnded { retro, items, actions, roti_results },
            )
            .await;
        Ok(())
    }
}
