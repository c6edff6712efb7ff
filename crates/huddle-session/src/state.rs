//! In-memory session state: phase, facilitator, timer, and the Lean
//! Coffee discussion sub-state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use huddle_core::{
    ItemId, LcDiscussionState, Phase, Retro, RetroItem, RetroId, SessionKind, TeamId, TemplateId,
    UserId, VotingPolicy,
};
use huddle_store::TimerColumns;

use crate::error::{SessionError, SessionResult};
use crate::timer::TimerState;

/// Lean Coffee discussion sub-state.
#[derive(Debug, Clone, Default)]
pub struct LcState {
    /// Topics awaiting discussion, highest-voted first.
    pub queue: Vec<ItemId>,
    /// Topic currently under discussion.
    pub current: Option<ItemId>,
    /// When the current topic's discussion segment began. Closing the
    /// topic accumulates `now - current_since` into its history row.
    pub current_since: Option<DateTime<Utc>>,
    /// Topics already discussed.
    pub done: HashSet<ItemId>,
}

impl LcState {
    /// Rebuild the pending queue from the current item set.
    ///
    /// Orders by vote count descending, ties broken by creation time, and
    /// excludes the current and done topics. Grouped children never enter
    /// the queue; their parent represents them.
    pub fn rebuild_queue(&mut self, items: &[RetroItem]) {
        let mut topics: Vec<&RetroItem> = items
            .iter()
            .filter(|i| i.group_id.is_none())
            .filter(|i| Some(i.id) != self.current && !self.done.contains(&i.id))
            .collect();
        topics.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        self.queue = topics.into_iter().map(|i| i.id).collect();
    }

    /// Snapshot for the `retro_state` payload.
    #[must_use]
    pub fn snapshot(&self) -> LcDiscussionState {
        let mut done: Vec<ItemId> = self.done.iter().copied().collect();
        done.sort();
        LcDiscussionState {
            queue: self.queue.clone(),
            current: self.current,
            done,
        }
    }
}

/// Mode-specific session state.
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Classic retro; no extra sub-state.
    Retro,
    /// Lean Coffee with its discussion queue.
    LeanCoffee(LcState),
}

/// The in-memory mirror of one session's authoritative state.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Session id (room id).
    pub retro_id: RetroId,
    /// Owning team.
    pub team_id: TeamId,
    /// Template id.
    pub template_id: TemplateId,
    /// Session kind.
    pub kind: SessionKind,
    /// Current phase.
    pub phase: Phase,
    /// Current facilitator.
    pub facilitator: Option<UserId>,
    /// Voting limits.
    pub policy: VotingPolicy,
    /// Timer state machine.
    pub timer: TimerState,
    /// Guard for the one-shot attendance snapshot: set once the session
    /// has left the waiting phase.
    pub attendance_taken: bool,
    /// Mode-specific sub-state.
    pub mode: SessionMode,
}

impl SessionState {
    /// Reconstruct session state from a persisted row.
    #[must_use]
    pub fn from_retro(retro: &Retro, now: DateTime<Utc>) -> Self {
        let columns = TimerColumns {
            started_at: retro.timer_started_at,
            duration_seconds: retro.timer_duration_seconds,
            paused_at: retro.timer_paused_at,
            remaining_seconds: retro.timer_remaining_seconds,
        };
        let mode = match retro.kind {
            SessionKind::Retro => SessionMode::Retro,
            SessionKind::LeanCoffee => SessionMode::LeanCoffee(LcState::default()),
        };
        Self {
            retro_id: retro.id,
            team_id: retro.team_id,
            template_id: retro.template_id,
            kind: retro.kind,
            phase: retro.phase,
            facilitator: retro.facilitator_id,
            policy: retro.policy,
            timer: TimerState::from_columns(&columns, now),
            attendance_taken: retro.started_at.is_some(),
            mode,
        }
    }

    /// Whether `user` is the current facilitator.
    #[must_use]
    pub fn is_facilitator(&self, user: UserId) -> bool {
        self.facilitator == Some(user)
    }

    /// Advance to the next phase in the kind's sequence.
    ///
    /// Returns `(previous, current)`.
    pub fn advance_phase(&mut self) -> SessionResult<(Phase, Phase)> {
        let next = self
            .phase
            .next(self.kind)
            .ok_or(SessionError::PhaseTerminal)?;
        let previous = self.phase;
        self.phase = next;
        Ok((previous, next))
    }

    /// Jump to an explicit phase within the kind's sequence.
    ///
    /// Returns `(previous, current)`.
    pub fn set_phase(&mut self, target: Phase) -> SessionResult<(Phase, Phase)> {
        if !target.is_valid_for(self.kind) {
            return Err(SessionError::InvalidPhase(target));
        }
        if self.phase == Phase::Ended {
            return Err(SessionError::PhaseTerminal);
        }
        let previous = self.phase;
        self.phase = target;
        Ok((previous, target))
    }

    /// The Lean Coffee sub-state, when this is an LC session.
    #[must_use]
    pub fn lc_state(&self) -> Option<&LcState> {
        match &self.mode {
            SessionMode::LeanCoffee(lc) => Some(lc),
            SessionMode::Retro => None,
        }
    }

    /// Mutable access to the Lean Coffee sub-state.
    pub fn lc_state_mut(&mut self) -> Option<&mut LcState> {
        match &mut self.mode {
            SessionMode::LeanCoffee(lc) => Some(lc),
            SessionMode::Retro => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use huddle_core::{ColumnId, RetroStatus};

    fn lc_retro() -> Retro {
        Retro {
            id: RetroId::new(),
            team_id: TeamId::new(),
            template_id: TemplateId::new(),
            kind: SessionKind::LeanCoffee,
            name: "lc".into(),
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

    fn topic(retro: RetroId, votes: u32, created: DateTime<Utc>) -> RetroItem {
        RetroItem {
            id: ItemId::new(),
            retro_id: retro,
            column_id: ColumnId::new(),
            author_id: UserId::new(),
            content: "topic".into(),
            position: 0,
            group_id: None,
            vote_count: votes,
            created_at: created,
        }
    }

    #[test]
    fn queue_orders_by_votes_then_creation() {
        let retro = RetroId::new();
        let now = Utc::now();
        let a = topic(retro, 2, now);
        let b = topic(retro, 5, now + Duration::seconds(1));
        let c = topic(retro, 2, now - Duration::seconds(1));
        let mut lc = LcState::default();
        lc.rebuild_queue(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(lc.queue, vec![b.id, c.id, a.id]);
    }

    #[test]
    fn queue_excludes_current_done_and_grouped() {
        let retro = RetroId::new();
        let now = Utc::now();
        let a = topic(retro, 3, now);
        let b = topic(retro, 2, now);
        let mut child = topic(retro, 9, now);
        child.group_id = Some(a.id);
        let mut lc = LcState::default();
        lc.current = Some(a.id);
        lc.done.insert(b.id);
        lc.rebuild_queue(&[a.clone(), b.clone(), child]);
        assert!(lc.queue.is_empty());
    }

    #[test]
    fn phase_set_rejects_foreign_phase() {
        let mut state = SessionState::from_retro(&lc_retro(), Utc::now());
        assert!(matches!(
            state.set_phase(Phase::Action),
            Err(SessionError::InvalidPhase(Phase::Action))
        ));
    }

    #[test]
    fn phase_advance_stops_at_ended() {
        let mut state = SessionState::from_retro(&lc_retro(), Utc::now());
        while state.phase != Phase::Ended {
            state.advance_phase().unwrap();
        }
        assert!(matches!(
            state.advance_phase(),
            Err(SessionError::PhaseTerminal)
        ));
    }

    #[test]
    fn reconstruction_marks_attendance_taken() {
        let mut retro = lc_retro();
        retro.started_at = Some(Utc::now());
        retro.phase = Phase::Vote;
        let state = SessionState::from_retro(&retro, Utc::now());
        assert!(state.attendance_taken);
        assert_eq!(state.phase, Phase::Vote);
    }
}
