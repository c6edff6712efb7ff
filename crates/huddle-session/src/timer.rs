//! The session timer state machine.
//!
//! Single-valued per session: a start, resume, add or reset replaces the
//! state, never runs concurrently with it. All transitions take the
//! current wall-clock instant as an argument so they stay deterministic
//! under test.

use chrono::{DateTime, Duration, Utc};
use huddle_store::TimerColumns;

use crate::error::{SessionError, SessionResult};

/// Timer state for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No timer active.
    Idle,
    /// Counting down towards `ends_at`.
    Running {
        /// Deadline.
        ends_at: DateTime<Utc>,
        /// Duration the countdown was (re)started with.
        duration_seconds: u32,
    },
    /// Frozen with time left on the clock.
    Paused {
        /// Seconds remaining when paused.
        remaining_seconds: u32,
    },
}

impl TimerState {
    /// Start (or restart) the countdown. Always replaces the current state.
    pub fn start(&mut self, now: DateTime<Utc>, duration_seconds: u32) -> DateTime<Utc> {
        let ends_at = now + Duration::seconds(i64::from(duration_seconds));
        *self = Self::Running { ends_at, duration_seconds };
        ends_at
    }

    /// Pause a running countdown, returning the clamped remaining seconds.
    pub fn pause(&mut self, now: DateTime<Utc>) -> SessionResult<u32> {
        let Self::Running { ends_at, .. } = *self else {
            return Err(SessionError::TimerNotRunning);
        };
        let remaining = (ends_at - now).num_seconds().max(0);
        let remaining = u32::try_from(remaining).unwrap_or(0);
        *self = Self::Paused { remaining_seconds: remaining };
        Ok(remaining)
    }

    /// Resume a paused countdown, returning the new deadline and duration.
    pub fn resume(&mut self, now: DateTime<Utc>) -> SessionResult<(DateTime<Utc>, u32)> {
        let Self::Paused { remaining_seconds } = *self else {
            return Err(SessionError::TimerNotPaused);
        };
        let ends_at = now + Duration::seconds(i64::from(remaining_seconds));
        *self = Self::Running { ends_at, duration_seconds: remaining_seconds };
        Ok((ends_at, remaining_seconds))
    }

    /// Add time to a running or paused countdown.
    ///
    /// Returns the new deadline when running, or the new remaining seconds
    /// when paused.
    pub fn add_time(
        &mut self,
        seconds: u32,
    ) -> SessionResult<(Option<DateTime<Utc>>, Option<u32>)> {
        match self {
            Self::Running { ends_at, duration_seconds } => {
                *ends_at = *ends_at + Duration::seconds(i64::from(seconds));
                *duration_seconds = duration_seconds.saturating_add(seconds);
                Ok((Some(*ends_at), None))
            },
            Self::Paused { remaining_seconds } => {
                *remaining_seconds = remaining_seconds.saturating_add(seconds);
                Ok((None, Some(*remaining_seconds)))
            },
            Self::Idle => Err(SessionError::TimerIdle),
        }
    }

    /// Reset to idle.
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }

    /// Whether a running countdown has passed its deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Running { ends_at, .. } if *ends_at <= now)
    }

    /// The persisted representation of this state.
    #[must_use]
    pub fn to_columns(&self, now: DateTime<Utc>) -> TimerColumns {
        match *self {
            Self::Idle => TimerColumns::default(),
            Self::Running { ends_at, duration_seconds } => TimerColumns {
                started_at: Some(ends_at - Duration::seconds(i64::from(duration_seconds))),
                duration_seconds: Some(duration_seconds),
                paused_at: None,
                remaining_seconds: None,
            },
            Self::Paused { remaining_seconds } => TimerColumns {
                started_at: None,
                duration_seconds: None,
                paused_at: Some(now),
                remaining_seconds: Some(remaining_seconds),
            },
        }
    }

    /// Reconstruct timer state from persisted columns after a restart.
    ///
    /// A running timer whose deadline already passed while the process was
    /// down comes back as idle; the expiry broadcast was either already
    /// sent or is lost with the replica that owned it.
    #[must_use]
    pub fn from_columns(columns: &TimerColumns, now: DateTime<Utc>) -> Self {
        if let Some(remaining) = columns.remaining_seconds {
            if columns.paused_at.is_some() {
                return Self::Paused { remaining_seconds: remaining };
            }
        }
        if let (Some(started_at), Some(duration)) =
            (columns.started_at, columns.duration_seconds)
        {
            let ends_at = started_at + Duration::seconds(i64::from(duration));
            if ends_at > now {
                return Self::Running { ends_at, duration_seconds: duration };
            }
        }
        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_replaces_any_state() {
        let now = Utc::now();
        let mut timer = TimerState::Paused { remaining_seconds: 42 };
        let ends_at = timer.start(now, 300);
        assert_eq!(ends_at, now + Duration::seconds(300));
        assert_eq!(
            timer,
            TimerState::Running { ends_at, duration_seconds: 300 }
        );
    }

    #[test]
    fn pause_only_from_running() {
        let now = Utc::now();
        let mut timer = TimerState::Idle;
        assert!(matches!(
            timer.pause(now),
            Err(SessionError::TimerNotRunning)
        ));

        timer.start(now, 120);
        let remaining = timer.pause(now + Duration::seconds(50)).unwrap();
        assert_eq!(remaining, 70);
    }

    #[test]
    fn pause_clamps_remaining_to_zero() {
        let now = Utc::now();
        let mut timer = TimerState::Idle;
        timer.start(now, 10);
        let remaining = timer.pause(now + Duration::seconds(30)).unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn resume_only_from_paused() {
        let now = Utc::now();
        let mut timer = TimerState::Idle;
        assert!(matches!(
            timer.resume(now),
            Err(SessionError::TimerNotPaused)
        ));

        timer = TimerState::Paused { remaining_seconds: 90 };
        let (ends_at, duration) = timer.resume(now).unwrap();
        assert_eq!(duration, 90);
        assert_eq!(ends_at, now + Duration::seconds(90));
    }

    #[test]
    fn add_time_in_both_live_states() {
        let now = Utc::now();
        let mut timer = TimerState::Idle;
        assert!(matches!(timer.add_time(60), Err(SessionError::TimerIdle)));

        timer.start(now, 60);
        let (ends_at, remaining) = timer.add_time(30).unwrap();
        assert_eq!(ends_at, Some(now + Duration::seconds(90)));
        assert_eq!(remaining, None);

        timer.pause(now).unwrap();
        let (ends_at, remaining) = timer.add_time(10).unwrap();
        assert_eq!(ends_at, None);
        assert_eq!(remaining, Some(100));
    }

    #[test]
    fn expiry_check() {
        let now = Utc::now();
        let mut timer = TimerState::Idle;
        assert!(!timer.is_expired(now));
        timer.start(now, 5);
        assert!(!timer.is_expired(now + Duration::seconds(4)));
        assert!(timer.is_expired(now + Duration::seconds(5)));
    }

    #[test]
    fn columns_round_trip_running() {
        let now = Utc::now();
        let mut timer = TimerState::Idle;
        timer.start(now, 600);
        let columns = timer.to_columns(now);
        let restored = TimerState::from_columns(&columns, now + Duration::seconds(10));
        assert_eq!(restored, timer);
    }

    #[test]
    fn columns_round_trip_paused() {
        let now = Utc::now();
        let timer = TimerState::Paused { remaining_seconds: 45 };
        let columns = timer.to_columns(now);
        let restored = TimerState::from_columns(&columns, now + Duration::seconds(1000));
        assert_eq!(restored, timer);
    }

    #[test]
    fn stale_running_timer_restores_to_idle() {
        let now = Utc::now();
        let columns = TimerColumns {
            started_at: Some(now - Duration::seconds(700)),
            duration_seconds: Some(600),
            paused_at: None,
            remaining_seconds: None,
        };
        assert_eq!(TimerState::from_columns(&columns, now), TimerState::Idle);
    }
}
