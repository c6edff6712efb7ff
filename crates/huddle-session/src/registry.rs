//! Session registry and the timer tick scheduler.
//!
//! The registry maps room ids to shared session state, reconstructing a
//! mirror from the persisted row on first access. One ticker task scans
//! all sessions for expired timers; wake-up latency stays well under the
//! 250 ms bound.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use huddle_core::{Retro, RetroId};
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info};

use crate::state::SessionState;
use crate::timer::TimerState;

/// Scheduler scan interval.
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Emitted by the ticker when a session's timer passes its deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimerExpiry {
    /// The session whose timer expired.
    pub retro_id: RetroId,
}

/// Registry of live session state mirrors.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<RetroId, SessionHandle>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session handle, reconstructing it from `retro` when this
    /// replica has not seen the session yet.
    #[must_use]
    pub fn get_or_load(&self, retro: &Retro) -> SessionHandle {
        self.sessions
            .entry(retro.id)
            .or_insert_with(|| {
                debug!(retro_id = %retro.id, "Reconstructing session state mirror");
                Arc::new(Mutex::new(SessionState::from_retro(retro, Utc::now())))
            })
            .clone()
    }

    /// Fetch an already-loaded session handle.
    #[must_use]
    pub fn get(&self, retro_id: RetroId) -> Option<SessionHandle> {
        self.sessions.get(&retro_id).map(|entry| entry.clone())
    }

    /// Drop a session mirror (after `retro_ended` or room teardown).
    pub fn remove(&self, retro_id: RetroId) {
        self.sessions.remove(&retro_id);
    }

    /// Number of live mirrors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no mirrors are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot the handles for one scheduler pass.
    fn handles(&self) -> Vec<(RetroId, SessionHandle)> {
        self.sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

/// Run the timer tick scheduler until shutdown.
///
/// Each pass copies the handle set, then locks sessions one at a time so
/// an expiry sweep never blocks command handling for other sessions. An
/// expired timer transitions to idle here; the receiver persists the
/// idle columns and broadcasts `timer_expired`.
pub async fn run_ticker(
    registry: Arc<SessionRegistry>,
    expiry_tx: mpsc::Sender<TimerExpiry>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Timer scheduler started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Timer scheduler shutting down");
                return;
            }
            () = tokio::time::sleep(TICK_INTERVAL) => {}
        }

        let now = Utc::now();
        for (retro_id, handle) in registry.handles() {
            let mut state = handle.lock().await;
            if state.timer.is_expired(now) {
                state.timer = TimerState::Idle;
                drop(state);
                debug!(retro_id = %retro_id, "Session timer expired");
                if expiry_tx.send(TimerExpiry { retro_id }).await.is_err() {
                    // Receiver gone: the server is tearing down.
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use huddle_core::{
        Phase, RetroStatus, SessionKind, TeamId, TemplateId, VotingPolicy,
    };

    fn retro_row() -> Retro {
        Retro {
            id: RetroId::new(),
            team_id: TeamId::new(),
            template_id: TemplateId::new(),
            kind: SessionKind::Retro,
            name: "r".into(),
            phase: Phase::Brainstorm,
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

    #[tokio::test]
    async fn get_or_load_reuses_the_mirror() {
        let registry = SessionRegistry::new();
        let retro = retro_row();
        let first = registry.get_or_load(&retro);
        first.lock().await.facilitator = Some(huddle_core::UserId::new());
        let second = registry.get_or_load(&retro);
        assert!(second.lock().await.facilitator.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn ticker_emits_expiry_and_idles_the_timer() {
        let registry = Arc::new(SessionRegistry::new());
        let retro = retro_row();
        let handle = registry.get_or_load(&retro);
        handle.lock().await.timer = TimerState::Running {
            ends_at: Utc::now() - Duration::seconds(1),
            duration_seconds: 60,
        };

        let (expiry_tx, mut expiry_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let ticker = tokio::spawn(run_ticker(
            registry.clone(),
            expiry_tx,
            shutdown_tx.subscribe(),
        ));

        let expiry = tokio::time::timeout(std::time::Duration::from_secs(2), expiry_rx.recv())
            .await
            .expect("ticker should fire within one interval")
            .expect("channel open");
        assert_eq!(expiry.retro_id, retro.id);
        assert_eq!(handle.lock().await.timer, TimerState::Idle);

        let _ = shutdown_tx.send(());
        let _ = ticker.await;
    }

    #[tokio::test]
    async fn ticker_ignores_running_timers_with_time_left() {
        let registry = Arc::new(SessionRegistry::new());
        let retro = retro_row();
        let handle = registry.get_or_load(&retro);
        handle.lock().await.timer = TimerState::Running {
            ends_at: Utc::now() + Duration::seconds(3600),
            duration_seconds: 3600,
        };

        let (expiry_tx, mut expiry_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let ticker = tokio::spawn(run_ticker(
            registry.clone(),
            expiry_tx,
            shutdown_tx.subscribe(),
        ));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(600), expiry_rx.recv()).await;
        assert!(result.is_err(), "no expiry should fire");

        let _ = shutdown_tx.send(());
        let _ = ticker.await;
    }
}
