//! Session phases and per-kind phase sequences.
//!
//! The server is the single authority over phase transitions (invariant:
//! exactly one writer per session). Both session kinds walk a fixed forward
//! sequence; `phase_set` may jump anywhere within the kind's sequence but
//! never to a phase outside it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete stage of the session lifecycle.
///
/// For Lean Coffee sessions the `brainstorm` phase doubles as the topic
/// proposal stage; `group` and `action` are retro-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Lobby: participants gather, a facilitator is claimed.
    Waiting,
    /// Mood check-in.
    Icebreaker,
    /// Item creation (topic proposal for Lean Coffee).
    Brainstorm,
    /// Facilitator groups related items (retro only).
    Group,
    /// Dot voting under the session's voting policy.
    Vote,
    /// Discussion of the voted items.
    Discuss,
    /// Action item capture (retro only).
    Action,
    /// Return-on-time-invested rating.
    Roti,
    /// Terminal state.
    Ended,
}

/// The two supported session kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Classic team retrospective.
    Retro,
    /// Lean Coffee: propose, vote, discuss sequentially with a timebox.
    LeanCoffee,
}

/// Phase order for retro sessions.
const RETRO_SEQUENCE: &[Phase] = &[
    Phase::Waiting,
    Phase::Icebreaker,
    Phase::Brainstorm,
    Phase::Group,
    Phase::Vote,
    Phase::Discuss,
    Phase::Action,
    Phase::Roti,
    Phase::Ended,
];

/// Phase order for Lean Coffee sessions.
const LEAN_COFFEE_SEQUENCE: &[Phase] = &[
    Phase::Waiting,
    Phase::Icebreaker,
    Phase::Brainstorm,
    Phase::Vote,
    Phase::Discuss,
    Phase::Roti,
    Phase::Ended,
];

impl SessionKind {
    /// The full phase sequence for this kind, in order.
    #[must_use]
    pub fn sequence(self) -> &'static [Phase] {
        match self {
            Self::Retro => RETRO_SEQUENCE,
            Self::LeanCoffee => LEAN_COFFEE_SEQUENCE,
        }
    }
}

impl Phase {
    /// The phase following `self` in the sequence for `kind`, or `None`
    /// when `self` is terminal or not part of the kind's sequence.
    #[must_use]
    pub fn next(self, kind: SessionKind) -> Option<Phase> {
        let seq = kind.sequence();
        let idx = seq.iter().position(|p| *p == self)?;
        seq.get(idx + 1).copied()
    }

    /// Whether `self` is a legal phase for sessions of `kind`.
    #[must_use]
    pub fn is_valid_for(self, kind: SessionKind) -> bool {
        kind.sequence().contains(&self)
    }

    /// Wire name of the phase (matches the serde representation).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Icebreaker => "icebreaker",
            Self::Brainstorm => "brainstorm",
            Self::Group => "group",
            Self::Vote => "vote",
            Self::Discuss => "discuss",
            Self::Action => "action",
            Self::Roti => "roti",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retro_sequence_walks_through_action() {
        let mut phase = Phase::Waiting;
        let mut seen = vec![phase];
        while let Some(next) = phase.next(SessionKind::Retro) {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(seen, RETRO_SEQUENCE);
    }

    #[test]
    fn lean_coffee_skips_group_and_action() {
        assert!(!Phase::Group.is_valid_for(SessionKind::LeanCoffee));
        assert!(!Phase::Action.is_valid_for(SessionKind::LeanCoffee));
        assert_eq!(
            Phase::Vote.next(SessionKind::LeanCoffee),
            Some(Phase::Discuss)
        );
        assert_eq!(
            Phase::Discuss.next(SessionKind::LeanCoffee),
            Some(Phase::Roti)
        );
    }

    #[test]
    fn ended_is_terminal() {
        assert_eq!(Phase::Ended.next(SessionKind::Retro), None);
        assert_eq!(Phase::Ended.next(SessionKind::LeanCoffee), None);
    }

    #[test]
    fn wire_names_round_trip() {
        for phase in RETRO_SEQUENCE {
            let json = serde_json::to_string(phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
            let back: Phase = serde_json::from_str(&json).unwrap();
            assert_eq!(*phase, back);
        }
    }
}
