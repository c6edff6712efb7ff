//! Huddle Core — shared types for the real-time session engine.
//!
//! This crate holds everything the other Huddle crates agree on:
//!
//! - Typed identifiers ([`RetroId`], [`UserId`], [`ConnectionId`], ...)
//! - The session [`Phase`] lifecycle and per-kind phase sequences
//! - The wire protocol ([`ClientCommand`], [`ServerFrame`], [`ErrorCode`])
//! - Domain model types shared by the store contract and the snapshot
//!   payloads ([`Retro`], [`RetroItem`], [`RetroAction`], ...)
//!
//! No I/O happens here; the crate is pure data plus the phase transition
//! rules that every replica must apply identically.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod id;
mod model;
mod phase;
mod wire;

pub use id::{
    ActionId, ColumnId, ConnectionId, ItemId, ReplicaId, RetroId, TeamId, TemplateId,
    TopicHistoryId, UserId,
};
pub use model::{
    ActionPriority, Attendee, LcDiscussionState, MoodEntry, Participant, Retro, RetroAction,
    RetroItem, RetroStatus, RotiResults, TeamMember, TeamMemberStatus, TeamRole, Template,
    TemplateColumn, TopicHistory, User, VotingPolicy,
};
pub use phase::{Phase, SessionKind};
pub use wire::{
    ClientCommand, ErrorCode, Frame, FrameDecodeError, MAX_MOOD_LEN, RetroStatePayload,
    ServerFrame, VoteAction,
};
