//! Huddle Store — the durable store contract.
//!
//! The engine depends only on the narrow async traits defined here; the
//! backing implementation is opaque. Two implementations ship:
//!
//! - [`MemoryStore`] — complete in-memory implementation used by the test
//!   suite and single-node dev runs.
//! - A SQL adapter lives outside this workspace with the rest of the
//!   platform; it implements the same traits.
//!
//! Every operation surfaces a distinguished not-found sentinel
//! ([`StoreError::NotFound`]); all other failures map to the remaining
//! [`StoreError`] variants.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::{
    ActionStore, AttendeeStore, ItemStore, MoodStore, RetroStore, RotiStore, Store,
    TeamMemberStore, TemplateStore, TimerColumns, TopicHistoryStore, UserStore, VoteStore,
};
