//! Huddle Hub — the per-process registry of clients and rooms.
//!
//! The hub is a single-writer actor: every mutation (register, unregister,
//! join, leave, broadcast) flows through one command channel into a
//! private state, which makes the delayed-leave cancellation race
//! impossible by construction — a rejoin and a firing grace timer are just
//! two commands on the same serial queue.
//!
//! Fan-out uses per-client bounded queues; a full queue drops the client
//! rather than stalling the broadcast (slow-consumer policy).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod actor;
mod client;

pub use actor::{Hub, HubError, HubEvent, HubHandle, JoinOutcome};
pub use client::ClientInfo;
