//! Huddle Cluster — relay of room broadcasts and presence between replicas.
//!
//! Any replica may hold any subset of a room's participants. The
//! [`ClusterBridge`] gives the rest of the engine a merged local+remote
//! view of each room: broadcasts go to local clients through the hub and
//! to remote clients through a shared pub/sub [`Substrate`], with origin
//! filtering so a replica never re-delivers its own envelopes.
//!
//! Two substrates ship: [`MemorySubstrate`] (loopback, for tests and
//! single-node runs) and [`RedisSubstrate`] (Redis pub/sub). Both preserve
//! per-publisher FIFO, which is all the protocol requires — clients treat
//! broadcasts as idempotent state deltas.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bridge;
mod envelope;
mod presence;
mod redis_substrate;
mod substrate;

pub use bridge::ClusterBridge;
pub use envelope::{ClusterEnvelope, EnvelopeKind, PresencePayload, PresenceSyncPayload};
pub use redis_substrate::RedisSubstrate;
pub use substrate::{MemorySubstrate, Substrate, SubstrateError, SubstrateResult};

/// Default cluster topic name.
pub const CLUSTER_TOPIC: &str = "retro_cluster";
