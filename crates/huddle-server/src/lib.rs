//! Huddle Server — the WebSocket session server.
//!
//! Ties the engine together: authenticated WebSocket upgrades, one
//! read/write pump pair per connection, the command dispatcher in front
//! of the durable store, and the background tasks (cluster subscriber,
//! presence sync, timer scheduler, hub event relay).
//!
//! The [`Engine`] type wires everything and is embeddable; the `huddled`
//! binary wraps it with config loading and signal handling for
//! single-node and dev deployments.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod auth;
pub mod config;
mod connection;
mod dispatcher;
mod engine;
mod error;
mod snapshot;

pub use auth::{AuthError, AuthedUser, DevTokenVerifier, TokenVerifier};
pub use config::ServerConfig;
pub use dispatcher::{ClientCtx, Dispatcher};
pub use engine::Engine;
pub use error::ServerError;
