//! Client registration data.

use huddle_core::{ConnectionId, ServerFrame, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything the hub needs to know about one connection.
///
/// The `sender` feeds the connection's write pump; the hub never blocks on
/// it. Cancelling `closed` tells the connection's pumps to shut down.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Process-unique connection id.
    pub conn_id: ConnectionId,
    /// Authenticated user.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
    /// Bounded outbound queue feeding the write pump.
    pub sender: mpsc::Sender<ServerFrame>,
    /// Close signal shared with the connection's pumps.
    pub closed: CancellationToken,
}
