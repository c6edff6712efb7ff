//! Server configuration.
//!
//! Loaded from a TOML file with serde defaults; the binary's CLI flags
//! override the file. Every tunable the protocol names (grace period,
//! read deadline, write timeout, queue capacity, frame size) lives here.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Main server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the WebSocket upgrade endpoint.
    pub bind: SocketAddr,

    /// Cluster substrate URL (e.g. `redis://127.0.0.1:6379`). Absent means
    /// single-replica: the in-process loopback substrate is used.
    pub substrate_url: Option<String>,

    /// Durable store connection string, handed to the store adapter the
    /// embedding platform wires in. The bundled binary serves the
    /// in-memory store when this is absent.
    pub store_url: Option<String>,

    /// Cluster pub/sub topic.
    pub cluster_topic: String,

    /// Seconds between a user's last connection dropping and the leave
    /// being announced.
    pub grace_period_secs: u64,

    /// Idle read deadline; connections silent for longer are closed.
    pub read_deadline_secs: u64,

    /// Per-frame write timeout.
    pub write_timeout_secs: u64,

    /// Capacity of each client's outbound queue. A client whose queue
    /// fills up is dropped.
    pub outbound_queue_capacity: usize,

    /// Maximum accepted frame size in bytes.
    pub max_frame_bytes: usize,

    /// Interval between cluster presence sync envelopes.
    pub presence_sync_secs: u64,

    /// Deadline for one inbound command handler.
    pub command_deadline_secs: u64,

    /// Bound on the shutdown broadcast drain.
    pub shutdown_drain_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            substrate_url: None,
            store_url: None,
            cluster_topic: huddle_cluster::CLUSTER_TOPIC.to_string(),
            grace_period_secs: 10,
            read_deadline_secs: 60,
            write_timeout_secs: 10,
            outbound_queue_capacity: 256,
            max_frame_bytes: 64 * 1024,
            presence_sync_secs: 15,
            command_deadline_secs: 60,
            shutdown_drain_secs: 5,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8420))
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| ServerError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the engine relies on.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.outbound_queue_capacity == 0 {
            return Err(ServerError::Config("outbound_queue_capacity must be > 0".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(ServerError::Config("max_frame_bytes must be > 0".into()));
        }
        if self.presence_sync_secs == 0 || self.presence_sync_secs > 30 {
            return Err(ServerError::Config(
                "presence_sync_secs must be within 1..=30".into(),
            ));
        }
        Ok(())
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Read deadline as a [`Duration`].
    #[must_use]
    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    /// Write timeout as a [`Duration`].
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Presence sync interval as a [`Duration`].
    #[must_use]
    pub fn presence_sync_interval(&self) -> Duration {
        Duration::from_secs(self.presence_sync_secs)
    }

    /// Command deadline as a [`Duration`].
    #[must_use]
    pub fn command_deadline(&self) -> Duration {
        Duration::from_secs(self.command_deadline_secs)
    }

    /// Shutdown drain bound as a [`Duration`].
    #[must_use]
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let config = ServerConfig::default();
        assert_eq!(config.grace_period_secs, 10);
        assert_eq!(config.read_deadline_secs, 60);
        assert_eq!(config.write_timeout_secs, 10);
        assert_eq!(config.outbound_queue_capacity, 256);
        assert_eq!(config.max_frame_bytes, 64 * 1024);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ServerConfig =
            toml::from_str("grace_period_secs = 3\ncluster_topic = \"t\"").unwrap();
        assert_eq!(config.grace_period_secs, 3);
        assert_eq!(config.cluster_topic, "t");
        assert_eq!(config.outbound_queue_capacity, 256);
    }

    #[test]
    fn sync_interval_bound_is_enforced() {
        let config = ServerConfig { presence_sync_secs: 45, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huddle.toml");
        std::fs::write(&path, "bind = \"0.0.0.0:9000\"\n").unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind.port(), 9000);
    }
}
