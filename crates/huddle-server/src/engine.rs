//! Engine wiring: hub, bridge, registry, dispatcher, background tasks,
//! and the accept loop.

use std::sync::Arc;

use huddle_cluster::{ClusterBridge, Substrate};
use huddle_core::ReplicaId;
use huddle_hub::{Hub, HubEvent, HubHandle};
use huddle_session::{SessionRegistry, TimerExpiry, run_ticker};
use huddle_store::Store;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::connection::{self, ConnectionDeps};
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;

/// Capacity of the hub event and timer expiry channels.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// The assembled session engine.
///
/// Construction spawns the background tasks (cluster subscriber,
/// presence sync, timer scheduler, event relay); [`Engine::serve`] runs
/// the accept loop until [`Engine::shutdown`].
pub struct Engine {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The local hub.
    pub hub: HubHandle,
    /// The cluster bridge.
    pub bridge: Arc<ClusterBridge>,
    /// The command dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// The session registry.
    pub sessions: Arc<SessionRegistry>,
    verifier: Arc<dyn TokenVerifier>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Engine {
    /// Wire the engine over a store, a substrate, and a token verifier.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Store,
        substrate: Arc<dyn Substrate>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let config = Arc::new(config);
        let (shutdown_tx, _) = broadcast::channel(4);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (hub, _hub_task) = Hub::spawn(config.grace_period(), events_tx);

        let replica_id = ReplicaId::new();
        info!(replica_id = %replica_id, "Replica identity generated");
        let bridge = Arc::new(ClusterBridge::new(
            replica_id,
            hub.clone(),
            substrate,
            config.presence_sync_interval(),
        ));
        let sessions = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            hub.clone(),
            bridge.clone(),
            sessions.clone(),
            config.command_deadline(),
        ));

        let (expiry_tx, expiry_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        tokio::spawn({
            let bridge = bridge.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            async move {
                if let Err(e) = bridge.run_subscriber(shutdown_rx).await {
                    error!(error = %e, "Cluster subscriber failed");
                }
            }
        });
        tokio::spawn(bridge.clone().run_presence_sync(shutdown_tx.subscribe()));
        tokio::spawn(run_ticker(
            sessions.clone(),
            expiry_tx,
            shutdown_tx.subscribe(),
        ));
        tokio::spawn(relay_events(
            dispatcher.clone(),
            events_rx,
            expiry_rx,
            shutdown_tx.subscribe(),
        ));

        Self {
            config,
            hub,
            bridge,
            dispatcher,
            sessions,
            verifier,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind).await?;
        info!(bind = %self.config.bind, "Listening for WebSocket upgrades");
        self.serve_on(listener).await
    }

    /// Serve on an existing listener until shutdown.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        let deps = ConnectionDeps {
            hub: self.hub.clone(),
            dispatcher: self.dispatcher.clone(),
            verifier: self.verifier.clone(),
            config: self.config.clone(),
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Accept loop shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(connection::serve(stream, peer, deps.clone()));
                        },
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                        },
                    }
                }
            }
        }
    }

    /// Signal shutdown, close every client, and wait out the bounded
    /// broadcast drain.
    pub async fn shutdown(&self) {
        info!("Engine shutting down");
        let _ = self.shutdown_tx.send(());
        let _ = self.hub.close_all().await;
        // Pending broadcasts drain through the per-client write pumps;
        // bound the wait rather than track each queue.
        tokio::time::sleep(self.config.shutdown_drain()).await;
    }
}

/// Relay hub grace-timer events and timer expiries into the dispatcher.
async fn relay_events(
    dispatcher: Arc<Dispatcher>,
    mut events_rx: mpsc::Receiver<HubEvent>,
    mut expiry_rx: mpsc::Receiver<TimerExpiry>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            event = events_rx.recv() => {
                let Some(event) = event else { return };
                let HubEvent::UserLeft { room, user, .. } = event;
                dispatcher.handle_user_left(room, user).await;
            }
            expiry = expiry_rx.recv() => {
                let Some(TimerExpiry { retro_id }) = expiry else { return };
                dispatcher.handle_timer_expired(retro_id).await;
            }
        }
    }
}
