pub(crate) mod router;
pub(crate) mod session;

use crate::config::WsConfig;
use crate::services::gateway::session::Session;
use crate::services::presence::PresenceRegistry;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

pub use router::EventRouter;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) events_total: Counter<u64>,
    pub(crate) heartbeat_timeouts_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            events_total: meter
                .u64_counter("websocket_events_total")
                .with_description("Inbound client events by name")
                .build(),
            heartbeat_timeouts_total: meter
                .u64_counter("websocket_heartbeat_timeouts_total")
                .with_description("Connections closed after missing heartbeats")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    router: EventRouter,
    presence: PresenceRegistry,
    config: WsConfig,
    metrics: Metrics,
    sessions: TaskTracker,
}

impl GatewayService {
    #[must_use]
    pub fn new(router: EventRouter, presence: PresenceRegistry, config: WsConfig) -> Self {
        Self { router, presence, config, metrics: Metrics::new(), sessions: TaskTracker::new() }
    }

    /// Tracker of every running session. Closing it and waiting drains the
    /// gateway during shutdown.
    #[must_use]
    pub fn sessions(&self) -> TaskTracker {
        self.sessions.clone()
    }

    /// Runs a connection until it closes. `user_id` is `None` for anonymous clients.
    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        user_id: Option<Uuid>,
        request_id: String,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        let session = Session {
            // Time-ordered, so a later connection of the same user always sorts higher.
            connection_id: Uuid::now_v7(),
            user_id,
            request_id,
            socket,
            router: self.router.clone(),
            presence: self.presence.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        self.sessions.track_future(session.run()).await;
    }
}
