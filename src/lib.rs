#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

use crate::adapters::database::{self, DbPool, PgStore};
use crate::adapters::memory::MemoryStore;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::friend_service::FriendService;
use crate::services::gateway::{EventRouter, GatewayService};
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::presence::PresenceRegistry;
use crate::storage::{ResilientStore, SharedStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Fully wired application, ready to be mounted on routers.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<SharedStore>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Wires every service around one store. Without an explicit store an
    /// in-memory one is used.
    #[must_use]
    pub fn build(self) -> App {
        let raw_store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let store: SharedStore = Arc::new(ResilientStore::new(raw_store, &self.config.store));

        let presence = PresenceRegistry::new(Arc::clone(&store));
        let friend_service = FriendService::new(Arc::clone(&store), presence.clone());
        let conversation_service = ConversationService::new(Arc::clone(&store));
        let message_service = MessageService::new(Arc::clone(&store), presence.clone(), self.config.messaging.clone());

        let router = EventRouter::new(friend_service.clone(), conversation_service.clone(), message_service.clone());
        let gateway_service = GatewayService::new(router, presence.clone(), self.config.websocket.clone());
        let health_service = HealthService::new(Arc::clone(&store));

        App {
            services: ServiceContainer {
                store,
                presence,
                friend_service,
                conversation_service,
                message_service,
                gateway_service,
            },
            health_service,
        }
    }
}

/// Opens the configured persistence store: Postgres when a database URL is set,
/// otherwise a process-local in-memory store.
///
/// Users are provisioned by the identity service into the database, so the
/// in-memory fallback starts empty and is meant for local development, where
/// only anonymous connections (or users seeded through [`MemoryStore::insert_user`]
/// by an embedding program) can connect.
///
/// # Errors
/// Returns an error if the database cannot be reached or migrated.
pub async fn connect_store(config: &Config) -> anyhow::Result<SharedStore> {
    if let Some(url) = &config.database.url {
        let pool = database::init_pool(&config.database, url).await?;
        run_migrations(&pool).await?;
        tracing::info!("Connected to Postgres");
        Ok(Arc::new(PgStore::new(pool)))
    } else {
        tracing::warn!(
            "No database configured, state is kept in memory and lost on restart. \
             No users exist in this mode, so only anonymous connections are accepted"
        );
        Ok(Arc::new(MemoryStore::new()))
    }
}

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Flips `shutdown_tx` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sinks.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();

        tracing::error!(panic.payload = %payload, panic.location = %location, "Panic occurred");
    }));
}
