use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use order_runtime::{
    ShutdownCoordinator, ShutdownError, ShutdownGroup, ShutdownManifest, ShutdownReport,
    TaskSupervisor,
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::api::{build_router, HttpListener, SharedService};
use crate::config::{ServiceConfig, StoreBackend};
use crate::order_engine::{FixedDelayFill, FulfillmentStrategy, OrderEngine};
use crate::store::{MemoryOrderStore, OrderStore, SqliteOrderStore, StoreCloser, StoreError};

/// Network listeners stop accepting new work.
pub const LISTENER_GROUP: ShutdownGroup = 0;
/// In-flight fulfillment tasks drain.
pub const TASK_GROUP: ShutdownGroup = 1;
/// The order store is released.
pub const STORE_GROUP: ShutdownGroup = 2;

/// The complete order system: store, supervisor, engine and (optionally) the HTTP
/// listener, with a fixed shutdown order.
pub struct OrderSystem {
    pub engine: OrderEngine,
    store: Arc<dyn OrderStore>,
    supervisor: TaskSupervisor,
    listener: Option<Arc<HttpListener>>,
}

impl OrderSystem {
    /// Wires an engine over `store`.
    pub fn new(store: Arc<dyn OrderStore>, strategy: Arc<dyn FulfillmentStrategy>) -> Self {
        let supervisor = TaskSupervisor::new();
        let engine = OrderEngine::new(Arc::clone(&store), supervisor.clone(), strategy);
        Self {
            engine,
            store,
            supervisor,
            listener: None,
        }
    }

    /// An in-memory system using `strategy`. Must be called inside a Tokio runtime.
    pub fn in_memory(strategy: Arc<dyn FulfillmentStrategy>) -> Self {
        Self::new(Arc::new(MemoryOrderStore::spawn()), strategy)
    }

    /// Opens the configured store and uses a [`FixedDelayFill`] with the configured delay.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn OrderStore> = match &config.store {
            StoreBackend::Memory => {
                info!("Using in-memory order store");
                Arc::new(MemoryOrderStore::spawn())
            }
            StoreBackend::Sqlite(url) => Arc::new(SqliteOrderStore::connect(url).await?),
        };
        let strategy = Arc::new(FixedDelayFill::new(config.fulfillment_delay));
        Ok(Self::new(store, strategy))
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn service(&self) -> SharedService {
        Arc::new(self.engine.clone())
    }

    /// The HTTP router with request tracing attached.
    pub fn router(&self) -> Router {
        build_router(self.service()).layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
    }

    /// Starts the HTTP listener on `addr` and registers it for shutdown.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn serve(&mut self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = HttpListener::bind(addr, self.router()).await?;
        let local_addr = listener.local_addr();
        self.listener = Some(Arc::new(listener));
        Ok(local_addr)
    }

    /// The shutdown manifest: listener, then tasks, then store.
    pub fn manifest(&self) -> ShutdownManifest {
        let mut manifest = ShutdownManifest::new();
        if let Some(listener) = &self.listener {
            manifest = manifest.entry("http-listener", LISTENER_GROUP, listener.clone());
        }
        manifest
            .entry("fulfillment-tasks", TASK_GROUP, Arc::new(self.supervisor.clone()))
            .entry("order-store", STORE_GROUP, Arc::new(StoreCloser(Arc::clone(&self.store))))
    }

    /// Shuts everything down within `deadline` and reports each resource's outcome.
    pub async fn shutdown(self, deadline: Duration) -> Result<ShutdownReport, ShutdownError> {
        info!(
            outstanding_tasks = self.supervisor.outstanding(),
            deadline_secs = deadline.as_secs_f64(),
            "Shutting down order system"
        );
        ShutdownCoordinator::new(deadline).run(self.manifest()).await
    }
}
