//! The HTTP listener as a shutdown-capable resource.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use order_runtime::{CloseError, Closeable};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A running axum server.
///
/// Closing it stops accepting connections and waits for in-flight requests to finish.
pub struct HttpListener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    abort: AbortHandle,
}

impl HttpListener {
    /// Binds `addr` and starts serving `router` on a background task.
    pub async fn bind(addr: SocketAddr, router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone().cancelled_owned();

        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
        });
        info!(%local_addr, "HTTP listener started");

        Ok(Self {
            local_addr,
            cancel,
            abort: server.abort_handle(),
            server: Mutex::new(Some(server)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Closeable for HttpListener {
    async fn close(&self) -> Result<(), CloseError> {
        self.cancel.cancel();
        let Some(server) = self.server.lock().await.take() else {
            return Ok(());
        };
        match server.await {
            Ok(Ok(())) => {
                info!(local_addr = %self.local_addr, "HTTP listener stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(CloseError::new(format!("http server failed: {e}"))),
            Err(e) => Err(CloseError::new(format!("http server task failed: {e}"))),
        }
    }

    /// Drops open connections.
    fn abort(&self) {
        warn!(local_addr = %self.local_addr, "Aborting HTTP listener");
        self.cancel.cancel();
        self.abort.abort();
    }
}
