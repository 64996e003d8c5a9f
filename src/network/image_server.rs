// file: src/network/image_server.rs
// version: 1.0.0
// guid: 4b6e0a3f-8d21-4c7a-95e8-2f1d7c9b0e63

//! Static HTTP server exposing upgrade images to devices

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{Result, UpgradeError};

/// Background HTTP server over an image directory
pub struct ImageServer {
    addr: SocketAddr,
    root: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ImageServer {
    /// Bind `bind` and serve files under `root` until stopped
    pub async fn start(bind: SocketAddr, root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(UpgradeError::config(format!(
                "Image directory {} does not exist",
                root.display()
            )));
        }

        let app = Router::new()
            .fallback_service(ServeDir::new(root))
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(bind).await.map_err(|e| {
            UpgradeError::config(format!("Failed to bind image server on {}: {}", bind, e))
        })?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Image server failed: {}", e);
            }
        });

        info!("Serving {} on http://{}", root.display(), addr);
        Ok(Self {
            addr,
            root: root.to_path_buf(),
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop accepting connections and wait for the server task
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Image server on {} stopped", self.addr);
    }
}

impl Drop for ImageServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
