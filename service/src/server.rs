//
// Copyright 2017-2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Chat server implementation
//!
//! The ChatServer owns the TCP listener. Every accepted socket gets its own
//! task running a [`SessionHandler`]; the server keeps no handle to those
//! tasks and puts no cap on how many there are. Sessions find each other
//! only through the shared [`ClientRegistry`].

use crate::{
    ChatConnection, ChatError, ClientRegistry, Result, ServerConfig, ServerMetrics,
    ServerSnapshot, SessionHandler, SessionId, notice,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Chat relay server
///
/// # Example
///
/// ```no_run
/// use chatrelay_service::{ChatServer, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = ChatServer::new(ServerConfig::default()).await?;
///     server.start().await?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct ChatServer {
    /// Server configuration
    config: ServerConfig,
    /// Shared client registry
    registry: Arc<ClientRegistry>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// TCP listener, taken by the accept loop on start
    listener: Mutex<Option<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown notification
    shutdown_notify: Arc<Notify>,
    /// Accept loop task handle
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChatServer {
    /// Create a new server with the given configuration
    ///
    /// This binds to the configured address but does not start accepting
    /// connections. Call `start()` to begin accepting.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let actual_addr = listener.local_addr()?;

        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(ClientRegistry::new(metrics.clone()));

        tracing::info!("Chat server bound to {}", actual_addr);

        Ok(Self {
            config,
            registry,
            metrics,
            listener: Mutex::new(Some(listener)),
            bind_address: actual_addr,
            started_at: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            accept_handle: Mutex::new(None),
        })
    }

    /// Start accepting connections
    ///
    /// The accept loop runs in its own task until `shutdown()` is called. A
    /// server can be started once.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ChatError::AlreadyRunning);
        }

        let Some(listener) = self.listener.lock().await.take() else {
            self.running.store(false, Ordering::SeqCst);
            return Err(ChatError::AlreadyRunning);
        };

        tracing::info!("Starting chat server on {}", self.bind_address);

        let handle = self.spawn_accept_loop(listener);
        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Spawn the accept loop task
    fn spawn_accept_loop(&self, listener: TcpListener) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        let next_id = AtomicU64::new(1);

        tokio::spawn(async move {
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let accept_result = tokio::select! {
                    result = listener.accept() => result,
                    _ = shutdown_notify.notified() => break,
                };

                match accept_result {
                    Ok((socket, peer_addr)) => {
                        let id = SessionId::new(next_id.fetch_add(1, Ordering::SeqCst));
                        tracing::debug!("Accepted connection {} from {}", id, peer_addr);
                        spawn_session(socket, id, &config, &registry, &metrics);
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                        metrics.accept_error();

                        // Back off on errors to avoid a tight loop
                        tokio::time::sleep(config.accept_backoff).await;
                    }
                }
            }

            tracing::info!("Accept loop terminated");
        })
    }

    /// Stop accepting connections and close every registered session
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ChatError::ServerNotRunning);
        }

        tracing::info!("Shutting down chat server");

        self.shutdown_notify.notify_waiters();

        if let Some(handle) = self.accept_handle.lock().await.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }

        self.registry.close_all(notice::SHUTDOWN).await;

        tracing::info!("Chat server shutdown complete");

        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get a snapshot of the server state
    pub async fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_sessions: self.registry.len().await,
            total_connections: self.metrics.total_connections(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the client registry
    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Start an independent session task for an accepted socket
fn spawn_session(
    socket: TcpStream,
    id: SessionId,
    config: &ServerConfig,
    registry: &Arc<ClientRegistry>,
    metrics: &Arc<ServerMetrics>,
) {
    let (connection, reader) = match ChatConnection::split(socket, id, config) {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!("Failed to set up connection {}: {}", id, e);
            return;
        }
    };

    let handler = SessionHandler::new(connection, reader, registry.clone(), config.max_name_length);
    let metrics = metrics.clone();
    metrics.connection_opened();

    tokio::spawn(async move {
        handler.run().await;
        metrics.connection_closed();
    });
}

impl std::fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatServer")
            .field("bind_address", &self.bind_address())
            .field("running", &self.is_running())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

// Implement Drop to ensure the accept loop stops
impl Drop for ChatServer {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            tracing::warn!("ChatServer dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.shutdown_notify.notify_waiters();
        }
    }
}
