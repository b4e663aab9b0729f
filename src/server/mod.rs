//! Server control surface: start, stop, status.
//!
//! # Example
//!
//! ```no_run
//! use warden::config::Config;
//! use warden::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = Server::start(Config::default()).await?;
//!     println!("serving on {}", handle.local_addr());
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod listener;
pub mod pool;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpSocket, lookup_host};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::http::connection::{ConnectionServices, ConnectionSettings};
use crate::http::decoder::BodyDecoderCollection;
use crate::http::dispatch::{DispatchSettings, Dispatcher};
use crate::resource::ResourceCache;
use pool::ConnectionPool;

/// State shared by the accept loop and every connection task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) local_addr: SocketAddr,
    pub(crate) pool: ConnectionPool,
    pub(crate) services: ConnectionServices,
    pub(crate) resources: Arc<ResourceCache>,
    /// One permit per connection the server will serve at once.
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) max_connections: usize,
    pub(crate) accepted: AtomicU64,
    pub(crate) shed: AtomicU64,
}

/// Snapshot returned by [`ServerHandle::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    pub local_addr: SocketAddr,
    pub active_connections: usize,
    pub idle_contexts: usize,
    pub accepted: u64,
    pub shed: u64,
    pub released: u64,
    pub cached_resources: usize,
}

pub struct Server;

impl Server {
    /// Registers the mounts, binds the listener and starts accepting.
    ///
    /// Bind and mount failures are returned here; nothing after this point
    /// reaches the caller.
    pub async fn start(config: Config) -> anyhow::Result<ServerHandle> {
        let mut resources = ResourceCache::new();
        resources.set_forbidden(config.resources.forbidden.clone());
        for mount in &config.mounts {
            resources
                .register(&mount.uri, &mount.path)
                .with_context(|| format!("failed to mount {} at {}", mount.path.display(), mount.uri))?;
        }
        let resources = Arc::new(resources);

        let addr = lookup_host(&config.server.listen_addr)
            .await
            .with_context(|| format!("failed to resolve {}", config.server.listen_addr))?
            .next()
            .with_context(|| format!("no address for {}", config.server.listen_addr))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket.listen(config.server.backlog)?;
        let local_addr = listener.local_addr()?;

        let dispatcher = Dispatcher::new(
            resources.clone(),
            BodyDecoderCollection::with_defaults(),
            DispatchSettings::from(&config),
        );
        let services = ConnectionServices::new(dispatcher, ConnectionSettings::from(&config.server));
        let max_connections = config.server.max_connections;

        let shared = Arc::new(Shared {
            local_addr,
            pool: ConnectionPool::new(),
            services,
            resources: resources.clone(),
            limiter: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            accepted: AtomicU64::new(0),
            shed: AtomicU64::new(0),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(listener::run(listener, shared.clone(), shutdown_rx));

        let sweep_task = (config.resources.idle_ttl_secs > 0).then(|| {
            tokio::spawn(sweep(resources, Duration::from_secs(config.resources.idle_ttl_secs)))
        });

        Ok(ServerHandle {
            shared,
            shutdown,
            accept_task: Some(accept_task),
            sweep_task,
            grace: config.server.shutdown_grace(),
        })
    }
}

/// Drops cached handles idle for longer than `ttl`.
async fn sweep(resources: Arc<ResourceCache>, ttl: Duration) {
    let mut interval = tokio::time::interval((ttl / 2).max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let evicted = resources.evict_idle(ttl);
        if evicted > 0 {
            tracing::debug!(evicted, "Resource sweep");
        }
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
    grace: Duration,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn status(&self) -> ServerStatus {
        let shared = &self.shared;
        ServerStatus {
            local_addr: shared.local_addr,
            active_connections: shared.max_connections - shared.limiter.available_permits(),
            idle_contexts: shared.pool.idle(),
            accepted: shared.accepted.load(Ordering::Relaxed),
            shed: shared.shed.load(Ordering::Relaxed),
            released: shared.pool.released(),
            cached_resources: shared.resources.len(),
        }
    }

    /// Stops accepting, asks idle keep-alive connections to close and waits
    /// a bounded time for the accept loop to finish.
    pub async fn stop(mut self) {
        self.shutdown_now().await;
    }

    async fn shutdown_now(&mut self) {
        let _ = self.shutdown.send(true);

        if let Some(mut task) = self.accept_task.take() {
            if tokio::time::timeout(self.grace, &mut task).await.is_err() {
                tracing::warn!("Accept loop did not stop in time, aborting");
                task.abort();
            }
        }
        if let Some(task) = self.sweep_task.take() {
            task.abort();
        }
        tracing::info!(addr = %self.shared.local_addr, "Server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            let _ = self.shutdown.send(true);
            task.abort();
        }
        if let Some(task) = self.sweep_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.shared.local_addr)
            .finish()
    }
}
