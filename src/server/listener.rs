use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Shared;
use crate::http::writer::SERVICE_UNAVAILABLE;

/// Accepts until shutdown is signalled. Each accepted socket is handed off
/// before the next accept is issued.
pub(crate) async fn run(listener: TcpListener, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    info!(addr = %shared.local_addr, "Listening");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            res = listener.accept() => match res {
                Ok((socket, peer)) => {
                    if *shutdown.borrow() {
                        drop(socket);
                        break;
                    }
                    handle(socket, peer, &shared, &shutdown);
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                }
            }
        }
    }

    drop(listener);
    info!(addr = %shared.local_addr, "Listener closed");
}

fn handle(socket: TcpStream, peer: SocketAddr, shared: &Arc<Shared>, shutdown: &watch::Receiver<bool>) {
    let Ok(permit) = shared.limiter.clone().try_acquire_owned() else {
        shared.shed.fetch_add(1, Ordering::Relaxed);
        info!(peer = %peer, "At capacity, shedding connection");
        tokio::spawn(shed(socket, peer));
        return;
    };
    shared.accepted.fetch_add(1, Ordering::Relaxed);

    if let Err(e) = socket.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let mut ctx = shared.pool.acquire();
    ctx.arm(Box::new(socket), Some(peer), shared.services.buffers.acquire());
    debug!(conn = ctx.id(), peer = %peer, "Accepted connection");

    let shared = shared.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        ctx.run(&shared.services, shutdown).await;
        shared.pool.release(ctx);
        drop(permit);
    });
}

/// Answers with a fixed 503 and closes.
async fn shed(mut socket: TcpStream, peer: SocketAddr) {
    let result = async {
        socket.write_all(SERVICE_UNAVAILABLE).await?;
        socket.shutdown().await
    }
    .await;
    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "Failed to send 503");
    }
}
