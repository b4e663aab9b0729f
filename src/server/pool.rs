use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::http::connection::ConnectionContext;
use crate::pool::ObjectPool;

/// Free list of connection contexts.
///
/// Grows to peak concurrency and never shrinks.
#[derive(Debug)]
pub struct ConnectionPool {
    contexts: ObjectPool<ConnectionContext>,
    created: Arc<AtomicU64>,
    released: AtomicU64,
    active: AtomicUsize,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        let created = Arc::new(AtomicU64::new(0));
        let next_id = created.clone();
        Self {
            contexts: ObjectPool::new(move || {
                ConnectionContext::new(next_id.fetch_add(1, Ordering::Relaxed) + 1)
            }),
            created,
            released: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// A recycled context, or a new one when none is idle.
    pub fn acquire(&self) -> ConnectionContext {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.contexts.acquire()
    }

    /// Takes back a context whose connection has ended.
    pub fn release(&self, mut ctx: ConnectionContext) {
        ctx.disarm();
        self.released.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
        tracing::trace!(conn = ctx.id(), "Context returned to pool");
        self.contexts.release(ctx);
    }

    /// Contexts currently serving a connection.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Contexts waiting in the free list.
    pub fn idle(&self) -> usize {
        self.contexts.idle()
    }

    /// Contexts ever constructed.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total releases since start.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_are_recycled() {
        let pool = ConnectionPool::new();

        let ctx = pool.acquire();
        let id = ctx.id();
        assert_eq!(pool.active(), 1);
        assert_eq!(pool.created(), 1);

        pool.release(ctx);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.active(), 0);

        let again = pool.acquire();
        assert_eq!(again.id(), id);
        assert_eq!(pool.created(), 1);

        let other = pool.acquire();
        assert_ne!(other.id(), id);
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn released_contexts_are_disarmed() {
        let pool = ConnectionPool::new();
        let mut ctx = pool.acquire();
        let (_client, server) = tokio::io::duplex(64);
        ctx.arm(Box::new(server), None, bytes::BytesMut::new());
        assert!(ctx.is_armed());

        pool.release(ctx);
        let ctx = pool.acquire();
        assert!(!ctx.is_armed());
        assert_eq!(pool.released(), 1);
    }
}
