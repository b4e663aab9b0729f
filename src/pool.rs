//! Reusable-object pool.
//!
//! Used for receive buffers and connection contexts. The free list is guarded
//! by a single short-lived lock; callers never see the lock itself.

use parking_lot::Mutex;

/// A free list of reusable values with an optional factory for misses.
pub struct ObjectPool<T> {
    items: Mutex<Vec<T>>,
    create: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> ObjectPool<T> {
    /// Creates a pool that builds a fresh value with `create` whenever the
    /// free list is empty.
    pub fn new(create: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            create: Box::new(create),
        }
    }

    /// Takes a pooled value, or builds a new one when none is idle.
    pub fn acquire(&self) -> T {
        if let Some(item) = self.items.lock().pop() {
            return item;
        }
        (self.create)()
    }

    /// Takes a pooled value without falling back to the factory.
    pub fn try_acquire(&self) -> Option<T> {
        self.items.lock().pop()
    }

    /// Returns a value to the free list.
    pub fn release(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Number of idle values currently held.
    pub fn idle(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle())
            .finish()
    }
}
