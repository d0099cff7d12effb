//! Connection pool - one storage handle per concurrent caller
//!
//! SQLite connections are not shared between threads, so every concurrent
//! gateway call checks out its own handle. A semaphore caps the number of
//! handles in use; idle ones are kept for reuse.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::storage::StorageProvider;
use crate::types::StorageError;

/// Bounded pool of handles from one provider
pub struct ConnectionPool<P: StorageProvider> {
    inner: Arc<PoolInner<P>>,
}

struct PoolInner<P: StorageProvider> {
    provider: P,
    idle: Mutex<Vec<P::Handle>>,
    permits: Arc<Semaphore>,
    max_size: usize,
}

impl<P: StorageProvider> Clone for ConnectionPool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: StorageProvider> ConnectionPool<P> {
    /// Create a pool allowing at most `max_size` handles in use at once
    pub fn new(provider: P, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                provider,
                idle: Mutex::new(Vec::with_capacity(max_size)),
                permits: Arc::new(Semaphore::new(max_size)),
                max_size,
            }),
        }
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Number of idle handles ready for reuse
    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Check out a handle, waiting while all handles are in use
    pub async fn acquire(&self) -> Result<PooledHandle<P>, StorageError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| StorageError::Unavailable("connection pool closed".to_string()))?;

        let reused = self.inner.idle.lock().pop();
        let handle = match reused {
            Some(handle) => handle,
            None => {
                tracing::debug!(location = %self.inner.provider.location(), "Opening new storage handle");
                self.inner.provider.connect()?
            }
        };

        Ok(PooledHandle {
            handle: Some(handle),
            pool: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }
}

/// A checked-out handle; goes back to the pool when dropped
pub struct PooledHandle<P: StorageProvider> {
    handle: Option<P::Handle>,
    pool: Arc<PoolInner<P>>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl<P: StorageProvider> PooledHandle<P> {
    /// Drop the handle instead of returning it, e.g. after the store broke
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<P: StorageProvider> Deref for PooledHandle<P> {
    type Target = P::Handle;

    fn deref(&self) -> &P::Handle {
        // Only taken in Drop
        self.handle.as_ref().unwrap_or_else(|| unreachable!("pooled handle used after release"))
    }
}

impl<P: StorageProvider> Drop for PooledHandle<P> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.discard {
            tracing::warn!("Discarding storage handle after failure");
            return;
        }
        self.pool.idle.lock().push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteProvider;
    use std::time::Duration;
    use tempfile::tempdir;

    fn provider(dir: &tempfile::TempDir) -> SqliteProvider {
        let path = dir.path().join("pool.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        SqliteProvider::new(path, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_handles_are_reused() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(provider(&dir), 2);

        assert_eq!(pool.idle_count(), 0);
        {
            let _a = pool.acquire().await.unwrap();
            let _b = pool.acquire().await.unwrap();
        }
        assert_eq!(pool.idle_count(), 2);

        let _c = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_discarded_handle_not_returned() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(provider(&dir), 1);
        {
            let mut handle = pool.acquire().await.unwrap();
            handle.discard();
        }
        assert_eq!(pool.idle_count(), 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(provider(&dir), 1);

        let held = pool.acquire().await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(waiting.is_err());

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_secs(5), pool.acquire()).await;
        assert!(matches!(acquired, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn test_zero_size_is_clamped() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(provider(&dir), 0);
        assert_eq!(pool.max_size(), 1);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(
            SqliteProvider::new(dir.path().join("missing.db"), Duration::ZERO),
            1,
        );
        assert!(matches!(pool.acquire().await, Err(StorageError::Unavailable(_))));
        // Permit released again after the failure
        assert!(matches!(pool.acquire().await, Err(StorageError::Unavailable(_))));
    }
}
