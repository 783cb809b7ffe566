//! Per-endpoint mutual exclusion
//!
//! A controller runs its own job queue and reacts badly to conflicting
//! concurrent requests, so every mutation holds the lock for its endpoint
//! from submission through entity resolution. Locks are created on first
//! use and live as long as the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Table of per-endpoint locks
#[derive(Debug, Default)]
pub struct EndpointLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held lock for one endpoint; released on drop
#[derive(Debug)]
pub struct EndpointGuard {
    endpoint: String,
    _guard: OwnedMutexGuard<()>,
}

impl EndpointGuard {
    /// Endpoint this guard locks
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        trace!(endpoint = %self.endpoint, "Released endpoint lock");
    }
}

impl EndpointLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, endpoint: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(endpoint.to_string()).or_default().clone()
    }

    /// Wait for exclusive access to `endpoint`
    pub async fn acquire(&self, endpoint: &str) -> EndpointGuard {
        let lock = self.lock_for(endpoint);
        if lock.try_lock().is_err() {
            debug!(endpoint, "Waiting for endpoint lock");
        }

        let guard = lock.lock_owned().await;
        trace!(endpoint, "Acquired endpoint lock");
        EndpointGuard {
            endpoint: endpoint.to_string(),
            _guard: guard,
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up with `None` if `cancel` fires first
    pub async fn acquire_cancellable(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Option<EndpointGuard> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.acquire(endpoint) => Some(guard),
        }
    }

    /// Whether `endpoint` is currently locked
    pub fn is_locked(&self, endpoint: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(endpoint)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of endpoints seen so far
    pub fn endpoint_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
