use super::{CacheBackend, CacheError};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Whether the cache backend may be used.
///
/// Request handling only ever moves this from available to disabled. The
/// single way back is a successful probe, which the optional recovery task
/// performs off the request path.
#[derive(Debug)]
pub struct Availability {
    available: AtomicBool,
}

impl Availability {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    // Returns true if this call performed the transition.
    fn disable(&self) -> bool {
        self.available.swap(false, Ordering::AcqRel)
    }

    fn restore(&self) -> bool {
        !self.available.swap(true, Ordering::AcqRel)
    }
}

/// Cache-aside front for the backend.
///
/// None of the public operations ever return an error: a failing backend is
/// logged, disables caching, and the caller just sees a miss or `false`.
pub struct CacheLayer {
    backend: Option<Arc<dyn CacheBackend>>,
    availability: Availability,
    op_timeout: Duration,
}

impl CacheLayer {
    /// Builds the layer and runs the startup probe. The layer starts
    /// available only if the probe succeeds.
    pub async fn connect(backend: Arc<dyn CacheBackend>, op_timeout: Duration) -> Self {
        let layer = Self {
            backend: Some(backend),
            availability: Availability::new(false),
            op_timeout,
        };
        if layer.probe().await {
            info!("Cache backend reachable, listing cache enabled");
        }
        layer
    }

    /// A layer with no backend at all; every operation is a no-op.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            availability: Availability::new(false),
            op_timeout: Duration::ZERO,
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    /// Liveness check against the backend, bypassing the availability gate.
    pub async fn probe(&self) -> bool {
        match self.ping_backend().await {
            Ok(()) => {
                self.availability.restore();
                true
            }
            Err(e) => {
                self.availability.disable();
                warn!("Cache backend unreachable, caching disabled: {}", e);
                false
            }
        }
    }

    /// Brings a disabled cache back once the backend answers again.
    ///
    /// Writes made while the cache was off skipped their invalidation, so
    /// `stale_keys` are deleted first and the layer is only re-enabled if
    /// every delete went through.
    pub async fn recover(&self, stale_keys: &[&str]) -> bool {
        if self.is_available() {
            return true;
        }
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        // --- Step 1: is the backend back? ---
        if let Err(e) = self.ping_backend().await {
            debug!("Cache backend still unreachable: {}", e);
            return false;
        }

        // --- Step 2: drop whatever was written before the outage ---
        for key in stale_keys {
            let deleted = match tokio::time::timeout(self.op_timeout, backend.delete(key)).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout(self.op_timeout)),
            };
            if let Err(e) = deleted {
                debug!("Could not drop stale cache key {}, staying disabled: {}", key, e);
                return false;
            }
        }

        // --- Step 3: reopen the gate ---
        self.availability.restore()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let backend = self.usable_backend()?;
        self.guarded("get", backend.get(key)).await.ok().flatten()
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> bool {
        if ttl_secs == 0 {
            warn!("Refusing to cache {} without an expiry", key);
            return false;
        }
        let Some(backend) = self.usable_backend() else {
            return false;
        };
        self.guarded("set", backend.set_ex(key, value, ttl_secs))
            .await
            .is_ok()
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        let Some(backend) = self.usable_backend() else {
            return false;
        };
        self.guarded("delete", backend.delete(key)).await.is_ok()
    }

    /// Periodically probes a disabled backend and re-enables caching once it
    /// answers again, dropping `stale_keys` on the way.
    pub fn spawn_recovery(
        self: &Arc<Self>,
        period: Duration,
        stale_keys: &[&'static str],
    ) -> JoinHandle<()> {
        let layer = Arc::clone(self);
        let stale_keys = stale_keys.to_vec();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately, the startup probe already covered it.
            interval.tick().await;

            loop {
                interval.tick().await;
                if layer.backend.is_none() || layer.is_available() {
                    continue;
                }
                if layer.recover(&stale_keys).await {
                    info!("Cache backend reachable again, listing cache re-enabled");
                }
            }
        })
    }

    fn usable_backend(&self) -> Option<&Arc<dyn CacheBackend>> {
        if !self.availability.is_available() {
            return None;
        }
        self.backend.as_ref()
    }

    async fn ping_backend(&self) -> Result<(), CacheError> {
        let Some(backend) = self.backend.as_ref() else {
            return Err(CacheError::Backend("no cache backend configured".to_string()));
        };
        match tokio::time::timeout(self.op_timeout, backend.ping()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }

    // Every backend call on the request path goes through here.
    async fn guarded<T, Fut>(&self, op: &'static str, call: Fut) -> Result<T, CacheError>
    where
        Fut: Future<Output = Result<T, CacheError>>,
    {
        // A call that outlives the op timeout is a failure like any other.
        let result = match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        };

        // First failure flips the gate; later ones only happen for calls
        // that were already in flight.
        if let Err(e) = &result {
            if self.availability.disable() {
                warn!("Cache {} failed, caching disabled: {}", op, e);
            } else {
                debug!("Cache {} failed while already disabled: {}", op, e);
            }
        }
        result
    }
}
