use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{BoardError, BoardResult};

pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// Process-wide mutual exclusion around spreadsheet writes.
///
/// One lock for everything, not one per row or sheet. Acquisition waits at
/// most `wait` and is never retried.
#[derive(Clone)]
pub struct ScriptLock {
    inner: Arc<Mutex<()>>,
    wait: Duration,
}

/// Held while the critical section runs; dropping it releases the lock.
pub struct ScriptLockGuard {
    _guard: OwnedMutexGuard<()>,
    label: &'static str,
}

impl ScriptLock {
    pub fn new(wait: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
            wait,
        }
    }

    pub async fn acquire(&self, label: &'static str) -> BoardResult<ScriptLockGuard> {
        match tokio::time::timeout(self.wait, Arc::clone(&self.inner).lock_owned()).await {
            Ok(guard) => {
                debug!(label, "script lock acquired");
                Ok(ScriptLockGuard {
                    _guard: guard,
                    label,
                })
            }
            Err(_) => {
                warn!(category = "lock", label, wait_ms = self.wait.as_millis() as u64, "script lock timed out");
                Err(BoardError::LockTimeout(self.wait))
            }
        }
    }
}

impl Default for ScriptLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_WAIT)
    }
}

impl Drop for ScriptLockGuard {
    fn drop(&mut self) {
        debug!(label = self.label, "script lock released");
    }
}
