use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Error)]
#[error("no job slot became free within {waited:?}")]
pub struct Overloaded {
    pub waited: Duration,
}

/// Admits at most `capacity` transcode jobs at once.
#[derive(Clone, Debug)]
pub struct SlotLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    wait: Duration,
}

/// One held job slot. Dropping it hands the slot back.
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

impl SlotLimiter {
    pub fn new(capacity: usize, wait: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            wait,
        }
    }

    /// Waits up to the configured budget for a free slot.
    pub async fn acquire(&self) -> Result<SlotPermit, Overloaded> {
        let overloaded = Overloaded { waited: self.wait };

        let permit = if self.wait.is_zero() {
            self.semaphore.clone().try_acquire_owned().ok()
        } else {
            match tokio::time::timeout(self.wait, self.semaphore.clone().acquire_owned()).await {
                Ok(Ok(permit)) => Some(permit),
                // The semaphore is never closed; treat it like a full house.
                Ok(Err(_closed)) => None,
                Err(_elapsed) => None,
            }
        };

        match permit {
            Some(permit) => {
                debug!(in_flight = self.in_flight(), capacity = self.capacity, "Job slot acquired");
                Ok(SlotPermit { _permit: permit })
            }
            None => {
                warn!(capacity = self.capacity, "No free job slot, rejecting");
                Err(overloaded)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
