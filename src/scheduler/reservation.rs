//! Accelerator reservation.
//!
//! The accelerator is a single cell naming its current holder. Acquiring it
//! is a compare-and-set on that cell; releasing happens when the [`Lease`] is
//! dropped, which is also the quiescence signal waiters block on. This is an
//! advisory lock: the hardware itself lives outside the process.

use super::SlotName;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

/// The shared constrained resource.
#[derive(Debug)]
pub struct Accelerator {
    holder: watch::Sender<Option<SlotName>>,
}

impl Accelerator {
    pub fn new() -> Arc<Self> {
        let (holder, _) = watch::channel(None);
        Arc::new(Self { holder })
    }

    /// The slot currently holding the reservation.
    pub fn holder(&self) -> Option<SlotName> {
        *self.holder.borrow()
    }

    /// Take the reservation if it is free.
    ///
    /// Returns the current holder when it is not.
    pub fn try_acquire(self: &Arc<Self>, slot: SlotName) -> Result<Lease, SlotName> {
        let mut outcome = Ok(());
        self.holder.send_if_modified(|current| match *current {
            None => {
                *current = Some(slot);
                true
            }
            Some(holder) => {
                outcome = Err(holder);
                false
            }
        });
        outcome.map(|()| {
            trace!(slot = %slot, "accelerator acquired");
            Lease {
                accelerator: Arc::clone(self),
                slot,
            }
        })
    }

    /// Wait until nobody holds the reservation, or the deadline passes.
    ///
    /// Returns `true` when the accelerator is quiescent.
    pub async fn wait_quiescent(&self, deadline: Instant) -> bool {
        let mut rx = self.holder.subscribe();
        let quiescent = match tokio::time::timeout_at(deadline, rx.wait_for(Option::is_none)).await {
            Ok(Ok(_)) => true,
            _ => self.holder().is_none(),
        };
        quiescent
    }

    fn release(&self, slot: SlotName) {
        self.holder.send_if_modified(|current| {
            if *current == Some(slot) {
                *current = None;
                true
            } else {
                false
            }
        });
        trace!(slot = %slot, "accelerator released");
    }
}

/// Proof of holding the accelerator. Dropping it releases the reservation.
#[derive(Debug)]
pub struct Lease {
    accelerator: Arc<Accelerator>,
    slot: SlotName,
}

impl Lease {
    pub fn slot(&self) -> SlotName {
        self.slot
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.accelerator.release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_single_holder() {
        let accel = Accelerator::new();
        let lease = accel.try_acquire(SlotName::Agents).unwrap();
        assert_eq!(accel.holder(), Some(SlotName::Agents));
        assert_eq!(
            accel.try_acquire(SlotName::Vision).unwrap_err(),
            SlotName::Agents
        );
        // The same slot cannot stack a second lease either.
        assert!(accel.try_acquire(SlotName::Agents).is_err());

        drop(lease);
        assert_eq!(accel.holder(), None);
        assert!(accel.try_acquire(SlotName::Vision).is_ok());
    }

    #[tokio::test]
    async fn test_wait_quiescent_wakes_on_release() {
        let accel = Accelerator::new();
        let lease = accel.try_acquire(SlotName::Transcription).unwrap();

        let waiter = {
            let accel = Arc::clone(&accel);
            tokio::spawn(async move {
                accel
                    .wait_quiescent(Instant::now() + Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(lease);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_quiescent_times_out() {
        let accel = Accelerator::new();
        let _lease = accel.try_acquire(SlotName::Transcription).unwrap();
        let quiescent = accel
            .wait_quiescent(Instant::now() + Duration::from_millis(20))
            .await;
        assert!(!quiescent);
    }
}
