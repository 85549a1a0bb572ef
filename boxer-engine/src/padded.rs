//! Padded mutex: mutual exclusion with a cool-down after every release.
//!
//! A plain mutex lets the next waiter in the moment the holder lets go. A
//! [`PaddedMutex`] keeps the lock closed for a fixed period after
//! [`PaddedMutex::release`], so two successive holders are always at least
//! that period apart no matter how many tasks are queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A mutex whose release takes effect only after a cool-down period.
///
/// `release` returns immediately; a background timer performs the real unlock
/// once the period has elapsed. Misuse (releasing while not held, or releasing
/// again before the pending cool-down fires) is a logic error and panics.
///
/// # Cancel Safety
/// [`PaddedMutex::lock`] is cancel safe: dropping the future before it
/// completes leaves the mutex untouched.
pub struct PaddedMutex {
    shared: Arc<Shared>,
}

struct Shared {
    gate: Arc<Mutex<()>>,
    holder: StdMutex<Option<OwnedMutexGuard<()>>>,
    locked: AtomicBool,
    cooling: AtomicBool,
    period: Duration,
}

impl Shared {
    fn holder(&self) -> StdMutexGuard<'_, Option<OwnedMutexGuard<()>>> {
        // The slot only ever holds an Option; a poisoned lock leaves it usable.
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PaddedMutex {
    /// Create an unlocked mutex with the given cool-down period.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate: Arc::new(Mutex::new(())),
                holder: StdMutex::new(None),
                locked: AtomicBool::new(false),
                cooling: AtomicBool::new(false),
                period,
            }),
        }
    }

    /// The cool-down period applied after each release.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.shared.period
    }

    /// Whether some caller currently holds the lock (including during cool-down).
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::Acquire)
    }

    /// Whether a release has been issued and its timer has not fired yet.
    #[must_use]
    pub fn is_cooling_down(&self) -> bool {
        self.shared.cooling.load(Ordering::Acquire)
    }

    /// Wait until the lock is free and take it.
    pub async fn lock(&self) {
        let guard = Arc::clone(&self.shared.gate).lock_owned().await;
        *self.shared.holder() = Some(guard);
        self.shared.locked.store(true, Ordering::Release);
        tracing::debug!("padded mutex locked");
    }

    /// Take the lock and return a guard that releases it on drop.
    pub async fn acquire(&self) -> PaddedGuard<'_> {
        self.lock().await;
        PaddedGuard { mutex: self }
    }

    /// Start the cool-down; the lock opens once it elapses.
    ///
    /// Returns immediately. Must be called from within a Tokio runtime.
    ///
    /// # Panics
    /// Panics if the mutex is not locked, or if a previous release is still
    /// cooling down. Both indicate a caller bug.
    pub fn release(&self) {
        assert!(self.is_locked(), "padded mutex released before it was locked");
        if self
            .shared
            .cooling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("padded mutex released while a cool-down is already pending");
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(shared.period).await;
            let guard = shared.holder().take();
            shared.locked.store(false, Ordering::Release);
            shared.cooling.store(false, Ordering::Release);
            // Waiters can only get in once the flags are clear.
            drop(guard);
            tracing::debug!("padded mutex cool-down elapsed");
        });
    }
}

impl std::fmt::Debug for PaddedMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaddedMutex")
            .field("period", &self.shared.period)
            .field("locked", &self.is_locked())
            .field("cooling", &self.is_cooling_down())
            .finish()
    }
}

/// Holds a [`PaddedMutex`]; dropping it calls [`PaddedMutex::release`].
#[must_use = "dropping the guard starts the cool-down immediately"]
#[derive(Debug)]
pub struct PaddedGuard<'a> {
    mutex: &'a PaddedMutex,
}

impl Drop for PaddedGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
