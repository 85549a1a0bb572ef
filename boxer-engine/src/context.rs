//! Per-VM runtime context: the static descriptor plus its lifecycle state.

use std::sync::RwLock;

use boxer_core::{VmInfo, VmState};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct Status {
    state: VmState,
    updated_at: DateTime<Utc>,
}

/// One managed VM.
///
/// The pool creates exactly one context per configured VM and hands out
/// `Arc<VmContext>` references. Only the controller changes the state.
#[derive(Debug)]
pub struct VmContext {
    info: VmInfo,
    status: RwLock<Status>,
}

impl VmContext {
    /// Wrap a descriptor in a fresh context, initially `STOPPED`.
    #[must_use]
    pub fn new(info: VmInfo) -> Self {
        Self {
            info,
            status: RwLock::new(Status { state: VmState::default(), updated_at: Utc::now() }),
        }
    }

    /// Hypervisor-side machine name.
    #[must_use]
    pub fn machine(&self) -> &str {
        &self.info.name
    }

    /// Snapshot that `restore` rolls back to.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        &self.info.snapshot
    }

    /// Guest address.
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.info.ip
    }

    /// Guest operating system label.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.info.os
    }

    /// Group this VM belongs to.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.info.group
    }

    /// The descriptor this context was built from.
    #[must_use]
    pub fn info(&self) -> &VmInfo {
        &self.info
    }

    /// Current lifecycle state.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn state(&self) -> VmState {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let status = self.status.read().expect("vm context read lock poisoned");
        status.state
    }

    /// When the state last changed (or the context was created).
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let status = self.status.read().expect("vm context read lock poisoned");
        status.updated_at
    }

    pub(crate) fn set_state(&self, state: VmState) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut status = self.status.write().expect("vm context write lock poisoned");
        let previous = status.state;
        *status = Status { state, updated_at: Utc::now() };
        drop(status);
        tracing::debug!(machine = %self.info.name, from = %previous, to = %state, "state changed");
    }
}
