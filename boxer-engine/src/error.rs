//! Error types for the engine crate.

use std::time::Duration;

use boxer_core::{Operation, VmState};

/// Errors that can occur while pooling or driving VMs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Malformed or unknown caller input: an unknown group, an empty command
    /// after substitution, or freeing a handle that is not allocated.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not permitted from the VM's current state.
    #[error("cannot {operation} VM {machine}: state is {current}, expected {expected}")]
    InvalidState {
        operation: Operation,
        machine: String,
        current: VmState,
        expected: VmState,
    },

    /// Misuse of a process handle, e.g. waiting twice or before launch.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The hypervisor command failed to launch, failed while running, or
    /// exited unsuccessfully.
    #[error("{operation} failed for VM {machine}: {reason}")]
    System {
        operation: Operation,
        machine: String,
        reason: String,
    },

    /// The hypervisor command outlived the policy timeout and was killed.
    #[error("{operation} timed out for VM {machine} after {}s", timeout.as_secs())]
    Timeout {
        operation: Operation,
        machine: String,
        timeout: Duration,
    },

    /// A pool bookkeeping invariant was violated. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying process I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
