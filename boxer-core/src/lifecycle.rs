//! VM lifecycle states and the operations that move between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed VM.
///
/// Every VM starts in [`VmState::Stopped`]. [`VmState::Error`] is sticky: no
/// operation is accepted from it until an operator resolves the VM externally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmState {
    /// Powered off. Initial state.
    #[default]
    Stopped,
    /// Powered on.
    Running,
    /// A snapshot restore command is in progress.
    Restoring,
    /// The last command failed; requires external remediation.
    Error,
}

impl VmState {
    /// Upper-case name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
            Self::Restoring => "RESTORING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle operation that can be issued against a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Power the VM on.
    Start,
    /// Power the VM off.
    Stop,
    /// Restore the VM's configured snapshot.
    Restore,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Operation; 3] = [Self::Start, Self::Stop, Self::Restore];

    /// State the VM must be in before the operation may run.
    #[must_use]
    pub const fn required_state(self) -> VmState {
        match self {
            Self::Start | Self::Restore => VmState::Stopped,
            Self::Stop => VmState::Running,
        }
    }

    /// State the VM is left in after the command exits successfully.
    ///
    /// A restore passes through [`VmState::Restoring`] while the command runs
    /// and settles back to [`VmState::Stopped`]: restoring a snapshot does not
    /// power the machine on.
    #[must_use]
    pub const fn success_state(self) -> VmState {
        match self {
            Self::Start => VmState::Running,
            Self::Stop | Self::Restore => VmState::Stopped,
        }
    }

    /// State published while the command is running, if any.
    #[must_use]
    pub const fn transient_state(self) -> Option<VmState> {
        match self {
            Self::Restore => Some(VmState::Restoring),
            Self::Start | Self::Stop => None,
        }
    }

    /// Lower-case name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped() {
        assert_eq!(VmState::default(), VmState::Stopped);
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        assert_eq!(Operation::Start.required_state(), VmState::Stopped);
        assert_eq!(Operation::Start.success_state(), VmState::Running);
        assert_eq!(Operation::Stop.required_state(), VmState::Running);
        assert_eq!(Operation::Stop.success_state(), VmState::Stopped);
        assert_eq!(Operation::Restore.required_state(), VmState::Stopped);
        assert_eq!(Operation::Restore.success_state(), VmState::Stopped);
        assert_eq!(Operation::Restore.transient_state(), Some(VmState::Restoring));
    }

    #[test]
    fn no_operation_accepts_error_state() {
        for op in Operation::ALL {
            assert_ne!(op.required_state(), VmState::Error, "{op} must not run from ERROR");
        }
    }

    #[test]
    fn state_serializes_upper_case() {
        #[derive(Serialize)]
        struct Row {
            state: VmState,
        }
        let out = match toml::to_string(&Row { state: VmState::Restoring }) {
            Ok(s) => s,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert_eq!(out.trim(), "state = \"RESTORING\"");
    }
}
