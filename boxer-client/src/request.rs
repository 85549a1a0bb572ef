//! Request and response types exchanged with [`crate::BoxerClient`].

use std::fmt;

use boxer_core::{Operation, VmState};
use boxer_engine::VmContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation a caller asks to run on an allocated box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoxerOp {
    /// Power the VM on.
    Start,
    /// Power the VM off.
    Stop,
    /// Restore the VM's snapshot.
    Restore,
}

impl From<BoxerOp> for Operation {
    fn from(op: BoxerOp) -> Self {
        match op {
            BoxerOp::Start => Operation::Start,
            BoxerOp::Stop => Operation::Stop,
            BoxerOp::Restore => Operation::Restore,
        }
    }
}

impl fmt::Display for BoxerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Operation::from(*self).as_str())
    }
}

/// Outcome code carried by a [`BoxerResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCode {
    /// The operation completed.
    Success,
    /// A command failed, timed out, or the pool hit an internal fault.
    InternalError,
    /// The box is not allocated through this client.
    NotFound,
    /// The request was malformed or the VM was in the wrong state.
    InvalidRequest,
    /// No VM could be handed out.
    Full,
}

impl ReturnCode {
    /// Wire name of the code, e.g. `INVALID_REQUEST`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Full => "FULL",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of an allocated box.
///
/// Boxes are identified by `(group, machine)`; the other fields are a
/// snapshot taken when the value was produced and are not kept in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxInfo {
    /// Group the box was allocated from.
    pub group: String,
    /// Hypervisor-side machine name.
    pub machine: String,
    /// Guest address.
    pub ip: String,
    /// Guest operating system label.
    pub os: String,
    /// Lifecycle state when the snapshot was taken.
    pub state: VmState,
    /// When `state` last changed.
    pub updated_at: DateTime<Utc>,
}

impl BoxInfo {
    /// Key under which the client tracks this box: `group:machine`.
    #[must_use]
    pub fn key(&self) -> String {
        box_key(&self.group, &self.machine)
    }
}

impl From<&VmContext> for BoxInfo {
    fn from(ctx: &VmContext) -> Self {
        Self {
            group: ctx.group().to_owned(),
            machine: ctx.machine().to_owned(),
            ip: ctx.ip().to_owned(),
            os: ctx.os().to_owned(),
            state: ctx.state(),
            updated_at: ctx.updated_at(),
        }
    }
}

pub(crate) fn box_key(group: &str, machine: &str) -> String {
    format!("{group}:{machine}")
}

/// A request to run `op` on `box_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxerRequest {
    /// Operation to run.
    pub op: BoxerOp,
    /// Target box; only `group` and `machine` are used to find it.
    pub box_info: BoxInfo,
}

impl BoxerRequest {
    /// Build a request to run `op` on `box_info`.
    #[must_use]
    pub fn new(op: BoxerOp, box_info: BoxInfo) -> Self {
        Self { op, box_info }
    }
}

/// Result of a [`BoxerRequest`] with the box's state afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxerResponse {
    /// Outcome of the request.
    pub code: ReturnCode,
    /// The box as it stands after the operation.
    pub box_info: BoxInfo,
}
