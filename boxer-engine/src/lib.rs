//! Runtime engine for the Boxer VM pool manager.
//!
//! Pools VM contexts into allocation groups under a global quota, drives
//! their lifecycle through hypervisor command templates, and serializes
//! those commands behind a cool-down lock.

#![warn(clippy::pedantic)]
#![warn(clippy::expect_used)]
#![deny(clippy::unwrap_used)]

pub mod compose;
pub mod context;
pub mod controller;
pub mod error;
pub mod padded;
pub mod promise;

pub use compose::{GroupStats, VmCompose};
pub use context::VmContext;
pub use controller::{build_argv, CommandController, VmController};
pub use error::EngineError;
pub use padded::{PaddedGuard, PaddedMutex};
pub use promise::{ProcessIo, Promise};
