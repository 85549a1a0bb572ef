//! Core types for the Boxer VM pool manager.
//!
//! Defines the VM descriptor, the lifecycle state and operation model, and the
//! TOML configuration with its validation rules.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod sample;

pub use config::{BoxerConfig, ControlPolicy, VmControl, MACHINE_PLACEHOLDER, SNAPSHOT_PLACEHOLDER};
pub use descriptor::VmInfo;
pub use error::CoreError;
pub use lifecycle::{Operation, VmState};
