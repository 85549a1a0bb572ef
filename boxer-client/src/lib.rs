//! Client facade for the Boxer VM pool manager.
//!
//! [`BoxerClient`] ties a [`boxer_engine::VmCompose`] pool to a
//! [`boxer_engine::VmController`]: callers allocate a box from a group, run
//! start/stop/restore requests against it, and free it when done.

#![warn(clippy::pedantic)]
#![warn(clippy::expect_used)]
#![deny(clippy::unwrap_used)]

pub mod client;
pub mod error;
pub mod request;

pub use client::BoxerClient;
pub use error::ClientError;
pub use request::{BoxInfo, BoxerOp, BoxerRequest, BoxerResponse, ReturnCode};
