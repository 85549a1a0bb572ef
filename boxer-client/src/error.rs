//! Error types for the client crate.

use boxer_core::CoreError;
use boxer_engine::EngineError;

use crate::request::ReturnCode;

/// Errors returned by [`crate::BoxerClient`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    /// An error propagated from the pool or the controller.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// No VM could be handed out: the group is exhausted or the global quota is reached.
    #[error("no VM available in group '{group}'")]
    Full { group: String },

    /// The box is not currently allocated through this client.
    #[error("box {group}:{machine} is not allocated")]
    NotAllocated { group: String, machine: String },

    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// The response code a caller should see for this error.
    #[must_use]
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Self::Full { .. } => ReturnCode::Full,
            Self::NotAllocated { .. } => ReturnCode::NotFound,
            Self::InvalidRequest(_)
            | Self::Config(_)
            | Self::Engine(EngineError::InvalidArgument(_) | EngineError::InvalidState { .. }) => {
                ReturnCode::InvalidRequest
            }
            Self::Engine(_) => ReturnCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use boxer_core::{Operation, VmState};

    use super::*;

    #[test]
    fn client_errors_map_to_return_codes() {
        let full = ClientError::Full { group: "g1".to_owned() };
        assert_eq!(full.return_code(), ReturnCode::Full);

        let missing =
            ClientError::NotAllocated { group: "g1".to_owned(), machine: "vm1".to_owned() };
        assert_eq!(missing.return_code(), ReturnCode::NotFound);

        let bad = ClientError::InvalidRequest("empty group".to_owned());
        assert_eq!(bad.return_code(), ReturnCode::InvalidRequest);
    }

    #[test]
    fn engine_errors_split_between_caller_and_internal() {
        let wrong_state = ClientError::Engine(EngineError::InvalidState {
            operation: Operation::Stop,
            machine: "vm1".to_owned(),
            current: VmState::Stopped,
            expected: VmState::Running,
        });
        assert_eq!(wrong_state.return_code(), ReturnCode::InvalidRequest);

        let failed = ClientError::Engine(EngineError::System {
            operation: Operation::Start,
            machine: "vm1".to_owned(),
            reason: "command exited with code 1".to_owned(),
        });
        assert_eq!(
            failed.return_code(),
            ReturnCode::InternalError,
            "command failures are internal"
        );
    }

    #[test]
    fn not_allocated_display_names_the_box() {
        let err = ClientError::NotAllocated { group: "g1".to_owned(), machine: "vm1".to_owned() };
        assert!(err.to_string().contains("g1:vm1"), "Display must include the box key");
    }
}
