//! Error types for BLE Mesh stack operations
//!
//! Every crate in the workspace reports failures through [`MeshError`]. Synchronous
//! failures (`Busy`, `InvalidArgument`, `TransportFailure`, `DispatchFailed`) are
//! returned to the caller; `Timeout` only ever travels inside an event.

use thiserror::Error;

use crate::address::Address;
use crate::opcode::Opcode;

/// Main error type for mesh stack operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    // ===== Caller Errors =====
    /// Argument rejected (unknown request opcode, bad role, malformed PDU)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A transaction to this destination is already outstanding
    #[error("Busy: request to {dst} still awaiting a response")]
    Busy {
        /// Destination with an outstanding transaction
        dst: Address,
    },

    /// Model index does not exist in the composition
    #[error("Unknown model: element {element}, index {index}")]
    UnknownModel {
        /// Element index
        element: u8,
        /// Model index within the element
        index: u8,
    },

    /// Operation not available on this model or transport
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // ===== Transport Errors =====
    /// Lower layers refused the hand-off
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// No response arrived before the transaction deadline
    #[error("Timeout waiting for response from {dst} to opcode {opcode}")]
    Timeout {
        /// Destination that did not answer
        dst: Address,
        /// Request opcode
        opcode: Opcode,
    },

    // ===== Bridge Errors =====
    /// Nested copy of a variable-length field failed
    #[error("Allocation failure copying {field} ({len} bytes)")]
    AllocationFailure {
        /// Field that could not be copied
        field: &'static str,
        /// Requested length
        len: usize,
    },

    /// Queue into the target context is full or closed
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    /// Reply channel dropped before an answer was sent
    #[error("Channel closed")]
    ChannelClosed,

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MeshError {
    /// Check if this error is recoverable/retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            MeshError::Busy { .. }
                | MeshError::TransportFailure(_)
                | MeshError::DispatchFailed(_)
        )
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            MeshError::InvalidArgument(_) => "INVALID_ARGUMENT",
            MeshError::Busy { .. } => "BUSY",
            MeshError::UnknownModel { .. } => "UNKNOWN_MODEL",
            MeshError::Unsupported(_) => "UNSUPPORTED",
            MeshError::TransportFailure(_) => "TRANSPORT_FAILURE",
            MeshError::Timeout { .. } => "TIMEOUT",
            MeshError::AllocationFailure { .. } => "ALLOCATION_FAILURE",
            MeshError::DispatchFailed(_) => "DISPATCH_FAILED",
            MeshError::ChannelClosed => "CHANNEL_CLOSED",
            MeshError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

/// Result type alias for mesh operations
pub type Result<T> = std::result::Result<T, MeshError>;
