//! Error types for the `higherorder-structures` crate.
//!
//! All fallible operations in this crate return [`StructureError`].

use crate::time_key::TimeKey;

/// Errors that can occur while building or querying a structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    /// Malformed construction input (bad dimensions, out-of-range cells,
    /// ragged arrays, unknown graph nodes).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Explanation of what is wrong with the input.
        reason: String,
    },

    /// An entity was not found in the structure.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// No entity carries the requested timestep key.
    #[error("time key not found: {0}")]
    TimeKeyNotFound(TimeKey),

    /// A timestep key string could not be split into base name and index.
    #[error("invalid time key: {0:?}")]
    InvalidTimeKey(String),

    /// A past timestep would be rewritten.
    #[error("time key {0} is already recorded")]
    TimeKeyAlreadyRecorded(TimeKey),

    /// The operation is intentionally not implemented.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in structure calculation")]
    ArithmeticOverflow,
}

impl StructureError {
    /// Shorthand for [`StructureError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Build an [`StructureError::EntityNotFound`] from any debuggable entity.
    pub fn entity_not_found(entity: &impl core::fmt::Debug) -> Self {
        Self::EntityNotFound(format!("{entity:?}"))
    }
}
