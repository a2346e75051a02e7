//! Error types for the `higherorder-dynamics` crate.

use higherorder_structures::{StructureError, TimeKey};

/// Errors that can occur while applying rules or driving a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DynamicsError {
    /// A structure query failed.
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// A rule referenced an entity that is not in the state it was given.
    #[error("entity missing from state: {0}")]
    MissingEntity(String),

    /// The requested combination of options is not implemented.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },

    /// No impacts were recorded for the requested timestep.
    #[error("no impacts recorded for {0}")]
    ImpactNotFound(TimeKey),

    /// A rule or model was configured with invalid parameters.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl DynamicsError {
    /// Build a [`DynamicsError::MissingEntity`] from any debuggable entity.
    pub fn missing_entity(entity: &impl core::fmt::Debug) -> Self {
        Self::MissingEntity(format!("{entity:?}"))
    }
}
