//! Error types for the simulation runner binary.
//!
//! [`EngineError`] wraps every failure mode of a run so that `main` can
//! propagate with `?`.

/// Top-level error for the simulation runner.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: higherorder_dynamics::ConfigError,
    },

    /// Building the initial structure failed.
    #[error("structure error: {source}")]
    Structure {
        /// The underlying structure error.
        #[from]
        source: higherorder_structures::StructureError,
    },

    /// Building or running the model failed.
    #[error("dynamics error: {source}")]
    Dynamics {
        /// The underlying dynamics error.
        #[from]
        source: higherorder_dynamics::DynamicsError,
    },

    /// Serializing the run summary failed.
    #[error("summary error: {source}")]
    Summary {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
