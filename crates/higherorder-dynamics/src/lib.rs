//! Transition rules, impact classification, and the simulation model.
//!
//! # Modules
//!
//! - [`config`] -- Typed YAML configuration for runs.
//! - [`error`] -- Error types for rule and model operations.
//! - [`impacts`] -- [`ImpactRule`] trait, Game of Life impact labels, and
//!   impact filters.
//! - [`model`] -- [`Model`]: stepping, simulation runs, periodicity
//!   detection, impact queries.
//! - [`rules`] -- [`Rule`] trait, Life-like threshold rules, sequence and
//!   shift rules, and the filtering rule engine.

pub mod config;
pub mod error;
pub mod impacts;
pub mod model;
pub mod rules;

// Re-export primary types at crate root.
pub use config::{
    ConfigError, GridConfig, LoggingConfig, ModelConfig, PatternConfig, Preset, RuleConfig,
    RunConfig, SimulationConfig, StorageMode,
};
pub use error::DynamicsError;
pub use impacts::{
    GameOfLifeImpact, ImpactFilter, ImpactKind, ImpactLabel, ImpactMap, ImpactRule,
    general_impact,
};
pub use model::{Model, PeriodicityOutcome, PeriodicityReport, SimulationReport, StepOutcome};
pub use rules::{
    LifeLike, Operation, OperationsInSequence, Rule, RuleFilter, SequenceStep, ShiftRule,
    apply_rule, apply_rule_at, live_neighbour_count,
};
