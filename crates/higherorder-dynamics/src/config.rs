//! Configuration loading and typed config structures for Higherorder runs.
//!
//! The canonical configuration lives in `higherorder-config.yaml` at the
//! project root. Every field has a default, so an empty document is a valid
//! configuration: a Game of Life glider on a 32x32 torus.

use std::path::Path;

use higherorder_structures::{Cell, DEFAULT_BASE_NAME, GridOptions};
use serde::Deserialize;

use crate::error::DynamicsError;
use crate::rules::LifeLike;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level run configuration.
///
/// Mirrors the structure of `higherorder-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Grid dimensions and neighborhood.
    #[serde(default)]
    pub grid: GridConfig,

    /// Initial pattern.
    #[serde(default)]
    pub pattern: PatternConfig,

    /// Transition rule.
    #[serde(default)]
    pub rule: RuleConfig,

    /// Model bookkeeping options.
    #[serde(default)]
    pub model: ModelConfig,

    /// Run length and analysis options.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// Number of columns.
    #[serde(default = "default_grid_side")]
    pub width: u32,

    /// Number of rows.
    #[serde(default = "default_grid_side")]
    pub height: u32,

    /// Wrap around as a torus.
    #[serde(default = "default_true")]
    pub periodic_boundary: bool,

    /// Include diagonal neighbors.
    #[serde(default = "default_true")]
    pub diagonal_neighbours: bool,
}

impl GridConfig {
    /// Grid construction options for this configuration.
    pub fn options(&self) -> GridOptions {
        GridOptions::sized(self.width, self.height)
            .periodic(self.periodic_boundary)
            .diagonal(self.diagonal_neighbours)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_side(),
            height: default_grid_side(),
            periodic_boundary: true,
            diagonal_neighbours: true,
        }
    }
}

/// Well-known Game of Life patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// 2x2 still life.
    Block,
    /// Period-2 oscillator, three cells in a row.
    Blinker,
    /// Period-4 spaceship moving one cell diagonally.
    Glider,
}

impl Preset {
    /// Live-cell offsets relative to the pattern's top-left corner.
    pub const fn offsets(self) -> &'static [(u32, u32)] {
        match self {
            Self::Block => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Self::Blinker => &[(0, 0), (1, 0), (2, 0)],
            Self::Glider => &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
        }
    }

    /// Live cells with the top-left corner at `origin`.
    pub fn cells(self, origin: Cell) -> Vec<Cell> {
        self.offsets()
            .iter()
            .map(|&(dx, dy)| Cell::new(origin.x.saturating_add(dx), origin.y.saturating_add(dy)))
            .collect()
    }
}

/// Initial pattern configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternConfig {
    /// A named pattern placed at `origin`.
    Preset {
        /// Which pattern.
        name: Preset,
        /// Top-left corner.
        #[serde(default = "default_origin")]
        origin: (u32, u32),
    },
    /// Explicit live cells.
    Cells {
        /// Live cell coordinates.
        cells: Vec<(u32, u32)>,
    },
    /// One connected blob grown from a seeded RNG.
    RandomBlob {
        /// Number of live cells.
        size: usize,
        /// RNG seed.
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self::Preset {
            name: Preset::Glider,
            origin: default_origin(),
        }
    }
}

/// Rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleConfig {
    /// Birth/survival notation, e.g. `B3/S23`.
    #[serde(default = "default_notation")]
    pub notation: String,
}

impl RuleConfig {
    /// Build the configured rule.
    ///
    /// # Errors
    ///
    /// Returns [`DynamicsError::InvalidConfig`] for malformed notation.
    pub fn build(&self) -> Result<LifeLike, DynamicsError> {
        LifeLike::from_notation(&self.notation)
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            notation: default_notation(),
        }
    }
}

/// How the model writes new timesteps into the structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Every entity gets a value at every step.
    #[default]
    Full,
    /// Only nonzero values are written; missing values read as 0.
    Sparse,
}

/// Model bookkeeping options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    /// Series the model reads and writes.
    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Index to start from; defaults to the series' last recorded index.
    #[serde(default)]
    pub initial_time_step: Option<u64>,

    /// Classify and keep impacts at every step.
    #[serde(default = "default_true")]
    pub record_impacts: bool,

    /// Only live entities originate impact edges.
    #[serde(default = "default_true")]
    pub impacts_active_only: bool,

    /// Full or sparse storage of new steps.
    #[serde(default)]
    pub storage: StorageMode,

    /// `step()` returns only the entities whose value changed.
    #[serde(default)]
    pub only_state_change: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            initial_time_step: None,
            record_impacts: true,
            impacts_active_only: true,
            storage: StorageMode::Full,
            only_state_change: false,
        }
    }
}

/// Run length and analysis options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Upper bound on simulated steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Stop as soon as a state repeats.
    #[serde(default = "default_true")]
    pub until_periodic: bool,

    /// Minimum size of the self-controlling group search.
    #[serde(default = "default_min_group_size")]
    pub min_group_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            until_periodic: true,
            min_group_size: default_min_group_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_grid_side() -> u32 {
    32
}

const fn default_true() -> bool {
    true
}

const fn default_origin() -> (u32, u32) {
    (1, 1)
}

const fn default_seed() -> u64 {
    42
}

fn default_notation() -> String {
    "B3/S23".to_owned()
}

fn default_base_name() -> String {
    DEFAULT_BASE_NAME.to_owned()
}

const fn default_max_steps() -> u64 {
    200
}

const fn default_min_group_size() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(SimulationConfig::parse("").unwrap(), SimulationConfig::default());
        let config = SimulationConfig::default();
        assert_eq!(config.grid.width, 32);
        assert_eq!(config.rule.build().unwrap(), LifeLike::game_of_life());
        assert_eq!(config.model.storage, StorageMode::Full);
        assert_eq!(config.run.max_steps, 200);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
grid:
  width: 12
  height: 9
  periodic_boundary: false
  diagonal_neighbours: true

pattern:
  kind: random_blob
  size: 7
  seed: 5

rule:
  notation: B36/S23

model:
  base_name: s_
  initial_time_step: 3
  record_impacts: false
  impacts_active_only: false
  storage: sparse
  only_state_change: false

run:
  max_steps: 50
  until_periodic: false
  min_group_size: 4

logging:
  level: debug
  json: true
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!((config.grid.width, config.grid.height), (12, 9));
        assert!(!config.grid.options().periodic_boundary);
        assert_eq!(config.pattern, PatternConfig::RandomBlob { size: 7, seed: 5 });
        assert_eq!(config.rule.build().unwrap().notation(), "B36/S23");
        assert_eq!(config.model.base_name, "s_");
        assert_eq!(config.model.initial_time_step, Some(3));
        assert_eq!(config.model.storage, StorageMode::Sparse);
        assert_eq!(config.run.min_group_size, 4);
        assert!(config.logging.json);
    }

    #[test]
    fn preset_pattern_with_default_origin() {
        let config = SimulationConfig::parse("pattern:\n  kind: preset\n  name: blinker\n").unwrap();
        assert_eq!(
            config.pattern,
            PatternConfig::Preset { name: Preset::Blinker, origin: (1, 1) }
        );
        assert_eq!(
            Preset::Blinker.cells(Cell::new(1, 1)),
            vec![Cell::new(1, 1), Cell::new(2, 1), Cell::new(3, 1)]
        );
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = SimulationConfig::parse("grid: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = SimulationConfig::from_file(Path::new("/nonexistent/higherorder-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
