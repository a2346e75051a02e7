//! Simulation runner binary for the Higherorder simulator.
//!
//! Wires the structures, dynamics, and analysis crates together: loads
//! configuration, seeds a grid, drives a life-like rule over it, and reports
//! periodicity plus the most self-contained group of the last recorded
//! impacts.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `HIGHERORDER_CONFIG` or `higherorder-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the grid and place the initial pattern
//! 4. Build the model with Game of Life impact classification
//! 5. Run until periodic, ended, or out of steps
//! 6. Analyse the last impacts and log a JSON summary

mod error;

use std::collections::BTreeSet;
use std::path::PathBuf;

use higherorder_analysis::{
    GroupRatio, GroupStrength, find_self_controlling_group, group_impact_strength,
    impact_group_ratio,
};
use higherorder_dynamics::{
    GameOfLifeImpact, ImpactFilter, LifeLike, LoggingConfig, Model, PatternConfig,
    PeriodicityOutcome, SimulationConfig,
};
use higherorder_structures::{
    Cell, Grid, InitialValues, KeyName, Structure, TimeKey, blobs, random_blob,
};
use rand::SeedableRng as _;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Environment variable naming an alternative config file.
const CONFIG_ENV: &str = "HIGHERORDER_CONFIG";

/// Config file looked up in the working directory.
const CONFIG_FILE: &str = "higherorder-config.yaml";

/// Final report of a run, logged as one JSON document.
#[derive(Debug, Serialize)]
struct RunSummary {
    rule: String,
    width: u32,
    height: u32,
    initial_live_cells: usize,
    initial_components: usize,
    outcome: PeriodicityOutcome,
    steps_run: u64,
    last_key: TimeKey,
    final_live_cells: usize,
    group: Option<GroupSummary>,
}

/// Self-controlling group found in the last recorded impacts.
#[derive(Debug, Serialize)]
struct GroupSummary {
    impacts_at: TimeKey,
    impact_count: usize,
    members: Vec<Cell>,
    strength: GroupStrength,
    ratio: GroupRatio,
}

fn main() -> Result<(), EngineError> {
    let (config, source) = load_config()?;
    init_logging(&config.logging)?;

    info!("higherorder-engine starting");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }

    let summary = run(&config)?;
    let document = serde_json::to_string(&summary)?;
    info!(summary = %document, "run summary");
    info!("higherorder-engine shutdown complete");
    Ok(())
}

/// Load the run configuration.
///
/// `HIGHERORDER_CONFIG` wins when set; otherwise `higherorder-config.yaml`
/// is read from the working directory if present.
fn load_config() -> Result<(SimulationConfig, Option<PathBuf>), EngineError> {
    let path = match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => {
            let path = PathBuf::from(CONFIG_FILE);
            if !path.exists() {
                return Ok((SimulationConfig::default(), None));
            }
            path
        }
    };
    let config = SimulationConfig::from_file(&path)?;
    Ok((config, Some(path)))
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let installed = if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: format!("{e}"),
    })
}

/// Execute one configured run and assemble its summary.
fn run(config: &SimulationConfig) -> Result<RunSummary, EngineError> {
    let grid = build_grid(config)?;
    let start_key = grid.store().initial_key_name();
    let initial = grid.store().nonzero_entities(&start_key);
    let initial_components = blobs(&initial, &grid.store().connections_lut()).len();
    info!(
        width = grid.width(),
        height = grid.height(),
        periodic = grid.periodic_boundary(),
        live_cells = initial.len(),
        components = initial_components,
        "Initial grid built"
    );

    let rule: LifeLike = config.rule.build()?;
    let notation = rule.notation();
    let mut model = Model::new(grid, rule, config.model.clone())?.with_impacts(GameOfLifeImpact);
    info!(rule = %notation, start = %model.current_key(), "Model built, entering step loop");

    let (outcome, steps_run, last_key) = if config.run.until_periodic {
        let report = model.simulate_till_periodicity(config.run.max_steps)?;
        (report.outcome, report.steps_run, report.last_key)
    } else {
        let report = model.simulation(config.run.max_steps)?;
        let outcome = if report.ended {
            PeriodicityOutcome::Ended
        } else {
            PeriodicityOutcome::Exhausted
        };
        (outcome, report.steps_run, report.last_key)
    };

    let group = analyse_group(&model, config.run.min_group_size)?;
    let final_live_cells = model.structure().store().nonzero_entities(&last_key).len();

    Ok(RunSummary {
        rule: notation,
        width: model.structure().width(),
        height: model.structure().height(),
        initial_live_cells: initial.len(),
        initial_components,
        outcome,
        steps_run,
        last_key,
        final_live_cells,
        group,
    })
}

/// Build the configured grid with the initial pattern in place.
fn build_grid(config: &SimulationConfig) -> Result<Grid, EngineError> {
    let key_name = KeyName {
        base_name: config.model.base_name.clone(),
        index: config.model.initial_time_step.unwrap_or(0),
    };
    let options = config.grid.options().key_name(key_name);

    let grid = match &config.pattern {
        PatternConfig::Preset { name, origin } => {
            Grid::with_live_cells(name.cells(Cell::from(*origin)), options)?
        }
        PatternConfig::Cells { cells } => {
            Grid::with_live_cells(cells.iter().copied().map(Cell::from), options)?
        }
        PatternConfig::RandomBlob { size, seed } => {
            let mut grid = Grid::new(InitialValues::Empty, options)?;
            let key = grid.store().initial_key_name();
            let mut rng = SmallRng::seed_from_u64(*seed);
            let placed = random_blob(&mut grid, *size, &key, &mut rng)?;
            info!(size = placed.len(), seed = *seed, "Random blob placed");
            grid
        }
    };
    Ok(grid)
}

/// Find the self-controlling group of the latest recorded impacts.
///
/// Returns `None` when no impacts were recorded or the last map is empty.
fn analyse_group(
    model: &Model<Grid, LifeLike>,
    min_group_size: usize,
) -> Result<Option<GroupSummary>, EngineError> {
    let Some(impacts_at) = model.impacts().keys().next_back().cloned() else {
        warn!("No impacts recorded, skipping group analysis");
        return Ok(None);
    };
    let impacts = model.get_impact(Some(&impacts_at), ImpactFilter::default())?;
    if impacts.is_empty() {
        info!(key = %impacts_at, "Last impact map is empty, skipping group analysis");
        return Ok(None);
    }

    let nodes: Vec<Cell> = model.structure().store().entity_ids().copied().collect();
    let Some(found) = find_self_controlling_group(&impacts, &nodes, min_group_size) else {
        return Ok(None);
    };
    let members: BTreeSet<Cell> = found.members.iter().copied().collect();
    let ratio = impact_group_ratio(&impacts, &members);
    let strength = group_impact_strength(&impacts, &members, nodes.len());
    info!(
        key = %impacts_at,
        size = members.len(),
        normalized = strength.normalized,
        ratio = ratio.ratio,
        "Self-controlling group found"
    );

    Ok(Some(GroupSummary {
        impacts_at,
        impact_count: impacts.len(),
        members: found.members,
        strength,
        ratio,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use super::*;

    fn parse(yaml: &str) -> SimulationConfig {
        SimulationConfig::parse(yaml).unwrap()
    }

    #[test]
    fn default_run_finds_glider_period() {
        let summary = run(&SimulationConfig::default()).unwrap();
        assert_eq!(
            summary.outcome,
            PeriodicityOutcome::Cycle { first_seen: 0, period: 4 }
        );
        assert_eq!(summary.initial_live_cells, 5);
        assert_eq!(summary.initial_components, 1);
        assert_eq!(summary.final_live_cells, 5);
        let group = summary.group.unwrap();
        assert!(group.members.len() >= 3);
        assert_eq!(group.impacts_at, TimeKey::at(3));
    }

    #[test]
    fn random_blob_pattern_is_connected() {
        let config = parse(
            "grid:\n  width: 8\n  height: 8\npattern:\n  kind: random_blob\n  size: 6\n  seed: 9\nrun:\n  max_steps: 3\n  until_periodic: false\n",
        );
        let grid = build_grid(&config).unwrap();
        let start = grid.store().nonzero_entities(&TimeKey::at(0));
        assert_eq!(start.len(), 6);
        assert_eq!(blobs(&start, &grid.store().connections_lut()).len(), 1);
    }

    #[test]
    fn custom_series_and_start_index() {
        let config = parse(
            "pattern:\n  kind: cells\n  cells: [[1, 2], [2, 2], [3, 2]]\nmodel:\n  base_name: s_\n  initial_time_step: 5\nrun:\n  max_steps: 4\n",
        );
        let summary = run(&config).unwrap();
        assert_eq!(
            summary.outcome,
            PeriodicityOutcome::Cycle { first_seen: 5, period: 2 }
        );
        assert_eq!(summary.last_key, TimeKey::new("s_", 7));
    }

    #[test]
    fn dying_pattern_ends() {
        let config = parse("pattern:\n  kind: cells\n  cells: [[4, 4]]\n");
        let summary = run(&config).unwrap();
        assert_eq!(summary.outcome, PeriodicityOutcome::Ended);
        assert_eq!(summary.final_live_cells, 0);
    }

    #[test]
    fn bad_notation_is_a_dynamics_error() {
        let config = parse("rule:\n  notation: nonsense\n");
        assert!(matches!(run(&config), Err(EngineError::Dynamics { .. })));
    }

    #[test]
    fn missing_config_path_is_an_error() {
        let result = SimulationConfig::from_file(Path::new("/nonexistent/higherorder-config.yaml"))
            .map_err(EngineError::from);
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }
}
