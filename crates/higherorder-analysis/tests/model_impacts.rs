//! Integration tests: group analysis over impacts recorded by a running
//! model.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;

use higherorder_analysis::{find_self_controlling_group, group_impact_strength, impact_group_ratio};
use higherorder_dynamics::{GameOfLifeImpact, LifeLike, Model, ModelConfig, Preset};
use higherorder_structures::{Cell, Grid, GridOptions, Structure};

fn glider_model() -> Model<Grid, LifeLike> {
    let grid = Grid::with_live_cells(Preset::Glider.cells(Cell::new(2, 2)), GridOptions::sized(12, 12))
        .unwrap();
    Model::new(grid, LifeLike::game_of_life(), ModelConfig::default())
        .unwrap()
        .with_impacts(GameOfLifeImpact)
}

#[test]
fn impacts_stay_near_the_glider() {
    let mut model = glider_model();
    model.simulation(1).unwrap();
    let impacts = model.impacts().values().next().unwrap();

    let nodes: Vec<Cell> = model.structure().store().entity_ids().copied().collect();
    let everything: BTreeSet<Cell> = nodes.iter().copied().collect();
    let ratio = impact_group_ratio(impacts, &everything);
    assert_eq!(ratio.between_count, impacts.len());

    let whole = group_impact_strength(impacts, &everything, nodes.len());
    assert!((whole.expected - 1.0).abs() < 1e-12);
    assert!((whole.normalized - whole.strength).abs() < 1e-12);
}

#[test]
fn self_controlling_group_starts_from_busiest_cell() {
    let mut model = glider_model();
    model.simulation(1).unwrap();
    let impacts = model.impacts().values().next().unwrap();
    let nodes: Vec<Cell> = model.structure().store().entity_ids().copied().collect();

    let found = find_self_controlling_group(impacts, &nodes, 3).unwrap();
    assert!(found.members.len() >= 3);
    let unique: BTreeSet<&Cell> = found.members.iter().collect();
    assert_eq!(unique.len(), found.members.len());
    let seed = found.members.first().unwrap();
    assert!(impacts.keys().any(|(source, target)| source == seed || target == seed));
}
