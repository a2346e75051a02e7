//! The simulation driver.
//!
//! A [`Model`] owns a structure and a rule. Each [`Model::step`] reads the
//! state at the current timestep, optionally records the impacts of that
//! state, applies the rule, and writes the result as the next timestep. The
//! model is the structure's single writer for the duration of a run.
//!
//! Periodicity detection compares topology fingerprints of the nonzero state
//! after every step against all fingerprints seen so far. A repeat closes a
//! cycle; translated patterns (gliders) count as repeats because
//! fingerprints are translation-invariant.

use std::collections::BTreeMap;

use higherorder_structures::{StateMap, Structure, StructureError, TimeKey};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ModelConfig, StorageMode};
use crate::error::DynamicsError;
use crate::impacts::{ImpactFilter, ImpactMap, ImpactRule, general_impact};
use crate::rules::{Rule, RuleFilter, apply_rule};

/// Result of a single [`Model::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<E> {
    /// A new timestep was recorded.
    Advanced(StateMap<E>),
    /// A new timestep was recorded and every entity is 0; the model ended.
    Terminal(StateMap<E>),
    /// Nothing to do: the model had ended or the current key is absent.
    Ended,
}

impl<E> StepOutcome<E> {
    /// Return the new state, if a timestep was recorded.
    pub const fn state(&self) -> Option<&StateMap<E>> {
        match self {
            Self::Advanced(state) | Self::Terminal(state) => Some(state),
            Self::Ended => None,
        }
    }
}

/// Summary of [`Model::simulation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// Steps that recorded a new timestep.
    pub steps_run: u64,
    /// Whether the model ended before the requested step count.
    pub ended: bool,
    /// Key of the last recorded timestep.
    pub last_key: TimeKey,
}

/// How [`Model::simulate_till_periodicity`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PeriodicityOutcome {
    /// The fingerprint at `first_seen + period` equals the one at
    /// `first_seen`.
    Cycle {
        /// Index of the earlier occurrence.
        first_seen: u64,
        /// Steps between the two occurrences.
        period: u64,
    },
    /// The model ended (all entities 0, or no state to read).
    Ended,
    /// `max_steps` were taken without a repeat.
    Exhausted,
}

/// Summary of [`Model::simulate_till_periodicity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodicityReport {
    /// Why the run stopped.
    pub outcome: PeriodicityOutcome,
    /// Steps taken during this call.
    pub steps_run: u64,
    /// Key of the last recorded timestep.
    pub last_key: TimeKey,
}

/// Drives a rule over a structure, one timestep at a time.
pub struct Model<S: Structure, R> {
    structure: S,
    rule: R,
    impact_rule: Option<Box<dyn ImpactRule<S::Entity>>>,
    config: ModelConfig,
    time_step: u64,
    impacts: BTreeMap<TimeKey, ImpactMap<S::Entity>>,
    ended: bool,
}

impl<S, R> Model<S, R>
where
    S: Structure,
    R: Rule<S::Entity>,
{
    /// Create a model starting at `config.initial_time_step`, or at the last
    /// recorded index of `config.base_name` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`DynamicsError::Unsupported`] for sparse storage combined
    /// with `only_state_change`, and [`DynamicsError::Structure`] if no
    /// start index is given and the series was never recorded.
    pub fn new(structure: S, rule: R, config: ModelConfig) -> Result<Self, DynamicsError> {
        if config.storage == StorageMode::Sparse && config.only_state_change {
            return Err(DynamicsError::Unsupported {
                operation: "only_state_change with sparse storage".to_owned(),
            });
        }
        let time_step = match config.initial_time_step {
            Some(index) => index,
            None => structure
                .store()
                .last_iteration(&config.base_name)
                .ok_or_else(|| {
                    StructureError::TimeKeyNotFound(TimeKey::new(config.base_name.clone(), 0))
                })?,
        };

        Ok(Self {
            structure,
            rule,
            impact_rule: None,
            config,
            time_step,
            impacts: BTreeMap::new(),
            ended: false,
        })
    }

    /// Attach an impact classifier. Impacts are recorded only when
    /// `record_impacts` is set in the config.
    #[must_use]
    pub fn with_impacts(mut self, impact_rule: impl ImpactRule<S::Entity> + 'static) -> Self {
        self.impact_rule = Some(Box::new(impact_rule));
        self
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    /// Return the structure.
    pub const fn structure(&self) -> &S {
        &self.structure
    }

    /// Consume the model and return the structure with its history.
    pub fn into_structure(self) -> S {
        self.structure
    }

    /// Return the rule.
    pub const fn rule(&self) -> &R {
        &self.rule
    }

    /// Return the model configuration.
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Return the current timestep index.
    pub const fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Return the key of the current timestep.
    pub fn current_key(&self) -> TimeKey {
        TimeKey::new(self.config.base_name.clone(), self.time_step)
    }

    /// Whether the model reached a terminal state.
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Return every recorded impact map, keyed by the timestep it describes.
    pub const fn impacts(&self) -> &BTreeMap<TimeKey, ImpactMap<S::Entity>> {
        &self.impacts
    }

    // -------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------

    /// Advance one timestep.
    ///
    /// Returns [`StepOutcome::Ended`] without error when the model already
    /// ended or the current key has no recorded state.
    ///
    /// # Errors
    ///
    /// Propagates rule errors and structure errors from recording the new
    /// timestep.
    pub fn step(&mut self) -> Result<StepOutcome<S::Entity>, DynamicsError> {
        if self.ended {
            return Ok(StepOutcome::Ended);
        }
        let key = self.current_key();
        if !self.structure.store().has_time_key(&key) {
            debug!(key = %key, "no state recorded, nothing to step");
            return Ok(StepOutcome::Ended);
        }

        let state = self.structure.time_slice(&key, false, true)?;
        let lut = self.structure.connections_lut();

        let impacts = match &self.impact_rule {
            Some(impact_rule) if self.config.record_impacts => Some(general_impact(
                impact_rule.as_ref(),
                &state,
                &lut,
                self.config.impacts_active_only,
            )),
            _ => None,
        };

        let sparse = self.config.storage == StorageMode::Sparse;
        let next = apply_rule(
            &self.rule,
            &state,
            &lut,
            RuleFilter {
                only_nonzero: sparse,
                only_state_change: false,
            },
        )?;
        let next_key = key.next()?;
        self.structure.store_mut().record_time_slice(&next_key, &next)?;
        if let Some(impacts) = impacts {
            debug!(key = %key, impacts = impacts.len(), "impacts recorded");
            self.impacts.insert(key.clone(), impacts);
        }
        self.time_step = next_key.index();

        let live = next.values().filter(|v| **v != 0).count();
        debug!(key = %next_key, live, "step recorded");

        let returned = if self.config.only_state_change {
            next.into_iter()
                .filter(|(entity, value)| state.get(entity).is_some_and(|previous| previous != value))
                .collect()
        } else {
            next
        };

        if live == 0 {
            self.ended = true;
            info!(key = %next_key, "terminal state reached");
            return Ok(StepOutcome::Terminal(returned));
        }
        Ok(StepOutcome::Advanced(returned))
    }

    /// Step up to `steps` times, stopping early if the model ends.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Model::step`].
    pub fn simulation(&mut self, steps: u64) -> Result<SimulationReport, DynamicsError> {
        let mut steps_run: u64 = 0;
        let mut ended = false;
        for _ in 0..steps {
            match self.step()? {
                StepOutcome::Advanced(_) => steps_run = steps_run.saturating_add(1),
                StepOutcome::Terminal(_) => {
                    steps_run = steps_run.saturating_add(1);
                    ended = true;
                    break;
                }
                StepOutcome::Ended => {
                    ended = true;
                    break;
                }
            }
        }
        info!(steps_run, ended, key = %self.current_key(), "simulation finished");
        Ok(SimulationReport {
            steps_run,
            ended,
            last_key: self.current_key(),
        })
    }

    /// Step until the nonzero state repeats a previously seen fingerprint,
    /// the model ends, or `max_steps` are taken.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Model::step`] and fingerprinting.
    pub fn simulate_till_periodicity(
        &mut self,
        max_steps: u64,
    ) -> Result<PeriodicityReport, DynamicsError> {
        let start = self.time_step;
        let start_key = self.current_key();
        if self.ended || !self.structure.store().has_time_key(&start_key) {
            return Ok(self.periodicity_report(PeriodicityOutcome::Ended, 0));
        }

        let mut seen: Vec<S::Fingerprint> = vec![self.structure.topology_at(&start_key, true)?];
        let mut steps_run: u64 = 0;
        while steps_run < max_steps {
            match self.step()? {
                StepOutcome::Advanced(_) => {}
                StepOutcome::Terminal(_) => {
                    steps_run = steps_run.saturating_add(1);
                    return Ok(self.periodicity_report(PeriodicityOutcome::Ended, steps_run));
                }
                StepOutcome::Ended => {
                    return Ok(self.periodicity_report(PeriodicityOutcome::Ended, steps_run));
                }
            }
            steps_run = steps_run.saturating_add(1);

            let fingerprint = self.structure.topology_at(&self.current_key(), true)?;
            if let Some(position) = seen.iter().position(|previous| *previous == fingerprint) {
                let position = u64::try_from(position).unwrap_or(u64::MAX);
                let first_seen = start.saturating_add(position);
                let period = self.time_step.saturating_sub(first_seen);
                info!(first_seen, period, key = %self.current_key(), "periodicity detected");
                return Ok(self.periodicity_report(
                    PeriodicityOutcome::Cycle { first_seen, period },
                    steps_run,
                ));
            }
            seen.push(fingerprint);
        }

        info!(max_steps, key = %self.current_key(), "no periodicity within step limit");
        Ok(self.periodicity_report(PeriodicityOutcome::Exhausted, steps_run))
    }

    fn periodicity_report(&self, outcome: PeriodicityOutcome, steps_run: u64) -> PeriodicityReport {
        PeriodicityReport {
            outcome,
            steps_run,
            last_key: self.current_key(),
        }
    }

    // -------------------------------------------------------------------
    // Impacts
    // -------------------------------------------------------------------

    /// Return the filtered impacts recorded for `key`, or for the latest
    /// recorded timestep when `key` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DynamicsError::ImpactNotFound`] if nothing was recorded for
    /// the requested timestep.
    pub fn get_impact(
        &self,
        key: Option<&TimeKey>,
        filter: ImpactFilter,
    ) -> Result<ImpactMap<S::Entity>, DynamicsError> {
        let impacts = match key {
            Some(key) => self
                .impacts
                .get(key)
                .ok_or_else(|| DynamicsError::ImpactNotFound(key.clone()))?,
            None => self
                .impacts
                .range(TimeKey::new(self.config.base_name.clone(), 0)..)
                .take_while(|(k, _)| k.is_in_series(&self.config.base_name))
                .last()
                .map(|(_, impacts)| impacts)
                .ok_or_else(|| DynamicsError::ImpactNotFound(self.current_key()))?,
        };
        Ok(filter.apply(impacts))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use higherorder_structures::{Cell, Graph, Grid, GridOptions, Lut};

    use super::*;
    use crate::impacts::{GameOfLifeImpact, ImpactKind, ImpactLabel};
    use crate::rules::{LifeLike, OperationsInSequence, SequenceStep};

    fn grid(side: u32, live: &[(u32, u32)]) -> Grid {
        Grid::with_live_cells(
            live.iter().map(|&(x, y)| Cell::new(x, y)),
            GridOptions::sized(side, side),
        )
        .unwrap()
    }

    fn life(structure: Grid, config: ModelConfig) -> Model<Grid, LifeLike> {
        Model::new(structure, LifeLike::game_of_life(), config)
            .unwrap()
            .with_impacts(GameOfLifeImpact)
    }

    #[test]
    fn lone_cell_reaches_terminal_state() {
        let mut model = life(grid(5, &[(2, 2)]), ModelConfig::default());
        let outcome = model.step().unwrap();
        assert!(matches!(outcome, StepOutcome::Terminal(_)));
        assert!(model.is_ended());
        assert_eq!(model.time_step(), 1);
        assert_eq!(model.step().unwrap(), StepOutcome::Ended);
        assert_eq!(model.time_step(), 1);
    }

    #[test]
    fn step_records_next_timestep() {
        let mut model = life(grid(5, &[(1, 2), (2, 2), (3, 2)]), ModelConfig::default());
        let outcome = model.step().unwrap();
        assert!(matches!(outcome, StepOutcome::Advanced(_)));
        assert_eq!(outcome.state().map(StateMap::len), Some(25));
        let recorded = model.structure().time_slice(&TimeKey::at(1), true, false).unwrap();
        let live: Vec<Cell> = recorded.into_keys().collect();
        assert_eq!(live, vec![Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3)]);
        assert_eq!(model.structure().store().last_iteration("t_"), Some(1));
    }

    #[test]
    fn missing_start_key_is_nothing_to_do() {
        let config = ModelConfig {
            initial_time_step: Some(7),
            ..ModelConfig::default()
        };
        let mut model = life(grid(4, &[(1, 1)]), config);
        assert_eq!(model.step().unwrap(), StepOutcome::Ended);
        assert!(!model.is_ended());
    }

    #[test]
    fn sparse_with_state_change_is_unsupported() {
        let config = ModelConfig {
            storage: StorageMode::Sparse,
            only_state_change: true,
            ..ModelConfig::default()
        };
        let result = Model::new(grid(4, &[]), LifeLike::game_of_life(), config);
        assert!(matches!(result, Err(DynamicsError::Unsupported { .. })));
    }

    #[test]
    fn sparse_storage_writes_nonzero_only() {
        let config = ModelConfig {
            storage: StorageMode::Sparse,
            ..ModelConfig::default()
        };
        let mut model = life(grid(5, &[(1, 2), (2, 2), (3, 2)]), config);
        model.simulation(2).unwrap();
        let entities = model.structure().get_entities();
        let at_one = entities.values().filter(|h| h.contains_key(&TimeKey::at(1))).count();
        assert_eq!(at_one, 3);
        let full = model.structure().time_slice(&TimeKey::at(2), false, true).unwrap();
        assert_eq!(full.len(), 25);
        assert_eq!(full.values().sum::<i64>(), 3);
    }

    #[test]
    fn only_state_change_returns_delta() {
        let config = ModelConfig {
            only_state_change: true,
            ..ModelConfig::default()
        };
        let mut model = life(grid(5, &[(1, 2), (2, 2), (3, 2)]), config);
        let outcome = model.step().unwrap();
        assert_eq!(outcome.state().map(StateMap::len), Some(4));
        // The structure still stores the full next state.
        let stored = model.structure().time_slice(&TimeKey::at(1), false, false).unwrap();
        assert_eq!(stored.len(), 25);
    }

    #[test]
    fn simulation_stops_when_ended() {
        let mut model = life(grid(5, &[(0, 0), (3, 3)]), ModelConfig::default());
        let report = model.simulation(10).unwrap();
        assert_eq!(report.steps_run, 1);
        assert!(report.ended);
        assert_eq!(report.last_key, TimeKey::at(1));
    }

    #[test]
    fn impacts_recorded_per_step() {
        let mut model = life(grid(5, &[(1, 2), (2, 2), (3, 2)]), ModelConfig::default());
        model.simulation(2).unwrap();
        assert_eq!(
            model.impacts().keys().cloned().collect::<Vec<_>>(),
            vec![TimeKey::at(0), TimeKey::at(1)]
        );
        let latest = model.get_impact(None, ImpactFilter::default()).unwrap();
        assert_eq!(latest, model.impacts()[&TimeKey::at(1)]);
        let first = model.get_impact(Some(&TimeKey::at(0)), ImpactFilter::default()).unwrap();
        let live = [Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)];
        assert!(!first.is_empty());
        assert!(first.keys().all(|(source, _)| live.contains(source)));
    }

    #[test]
    fn blinker_has_no_kill_impacts() {
        let mut model = life(grid(5, &[(1, 2), (2, 2), (3, 2)]), ModelConfig::default());
        model.step().unwrap();
        let kills = model
            .get_impact(
                Some(&TimeKey::at(0)),
                ImpactFilter {
                    kind: ImpactKind::Label(ImpactLabel::Kill),
                    redundancy_only: false,
                },
            )
            .unwrap();
        assert!(kills.is_empty());
    }

    #[test]
    fn unknown_impact_key_fails() {
        let model = life(grid(4, &[(1, 1)]), ModelConfig::default());
        assert!(matches!(
            model.get_impact(None, ImpactFilter::default()),
            Err(DynamicsError::ImpactNotFound(_))
        ));
        assert!(matches!(
            model.get_impact(Some(&TimeKey::at(3)), ImpactFilter::default()),
            Err(DynamicsError::ImpactNotFound(_))
        ));
    }

    #[test]
    fn impacts_not_recorded_when_disabled() {
        let config = ModelConfig {
            record_impacts: false,
            ..ModelConfig::default()
        };
        let mut model = life(grid(5, &[(1, 2), (2, 2), (3, 2)]), config);
        model.step().unwrap();
        assert!(model.impacts().is_empty());
    }

    #[test]
    fn closure_rule_on_graph() {
        // Each node takes the maximum over itself and its neighbors.
        let spread = |state: &StateMap<u32>, lut: &Lut<u32>| -> StateMap<u32> {
            state
                .iter()
                .map(|(node, &own)| {
                    let best = lut
                        .get(node)
                        .into_iter()
                        .flatten()
                        .filter_map(|n| state.get(n).copied())
                        .fold(own, i64::max);
                    (*node, best)
                })
                .collect()
        };
        let values = [(1, 1)].into_iter().collect();
        let graph = Graph::new([1_u32, 2, 3, 4], vec![(1, 2), (2, 3), (3, 4)], &values, Default::default())
            .unwrap();
        let mut model = Model::new(graph, spread, ModelConfig::default()).unwrap();
        model.simulation(3).unwrap();
        let last = model.structure().time_slice(&TimeKey::at(3), true, false).unwrap();
        assert_eq!(last.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn failed_step_records_no_impacts() {
        // Star around node 2, all alive: leaves impact the hub.
        let values = [(1, 1), (2, 1), (3, 1), (4, 1)].into_iter().collect();
        let graph = Graph::new([1_u32, 2, 3, 4], vec![(1, 2), (2, 3), (2, 4)], &values, Default::default())
            .unwrap();
        let state = graph.time_slice(&TimeKey::at(0), false, true).unwrap();
        assert!(!general_impact(&GameOfLifeImpact, &state, &graph.connections_lut(), true).is_empty());

        let rule = OperationsInSequence::new(vec![SequenceStep::new(1_u32, 9)]);
        let mut model = Model::new(graph, rule, ModelConfig::default())
            .unwrap()
            .with_impacts(GameOfLifeImpact);
        assert!(matches!(model.step(), Err(DynamicsError::MissingEntity(_))));
        assert!(model.impacts().is_empty());
        assert_eq!(model.time_step(), 0);
        assert!(!model.structure().store().has_time_key(&TimeKey::at(1)));
    }

    #[test]
    fn block_is_periodic_after_one_step() {
        let mut model = life(grid(6, &[(2, 2), (3, 2), (2, 3), (3, 3)]), ModelConfig::default());
        let report = model.simulate_till_periodicity(10).unwrap();
        assert_eq!(
            report.outcome,
            PeriodicityOutcome::Cycle {
                first_seen: 0,
                period: 1
            }
        );
        assert_eq!(report.steps_run, 1);
    }

    #[test]
    fn periodicity_reports_exhaustion() {
        let mut model = life(grid(10, &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]), ModelConfig::default());
        let report = model.simulate_till_periodicity(2).unwrap();
        assert_eq!(report.outcome, PeriodicityOutcome::Exhausted);
        assert_eq!(report.last_key, TimeKey::at(2));
    }

    #[test]
    fn periodicity_on_dying_pattern_ends() {
        let mut model = life(grid(6, &[(0, 0), (3, 3)]), ModelConfig::default());
        let report = model.simulate_till_periodicity(10).unwrap();
        assert_eq!(report.outcome, PeriodicityOutcome::Ended);
        assert_eq!(report.steps_run, 1);
    }
}
