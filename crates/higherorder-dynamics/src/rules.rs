//! Transition rules and the rule engine.
//!
//! A [`Rule`] maps the full current state to the next state in one call. It
//! sees only the state and the neighbor lookup table, never the structure's
//! history, so the same rule drives grids and graphs alike. Plain closures
//! of the right shape are rules too.
//!
//! [`apply_rule`] wraps a rule with the two output filters the model needs:
//! dropping zero values (sparse output) and dropping unchanged values.

use std::collections::BTreeSet;

use higherorder_structures::{Cell, Entity, GridGeometry, Lut, StateMap, Structure, TimeKey, Value};
use serde::{Deserialize, Serialize};

use crate::error::DynamicsError;

/// A transition function over a whole state.
///
/// Implementations must be pure: the output depends only on `state` and
/// `lut`.
pub trait Rule<E: Entity> {
    /// Compute the next value of every entity.
    ///
    /// # Errors
    ///
    /// Returns a [`DynamicsError`] if the rule cannot be applied to this
    /// state (for example a sequence step naming an absent entity).
    fn apply(&self, state: &StateMap<E>, lut: &Lut<E>) -> Result<StateMap<E>, DynamicsError>;
}

impl<E, F> Rule<E> for F
where
    E: Entity,
    F: Fn(&StateMap<E>, &Lut<E>) -> StateMap<E>,
{
    fn apply(&self, state: &StateMap<E>, lut: &Lut<E>) -> Result<StateMap<E>, DynamicsError> {
        Ok(self(state, lut))
    }
}

/// Number of neighbors of `entity` that are alive (value > 0) in `state`.
///
/// Neighbors absent from `state` count as dead.
pub fn live_neighbour_count<E: Entity>(entity: &E, state: &StateMap<E>, lut: &Lut<E>) -> usize {
    lut.get(entity).map_or(0, |neighbours| {
        neighbours
            .iter()
            .filter(|n| state.get(*n).is_some_and(|&v| v > 0))
            .count()
    })
}

// ---------------------------------------------------------------------------
// Threshold rules
// ---------------------------------------------------------------------------

/// Outer-totalistic birth/survival rule on binarized states.
///
/// A dead entity (value <= 0) becomes 1 when its live-neighbor count is in
/// `birth`; a live entity stays 1 when its count is in `survival`. All other
/// entities become 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeLike {
    /// Live-neighbor counts that bring a dead entity to life.
    pub birth: BTreeSet<usize>,
    /// Live-neighbor counts that keep a live entity alive.
    pub survival: BTreeSet<usize>,
}

impl LifeLike {
    /// Conway's Game of Life, `B3/S23`.
    pub fn game_of_life() -> Self {
        Self {
            birth: BTreeSet::from([3]),
            survival: BTreeSet::from([2, 3]),
        }
    }

    /// Parse birth/survival notation such as `B36/S23`.
    ///
    /// # Errors
    ///
    /// Returns [`DynamicsError::InvalidConfig`] if the notation is not of the
    /// form `B<digits>/S<digits>`.
    pub fn from_notation(notation: &str) -> Result<Self, DynamicsError> {
        let invalid = || DynamicsError::InvalidConfig {
            reason: format!("rule notation {notation:?} is not of the form B<digits>/S<digits>"),
        };
        let (birth, survival) = notation.trim().split_once('/').ok_or_else(invalid)?;
        let birth = birth
            .strip_prefix(['B', 'b'])
            .and_then(parse_counts)
            .ok_or_else(invalid)?;
        let survival = survival
            .strip_prefix(['S', 's'])
            .and_then(parse_counts)
            .ok_or_else(invalid)?;
        Ok(Self { birth, survival })
    }

    /// Render the rule in `B.../S...` notation.
    pub fn notation(&self) -> String {
        let digits = |set: &BTreeSet<usize>| set.iter().map(ToString::to_string).collect::<String>();
        format!("B{}/S{}", digits(&self.birth), digits(&self.survival))
    }
}

impl Default for LifeLike {
    fn default() -> Self {
        Self::game_of_life()
    }
}

fn parse_counts(digits: &str) -> Option<BTreeSet<usize>> {
    digits
        .chars()
        .map(|c| c.to_digit(10).and_then(|d| usize::try_from(d).ok()))
        .collect()
}

impl<E: Entity> Rule<E> for LifeLike {
    fn apply(&self, state: &StateMap<E>, lut: &Lut<E>) -> Result<StateMap<E>, DynamicsError> {
        Ok(state
            .iter()
            .map(|(entity, &value)| {
                let live = live_neighbour_count(entity, state, lut);
                let next = if value > 0 {
                    self.survival.contains(&live)
                } else {
                    self.birth.contains(&live)
                };
                (entity.clone(), Value::from(next))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Sequence of operations
// ---------------------------------------------------------------------------

/// A pairwise operation from a source entity to a target entity.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// `target = source`.
    Copy,
    /// `source = target`.
    CopyFrom,
    /// `target += source` (saturating).
    Add,
    /// `target -= source` (saturating).
    Subtract,
    /// `target = source`, then `source = 0`.
    Replace,
    /// Exchange the two values.
    Swap,
    /// `(source, target) = f(source, target)`.
    Custom(fn(Value, Value) -> (Value, Value)),
}

/// One step of an [`OperationsInSequence`] rule.
#[derive(Debug, Clone)]
pub struct SequenceStep<E> {
    /// Entity the operation reads from.
    pub source: E,
    /// Entity the operation writes to.
    pub target: E,
    /// Operation to apply; `None` uses the rule's default.
    pub operation: Option<Operation>,
}

impl<E> SequenceStep<E> {
    /// A step that uses the rule's default operation.
    pub const fn new(source: E, target: E) -> Self {
        Self {
            source,
            target,
            operation: None,
        }
    }

    /// A step with an explicit operation.
    pub const fn with(source: E, target: E, operation: Operation) -> Self {
        Self {
            source,
            target,
            operation: Some(operation),
        }
    }
}

/// Applies pairwise operations one after another on a copy of the state.
///
/// Later steps see the results of earlier ones. Entities not touched by any
/// step keep their value.
#[derive(Debug, Clone)]
pub struct OperationsInSequence<E> {
    /// Steps in application order.
    pub sequence: Vec<SequenceStep<E>>,
    /// Operation for steps that do not name one.
    pub default_operation: Operation,
}

impl<E> OperationsInSequence<E> {
    /// Create a sequence rule whose unlabelled steps copy.
    pub const fn new(sequence: Vec<SequenceStep<E>>) -> Self {
        Self {
            sequence,
            default_operation: Operation::Copy,
        }
    }
}

impl<E: Entity> Rule<E> for OperationsInSequence<E> {
    fn apply(&self, state: &StateMap<E>, _lut: &Lut<E>) -> Result<StateMap<E>, DynamicsError> {
        let mut next = state.clone();
        for step in &self.sequence {
            let source = *next
                .get(&step.source)
                .ok_or_else(|| DynamicsError::missing_entity(&step.source))?;
            let target = *next
                .get(&step.target)
                .ok_or_else(|| DynamicsError::missing_entity(&step.target))?;

            let (new_source, new_target) = match step.operation.unwrap_or(self.default_operation) {
                Operation::Copy => (source, source),
                Operation::CopyFrom => (target, target),
                Operation::Add => (source, target.saturating_add(source)),
                Operation::Subtract => (source, target.saturating_sub(source)),
                Operation::Replace => (0, source),
                Operation::Swap => (target, source),
                Operation::Custom(f) => f(source, target),
            };
            next.insert(step.source.clone(), new_source);
            next.insert(step.target.clone(), new_target);
        }
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Shift
// ---------------------------------------------------------------------------

/// Grid rule where every cell copies the cell one row below (`x + 1`).
///
/// Rows are indexed by `x`, matching [`InitialValues::Array`]. Without a
/// periodic boundary the last row receives 0.
///
/// [`InitialValues::Array`]: higherorder_structures::InitialValues::Array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftRule {
    geometry: GridGeometry,
}

impl ShiftRule {
    /// Build a shift rule for a grid with the given geometry.
    pub const fn new(geometry: GridGeometry) -> Self {
        Self { geometry }
    }

    /// Build a shift rule matching `grid`.
    pub const fn for_grid(grid: &higherorder_structures::Grid) -> Self {
        Self::new(grid.grid_geometry())
    }
}

impl Rule<Cell> for ShiftRule {
    fn apply(&self, state: &StateMap<Cell>, _lut: &Lut<Cell>) -> Result<StateMap<Cell>, DynamicsError> {
        Ok(state
            .keys()
            .map(|&cell| {
                let value = self
                    .geometry
                    .offset(cell, 1, 0)
                    .and_then(|below| state.get(&below).copied())
                    .unwrap_or(0);
                (cell, value)
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Output filters for [`apply_rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Keep only nonzero values.
    pub only_nonzero: bool,
    /// Keep only entities whose value differs from the input state.
    pub only_state_change: bool,
}

/// Apply `rule` to `state` and filter the result.
///
/// With `only_state_change`, entities absent from `state` are dropped as
/// well, since they have no previous value to differ from.
///
/// # Errors
///
/// Propagates the rule's error.
pub fn apply_rule<E, R>(
    rule: &R,
    state: &StateMap<E>,
    lut: &Lut<E>,
    filter: RuleFilter,
) -> Result<StateMap<E>, DynamicsError>
where
    E: Entity,
    R: Rule<E> + ?Sized,
{
    let mut next = rule.apply(state, lut)?;
    if filter.only_nonzero {
        next.retain(|_, value| *value != 0);
    }
    if filter.only_state_change {
        next.retain(|entity, value| state.get(entity).is_some_and(|previous| previous != value));
    }
    Ok(next)
}

/// Apply `rule` to the recorded state of `structure` at `key`.
///
/// Entities without a value at `key` are read as 0.
///
/// # Errors
///
/// Returns [`DynamicsError::Structure`] if `key` was never recorded, or
/// propagates the rule's error.
pub fn apply_rule_at<S, R>(
    rule: &R,
    structure: &S,
    key: &TimeKey,
    filter: RuleFilter,
) -> Result<StateMap<S::Entity>, DynamicsError>
where
    S: Structure,
    R: Rule<S::Entity> + ?Sized,
{
    let state = structure.time_slice(key, false, true)?;
    apply_rule(rule, &state, &structure.connections_lut(), filter)
}
