//! Rectangular cell grids.
//!
//! A [`Grid`] has `width × height` cells addressed by [`Cell`] coordinates
//! `x in [0, width)`, `y in [0, height)`. Cells are connected to their
//! orthogonal neighbors (von Neumann neighborhood) and optionally their
//! diagonal neighbors (Moore neighborhood). With a periodic boundary the grid
//! wraps around as a torus.
//!
//! # Narrow dimensions
//!
//! On a periodic grid with a dimension of size 1 or 2, the `+1` and `-1`
//! offsets land on the same cell (or on the cell itself). Connections are
//! collected as a set of unordered pairs and self-pairs are dropped, so such
//! grids carry no duplicate edges and no cell neighbors itself.
//!
//! # Topology fingerprints
//!
//! Each component is recentered on its centroid and the offsets are rounded
//! to [`FINGERPRINT_PRECISION`] decimal places. Offsets are computed as
//! `(n·x − Σx) / n` from integer coordinates, so translating a pattern never
//! changes its fingerprint. On periodic grids a component straddling the
//! seam is first unwrapped by walking it along neighbor offsets.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::components::blobs;
use crate::error::StructureError;
use crate::store::EntityStore;
use crate::structure::{Structure, StructureType};
use crate::time_key::KeyName;
use crate::{StateMap, Value};

/// Decimal places kept in topology fingerprint offsets.
pub const FINGERPRINT_PRECISION: u32 = 7;

/// Orthogonal neighbor offsets.
const VON_NEUMANN: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Orthogonal and diagonal neighbor offsets.
const MOORE: [(i64, i64); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// A grid cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl Cell {
    /// Create a cell coordinate.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(u32, u32)> for Cell {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

/// Grid dimensions and neighborhood flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Number of columns (x range).
    pub width: u32,
    /// Number of rows (y range).
    pub height: u32,
    /// Whether the grid wraps around as a torus.
    pub periodic_boundary: bool,
    /// Whether diagonal cells are neighbors (Moore neighborhood).
    pub diagonal_neighbours: bool,
}

impl GridGeometry {
    /// Neighbor offsets for this geometry.
    pub const fn stencil(&self) -> &'static [(i64, i64)] {
        if self.diagonal_neighbours {
            &MOORE
        } else {
            &VON_NEUMANN
        }
    }

    /// Move `cell` by `(dx, dy)`, wrapping on periodic grids.
    ///
    /// Returns `None` when the move leaves a non-periodic grid.
    pub fn offset(&self, cell: Cell, dx: i64, dy: i64) -> Option<Cell> {
        let x = shift(cell.x, dx, self.width, self.periodic_boundary)?;
        let y = shift(cell.y, dy, self.height, self.periodic_boundary)?;
        Some(Cell { x, y })
    }

    /// Whether `cell` lies inside the grid.
    pub const fn contains(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }
}

fn shift(coord: u32, delta: i64, size: u32, periodic: bool) -> Option<u32> {
    let moved = i64::from(coord).checked_add(delta)?;
    if periodic {
        let size = i64::from(size);
        if size == 0 {
            return None;
        }
        u32::try_from(moved.rem_euclid(size)).ok()
    } else {
        u32::try_from(moved).ok().filter(|&m| m < size)
    }
}

/// Initial cell values for [`Grid::new`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitialValues {
    /// All cells start at 0; width and height must be given.
    #[default]
    Empty,
    /// Dense values, indexed `array[x][y]`. Dimensions default to the
    /// array's shape.
    Array(Vec<Vec<Value>>),
    /// Sparse values. Dimensions default to the largest coordinates + 1.
    Cells(BTreeMap<Cell, Value>),
}

/// Construction options for a [`Grid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridOptions {
    /// Explicit width; inferred from the initial values when `None`.
    pub width: Option<u32>,
    /// Explicit height; inferred from the initial values when `None`.
    pub height: Option<u32>,
    /// Wrap around as a torus.
    pub periodic_boundary: bool,
    /// Include diagonal neighbors.
    pub diagonal_neighbours: bool,
    /// Naming scheme of the initial series.
    pub key_name: KeyName,
}

impl GridOptions {
    /// Options with explicit dimensions and default flags.
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Set the periodic boundary flag.
    #[must_use]
    pub fn periodic(mut self, periodic_boundary: bool) -> Self {
        self.periodic_boundary = periodic_boundary;
        self
    }

    /// Set the diagonal neighbor flag.
    #[must_use]
    pub fn diagonal(mut self, diagonal_neighbours: bool) -> Self {
        self.diagonal_neighbours = diagonal_neighbours;
        self
    }

    /// Set the timestep naming scheme.
    #[must_use]
    pub fn key_name(mut self, key_name: KeyName) -> Self {
        self.key_name = key_name;
        self
    }
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            periodic_boundary: true,
            diagonal_neighbours: true,
            key_name: KeyName::default(),
        }
    }
}

/// One recentered cell of a topology fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset {
    /// Column offset from the component centroid.
    pub dx: Decimal,
    /// Row offset from the component centroid.
    pub dy: Decimal,
}

/// Translation-invariant encoding of a grid state's components.
///
/// Offsets within a component are sorted, and components are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridTopology(pub Vec<Vec<Offset>>);

impl GridTopology {
    /// Return the recentered components.
    pub fn components(&self) -> &[Vec<Offset>] {
        &self.0
    }

    /// Whether the state had no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether fingerprints should also be normalized for rotation/reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Compare shapes as they lie on the grid.
    #[default]
    Preserve,
    /// Compare shapes up to rotation and reflection.
    Normalize,
}

/// A rectangular cell grid with time-indexed cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    store: EntityStore<Cell>,
    geometry: GridGeometry,
}

impl Grid {
    /// Build a grid from initial values and options.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::InvalidArgument`] when dimensions are zero
    /// or missing, when explicit dimensions are smaller than the initial
    /// values require, or when an array is empty or ragged.
    pub fn new(initial: InitialValues, options: GridOptions) -> Result<Self, StructureError> {
        let (values, width, height) = resolve_initial_values(initial, options.width, options.height)?;
        if width == 0 || height == 0 {
            return Err(StructureError::invalid(format!(
                "grid dimensions must be positive, got {width}x{height}"
            )));
        }

        let geometry = GridGeometry {
            width,
            height,
            periodic_boundary: options.periodic_boundary,
            diagonal_neighbours: options.diagonal_neighbours,
        };

        let mut initial_values = BTreeMap::new();
        for x in 0..width {
            for y in 0..height {
                initial_values.insert(Cell { x, y }, 0);
            }
        }
        for (cell, value) in values {
            if !geometry.contains(cell) {
                return Err(StructureError::invalid(format!(
                    "initial value for {cell} is not in the {width}x{height} grid"
                )));
            }
            initial_values.insert(cell, value);
        }

        let connections = build_connections(&geometry);
        let store = EntityStore::new(initial_values, connections, options.key_name)?;
        Ok(Self { store, geometry })
    }

    /// Build a grid whose listed cells start at 1 and all others at 0.
    ///
    /// # Errors
    ///
    /// Same as [`Grid::new`].
    pub fn with_live_cells(
        cells: impl IntoIterator<Item = Cell>,
        options: GridOptions,
    ) -> Result<Self, StructureError> {
        let values: BTreeMap<Cell, Value> = cells.into_iter().map(|cell| (cell, 1)).collect();
        if values.is_empty() {
            return Self::new(InitialValues::Empty, options);
        }
        Self::new(InitialValues::Cells(values), options)
    }

    /// Return the number of columns.
    pub const fn width(&self) -> u32 {
        self.geometry.width
    }

    /// Return the number of rows.
    pub const fn height(&self) -> u32 {
        self.geometry.height
    }

    /// Whether the grid wraps around.
    pub const fn periodic_boundary(&self) -> bool {
        self.geometry.periodic_boundary
    }

    /// Whether diagonal cells are neighbors.
    pub const fn diagonal_neighbours(&self) -> bool {
        self.geometry.diagonal_neighbours
    }

    /// Return the grid geometry.
    pub const fn grid_geometry(&self) -> GridGeometry {
        self.geometry
    }

    /// Fingerprint the components of `state`, optionally normalizing
    /// orientation.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::Unsupported`] for [`Orientation::Normalize`].
    pub fn oriented_topology(
        &self,
        state: &StateMap<Cell>,
        orientation: Orientation,
    ) -> Result<GridTopology, StructureError> {
        if orientation == Orientation::Normalize {
            return Err(StructureError::Unsupported {
                operation: "orientation normalization of topology fingerprints".to_owned(),
            });
        }
        Ok(self.translation_topology(state))
    }

    /// Recentered components of `state`, sorted.
    fn translation_topology(&self, state: &StateMap<Cell>) -> GridTopology {
        let components = blobs(state, &self.store.connections_lut());
        let mut canonical: Vec<Vec<Offset>> =
            components.iter().map(|component| self.recenter(component)).collect();
        canonical.sort();
        GridTopology(canonical)
    }

    /// Coordinates of `component` with periodic seams removed.
    fn unwrap_component(&self, component: &[Cell]) -> Vec<(i64, i64)> {
        let raw = |cell: Cell| (i64::from(cell.x), i64::from(cell.y));
        if !self.geometry.periodic_boundary {
            return component.iter().copied().map(raw).collect();
        }

        let members: BTreeSet<Cell> = component.iter().copied().collect();
        let mut placed: BTreeMap<Cell, (i64, i64)> = BTreeMap::new();
        let mut queue = VecDeque::new();
        if let Some(&first) = component.first() {
            placed.insert(first, raw(first));
            queue.push_back(first);
        }

        while let Some(cell) = queue.pop_front() {
            let Some(&(ux, uy)) = placed.get(&cell) else {
                continue;
            };
            for &(dx, dy) in self.geometry.stencil() {
                let Some(neighbour) = self.geometry.offset(cell, dx, dy) else {
                    continue;
                };
                if members.contains(&neighbour) && !placed.contains_key(&neighbour) {
                    placed.insert(neighbour, (ux.saturating_add(dx), uy.saturating_add(dy)));
                    queue.push_back(neighbour);
                }
            }
        }

        component
            .iter()
            .map(|cell| placed.get(cell).copied().unwrap_or_else(|| raw(*cell)))
            .collect()
    }

    /// Recenter a component on its centroid and sort its offsets.
    fn recenter(&self, component: &[Cell]) -> Vec<Offset> {
        let coords = self.unwrap_component(component);
        let count = i64::try_from(coords.len()).unwrap_or(i64::MAX);
        let sum_x = coords.iter().fold(0_i64, |acc, &(x, _)| acc.saturating_add(x));
        let sum_y = coords.iter().fold(0_i64, |acc, &(_, y)| acc.saturating_add(y));

        let mut offsets: Vec<Offset> = coords
            .iter()
            .map(|&(x, y)| Offset {
                dx: centroid_offset(x, sum_x, count),
                dy: centroid_offset(y, sum_y, count),
            })
            .collect();
        offsets.sort();
        offsets
    }
}

/// `(n·coord − Σ) / n`, rounded to [`FINGERPRINT_PRECISION`] places.
fn centroid_offset(coord: i64, sum: i64, count: i64) -> Decimal {
    let numerator = coord.saturating_mul(count).saturating_sub(sum);
    Decimal::from(numerator)
        .checked_div(Decimal::from(count))
        .unwrap_or(Decimal::ZERO)
        .round_dp(FINGERPRINT_PRECISION)
}

fn resolve_initial_values(
    initial: InitialValues,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<(Vec<(Cell, Value)>, u32, u32), StructureError> {
    match initial {
        InitialValues::Empty => match (width, height) {
            (Some(width), Some(height)) => Ok((Vec::new(), width, height)),
            _ => Err(StructureError::invalid(
                "either initial values or both width and height must be provided",
            )),
        },
        InitialValues::Array(rows) => {
            let columns = rows.first().map(Vec::len).unwrap_or_default();
            if columns == 0 {
                return Err(StructureError::invalid("initial value array is empty"));
            }
            if rows.iter().any(|row| row.len() != columns) {
                return Err(StructureError::invalid("initial value array is ragged"));
            }
            let array_width = to_dimension(rows.len())?;
            let array_height = to_dimension(columns)?;
            let width = fit_dimension("width", width, array_width)?;
            let height = fit_dimension("height", height, array_height)?;

            let mut values = Vec::new();
            for (x, row) in (0_u32..).zip(rows) {
                for (y, value) in (0_u32..).zip(row) {
                    values.push((Cell { x, y }, value));
                }
            }
            Ok((values, width, height))
        }
        InitialValues::Cells(cells) => {
            let max_x = cells.keys().map(|c| c.x).max();
            let max_y = cells.keys().map(|c| c.y).max();
            let (Some(max_x), Some(max_y)) = (max_x, max_y) else {
                return resolve_initial_values(InitialValues::Empty, width, height);
            };
            let needed_width = max_x.checked_add(1).ok_or(StructureError::ArithmeticOverflow)?;
            let needed_height = max_y.checked_add(1).ok_or(StructureError::ArithmeticOverflow)?;
            let width = fit_dimension("width", width, needed_width)?;
            let height = fit_dimension("height", height, needed_height)?;
            Ok((cells.into_iter().collect(), width, height))
        }
    }
}

fn to_dimension(len: usize) -> Result<u32, StructureError> {
    u32::try_from(len).map_err(|_err| StructureError::invalid(format!("dimension {len} exceeds u32")))
}

fn fit_dimension(name: &str, explicit: Option<u32>, needed: u32) -> Result<u32, StructureError> {
    match explicit {
        None => Ok(needed),
        Some(given) if given < needed => Err(StructureError::invalid(format!(
            "{name} {given} is smaller than the {needed} required by the initial values"
        ))),
        Some(given) => Ok(given),
    }
}

/// Collect every unordered neighbor pair once, skipping self-pairs.
fn build_connections(geometry: &GridGeometry) -> Vec<(Cell, Cell)> {
    let mut pairs: BTreeSet<(Cell, Cell)> = BTreeSet::new();
    for x in 0..geometry.width {
        for y in 0..geometry.height {
            let cell = Cell { x, y };
            for &(dx, dy) in geometry.stencil() {
                let Some(neighbour) = geometry.offset(cell, dx, dy) else {
                    continue;
                };
                if neighbour != cell {
                    pairs.insert((cell.min(neighbour), cell.max(neighbour)));
                }
            }
        }
    }
    pairs.into_iter().collect()
}

impl Structure for Grid {
    type Entity = Cell;
    type Fingerprint = GridTopology;

    fn store(&self) -> &EntityStore<Cell> {
        &self.store
    }

    fn store_mut(&mut self) -> &mut EntityStore<Cell> {
        &mut self.store
    }

    fn structure_type(&self) -> StructureType {
        StructureType::Grid
    }

    fn topology_representation(&self, state: &StateMap<Cell>) -> GridTopology {
        self.translation_topology(state)
    }

    fn geometry(&self) -> Option<GridGeometry> {
        Some(self.geometry)
    }
}
