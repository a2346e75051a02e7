//! Seeded pattern generation.
//!
//! The RNG is always passed in, so the same seed reproduces the same
//! pattern and nothing touches global random state.

use rand::Rng;
use tracing::debug;

use crate::error::StructureError;
use crate::grid::{Cell, Grid};
use crate::structure::Structure;
use crate::time_key::TimeKey;

/// Grow one connected blob of `size` live cells on `grid` at `key`.
///
/// The first cell is drawn uniformly from all cells. Each further cell is
/// drawn uniformly from the blob's external neighbors, so the blob stays
/// connected. Chosen cells are set to 1; other cells are left untouched.
/// Returns the chosen cells in the order they were added.
///
/// # Errors
///
/// Returns [`StructureError::InvalidArgument`] if `size` exceeds the cell
/// count or the blob runs out of room to grow, and
/// [`StructureError::TimeKeyNotFound`] if `key` was never recorded.
pub fn random_blob<R: Rng + ?Sized>(
    grid: &mut Grid,
    size: usize,
    key: &TimeKey,
    rng: &mut R,
) -> Result<Vec<Cell>, StructureError> {
    grid.store().require_time_key(key)?;
    let cell_count = grid.store().entity_count();
    if size > cell_count {
        return Err(StructureError::invalid(format!(
            "blob of {size} cells does not fit a grid of {cell_count} cells"
        )));
    }

    let mut candidates: Vec<Cell> = grid.store().entity_ids().copied().collect();
    let mut blob: Vec<Cell> = Vec::with_capacity(size);
    while blob.len() < size {
        if candidates.is_empty() {
            return Err(StructureError::invalid(format!(
                "blob stopped growing at {} of {size} cells",
                blob.len()
            )));
        }
        let idx: usize = rng.random_range(0..candidates.len());
        let Some(&cell) = candidates.get(idx) else {
            continue;
        };
        blob.push(cell);
        candidates = grid.store().entities_neighbours(&blob, true, true)?;
    }

    for cell in &blob {
        grid.store_mut().set_value(cell, key, 1)?;
    }
    debug!(size, key = %key, "seeded random blob");
    Ok(blob)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::grid::{GridOptions, InitialValues};

    fn empty_grid(side: u32) -> Grid {
        Grid::new(InitialValues::Empty, GridOptions::sized(side, side)).unwrap()
    }

    #[test]
    fn blob_is_one_component_of_requested_size() {
        for seed in 0..20 {
            let mut grid = empty_grid(12);
            let mut rng = SmallRng::seed_from_u64(seed);
            let blob = random_blob(&mut grid, 9, &TimeKey::at(0), &mut rng).unwrap();

            let unique: BTreeSet<Cell> = blob.iter().copied().collect();
            assert_eq!(unique.len(), 9);
            let components = grid.components_at(&TimeKey::at(0), true).unwrap();
            assert_eq!(components.len(), 1);
            assert_eq!(components.first().map(Vec::len), Some(9));
        }
    }

    #[test]
    fn same_seed_same_blob() {
        let mut a = empty_grid(10);
        let mut b = empty_grid(10);
        let blob_a = random_blob(&mut a, 6, &TimeKey::at(0), &mut SmallRng::seed_from_u64(7)).unwrap();
        let blob_b = random_blob(&mut b, 6, &TimeKey::at(0), &mut SmallRng::seed_from_u64(7)).unwrap();
        assert_eq!(blob_a, blob_b);
    }

    #[test]
    fn oversized_blob_rejected() {
        let mut grid = empty_grid(2);
        let mut rng = SmallRng::seed_from_u64(1);
        let result = random_blob(&mut grid, 5, &TimeKey::at(0), &mut rng);
        assert!(matches!(result, Err(StructureError::InvalidArgument { .. })));
    }

    #[test]
    fn whole_grid_blob() {
        let mut grid = empty_grid(3);
        let mut rng = SmallRng::seed_from_u64(3);
        let blob = random_blob(&mut grid, 9, &TimeKey::at(0), &mut rng).unwrap();
        assert_eq!(blob.len(), 9);
        assert_eq!(grid.time_slice(&TimeKey::at(0), true, false).unwrap().len(), 9);
    }

    #[test]
    fn unrecorded_key_rejected() {
        let mut grid = empty_grid(4);
        let mut rng = SmallRng::seed_from_u64(3);
        let result = random_blob(&mut grid, 2, &TimeKey::at(5), &mut rng);
        assert!(matches!(result, Err(StructureError::TimeKeyNotFound(_))));
    }
}
