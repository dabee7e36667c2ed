//! Integer grid cells and their hash.

use std::hash::{Hash, Hasher};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// Teschner et al. collision-detection primes. The mixing is deliberately
// cheap, not cryptographic: buckets store id sets and lookups compare the
// full coordinate triple, so a colliding hash only costs probe time.
const PRIME_X: i64 = 73_856_093;
const PRIME_Y: i64 = 19_349_663;
const PRIME_Z: i64 = 83_492_791;

/// Coordinate of one cubic cell of the uniform world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellIndex {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Hash for CellIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mixed = (i64::from(self.x)).wrapping_mul(PRIME_X)
            ^ (i64::from(self.y)).wrapping_mul(PRIME_Y)
            ^ (i64::from(self.z)).wrapping_mul(PRIME_Z);
        state.write_i64(mixed);
    }
}

/// The cell containing a world point: elementwise `floor(p / cell_size)`.
pub fn cell_of(p: &Vector3<f64>, cell_size: f64) -> CellIndex {
    CellIndex {
        x: (p.x / cell_size).floor() as i32,
        y: (p.y / cell_size).floor() as i32,
        z: (p.z / cell_size).floor() as i32,
    }
}

/// All cells overlapped by the world-frame box `[min, max]`.
pub fn cells_in_box(
    min: &Vector3<f64>,
    max: &Vector3<f64>,
    cell_size: f64,
) -> impl Iterator<Item = CellIndex> {
    let lo = cell_of(min, cell_size);
    let hi = cell_of(max, cell_size);
    (lo.x..=hi.x).flat_map(move |x| {
        (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| CellIndex::new(x, y, z)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_of_floors_toward_negative() {
        let c = cell_of(&Vector3::new(-0.1, 0.0, 2.5), 1.0);
        assert_eq!(c, CellIndex::new(-1, 0, 2));
    }

    #[test]
    fn test_cell_of_respects_cell_size() {
        let c = cell_of(&Vector3::new(1.2, 0.4, -0.3), 0.5);
        assert_eq!(c, CellIndex::new(2, 0, -1));
    }

    #[test]
    fn test_cells_in_box_counts() {
        let cells: Vec<_> = cells_in_box(
            &Vector3::new(0.1, 0.1, 0.1),
            &Vector3::new(1.9, 0.9, 0.9),
            1.0,
        )
        .collect();
        // Spans two cells in x, one in y and z.
        assert_eq!(cells.len(), 2);
        assert!(cells.contains(&CellIndex::new(0, 0, 0)));
        assert!(cells.contains(&CellIndex::new(1, 0, 0)));
    }

    #[test]
    fn test_distinct_cells_hash_differently_in_practice() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        for x in -3..3 {
            for y in -3..3 {
                for z in -3..3 {
                    set.insert(CellIndex::new(x, y, z));
                }
            }
        }
        assert_eq!(set.len(), 6 * 6 * 6);
    }
}
