//! Uniform grid for area-of-interest queries.

use protocol::AgentPosition;
use std::collections::{HashMap, HashSet};

/// Integer cell coordinates `(floor(x / cell), floor(z / cell))`.
pub type CellKey = (i64, i64);

/// Grid of agent ids bucketed by ground-plane cell.
///
/// The grid has no incremental update path: [`SpatialGrid::rebuild`] replaces
/// its whole contents, so it always mirrors exactly the last position set it
/// was given.
pub struct SpatialGrid {
    cell_size: f64,
    /// Cell buckets. Emptied buckets are kept to reuse their allocation.
    cells: HashMap<CellKey, Vec<String>>,
    len: usize,
}

impl SpatialGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::with_capacity(128),
            len: 0,
        }
    }

    /// Cell containing a point. Floor division keeps negatives consistent,
    /// so `-15` with cell size 10 lands in cell `-2`.
    #[inline]
    pub fn cell_key(&self, x: f64, z: f64) -> CellKey {
        (
            (x / self.cell_size).floor() as i64,
            (z / self.cell_size).floor() as i64,
        )
    }

    /// Clear all cells and re-insert every agent.
    pub fn rebuild(&mut self, positions: &HashMap<String, AgentPosition>) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.len = 0;

        for (agent_id, pos) in positions {
            let key = self.cell_key(pos.x, pos.z);
            self.cells
                .entry(key)
                .or_insert_with(|| Vec::with_capacity(4))
                .push(agent_id.clone());
            self.len += 1;
        }
    }

    /// Ids of every agent in the cells overlapping the box
    /// `[x - radius, x + radius] x [z - radius, z + radius]`.
    ///
    /// Results can lie outside `radius`; callers must not treat them as an
    /// exact circle.
    pub fn query_radius(&self, x: f64, z: f64, radius: f64) -> HashSet<&str> {
        let mut result = HashSet::new();
        if self.len == 0 {
            return result;
        }

        let (min_cx, min_cz) = self.cell_key(x - radius, z - radius);
        let (max_cx, max_cz) = self.cell_key(x + radius, z + radius);

        for cx in min_cx..=max_cx {
            for cz in min_cz..=max_cz {
                if let Some(cell) = self.cells.get(&(cx, cz)) {
                    result.extend(cell.iter().map(String::as_str));
                }
            }
        }
        result
    }

    /// Number of agents indexed by the last rebuild.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.values().filter(|c| !c.is_empty()).count()
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl std::fmt::Debug for SpatialGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialGrid")
            .field("cell_size", &self.cell_size)
            .field("agents", &self.len)
            .field("cells", &self.cell_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(entries: &[(&str, f64, f64)]) -> HashMap<String, AgentPosition> {
        entries
            .iter()
            .map(|&(id, x, z)| {
                (
                    id.to_string(),
                    AgentPosition {
                        agent_id: id.to_string(),
                        x,
                        y: 0.0,
                        z,
                        rotation: 0.0,
                        timestamp: 0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_grid() {
        let grid = SpatialGrid::new(10.0);
        assert!(grid.query_radius(0.0, 0.0, 50.0).is_empty());
        assert!(grid.is_empty());
    }

    #[test]
    fn test_finds_agents_within_radius() {
        let mut grid = SpatialGrid::new(10.0);
        grid.rebuild(&positions(&[("a1", 5.0, 5.0), ("a2", 50.0, 50.0)]));

        let nearby = grid.query_radius(0.0, 0.0, 15.0);
        assert!(nearby.contains("a1"));
        assert!(!nearby.contains("a2"));
    }

    #[test]
    fn test_large_radius_finds_all() {
        let mut grid = SpatialGrid::new(10.0);
        grid.rebuild(&positions(&[("a1", -40.0, -40.0), ("a2", 40.0, 40.0)]));

        let all = grid.query_radius(0.0, 0.0, 100.0);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_rebuild_clears_previous() {
        let mut grid = SpatialGrid::new(10.0);
        grid.rebuild(&positions(&[("a1", 5.0, 5.0), ("a2", 50.0, 50.0)]));
        grid.rebuild(&positions(&[("a2", 0.0, 0.0)]));

        let result = grid.query_radius(0.0, 0.0, 100.0);
        assert!(!result.contains("a1"));
        assert!(result.contains("a2"));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.cell_count(), 1);
    }

    #[test]
    fn test_negative_coordinates() {
        let mut grid = SpatialGrid::new(10.0);
        assert_eq!(grid.cell_key(-15.0, -20.0), (-2, -2));
        assert_eq!(grid.cell_key(-11.0, -20.0), (-2, -2));
        assert_eq!(grid.cell_key(-10.0, 0.0), (-1, 0));

        grid.rebuild(&positions(&[("a1", -15.0, -20.0)]));
        assert!(grid.query_radius(-10.0, -15.0, 20.0).contains("a1"));
    }

    #[test]
    fn test_custom_cell_size() {
        let mut grid = SpatialGrid::new(5.0);
        grid.rebuild(&positions(&[("a1", 3.0, 3.0), ("a2", 30.0, 30.0)]));

        let result = grid.query_radius(0.0, 0.0, 10.0);
        assert!(result.contains("a1"));
        assert!(!result.contains("a2"));
    }

    #[test]
    fn test_bounding_box_approximation() {
        // (19, 19) is ~26.9 from the origin, outside radius 20, but its cell
        // overlaps the query box.
        let mut grid = SpatialGrid::new(10.0);
        grid.rebuild(&positions(&[("corner", 19.0, 19.0)]));
        assert!(grid.query_radius(0.0, 0.0, 20.0).contains("corner"));
    }
}
