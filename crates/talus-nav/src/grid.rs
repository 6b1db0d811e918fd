//! Fixed-resolution 2-D occupancy grid.
//!
//! One flat `Vec<bool>` indexed `y * width + x`.  Every accessor is
//! bounds-checked and anything outside the map reads as occupied, so a
//! search can never wander off the edge.
//!
//! # Example
//!
//! ```rust
//! use talus_nav::grid::{Cell, OccupancyGrid};
//!
//! let mut grid = OccupancyGrid::new(50, 50, 0.1, 0.0, 0.0);
//! grid.mark_rect(2.0, 2.0, 2.3, 2.3);
//!
//! assert!(grid.is_occupied(grid.world_to_cell(2.15, 2.15)));
//! assert!(!grid.is_occupied(Cell::new(0, 0)));
//! assert!(grid.is_occupied(Cell::new(-1, 0)));
//! ```

use talus_types::Obstacle;

/// Integer cell coordinate.  Signed so that out-of-grid positions are
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

// Absorbs float noise when an edge lands exactly on a cell boundary.
const EDGE_EPS: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    resolution: f32,
    origin_x: f32,
    origin_y: f32,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    /// Empty grid of `width × height` cells; `origin` is the world position
    /// of the corner of cell `(0, 0)`.
    pub fn new(width: usize, height: usize, resolution: f32, origin_x: f32, origin_y: f32) -> Self {
        Self {
            width,
            height,
            resolution,
            origin_x,
            origin_y,
            cells: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.width && (cell.y as usize) < self.height
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        self.in_bounds(cell)
            .then(|| cell.y as usize * self.width + cell.x as usize)
    }

    /// `true` for blocked cells and for every cell outside the map.
    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.index(cell).is_none_or(|i| self.cells[i])
    }

    /// Mark one cell.  Out-of-grid cells are ignored.
    pub fn set_occupied(&mut self, cell: Cell, occupied: bool) {
        if let Some(i) = self.index(cell) {
            self.cells[i] = occupied;
        }
    }

    pub fn clear(&mut self) {
        self.cells.fill(false);
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// Cell containing the world point `(x, y)`.  Non-finite input maps
    /// off the map, so it reads as occupied.
    pub fn world_to_cell(&self, x: f32, y: f32) -> Cell {
        if !x.is_finite() || !y.is_finite() {
            return Cell::new(i32::MIN, i32::MIN);
        }
        Cell::new(
            ((x - self.origin_x) / self.resolution).floor() as i32,
            ((y - self.origin_y) / self.resolution).floor() as i32,
        )
    }

    /// World position of the centre of `cell`.
    pub fn cell_centre(&self, cell: Cell) -> (f32, f32) {
        (
            self.origin_x + (cell.x as f32 + 0.5) * self.resolution,
            self.origin_y + (cell.y as f32 + 0.5) * self.resolution,
        )
    }

    /// Block every cell overlapping the world rectangle
    /// `[min_x, max_x] × [min_y, max_y]`, clipped to the map.
    pub fn mark_rect(&mut self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) {
        let to_cell = |v: f32, origin: f32| (v - origin) / self.resolution;
        let x0 = (to_cell(min_x, self.origin_x) + EDGE_EPS).floor() as i64;
        let y0 = (to_cell(min_y, self.origin_y) + EDGE_EPS).floor() as i64;
        let x1 = (to_cell(max_x, self.origin_x) - EDGE_EPS).ceil() as i64 - 1;
        let y1 = (to_cell(max_y, self.origin_y) - EDGE_EPS).ceil() as i64 - 1;

        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(self.width as i64 - 1);
        let y1 = y1.min(self.height as i64 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.cells[y as usize * self.width + x as usize] = true;
            }
        }
    }

    /// Clear the grid and rasterise each obstacle's footprint grown by
    /// `inflation` metres on every side.
    pub fn rebuild(&mut self, obstacles: &[Obstacle], inflation: f32) {
        self.clear();
        for obstacle in obstacles {
            let half_x = obstacle.size.x.abs() * 0.5 + inflation;
            let half_y = obstacle.size.y.abs() * 0.5 + inflation;
            let p = obstacle.position;
            self.mark_rect(p.x - half_x, p.y - half_y, p.x + half_x, p.y + half_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use talus_types::{ObstacleType, Vec3};

    fn rock(x: f32, y: f32, w: f32, h: f32) -> Obstacle {
        Obstacle {
            id: "rock".to_string(),
            position: Vec3::new(x, y, 0.0),
            size: Vec3::new(w, h, 0.2),
            obstacle_type: ObstacleType::Rock,
            confidence: 0.9,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn out_of_grid_is_occupied() {
        let grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        assert!(!grid.is_occupied(Cell::new(9, 9)));
        assert!(grid.is_occupied(Cell::new(10, 0)));
        assert!(grid.is_occupied(Cell::new(0, -1)));
        assert!(grid.is_occupied(Cell::new(i32::MAX, i32::MIN)));
    }

    #[test]
    fn world_cell_conversion() {
        let grid = OccupancyGrid::new(200, 200, 0.1, -10.0, -10.0);
        let c = grid.world_to_cell(0.05, -0.05);
        assert_eq!(c, Cell::new(100, 99));
        let (x, y) = grid.cell_centre(c);
        assert!((x - 0.05).abs() < 1e-4 && (y + 0.05).abs() < 1e-4);
    }

    #[test]
    fn non_finite_point_lands_off_the_map() {
        let grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        for (x, y) in [(f32::NAN, 0.5), (0.5, f32::NAN), (f32::INFINITY, 0.5), (0.5, f32::NEG_INFINITY)] {
            let cell = grid.world_to_cell(x, y);
            assert!(!grid.in_bounds(cell), "({x}, {y}) mapped to {cell:?}");
            assert!(grid.is_occupied(cell));
        }
    }

    #[test]
    fn rect_marks_exact_cells() {
        let mut grid = OccupancyGrid::new(50, 50, 0.1, 0.0, 0.0);
        grid.mark_rect(2.0, 2.0, 2.3, 2.3);
        assert_eq!(grid.occupied_count(), 9);
        for x in 20..23 {
            for y in 20..23 {
                assert!(grid.is_occupied(Cell::new(x, y)));
            }
        }
        assert!(!grid.is_occupied(Cell::new(23, 20)));
        assert!(!grid.is_occupied(Cell::new(19, 22)));
    }

    #[test]
    fn rebuild_replaces_and_inflates() {
        let mut grid = OccupancyGrid::new(50, 50, 0.1, 0.0, 0.0);
        grid.rebuild(&[rock(1.05, 1.05, 0.1, 0.1)], 0.0);
        assert_eq!(grid.occupied_count(), 1);

        grid.rebuild(&[rock(3.05, 3.05, 0.1, 0.1)], 0.1);
        assert_eq!(grid.occupied_count(), 9);
        assert!(!grid.is_occupied(Cell::new(10, 10)));
    }

    #[test]
    fn rect_is_clipped_to_map() {
        let mut grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        grid.mark_rect(-5.0, -5.0, 0.2, 0.2);
        assert_eq!(grid.occupied_count(), 4);
        grid.clear();
        grid.mark_rect(5.0, 5.0, 6.0, 6.0);
        assert_eq!(grid.occupied_count(), 0);
    }
}
