//! Line-of-sight shortcutting of grid paths.
//!
//! [`line_of_sight`] walks every cell the straight segment between two cell
//! centres touches (a supercover traversal), so a segment that clips the
//! corner of a blocked cell counts as obstructed.  [`smooth`] then drops
//! every intermediate cell its kept predecessor can see past.

use crate::grid::{Cell, OccupancyGrid};

/// `true` when no cell touched by the segment `a → b` is occupied.
pub fn line_of_sight(grid: &OccupancyGrid, a: Cell, b: Cell) -> bool {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    let sx = (b.x - a.x).signum();
    let sy = (b.y - a.y).signum();

    let (mut x, mut y) = (a.x, a.y);
    if grid.is_occupied(Cell::new(x, y)) {
        return false;
    }

    let (mut ix, mut iy) = (0, 0);
    while ix < dx || iy < dy {
        let decision = (1 + 2 * ix) as i64 * dy as i64 - (1 + 2 * iy) as i64 * dx as i64;
        if decision == 0 {
            // Exactly through a corner: both side cells are touched.
            if grid.is_occupied(Cell::new(x + sx, y)) || grid.is_occupied(Cell::new(x, y + sy)) {
                return false;
            }
            x += sx;
            y += sy;
            ix += 1;
            iy += 1;
        } else if decision < 0 {
            x += sx;
            ix += 1;
        } else {
            y += sy;
            iy += 1;
        }
        if grid.is_occupied(Cell::new(x, y)) {
            return false;
        }
    }
    true
}

/// Shortcut a cell path.  Endpoints are always kept and the result never
/// crosses an occupied cell if the input did not.
pub fn smooth(grid: &OccupancyGrid, path: &[Cell]) -> Vec<Cell> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut kept = vec![path[0]];
    let mut anchor = path[0];
    for i in 1..path.len() - 1 {
        if !line_of_sight(grid, anchor, path[i + 1]) {
            kept.push(path[i]);
            anchor = path[i];
        }
    }
    kept.push(path[path.len() - 1]);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astar::{path_length, search};

    #[test]
    fn clear_line_on_empty_grid() {
        let grid = OccupancyGrid::new(20, 20, 0.1, 0.0, 0.0);
        assert!(line_of_sight(&grid, Cell::new(0, 0), Cell::new(19, 7)));
        assert!(line_of_sight(&grid, Cell::new(3, 3), Cell::new(3, 3)));
    }

    #[test]
    fn blocked_cell_on_segment() {
        let mut grid = OccupancyGrid::new(20, 20, 0.1, 0.0, 0.0);
        grid.set_occupied(Cell::new(5, 2), true);
        assert!(!line_of_sight(&grid, Cell::new(0, 0), Cell::new(10, 4)));
        assert!(!line_of_sight(&grid, Cell::new(10, 4), Cell::new(0, 0)));
        assert!(line_of_sight(&grid, Cell::new(0, 10), Cell::new(10, 14)));
    }

    #[test]
    fn corner_touch_is_obstructed() {
        let mut grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        grid.set_occupied(Cell::new(1, 0), true);
        assert!(!line_of_sight(&grid, Cell::new(0, 0), Cell::new(1, 1)));
    }

    #[test]
    fn smoothing_never_lengthens_and_keeps_endpoints() {
        let mut grid = OccupancyGrid::new(40, 40, 0.1, 0.0, 0.0);
        for y in 5..30 {
            grid.set_occupied(Cell::new(20, y), true);
        }
        for goal in [Cell::new(39, 39), Cell::new(35, 10), Cell::new(30, 2)] {
            let raw = search(&grid, Cell::new(2, 20), goal, 100_000).unwrap();
            let smooth = smooth(&grid, &raw);
            assert_eq!(smooth.first(), raw.first());
            assert_eq!(smooth.last(), raw.last());
            assert!(smooth.len() <= raw.len());
            assert!(path_length(&smooth) <= path_length(&raw) + 1e-4);
            for w in smooth.windows(2) {
                assert!(line_of_sight(&grid, w[0], w[1]));
            }
        }
    }

    #[test]
    fn empty_grid_collapses_to_segment() {
        let grid = OccupancyGrid::new(30, 30, 0.1, 0.0, 0.0);
        let raw = search(&grid, Cell::new(0, 0), Cell::new(20, 7), 100_000).unwrap();
        let smooth = smooth(&grid, &raw);
        assert_eq!(smooth, vec![Cell::new(0, 0), Cell::new(20, 7)]);
        assert!(path_length(&smooth) <= path_length(&raw));
    }
}
