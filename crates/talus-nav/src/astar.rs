//! A* over the 8-connected occupancy grid.
//!
//! Orthogonal steps cost 1, diagonal steps √2 (in cells); the heuristic is
//! the straight-line distance, which never overestimates.  A diagonal step
//! is only taken when both orthogonal cells beside it are free, so paths
//! never squeeze between two blocked corners.
//!
//! Frontier entries with equal `f` pop in insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f32::consts::SQRT_2;

use talus_types::TalusError;

use crate::grid::{Cell, OccupancyGrid};

const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[derive(Debug, Clone, Copy)]
struct Frontier {
    f: f32,
    seq: u64,
    index: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // BinaryHeap is a max-heap: invert so the lowest f, then the earliest
    // insertion, comes out first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn heuristic(a: Cell, b: Cell) -> f32 {
    let dx = (a.x - b.x) as f32;
    let dy = (a.y - b.y) as f32;
    (dx * dx + dy * dy).sqrt()
}

/// Cheapest cell path from `start` to `goal`, both inclusive.
///
/// The start cell itself may be occupied (the robot can stand inside an
/// inflation margin) but must be inside the map; the goal must be free.
///
/// # Errors
///
/// - [`TalusError::NoPathFound`] when the start is off the map, the goal is
///   blocked, or the frontier empties.
/// - [`TalusError::PlanningTimeout`] after `max_expansions` node expansions.
pub fn search(
    grid: &OccupancyGrid,
    start: Cell,
    goal: Cell,
    max_expansions: usize,
) -> Result<Vec<Cell>, TalusError> {
    if !grid.in_bounds(start) {
        return Err(TalusError::NoPathFound(format!(
            "start cell ({}, {}) is outside the map",
            start.x, start.y
        )));
    }
    if grid.is_occupied(goal) {
        return Err(TalusError::NoPathFound(format!(
            "goal cell ({}, {}) is occupied",
            goal.x, goal.y
        )));
    }
    if start == goal {
        return Ok(vec![start]);
    }

    let width = grid.width();
    let cell_of = |i: usize| Cell::new((i % width) as i32, (i / width) as i32);
    let index_of = |c: Cell| c.y as usize * width + c.x as usize;

    let len = width * grid.height();
    let mut g = vec![f32::INFINITY; len];
    let mut came_from: Vec<Option<usize>> = vec![None; len];
    let mut closed = vec![false; len];

    let mut open = BinaryHeap::new();
    let mut seq = 0u64;
    let start_i = index_of(start);
    let goal_i = index_of(goal);
    g[start_i] = 0.0;
    open.push(Frontier {
        f: heuristic(start, goal),
        seq,
        index: start_i,
    });

    let mut expansions = 0usize;
    while let Some(Frontier { index, .. }) = open.pop() {
        if closed[index] {
            continue;
        }
        if index == goal_i {
            return Ok(reconstruct(&came_from, goal_i, cell_of));
        }
        closed[index] = true;
        expansions += 1;
        if expansions > max_expansions {
            return Err(TalusError::PlanningTimeout { expansions: max_expansions });
        }

        let here = cell_of(index);
        for (dx, dy) in NEIGHBOURS {
            let next = Cell::new(here.x + dx, here.y + dy);
            if grid.is_occupied(next) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal
                && (grid.is_occupied(Cell::new(here.x + dx, here.y))
                    || grid.is_occupied(Cell::new(here.x, here.y + dy)))
            {
                continue;
            }
            let ni = index_of(next);
            if closed[ni] {
                continue;
            }
            let tentative = g[index] + if diagonal { SQRT_2 } else { 1.0 };
            if tentative < g[ni] {
                g[ni] = tentative;
                came_from[ni] = Some(index);
                seq += 1;
                open.push(Frontier {
                    f: tentative + heuristic(next, goal),
                    seq,
                    index: ni,
                });
            }
        }
    }

    Err(TalusError::NoPathFound(format!(
        "goal cell ({}, {}) is unreachable",
        goal.x, goal.y
    )))
}

fn reconstruct(came_from: &[Option<usize>], goal: usize, cell_of: impl Fn(usize) -> Cell) -> Vec<Cell> {
    let mut path = vec![cell_of(goal)];
    let mut current = goal;
    while let Some(prev) = came_from[current] {
        path.push(cell_of(prev));
        current = prev;
    }
    path.reverse();
    path
}

/// Euclidean length of a cell path, in cells.
pub fn path_length(cells: &[Cell]) -> f32 {
    cells
        .windows(2)
        .map(|w| heuristic(w[0], w[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_connected(path: &[Cell]) -> bool {
        path.windows(2)
            .all(|w| (w[0].x - w[1].x).abs() <= 1 && (w[0].y - w[1].y).abs() <= 1 && w[0] != w[1])
    }

    #[test]
    fn straight_diagonal_on_empty_grid() {
        let grid = OccupancyGrid::new(20, 20, 0.1, 0.0, 0.0);
        let path = search(&grid, Cell::new(0, 0), Cell::new(10, 10), 10_000).unwrap();
        assert_eq!(path.first(), Some(&Cell::new(0, 0)));
        assert_eq!(path.last(), Some(&Cell::new(10, 10)));
        assert_eq!(path.len(), 11);
        assert!((path_length(&path) - 10.0 * SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn detours_around_wall() {
        let mut grid = OccupancyGrid::new(20, 20, 0.1, 0.0, 0.0);
        for y in 0..15 {
            grid.set_occupied(Cell::new(10, y), true);
        }
        let path = search(&grid, Cell::new(2, 2), Cell::new(18, 2), 10_000).unwrap();
        assert!(is_connected(&path));
        assert!(path.iter().all(|c| !grid.is_occupied(*c)));
        assert!(path.iter().any(|c| c.y >= 15));
    }

    #[test]
    fn never_cuts_blocked_corners() {
        let mut grid = OccupancyGrid::new(5, 5, 0.1, 0.0, 0.0);
        // Two blocks touching only at a corner.
        grid.set_occupied(Cell::new(1, 2), true);
        grid.set_occupied(Cell::new(2, 1), true);
        let path = search(&grid, Cell::new(1, 1), Cell::new(2, 2), 10_000).unwrap();
        for w in path.windows(2) {
            let (dx, dy) = (w[1].x - w[0].x, w[1].y - w[0].y);
            if dx != 0 && dy != 0 {
                assert!(!grid.is_occupied(Cell::new(w[0].x + dx, w[0].y)));
                assert!(!grid.is_occupied(Cell::new(w[0].x, w[0].y + dy)));
            }
        }
        assert!(path.len() > 2);
    }

    #[test]
    fn occupied_goal_fails() {
        let mut grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        grid.set_occupied(Cell::new(5, 5), true);
        let err = search(&grid, Cell::new(0, 0), Cell::new(5, 5), 10_000).unwrap_err();
        assert!(matches!(err, TalusError::NoPathFound(_)));
        let err = search(&grid, Cell::new(0, 0), Cell::new(50, 5), 10_000).unwrap_err();
        assert!(matches!(err, TalusError::NoPathFound(_)));
    }

    #[test]
    fn enclosed_goal_fails() {
        let mut grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        for c in [(4, 4), (5, 4), (6, 4), (4, 5), (6, 5), (4, 6), (5, 6), (6, 6)] {
            grid.set_occupied(Cell::new(c.0, c.1), true);
        }
        let err = search(&grid, Cell::new(0, 0), Cell::new(5, 5), 10_000).unwrap_err();
        assert!(matches!(err, TalusError::NoPathFound(_)));
    }

    #[test]
    fn expansion_budget_is_enforced() {
        let grid = OccupancyGrid::new(50, 50, 0.1, 0.0, 0.0);
        let err = search(&grid, Cell::new(0, 0), Cell::new(49, 0), 5).unwrap_err();
        assert_eq!(err, TalusError::PlanningTimeout { expansions: 5 });
    }

    #[test]
    fn off_map_start_fails_but_blocked_start_is_allowed() {
        let mut grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        assert!(search(&grid, Cell::new(-1, 0), Cell::new(5, 5), 10_000).is_err());
        grid.set_occupied(Cell::new(0, 0), true);
        assert!(search(&grid, Cell::new(0, 0), Cell::new(5, 5), 10_000).is_ok());
    }

    #[test]
    fn ties_resolve_deterministically() {
        let grid = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        let a = search(&grid, Cell::new(0, 0), Cell::new(6, 3), 10_000).unwrap();
        let b = search(&grid, Cell::new(0, 0), Cell::new(6, 3), 10_000).unwrap();
        assert_eq!(a, b);
    }
}
