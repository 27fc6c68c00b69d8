//! Grid pathfinding between two tiles.
//!
//! [`find_path`] runs a breadth-first search over the eight neighbors of
//! each tile. On an unweighted grid BFS yields the shortest hop count; ties
//! between equally short routes are broken by the fixed enumeration order in
//! [`NEIGHBOR_ORDER`] (orthogonal before diagonal), so the same matrix and
//! endpoints always produce the same path.
//!
//! A path never includes the start tile: its first element is the tile the
//! avatar steps onto first and its last element is the goal.

use std::collections::{BTreeMap, VecDeque};

use questbot_types::{Direction, Tile};

use crate::grid::Matrix;

/// Neighbor enumeration order: orthogonal steps first, then diagonals.
pub const NEIGHBOR_ORDER: [Direction; 8] = [
    Direction::Up,
    Direction::Right,
    Direction::Down,
    Direction::Left,
    Direction::UpRight,
    Direction::DownRight,
    Direction::DownLeft,
    Direction::UpLeft,
];

/// Find the shortest 8-connected walking path from `start` to `goal`.
///
/// Returns `Some(vec![])` when `start == goal`, and `None` when `start` is
/// outside the grid or `goal` is blocked, outside the grid, or unreachable.
/// The start tile itself may be blocked (the avatar is standing on it).
pub fn find_path(matrix: &Matrix, start: Tile, goal: Tile) -> Option<Vec<Tile>> {
    if !matrix.contains(start) || matrix.is_blocked(goal) {
        return None;
    }
    if start == goal {
        return Some(Vec::new());
    }

    // Predecessor map doubles as the visited set.
    let mut prev: BTreeMap<Tile, Tile> = BTreeMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for direction in NEIGHBOR_ORDER {
            let Some(next) = current.step(direction) else {
                continue;
            };
            if next == start || matrix.is_blocked(next) || prev.contains_key(&next) {
                continue;
            }
            prev.insert(next, current);
            if next == goal {
                return Some(reconstruct(&prev, start, goal));
            }
            queue.push_back(next);
        }
    }

    None
}

/// Walk the predecessor chain back from `goal`, excluding `start`.
fn reconstruct(prev: &BTreeMap<Tile, Tile>, start: Tile, goal: Tile) -> Vec<Tile> {
    let mut path = VecDeque::new();
    let mut current = goal;
    while current != start {
        path.push_front(current);
        match prev.get(&current) {
            Some(&predecessor) => current = predecessor,
            None => break,
        }
    }
    path.into_iter().collect()
}
