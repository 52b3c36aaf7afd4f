//! Guard AI: bounded grid search, alarm routing, and the per-guard state machine.

pub mod alarm;
pub mod guard;
pub mod planner;

use crate::components::TilePos;

/// Manhattan distance heuristic.
pub fn manhattan(a: &TilePos, b: &TilePos) -> u32 {
    (a.x - b.x).unsigned_abs() + (a.y - b.y).unsigned_abs()
}
