//! Alarm routing: which tile a guard should run to when a trigger fires.
//!
//! Every guard receives the same `Alarm` value for a tick and resolves it
//! against its own position and beat. Two guards hearing the same alarm from
//! the same spot pick the same door.

use bevy::prelude::*;

use crate::components::TilePos;
use crate::plugins::grid::GridMap;

use super::manhattan;

/// An alarm raised this tick, as seen by every guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub source: Entity,
    /// Door tiles wired to the source.
    pub doors: Vec<TilePos>,
}

/// Walkable orthogonal neighbor of `tile` closest to `anchor`.
///
/// `own_tile` is the asking guard's tile, which counts as walkable even
/// though the guard itself occupies it. Ties keep `Direction::ALL` order.
pub fn nearest_accessible_neighbor(
    grid: &GridMap,
    tile: TilePos,
    anchor: TilePos,
    own_tile: Option<TilePos>,
) -> Option<TilePos> {
    tile.neighbors()
        .into_iter()
        .filter(|n| grid.is_walkable_tile(*n) || Some(*n) == own_tile)
        .min_by_key(|n| manhattan(n, &anchor))
}

/// Doors ordered nearest-first from `from`. Equal distances keep wiring order.
pub fn doors_by_distance(doors: &[TilePos], from: TilePos) -> Vec<TilePos> {
    let mut sorted = doors.to_vec();
    sorted.sort_by_key(|d| manhattan(d, &from));
    sorted
}

/// Pick the nearest untried door that has an accessible neighbor, and that
/// neighbor. Returns `None` once every wired door is exhausted.
pub fn resolve_investigation(
    grid: &GridMap,
    doors: &[TilePos],
    guard_tile: TilePos,
    anchor: TilePos,
    tried: &[TilePos],
) -> Option<(TilePos, TilePos)> {
    doors_by_distance(doors, guard_tile)
        .into_iter()
        .filter(|door| !tried.contains(door))
        .find_map(|door| {
            nearest_accessible_neighbor(grid, door, anchor, Some(guard_tile))
                .map(|target| (door, target))
        })
}
