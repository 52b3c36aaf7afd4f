use bevy::prelude::*;
use serde::Deserialize;

use crate::plugins::grid::OccupantKind;

// ---------------------------------------------------------------------------
// Grid and spatial
// ---------------------------------------------------------------------------

/// Integer tile address. Tile `(x, y)` has its center at `(x + 0.5, y + 0.5)`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile one step away in `dir`.
    pub fn step(self, dir: Direction) -> TilePos {
        let (dx, dy) = dir.delta();
        TilePos {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// The four orthogonal neighbors, in `Direction::ALL` order.
    pub fn neighbors(self) -> [TilePos; 4] {
        Direction::ALL.map(|d| self.step(d))
    }
}

/// Cardinal direction. The world is y-up, so `Up` is `+Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid offset for this direction.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Unit vector in world space.
    pub fn vector(&self) -> Vec2 {
        let (dx, dy) = self.delta();
        Vec2::new(dx as f32, dy as f32)
    }

    /// Facing angle in radians, measured from `+X` counter-clockwise.
    pub fn angle(&self) -> f32 {
        match self {
            Direction::Right => 0.0,
            Direction::Up => std::f32::consts::FRAC_PI_2,
            Direction::Left => std::f32::consts::PI,
            Direction::Down => -std::f32::consts::FRAC_PI_2,
        }
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

#[derive(Component, Debug)]
pub struct Player;

/// Stable per-level guard index; guards update in ascending id order.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuardId(pub usize);

/// Stable per-level camera index.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecurityCamera(pub usize);

/// Direction an actor is currently looking. Drives its light cone.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facing(pub Direction);

/// Movement intent emitted by guard AI, in tiles per second.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementIntent(pub Vec2);

// ---------------------------------------------------------------------------
// World objects
// ---------------------------------------------------------------------------

/// What this entity counts as on the navigation grid. Assigned once at
/// spawn by `classify_occupant`; door props flip it when they open or close.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant(pub OccupantKind);

/// A laser or switch that raises an alarm when the player steps on it.
#[derive(Component, Debug, Clone)]
pub struct AlarmTrigger {
    /// Door tiles this trigger is wired to.
    pub doors: Vec<TilePos>,
}

/// Marker: the player is currently standing on this trigger.
#[derive(Component, Debug)]
pub struct Tripped;

/// Marker for entities that belong to the current level.
#[derive(Component, Debug)]
pub struct LevelEntity;
