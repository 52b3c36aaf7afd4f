//! Configuration errors. These abort level load; nothing at runtime returns them.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GuardConfigError {
    #[error("guard {guard} has an empty patrol path")]
    EmptyPatrolPath { guard: usize },

    #[error("guard {guard} waypoint {index} at ({x}, {y}) is not a valid tile")]
    WaypointOutOfBounds {
        guard: usize,
        index: usize,
        x: i32,
        y: i32,
    },

    #[error("guard {guard} has no light cone bound")]
    MissingLight { guard: usize },

    #[error("guard {guard} has non-positive speed {speed}")]
    InvalidSpeed { guard: usize, speed: f32 },
}

#[derive(Debug, Error, PartialEq)]
pub enum LevelError {
    #[error("level has zero size ({width}x{height})")]
    EmptyGrid { width: usize, height: usize },

    #[error("{what} at ({x}, {y}) is outside the grid")]
    OutOfBounds { what: &'static str, x: i32, y: i32 },

    #[error("trigger {trigger} references missing object {object}")]
    MissingTriggerObject { trigger: usize, object: usize },

    #[error("trigger {trigger} references object {object}, which is not a laser or switch")]
    NotATrigger { trigger: usize, object: usize },

    #[error(transparent)]
    Guard(#[from] GuardConfigError),
}
