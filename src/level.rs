//! In-memory level description handed over by the host's level loader.
//!
//! The core never reads level files. Hosts deserialize a `LevelDescription`
//! from whatever format they author in and insert it as a resource.

use bevy::prelude::*;
use serde::Deserialize;

use crate::ai::guard::GuardBrain;
use crate::components::{Direction, TilePos};
use crate::error::LevelError;
use crate::plugins::grid::{GridMap, classify_occupant};
use crate::resources::AiConfig;

fn default_guard_speed() -> f32 {
    2.0
}

#[derive(Resource, Debug, Clone, Deserialize)]
pub struct LevelDescription {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub void_tiles: Vec<TilePos>,
    #[serde(default)]
    pub objects: Vec<LevelObject>,
    #[serde(default)]
    pub guards: Vec<GuardSpec>,
    #[serde(default)]
    pub cameras: Vec<CameraSpec>,
    pub player_start: TilePos,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelObject {
    pub kind: ObjectKind,
    pub tile: TilePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    Wall,
    Laser,
    Box,
    Door {
        #[serde(default)]
        open: bool,
    },
    Switch,
    Exit,
}

impl ObjectKind {
    pub fn is_trigger(&self) -> bool {
        matches!(self, ObjectKind::Laser | ObjectKind::Switch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardStatus {
    Sleep,
    Patrol,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardSpec {
    pub status: GuardStatus,
    pub facing: Direction,
    /// Patrol posts as tile coordinates; guards walk their centers.
    pub waypoints: Vec<TilePos>,
    /// Calm walking speed in tiles per second.
    #[serde(default = "default_guard_speed")]
    pub speed: f32,
    pub light: Option<LightSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LightSpec {
    pub half_angle_degrees: f32,
    pub range: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSpec {
    pub tile: TilePos,
    pub facing: Direction,
    pub light: LightSpec,
}

/// Wires a laser or switch object to the doors guards should check.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSpec {
    /// Index into `objects`.
    pub object: usize,
    pub doors: Vec<TilePos>,
}

impl LevelDescription {
    /// Check everything that does not depend on guard construction.
    pub fn validate(&self) -> Result<(), LevelError> {
        if self.width == 0 || self.height == 0 {
            return Err(LevelError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }

        let in_bounds = |tile: &TilePos| {
            tile.x >= 0
                && tile.y >= 0
                && (tile.x as usize) < self.width
                && (tile.y as usize) < self.height
        };
        let check = |what: &'static str, tile: &TilePos| {
            if in_bounds(tile) {
                Ok(())
            } else {
                Err(LevelError::OutOfBounds {
                    what,
                    x: tile.x,
                    y: tile.y,
                })
            }
        };

        check("player start", &self.player_start)?;
        for tile in &self.void_tiles {
            check("void tile", tile)?;
        }
        for object in &self.objects {
            check("object", &object.tile)?;
        }
        for camera in &self.cameras {
            check("camera", &camera.tile)?;
        }
        for (index, trigger) in self.triggers.iter().enumerate() {
            let object = self
                .objects
                .get(trigger.object)
                .ok_or(LevelError::MissingTriggerObject {
                    trigger: index,
                    object: trigger.object,
                })?;
            if !object.kind.is_trigger() {
                return Err(LevelError::NotATrigger {
                    trigger: index,
                    object: trigger.object,
                });
            }
            for door in &trigger.doors {
                check("trigger door", door)?;
            }
        }
        Ok(())
    }

    /// Grid with void tiles and the initial object layout.
    pub fn build_grid(&self) -> GridMap {
        let mut grid = GridMap::new(self.width, self.height);
        for tile in &self.void_tiles {
            grid.mark_invalid(tile.x, tile.y);
        }
        for object in &self.objects {
            grid.place(object.tile.x, object.tile.y, classify_occupant(&object.kind));
        }
        grid
    }

    /// Construct every guard's state machine, failing on the first bad spec.
    pub fn build_guards(
        &self,
        grid: &GridMap,
        config: &AiConfig,
    ) -> Result<Vec<GuardBrain>, LevelError> {
        self.guards
            .iter()
            .enumerate()
            .map(|(index, spec)| GuardBrain::new(index, spec, grid, config).map_err(LevelError::from))
            .collect()
    }

    /// Door tiles wired to the object at `index`.
    pub fn doors_for(&self, index: usize) -> Vec<TilePos> {
        self.triggers
            .iter()
            .filter(|t| t.object == index)
            .flat_map(|t| t.doors.iter().copied())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
