//! Vision: cone range/angle test plus an occlusion raycast per emitter.
//!
//! Guards and security cameras carry a `LightCone`. Each tick the player is
//! tested against every active cone; the first emitter with a clear line of
//! sight catches them. A blocked emitter never hides a clear one.

use avian2d::prelude::*;
use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use crate::app_state::LevelState;
use crate::components::{Direction, GuardId, Player, SecurityCamera};
use crate::events::PlayerCaught;
use crate::level::LightSpec;

use super::grid::TickSet;

/// Longest hit list requested from the physics world per ray.
const MAX_RAY_HITS: u32 = 32;

pub struct VisionPlugin;

impl Plugin for VisionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            check_vision
                .in_set(TickSet::Vision)
                .run_if(in_state(LevelState::Sneaking)),
        );
    }
}

// ---------------------------------------------------------------------------
// Physics layers
// ---------------------------------------------------------------------------

#[derive(PhysicsLayer, Clone, Copy, Debug, Default)]
pub enum GameLayer {
    #[default]
    Default,
    Wall,
    /// Boxes and closed doors.
    Prop,
    Guard,
    Player,
    /// Lasers, switches and exits: never block light.
    Sensor,
}

// ---------------------------------------------------------------------------
// Light cone
// ---------------------------------------------------------------------------

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct LightCone {
    /// Radians from `+X`, counter-clockwise.
    pub facing_angle: f32,
    pub half_angle_degrees: f32,
    pub range: f32,
    /// Collision categories the light's ray reports.
    pub mask: u32,
    pub active: bool,
}

impl LightCone {
    pub fn new(spec: &LightSpec, facing: Direction, mask: u32) -> Self {
        Self {
            facing_angle: facing.angle(),
            half_angle_degrees: spec.half_angle_degrees,
            range: spec.range,
            mask,
            active: true,
        }
    }

    /// Range and angle test only. A target on the origin is never inside.
    pub fn contains(&self, origin: Vec2, target: Vec2) -> bool {
        let to_target = target - origin;
        let distance = to_target.length();
        if !distance.is_finite() || distance <= f32::EPSILON {
            return false;
        }
        if distance > self.range {
            return false;
        }
        cone_angle_degrees(Vec2::from_angle(self.facing_angle), to_target) <= self.half_angle_degrees
    }
}

/// Unsigned angle between two vectors, in `[0, 180]` degrees.
pub fn cone_angle_degrees(facing: Vec2, to_target: Vec2) -> f32 {
    facing
        .perp_dot(to_target)
        .atan2(facing.dot(to_target))
        .abs()
        .to_degrees()
}

// ---------------------------------------------------------------------------
// Raycast collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: Entity,
    pub point: Vec2,
    pub category_bits: u32,
}

/// World query used for occlusion. Hits are ordered nearest first.
pub trait RaycastWorld {
    fn raycast(&self, origin: Vec2, target: Vec2, mask: u32) -> Vec<RayHit>;
}

/// `RaycastWorld` over avian's spatial query. `category_of` reports each hit
/// entity's collision memberships.
pub struct PhysicsRaycast<'a, 'w, 's, F> {
    pub spatial: &'a SpatialQuery<'w, 's>,
    pub category_of: F,
}

impl<F: Fn(Entity) -> u32> RaycastWorld for PhysicsRaycast<'_, '_, '_, F> {
    fn raycast(&self, origin: Vec2, target: Vec2, mask: u32) -> Vec<RayHit> {
        let delta = target - origin;
        let Ok(direction) = Dir2::new(delta) else {
            return Vec::new();
        };
        let filter = SpatialQueryFilter::from_mask(mask);
        let mut hits: Vec<RayHit> = self
            .spatial
            .ray_hits(origin, direction, delta.length(), MAX_RAY_HITS, true, &filter)
            .into_iter()
            .map(|hit| RayHit {
                entity: hit.entity,
                point: origin + *direction * hit.distance,
                category_bits: (self.category_of)(hit.entity),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.point
                .distance_squared(origin)
                .total_cmp(&b.point.distance_squared(origin))
        });
        hits
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterKind {
    Guard,
    Camera,
}

/// Who saw the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sighting {
    pub kind: EmitterKind,
    pub index: usize,
    pub owner: Option<Entity>,
}

#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    pub kind: EmitterKind,
    pub index: usize,
    /// Body the light is mounted on; its own hits never occlude.
    pub owner: Option<Entity>,
    pub origin: Vec2,
    pub light: LightCone,
}

#[derive(Debug, Clone, Copy)]
pub struct VisionTarget {
    pub entity: Entity,
    pub position: Vec2,
}

impl Emitter {
    fn sighting(&self) -> Sighting {
        Sighting {
            kind: self.kind,
            index: self.index,
            owner: self.owner,
        }
    }

    /// Nothing matching the mask, other than the target or the emitter's
    /// own body, lies strictly nearer than the target.
    fn has_line_of_sight(&self, world: &impl RaycastWorld, target: &VisionTarget) -> bool {
        let distance = self.origin.distance(target.position);
        world
            .raycast(self.origin, target.position, self.light.mask)
            .iter()
            .filter(|hit| hit.category_bits & self.light.mask != 0)
            .filter(|hit| hit.entity != target.entity && Some(hit.entity) != self.owner)
            .all(|hit| hit.point.distance(self.origin) >= distance)
    }
}

/// First emitter, in slice order, that sees the target.
pub fn detect(
    world: &impl RaycastWorld,
    target: &VisionTarget,
    emitters: &[Emitter],
) -> Option<Sighting> {
    emitters
        .iter()
        .filter(|e| e.light.active)
        .filter(|e| e.light.contains(e.origin, target.position))
        .find(|e| e.has_line_of_sight(world, target))
        .map(Emitter::sighting)
}

pub fn is_player_detected(
    world: &impl RaycastWorld,
    target: &VisionTarget,
    emitters: &[Emitter],
) -> bool {
    detect(world, target, emitters).is_some()
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Guards in id order, then cameras in id order.
#[span_fn]
pub fn check_vision(
    mut commands: Commands,
    spatial: SpatialQuery,
    player: Query<(Entity, &Transform), With<Player>>,
    guards: Query<(Entity, &GuardId, &Transform, &LightCone)>,
    cameras: Query<(Entity, &SecurityCamera, &Transform, &LightCone)>,
    layers: Query<&CollisionLayers>,
    mut next_state: ResMut<NextState<LevelState>>,
) {
    let Ok((player_entity, player_transform)) = player.single() else {
        return;
    };
    let target = VisionTarget {
        entity: player_entity,
        position: player_transform.translation.truncate(),
    };

    let mut guard_emitters: Vec<Emitter> = guards
        .iter()
        .map(|(entity, id, transform, light)| Emitter {
            kind: EmitterKind::Guard,
            index: id.0,
            owner: Some(entity),
            origin: transform.translation.truncate(),
            light: *light,
        })
        .collect();
    guard_emitters.sort_by_key(|e| e.index);

    let mut camera_emitters: Vec<Emitter> = cameras
        .iter()
        .map(|(entity, camera, transform, light)| Emitter {
            kind: EmitterKind::Camera,
            index: camera.0,
            owner: Some(entity),
            origin: transform.translation.truncate(),
            light: *light,
        })
        .collect();
    camera_emitters.sort_by_key(|e| e.index);
    guard_emitters.append(&mut camera_emitters);

    let world = PhysicsRaycast {
        spatial: &spatial,
        category_of: |entity: Entity| layers.get(entity).map(|l| l.memberships.0).unwrap_or(0),
    };
    if let Some(sighting) = detect(&world, &target, &guard_emitters) {
        info!(
            "player caught: {:?} {} at ({}, {})",
            sighting.kind, sighting.index, target.position.x, target.position.y
        );
        commands.trigger(PlayerCaught { sighting });
        next_state.set(LevelState::Caught);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
