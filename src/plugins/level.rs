//! Level driver: spawns bodies, sensors, guards and cameras from the
//! `LevelDescription` resource, detects escape, and clears the level on
//! restart.

use avian2d::prelude::*;
use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use crate::app_state::LevelState;
use crate::components::{
    AlarmTrigger, Facing, GuardId, LevelEntity, MovementIntent, Occupant, Player, SecurityCamera,
    TilePos,
};
use crate::events::PlayerEscaped;
use crate::level::{LevelDescription, ObjectKind};
use crate::resources::AiConfig;

use super::grid::{GridMap, OccupantKind, TickSet, center_of, classify_occupant, tile_of};
use super::vision::{GameLayer, LightCone};

const PLAYER_RADIUS: f32 = 0.3;
const GUARD_RADIUS: f32 = 0.4;
const BOX_DAMPING: f32 = 8.0;

pub struct LevelPlugin;

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Gravity(Vec2::ZERO));
        app.add_systems(OnEnter(LevelState::Loading), despawn_level);
        app.add_systems(
            Update,
            spawn_level.run_if(
                in_state(LevelState::Loading).and(resource_exists::<LevelDescription>),
            ),
        );
        app.add_systems(
            FixedUpdate,
            check_exit
                .in_set(TickSet::Triggers)
                .run_if(in_state(LevelState::Sneaking)),
        );
    }
}

fn at(tile: TilePos) -> Transform {
    let c = center_of(tile);
    Transform::from_xyz(c.x, c.y, 0.0)
}

/// Build the grid and every level entity. Bad guard configuration aborts
/// the load through Bevy's error handler.
#[span_fn]
pub fn spawn_level(
    mut commands: Commands,
    level: Res<LevelDescription>,
    config: Res<AiConfig>,
    mut next_state: ResMut<NextState<LevelState>>,
) -> Result {
    level.validate()?;
    let grid = level.build_grid();
    let brains = level.build_guards(&grid, &config)?;

    let tile_collider = || Collider::rectangle(1.0, 1.0);

    for (index, object) in level.objects.iter().enumerate() {
        let occupant = Occupant(classify_occupant(&object.kind));
        let base = (LevelEntity, occupant, at(object.tile));
        match object.kind {
            ObjectKind::Wall => {
                commands.spawn((
                    base,
                    RigidBody::Static,
                    tile_collider(),
                    CollisionLayers::new(GameLayer::Wall, LayerMask::ALL),
                ));
            }
            ObjectKind::Door { open: false } => {
                commands.spawn((
                    base,
                    RigidBody::Static,
                    tile_collider(),
                    CollisionLayers::new(GameLayer::Prop, LayerMask::ALL),
                ));
            }
            ObjectKind::Door { open: true } => {
                commands.spawn(base);
            }
            ObjectKind::Box => {
                commands.spawn((
                    base,
                    RigidBody::Dynamic,
                    tile_collider(),
                    LockedAxes::ROTATION_LOCKED,
                    LinearDamping(BOX_DAMPING),
                    CollisionLayers::new(GameLayer::Prop, LayerMask::ALL),
                ));
            }
            ObjectKind::Laser | ObjectKind::Switch => {
                commands.spawn((
                    base,
                    AlarmTrigger {
                        doors: level.doors_for(index),
                    },
                    RigidBody::Static,
                    tile_collider(),
                    Sensor,
                    CollisionLayers::new(GameLayer::Sensor, GameLayer::Player),
                ));
            }
            ObjectKind::Exit => {
                commands.spawn((
                    base,
                    RigidBody::Static,
                    tile_collider(),
                    Sensor,
                    CollisionLayers::new(GameLayer::Sensor, GameLayer::Player),
                ));
            }
        }
    }

    commands.spawn((
        Player,
        LevelEntity,
        Occupant(OccupantKind::Player),
        at(level.player_start),
        RigidBody::Dynamic,
        Collider::circle(PLAYER_RADIUS),
        LockedAxes::ROTATION_LOCKED,
        LinearVelocity::default(),
        CollisionLayers::new(GameLayer::Player, LayerMask::ALL),
    ));

    let guard_count = brains.len();
    for brain in brains {
        let facing = brain.facing();
        let light = LightCone::new(&brain.light(), facing, config.light_mask);
        let start = tile_of(brain.waypoints()[0]);
        commands.spawn((
            GuardId(brain.index()),
            LevelEntity,
            Occupant(OccupantKind::Guard),
            at(start),
            MovementIntent::default(),
            Facing(facing),
            light,
            RigidBody::Dynamic,
            Collider::circle(GUARD_RADIUS),
            LockedAxes::ROTATION_LOCKED,
            LinearVelocity::default(),
            CollisionLayers::new(GameLayer::Guard, LayerMask::ALL),
            brain,
        ));
    }

    for (index, camera) in level.cameras.iter().enumerate() {
        commands.spawn((
            SecurityCamera(index),
            LevelEntity,
            at(camera.tile),
            Facing(camera.facing),
            LightCone::new(&camera.light, camera.facing, config.light_mask),
        ));
    }

    info!(
        "level loaded: {}x{}, {} guards, {} cameras",
        level.width,
        level.height,
        guard_count,
        level.cameras.len()
    );
    commands.insert_resource(grid);
    next_state.set(LevelState::Sneaking);
    Ok(())
}

/// The player standing on an exit tile wins the level.
#[span_fn]
pub fn check_exit(
    mut commands: Commands,
    grid: Res<GridMap>,
    player: Query<&Transform, With<Player>>,
    mut next_state: ResMut<NextState<LevelState>>,
) {
    let Ok(player) = player.single() else {
        return;
    };
    let tile = tile_of(player.translation.truncate());
    if grid.occupant_at(tile.x, tile.y) == OccupantKind::Exit {
        info!("player escaped at ({}, {})", tile.x, tile.y);
        commands.trigger(PlayerEscaped);
        next_state.set(LevelState::Escaped);
    }
}

/// Clear the previous run before a (re)load.
fn despawn_level(mut commands: Commands, query: Query<Entity, With<LevelEntity>>) {
    for entity in &query {
        commands.entity(entity).despawn();
    }
    commands.remove_resource::<GridMap>();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
