//! Guard tick: laser tripping, alarm hand-off, per-guard AI, and turning
//! movement intents into physics velocity.

use avian2d::prelude::*;
use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use crate::ai::alarm::Alarm;
use crate::ai::guard::GuardBrain;
use crate::app_state::LevelState;
use crate::components::{AlarmTrigger, Facing, GuardId, MovementIntent, Player, Tripped};
use crate::events::AlarmRaised;
use crate::resources::TickStats;

use super::grid::{GridMap, TickSet, tile_of};
use super::vision::LightCone;

pub struct GuardPlugin;

impl Plugin for GuardPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<AlarmRaised>();
        app.init_resource::<TickStats>();
        app.add_systems(
            FixedUpdate,
            trip_lasers
                .in_set(TickSet::Triggers)
                .run_if(in_state(LevelState::Sneaking)),
        );
        app.add_systems(
            FixedUpdate,
            (update_guards, apply_movement_intent)
                .chain()
                .in_set(TickSet::Guards)
                .run_if(in_state(LevelState::Sneaking)),
        );
        app.add_systems(OnExit(LevelState::Sneaking), halt_movers);
    }
}

/// Raise an alarm when the player steps onto a laser or switch. Standing on
/// it does not re-raise; stepping off re-arms it.
#[span_fn]
pub fn trip_lasers(
    mut commands: Commands,
    player: Query<&Transform, With<Player>>,
    triggers: Query<(Entity, &Transform, Has<Tripped>), With<AlarmTrigger>>,
    mut alarms: MessageWriter<AlarmRaised>,
) {
    let Ok(player) = player.single() else {
        return;
    };
    let player_tile = tile_of(player.translation.truncate());

    for (entity, transform, tripped) in &triggers {
        let on_trigger = tile_of(transform.translation.truncate()) == player_tile;
        if on_trigger && !tripped {
            info!("alarm tripped at ({}, {})", player_tile.x, player_tile.y);
            alarms.write(AlarmRaised { source: entity });
            commands.entity(entity).insert(Tripped);
        } else if !on_trigger && tripped {
            commands.entity(entity).remove::<Tripped>();
        }
    }
}

/// Run every guard's state machine in id order. All guards see the same
/// alarm: the last one raised this tick.
#[allow(clippy::type_complexity)]
#[span_fn]
pub fn update_guards(
    mut grid: ResMut<GridMap>,
    mut alarms: MessageReader<AlarmRaised>,
    triggers: Query<&AlarmTrigger>,
    mut guards: Query<(
        &GuardId,
        &Transform,
        &mut GuardBrain,
        &mut MovementIntent,
        &mut Facing,
        &mut LightCone,
    )>,
    mut stats: ResMut<TickStats>,
    time: Res<Time<Fixed>>,
) {
    let dt = time.timestep().as_secs_f32();
    let alarm = alarms.read().last().map(|raised| Alarm {
        source: raised.source,
        doors: triggers
            .get(raised.source)
            .map(|trigger| trigger.doors.clone())
            .unwrap_or_default(),
    });

    let mut ordered: Vec<_> = guards.iter_mut().collect();
    ordered.sort_by_key(|(id, ..)| **id);

    let mut alerted = 0;
    let mut expansions = 0;
    for (_, transform, mut brain, mut intent, mut facing, mut light) in ordered {
        intent.0 = brain.update(
            transform.translation.truncate(),
            dt,
            &mut grid,
            alarm.as_ref(),
        );
        facing.0 = brain.facing();
        light.facing_angle = brain.facing().angle();
        if brain.alarmed() {
            alerted += 1;
        }
        expansions += brain.last_expansions();
    }
    stats.guards_alerted = alerted;
    stats.planner_expansions = expansions;
}

/// Hand movement intents to the physics step.
pub fn apply_movement_intent(mut movers: Query<(&MovementIntent, &mut LinearVelocity)>) {
    for (intent, mut velocity) in &mut movers {
        velocity.0 = intent.0;
    }
}

/// Stop everything once the level is decided.
fn halt_movers(mut movers: Query<(&mut MovementIntent, &mut LinearVelocity)>) {
    for (mut intent, mut velocity) in &mut movers {
        intent.0 = Vec2::ZERO;
        velocity.0 = Vec2::ZERO;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Direction, Occupant, TilePos};
    use crate::level::{GuardSpec, GuardStatus, LightSpec};
    use crate::plugins::grid::{GridPlugin, OccupantKind, center_of};
    use crate::resources::AiConfig;
    use bevy::state::app::StatesPlugin;

    fn setup_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(StatesPlugin);
        app.insert_state(LevelState::Sneaking);
        app.insert_resource(GridMap::new(6, 3));
        app.add_plugins((GridPlugin, GuardPlugin));
        app
    }

    fn at(tile: TilePos) -> Transform {
        let c = center_of(tile);
        Transform::from_xyz(c.x, c.y, 0.0)
    }

    fn spawn_guard(app: &mut App, id: usize, waypoints: &[(i32, i32)]) -> Entity {
        let spec = GuardSpec {
            status: GuardStatus::Patrol,
            facing: Direction::Right,
            waypoints: waypoints.iter().map(|&(x, y)| TilePos::new(x, y)).collect(),
            speed: 2.0,
            light: Some(LightSpec {
                half_angle_degrees: 30.0,
                range: 5.0,
            }),
        };
        let cfg = AiConfig::default();
        let grid = app.world().resource::<GridMap>().clone();
        let brain = GuardBrain::new(id, &spec, &grid, &cfg).unwrap();
        let light = LightCone::new(&brain.light(), spec.facing, cfg.light_mask);
        app.world_mut()
            .spawn((
                brain,
                GuardId(id),
                at(spec.waypoints[0]),
                MovementIntent::default(),
                Facing(spec.facing),
                light,
                LinearVelocity::default(),
                Occupant(OccupantKind::Guard),
            ))
            .id()
    }

    fn tick(app: &mut App) {
        app.world_mut().run_schedule(FixedUpdate);
    }

    #[test]
    fn patrolling_guard_gets_velocity() {
        let mut app = setup_app();
        let guard = spawn_guard(&mut app, 0, &[(1, 1), (4, 1)]);

        // First tick acknowledges the starting post, second starts walking.
        tick(&mut app);
        tick(&mut app);

        let velocity = app.world().get::<LinearVelocity>(guard).unwrap();
        assert_eq!(velocity.0, Vec2::new(2.0, 0.0));
        let facing = app.world().get::<Facing>(guard).unwrap();
        assert_eq!(facing.0, Direction::Right);
        let stats = app.world().resource::<TickStats>();
        assert!(stats.planner_expansions > 0);
    }

    #[test]
    fn stepping_on_laser_alerts_guards_once() {
        let mut app = setup_app();
        let guard = spawn_guard(&mut app, 0, &[(1, 1), (4, 1)]);
        let laser_tile = TilePos::new(2, 1);
        let laser = app
            .world_mut()
            .spawn((
                AlarmTrigger {
                    doors: vec![TilePos::new(4, 1)],
                },
                Occupant(OccupantKind::Laser),
                at(laser_tile),
            ))
            .id();
        app.world_mut().spawn((
            Occupant(OccupantKind::DoorClosed),
            at(TilePos::new(4, 1)),
        ));
        app.world_mut()
            .spawn((Player, Occupant(OccupantKind::Player), at(laser_tile)));

        tick(&mut app);

        let brain = app.world().get::<GuardBrain>(guard).unwrap();
        assert!(brain.alarmed());
        assert_eq!(brain.last_trigger(), Some(laser));
        assert!(app.world().get::<Tripped>(laser).is_some());
        let velocity = app.world().get::<LinearVelocity>(guard).unwrap();
        assert_eq!(velocity.0.length(), 4.0);
        assert_eq!(app.world().resource::<TickStats>().guards_alerted, 1);

        // Standing still on the laser does not raise it again.
        tick(&mut app);
        let messages = app
            .world()
            .resource::<bevy::ecs::message::Messages<AlarmRaised>>();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn guards_halt_when_level_ends() {
        let mut app = setup_app();
        let guard = spawn_guard(&mut app, 0, &[(1, 1), (4, 1)]);
        tick(&mut app);
        tick(&mut app);
        assert_ne!(app.world().get::<LinearVelocity>(guard).unwrap().0, Vec2::ZERO);

        app.world_mut()
            .resource_mut::<NextState<LevelState>>()
            .set(LevelState::Caught);
        app.update();
        assert_eq!(app.world().get::<LinearVelocity>(guard).unwrap().0, Vec2::ZERO);
    }
}
