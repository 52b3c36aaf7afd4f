//! Integration tests: a full headless app with physics.
//!
//! Most tests pause virtual time and drive `FixedUpdate` by hand, so bodies
//! stay where the test puts them. The `running_app` tests instead advance
//! time by exactly one fixed step per frame and let avian move the bodies.

use std::time::Duration;

use avian2d::prelude::LinearVelocity;
use bevy::asset::AssetPlugin;
use bevy::prelude::*;
use bevy::scene::ScenePlugin;
use bevy::state::app::StatesPlugin;
use bevy::time::TimeUpdateStrategy;
use nightwatch::NightwatchPlugin;
use nightwatch::ai::guard::GuardBrain;
use nightwatch::app_state::LevelState;
use nightwatch::components::{GuardId, Player, SecurityCamera, TilePos, Tripped};
use nightwatch::events::PlayerCaught;
use nightwatch::level::LevelDescription;
use nightwatch::plugins::grid::{GridMap, OccupantKind, center_of, is_grid_aligned};
use nightwatch::plugins::vision::{EmitterKind, Sighting};
use nightwatch::resources::TickStats;

/// Guard 0 walks the corridor at y = 3. A laser at (3, 1) is wired to the
/// door at (5, 2). The camera in the corner watches the far column.
const LEVEL: &str = r#"{
    "width": 8,
    "height": 5,
    "objects": [
        {"kind": {"type": "wall"}, "tile": {"x": 0, "y": 0}},
        {"kind": {"type": "laser"}, "tile": {"x": 3, "y": 1}},
        {"kind": {"type": "door", "open": false}, "tile": {"x": 5, "y": 2}},
        {"kind": {"type": "exit"}, "tile": {"x": 6, "y": 1}},
        {"kind": {"type": "box"}, "tile": {"x": 2, "y": 2}}
    ],
    "guards": [{
        "status": "patrol",
        "facing": "right",
        "waypoints": [{"x": 1, "y": 3}, {"x": 6, "y": 3}],
        "light": {"half_angle_degrees": 30.0, "range": 4.0}
    }],
    "cameras": [{
        "tile": {"x": 7, "y": 4},
        "facing": "down",
        "light": {"half_angle_degrees": 20.0, "range": 2.0}
    }],
    "player_start": {"x": 1, "y": 1},
    "triggers": [{"object": 1, "doors": [{"x": 5, "y": 2}]}]
}"#;

/// A sleeping guard looks right down row 3; a wall stands two tiles ahead.
const OCCLUDED_LEVEL: &str = r#"{
    "width": 8,
    "height": 5,
    "objects": [
        {"kind": {"type": "wall"}, "tile": {"x": 3, "y": 3}}
    ],
    "guards": [{
        "status": "sleep",
        "facing": "right",
        "waypoints": [{"x": 1, "y": 3}],
        "light": {"half_angle_degrees": 30.0, "range": 4.0}
    }],
    "cameras": [],
    "player_start": {"x": 1, "y": 1},
    "triggers": []
}"#;

#[derive(Resource, Default)]
struct CaughtLog(Option<Sighting>);

fn setup_app() -> App {
    let mut app = build_app();
    app.world_mut().resource_mut::<Time<Virtual>>().pause();
    load(&mut app, LEVEL);
    app
}

/// Each frame advances time by one fixed step, so every `update` runs one
/// tick followed by one physics step.
fn running_app(level: &str) -> App {
    let mut app = build_app();
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
        1.0 / 64.0,
    )));
    load(&mut app, level);
    app
}

fn build_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    // Plugins required by avian2d but not in MinimalPlugins
    app.add_plugins(TransformPlugin);
    app.add_plugins(AssetPlugin::default());
    app.add_plugins(ScenePlugin);
    app.add_plugins(StatesPlugin);
    app.add_plugins(NightwatchPlugin);
    app.init_resource::<CaughtLog>();
    app.add_observer(|caught: On<PlayerCaught>, mut log: ResMut<CaughtLog>| {
        log.0 = Some(caught.sighting);
    });
    // finish() must be called before update(): avian2d registers its
    // diagnostics resources in Plugin::finish().
    app.finish();
    app.cleanup();
    app
}

fn load(app: &mut App, level: &str) {
    let level: LevelDescription = serde_json::from_str(level).unwrap();
    app.insert_resource(level);
    for _ in 0..3 {
        app.update();
    }
    assert_eq!(state(app), LevelState::Sneaking);
}

fn state(app: &App) -> LevelState {
    *app.world().resource::<State<LevelState>>().get()
}

/// One simulation tick, then a frame so state transitions apply.
fn tick(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
    app.update();
}

fn player(app: &mut App) -> Entity {
    let world = app.world_mut();
    world
        .query_filtered::<Entity, With<Player>>()
        .single(world)
        .unwrap()
}

fn guard(app: &mut App) -> Entity {
    let world = app.world_mut();
    world
        .query_filtered::<Entity, With<GuardId>>()
        .single(world)
        .unwrap()
}

fn move_player(app: &mut App, tile: TilePos) {
    let entity = player(app);
    let c = center_of(tile);
    app.world_mut()
        .get_mut::<Transform>(entity)
        .unwrap()
        .translation = Vec3::new(c.x, c.y, 0.0);
}

#[test]
fn level_spawns_everything() {
    let mut app = setup_app();

    let world = app.world_mut();
    assert_eq!(world.query::<&GuardBrain>().iter(world).count(), 1);
    assert_eq!(world.query::<&SecurityCamera>().iter(world).count(), 1);
    assert_eq!(world.query::<&Player>().iter(world).count(), 1);

    let grid = app.world().resource::<GridMap>();
    assert_eq!((grid.width, grid.height), (8, 5));
    assert_eq!(grid.occupant_at(0, 0), OccupantKind::Wall);
    assert_eq!(grid.occupant_at(5, 2), OccupantKind::DoorClosed);
    assert_eq!(grid.occupant_at(2, 2), OccupantKind::Box);
}

#[test]
fn occupancy_tracks_actors_each_tick() {
    let mut app = setup_app();
    tick(&mut app);

    let grid = app.world().resource::<GridMap>();
    assert_eq!(grid.occupant_at(1, 3), OccupantKind::Guard);
    assert_eq!(grid.occupant_at(1, 1), OccupantKind::Player);
    // Static objects survive the rewrite
    assert_eq!(grid.occupant_at(3, 1), OccupantKind::Laser);

    move_player(&mut app, TilePos::new(4, 1));
    tick(&mut app);
    let grid = app.world().resource::<GridMap>();
    assert_eq!(grid.occupant_at(1, 1), OccupantKind::None);
    assert_eq!(grid.occupant_at(4, 1), OccupantKind::Player);
}

#[test]
fn patrolling_guard_starts_walking() {
    let mut app = setup_app();
    let guard = guard(&mut app);

    tick(&mut app);
    tick(&mut app);

    let velocity = app.world().get::<LinearVelocity>(guard).unwrap();
    assert_eq!(velocity.0, Vec2::new(2.0, 0.0));
    assert_eq!(state(&app), LevelState::Sneaking);
}

#[test]
fn laser_alerts_guard() {
    let mut app = setup_app();
    let guard = guard(&mut app);
    tick(&mut app);

    move_player(&mut app, TilePos::new(3, 1));
    tick(&mut app);

    let brain = app.world().get::<GuardBrain>(guard).unwrap();
    assert!(brain.alarmed());
    assert!(brain.invariants_hold());
    let velocity = app.world().get::<LinearVelocity>(guard).unwrap();
    assert_eq!(velocity.0.length(), 4.0);
    assert_eq!(app.world().resource::<TickStats>().guards_alerted, 1);

    let world = app.world_mut();
    assert_eq!(world.query::<&Tripped>().iter(world).count(), 1);
    assert_eq!(state(&app), LevelState::Sneaking);
}

#[test]
fn player_in_front_of_guard_is_caught() {
    let mut app = setup_app();
    tick(&mut app);
    assert!(app.world().resource::<CaughtLog>().0.is_none());

    move_player(&mut app, TilePos::new(4, 3));
    tick(&mut app);

    assert_eq!(state(&app), LevelState::Caught);
    let sighting = app.world().resource::<CaughtLog>().0.unwrap();
    assert_eq!(sighting.kind, EmitterKind::Guard);
    assert_eq!(sighting.index, 0);

    // Everything stops once the level is decided
    let guard = guard(&mut app);
    assert_eq!(
        app.world().get::<LinearVelocity>(guard).unwrap().0,
        Vec2::ZERO
    );
}

#[test]
fn camera_catches_player() {
    let mut app = setup_app();
    move_player(&mut app, TilePos::new(7, 3));
    tick(&mut app);

    assert_eq!(state(&app), LevelState::Caught);
    let sighting = app.world().resource::<CaughtLog>().0.unwrap();
    assert_eq!(sighting.kind, EmitterKind::Camera);
}

#[test]
fn reaching_exit_escapes() {
    let mut app = setup_app();
    move_player(&mut app, TilePos::new(6, 1));
    tick(&mut app);
    assert_eq!(state(&app), LevelState::Escaped);
}

#[test]
fn restart_respawns_a_clean_level() {
    let mut app = setup_app();
    move_player(&mut app, TilePos::new(6, 1));
    tick(&mut app);
    assert_eq!(state(&app), LevelState::Escaped);

    app.world_mut()
        .resource_mut::<NextState<LevelState>>()
        .set(LevelState::Loading);
    for _ in 0..3 {
        app.update();
    }
    assert_eq!(state(&app), LevelState::Sneaking);

    let world = app.world_mut();
    assert_eq!(world.query::<&Player>().iter(world).count(), 1);
    assert_eq!(world.query::<&GuardBrain>().iter(world).count(), 1);
    let player = player(&mut app);
    let position = app.world().get::<Transform>(player).unwrap().translation;
    assert_eq!(position.truncate(), center_of(TilePos::new(1, 1)));
}

#[test]
fn guard_patrols_under_physics() {
    let mut app = running_app(LEVEL);
    // Out of the guard's sight for the whole walk.
    move_player(&mut app, TilePos::new(1, 0));
    let guard = guard(&mut app);

    let mut index = app.world().get::<GuardBrain>(guard).unwrap().path_index();
    let mut advances = 0;
    for _ in 0..600 {
        app.update();
        let brain = app.world().get::<GuardBrain>(guard).unwrap();
        if brain.path_index() != index {
            index = brain.path_index();
            advances += 1;
            let position = app.world().get::<Transform>(guard).unwrap().translation;
            assert!(is_grid_aligned(position.truncate()), "advanced at {position:?}");
        }
    }

    assert!(advances >= 2, "path index changed {advances} times");
    assert_eq!(state(&app), LevelState::Sneaking);
}

#[test]
fn wall_between_guard_and_player_blocks_the_light() {
    let mut app = running_app(OCCLUDED_LEVEL);

    move_player(&mut app, TilePos::new(4, 3));
    for _ in 0..10 {
        app.update();
    }
    assert_eq!(state(&app), LevelState::Sneaking);
    assert!(app.world().resource::<CaughtLog>().0.is_none());

    // Same row, this side of the wall.
    move_player(&mut app, TilePos::new(2, 3));
    for _ in 0..3 {
        app.update();
    }
    assert_eq!(state(&app), LevelState::Caught);
    let sighting = app.world().resource::<CaughtLog>().0.unwrap();
    assert_eq!(sighting.kind, EmitterKind::Guard);
}
