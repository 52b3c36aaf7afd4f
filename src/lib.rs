pub mod ai;
pub mod app_state;
pub mod components;
pub mod error;
pub mod events;
pub mod level;
pub mod plugins;
pub mod resources;

use avian2d::prelude::*;
use bevy::prelude::*;

use app_state::LevelState;
use plugins::grid::GridPlugin;
use plugins::guards::GuardPlugin;
use plugins::level::LevelPlugin;
use plugins::telemetry::TelemetryPlugin;
use plugins::vision::VisionPlugin;
use resources::AiConfig;

/// Everything the stealth core needs on top of a headless or windowed app.
/// Insert a `LevelDescription` resource to start a level.
pub struct NightwatchPlugin;

impl Plugin for NightwatchPlugin {
    fn build(&self, app: &mut App) {
        // Physics: guards and the player are avian bodies in tile units
        app.add_plugins(PhysicsPlugins::default());

        // State machine (StatesPlugin comes from DefaultPlugins)
        app.init_state::<LevelState>();
        app.init_resource::<AiConfig>();

        app.add_plugins(GridPlugin);
        app.add_plugins(GuardPlugin);
        app.add_plugins(VisionPlugin);
        app.add_plugins(LevelPlugin);
        app.add_plugins(TelemetryPlugin);
    }
}
