use avian2d::prelude::*;
use bevy::prelude::*;
use serde::Deserialize;

use crate::plugins::vision::GameLayer;

// ---------------------------------------------------------------------------
// AI tuning
// ---------------------------------------------------------------------------

/// Tick-based tuning shared by every guard in a level.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Ticks each look-around facing is held.
    pub look_hold_ticks: u32,
    /// Misaligned ticks before the guard reverses its direction once.
    pub misalign_invert_ticks: u32,
    /// Misaligned ticks before a full reset to the first waypoint.
    pub misalign_reset_ticks: u32,
    /// Speed factor applied while alarmed.
    pub alert_speed_multiplier: f32,
    /// Collision categories that block (or are) a light's line of sight.
    pub light_mask: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            look_hold_ticks: 50,
            misalign_invert_ticks: 30,
            misalign_reset_ticks: 60,
            alert_speed_multiplier: 2.0,
            light_mask: GameLayer::Wall.to_bits()
                | GameLayer::Prop.to_bits()
                | GameLayer::Player.to_bits(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-tick stats
// ---------------------------------------------------------------------------

/// Counters from the most recent guard tick, read by telemetry.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct TickStats {
    pub guards_alerted: u32,
    pub planner_expansions: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
