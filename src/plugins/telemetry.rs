//! Frame-level telemetry: frame time plus the guard tick counters.

use bevy::prelude::*;
use micromegas_tracing::prelude::{fmetric, imetric, span_scope};

use crate::resources::TickStats;

pub struct TelemetryPlugin;

impl Plugin for TelemetryPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TickStats>();
        app.add_systems(Last, frame_telemetry);
    }
}

fn frame_telemetry(time: Res<Time>, stats: Res<TickStats>) {
    span_scope!("frame");
    let dt_ms = time.delta_secs_f64() * 1000.0;
    fmetric!("frame_time_ms", "ms", dt_ms);
    imetric!("guards_alerted", "count", stats.guards_alerted as u64);
    imetric!("planner_expansions", "count", stats.planner_expansions as u64);
}
