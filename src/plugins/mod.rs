pub mod grid;
pub mod guards;
pub mod level;
pub mod telemetry;
pub mod vision;
