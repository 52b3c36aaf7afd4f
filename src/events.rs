//! Messages and events exchanged between the trigger, guard and vision systems.

use bevy::prelude::*;

use crate::plugins::vision::Sighting;

/// A laser or switch fired. Read once per tick and handed to every guard.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmRaised {
    pub source: Entity,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct PlayerCaught {
    pub sighting: Sighting,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct PlayerEscaped;
