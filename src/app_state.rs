use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, States)]
pub enum LevelState {
    /// Waiting for a `LevelDescription` to spawn.
    #[default]
    Loading,
    Sneaking,
    /// A guard or camera saw the player.
    Caught,
    /// The player reached an exit.
    Escaped,
}
