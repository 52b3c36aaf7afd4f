//! Navigation grid: per-tile validity, occupancy, and planner marks.
//!
//! The grid is pure data. The level driver rewrites occupancy once per tick
//! (`refresh_occupancy`) from every entity carrying an `Occupant`; guards and
//! their planners only read it, apart from the goal/visited scratch marks.

use bevy::prelude::*;
use micromegas_tracing::prelude::*;
use pathfinding::matrix::Matrix;

use crate::app_state::LevelState;
use crate::components::{Occupant, TilePos};
use crate::level::ObjectKind;

pub struct GridPlugin;

impl Plugin for GridPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            FixedUpdate,
            (
                TickSet::Occupancy,
                TickSet::Triggers,
                TickSet::Guards,
                TickSet::Vision,
            )
                .chain(),
        );
        app.add_systems(
            FixedUpdate,
            refresh_occupancy
                .in_set(TickSet::Occupancy)
                .run_if(in_state(LevelState::Sneaking)),
        );
    }
}

/// Ordering of the per-tick systems: occupancy, then triggers and guard AI,
/// then the vision pass.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum TickSet {
    Occupancy,
    Triggers,
    Guards,
    Vision,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Half-width of the band around a tile center that counts as "on" it.
pub const ALIGN_TOLERANCE: f32 = 0.05;

// ---------------------------------------------------------------------------
// Occupants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OccupantKind {
    #[default]
    None,
    Wall,
    Guard,
    Player,
    Laser,
    Box,
    DoorOpen,
    DoorClosed,
    Switch,
    Exit,
}

impl OccupantKind {
    /// Guards may cross empty floor, laser beams and the player's tile.
    pub fn is_passable(&self) -> bool {
        matches!(
            self,
            OccupantKind::None | OccupantKind::Laser | OccupantKind::Player
        )
    }

    /// When several objects share a tile, the highest precedence is kept.
    fn precedence(&self) -> u8 {
        match self {
            OccupantKind::None => 0,
            OccupantKind::Player => 1,
            OccupantKind::DoorOpen => 2,
            OccupantKind::Exit => 3,
            OccupantKind::Laser => 4,
            OccupantKind::Switch => 5,
            OccupantKind::Guard => 6,
            OccupantKind::Box => 7,
            OccupantKind::DoorClosed => 8,
            OccupantKind::Wall => 9,
        }
    }

    fn from_glyph(c: char) -> Option<Self> {
        match c {
            '.' => Some(OccupantKind::None),
            '#' => Some(OccupantKind::Wall),
            'G' => Some(OccupantKind::Guard),
            'P' => Some(OccupantKind::Player),
            '~' => Some(OccupantKind::Laser),
            'B' => Some(OccupantKind::Box),
            '/' => Some(OccupantKind::DoorOpen),
            'D' => Some(OccupantKind::DoorClosed),
            's' => Some(OccupantKind::Switch),
            'E' => Some(OccupantKind::Exit),
            _ => None,
        }
    }

    pub fn glyph(&self) -> char {
        match self {
            OccupantKind::None => '.',
            OccupantKind::Wall => '#',
            OccupantKind::Guard => 'G',
            OccupantKind::Player => 'P',
            OccupantKind::Laser => '~',
            OccupantKind::Box => 'B',
            OccupantKind::DoorOpen => '/',
            OccupantKind::DoorClosed => 'D',
            OccupantKind::Switch => 's',
            OccupantKind::Exit => 'E',
        }
    }
}

/// Map a level object to its grid occupant. Called once per object at spawn.
pub fn classify_occupant(kind: &ObjectKind) -> OccupantKind {
    match kind {
        ObjectKind::Wall => OccupantKind::Wall,
        ObjectKind::Laser => OccupantKind::Laser,
        ObjectKind::Box => OccupantKind::Box,
        ObjectKind::Door { open: true } => OccupantKind::DoorOpen,
        ObjectKind::Door { open: false } => OccupantKind::DoorClosed,
        ObjectKind::Switch => OccupantKind::Switch,
        ObjectKind::Exit => OccupantKind::Exit,
    }
}

// ---------------------------------------------------------------------------
// Cells and map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub valid: bool,
    pub occupied: bool,
    pub occupant: OccupantKind,
    pub is_goal: bool,
    pub visited: bool,
}

impl Default for GridCell {
    fn default() -> Self {
        Self {
            valid: true,
            occupied: false,
            occupant: OccupantKind::None,
            is_goal: false,
            visited: false,
        }
    }
}

/// The level's navigation grid. Row index is `y`, column index is `x`.
#[derive(Resource, Debug, Clone)]
pub struct GridMap {
    pub width: usize,
    pub height: usize,
    cells: Matrix<GridCell>,
    goal: Option<TilePos>,
}

impl GridMap {
    /// All-valid, unoccupied grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: Matrix::new(height, width, GridCell::default()),
            goal: None,
        }
    }

    /// Parse an ASCII picture of the grid. The first line is the top row
    /// (highest `y`). A space is a void (invalid) tile.
    pub fn from_ascii(text: &str) -> Result<Self, String> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Err("Empty grid".to_string());
        }
        let height = lines.len();
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        if width == 0 {
            return Err("Grid has zero width".to_string());
        }

        let mut grid = GridMap::new(width, height);
        for (row, line) in lines.iter().enumerate() {
            let y = (height - 1 - row) as i32;
            let mut chars = line.chars();
            for x in 0..width as i32 {
                match chars.next() {
                    Some(' ') | None => grid.mark_invalid(x, y),
                    Some(c) => {
                        let kind = OccupantKind::from_glyph(c).ok_or_else(|| {
                            format!("Unknown tile character '{}' at ({}, {})", c, x, y)
                        })?;
                        grid.place(x, y, kind);
                    }
                }
            }
        }
        Ok(grid)
    }

    /// Render the grid back to ASCII, top row first.
    pub fn to_ascii(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for y in (0..self.height as i32).rev() {
            for x in 0..self.width as i32 {
                let c = match self.cell(x, y) {
                    Some(cell) if cell.valid => cell.occupant.glyph(),
                    _ => ' ',
                };
                out.push(c);
            }
            out.push('\n');
        }
        out
    }

    fn cell(&self, x: i32, y: i32) -> Option<&GridCell> {
        if x < 0 || y < 0 {
            return None;
        }
        self.cells.get((y as usize, x as usize))
    }

    fn cell_mut(&mut self, x: i32, y: i32) -> Option<&mut GridCell> {
        if x < 0 || y < 0 {
            return None;
        }
        self.cells.get_mut((y as usize, x as usize))
    }

    fn for_each_cell_mut(&mut self, mut f: impl FnMut(&mut GridCell)) {
        for row in 0..self.height {
            for col in 0..self.width {
                if let Some(cell) = self.cells.get_mut((row, col)) {
                    f(cell);
                }
            }
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.cell(x, y).is_some()
    }

    /// Inside the grid and not a void tile.
    pub fn is_valid(&self, x: i32, y: i32) -> bool {
        self.cell(x, y).is_some_and(|c| c.valid)
    }

    /// Valid and holding nothing a guard cannot cross.
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.cell(x, y)
            .is_some_and(|c| c.valid && c.occupant.is_passable())
    }

    pub fn is_walkable_tile(&self, tile: TilePos) -> bool {
        self.is_walkable(tile.x, tile.y)
    }

    pub fn occupant_at(&self, x: i32, y: i32) -> OccupantKind {
        self.cell(x, y).map(|c| c.occupant).unwrap_or_default()
    }

    pub fn mark_invalid(&mut self, x: i32, y: i32) {
        if let Some(cell) = self.cell_mut(x, y) {
            cell.valid = false;
        }
    }

    // -- occupancy feed ----------------------------------------------------

    /// Forget every occupant before a fresh occupancy write.
    pub fn begin_occupancy_frame(&mut self) {
        self.for_each_cell_mut(|cell| {
            cell.occupant = OccupantKind::None;
            cell.occupied = false;
        });
    }

    /// Record `kind` on a tile unless something more blocking is there.
    /// Out-of-bounds writes are ignored.
    pub fn place(&mut self, x: i32, y: i32, kind: OccupantKind) {
        if let Some(cell) = self.cell_mut(x, y)
            && kind.precedence() >= cell.occupant.precedence()
        {
            cell.occupant = kind;
            cell.occupied = kind != OccupantKind::None;
        }
    }

    // -- planner marks -----------------------------------------------------

    /// Reset goal and visited marks for a new planning round.
    pub fn clear_marks(&mut self) {
        self.for_each_cell_mut(|cell| {
            cell.is_goal = false;
            cell.visited = false;
        });
        self.goal = None;
    }

    /// Reset visited marks only, keeping the goal.
    pub fn clear_visited(&mut self) {
        self.for_each_cell_mut(|cell| cell.visited = false);
    }

    /// Mark the single goal tile for this planning round.
    pub fn set_goal(&mut self, x: i32, y: i32) {
        if let Some(previous) = self.goal.take()
            && let Some(cell) = self.cell_mut(previous.x, previous.y)
        {
            cell.is_goal = false;
        }
        if let Some(cell) = self.cell_mut(x, y) {
            cell.is_goal = true;
            self.goal = Some(TilePos::new(x, y));
        }
    }

    pub fn is_goal(&self, x: i32, y: i32) -> bool {
        self.cell(x, y).is_some_and(|c| c.is_goal)
    }

    pub fn goal(&self) -> Option<TilePos> {
        self.goal
    }

    pub fn set_visited(&mut self, x: i32, y: i32) {
        if let Some(cell) = self.cell_mut(x, y) {
            cell.visited = true;
        }
    }

    pub fn is_visited(&self, x: i32, y: i32) -> bool {
        self.cell(x, y).is_some_and(|c| c.visited)
    }
}

// ---------------------------------------------------------------------------
// Coordinate conversion
// ---------------------------------------------------------------------------

/// Continuous position to tile: `floor(coord - 0.5)`, widened by the
/// alignment band so a center that rounding left just short maps to its
/// own tile.
pub fn tile_of(pos: Vec2) -> TilePos {
    let axis = |c: f32| (c - 0.5 + ALIGN_TOLERANCE).floor() as i32;
    TilePos {
        x: axis(pos.x),
        y: axis(pos.y),
    }
}

/// Tile to continuous tile center.
pub fn center_of(tile: TilePos) -> Vec2 {
    Vec2::new(tile.x as f32 + 0.5, tile.y as f32 + 0.5)
}

/// Closest tile center to `pos`.
pub fn nearest_center(pos: Vec2) -> Vec2 {
    let axis = |c: f32| (c - 0.5).round() + 0.5;
    Vec2::new(axis(pos.x), axis(pos.y))
}

/// Whether `pos` lies on a tile center, within `ALIGN_TOLERANCE` per axis.
pub fn is_grid_aligned(pos: Vec2) -> bool {
    let offset = (pos - nearest_center(pos)).abs();
    offset.x <= ALIGN_TOLERANCE && offset.y <= ALIGN_TOLERANCE
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Rewrite grid occupancy from every tracked object's current position.
#[span_fn]
pub fn refresh_occupancy(
    mut grid: ResMut<GridMap>,
    objects: Query<(&Transform, &Occupant)>,
) {
    grid.begin_occupancy_frame();
    for (transform, occupant) in &objects {
        let tile = tile_of(transform.translation.truncate());
        grid.place(tile.x, tile.y, occupant.0);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
