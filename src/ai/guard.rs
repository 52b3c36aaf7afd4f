//! Per-guard state machine: sleep, patrol and alert, plus the look-around
//! sequence and the misalignment recovery that keep a guard on the grid.
//!
//! A `GuardBrain` reads the guard's continuous position and returns a
//! movement intent (tiles per second). It never touches physics directly.

use bevy::prelude::*;
use micromegas_tracing::prelude::*;

use crate::components::{Direction, TilePos};
use crate::error::GuardConfigError;
use crate::level::{GuardSpec, GuardStatus, LightSpec};
use crate::plugins::grid::{
    ALIGN_TOLERANCE, GridMap, OccupantKind, center_of, is_grid_aligned, nearest_center, tile_of,
};
use crate::resources::AiConfig;

use super::alarm::{Alarm, nearest_accessible_neighbor, resolve_investigation};
use super::planner::{PathPlanner, PlanStep};

/// Facings held in turn while looking around.
pub const LOOK_AROUND: [Direction; 4] = [
    Direction::Up,
    Direction::Right,
    Direction::Down,
    Direction::Left,
];

/// Share of the commanded step a guard must cover for a tick to count as
/// progress.
const PROGRESS_FRACTION: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Sleep,
    Patrol,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalKind {
    /// One of the patrol waypoints.
    Waypoint,
    /// Free tile next to a box dropped on a waypoint.
    Escape,
    /// Investigation target: a door neighbor or the guard's own tile.
    Pursuit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Goal {
    pub point: Vec2,
    pub kind: GoalKind,
}

#[derive(Debug, Clone)]
struct PendingTrigger {
    source: Entity,
    doors: Vec<TilePos>,
    tried: Vec<TilePos>,
}

#[derive(Component, Debug)]
pub struct GuardBrain {
    index: usize,
    state: GuardState,
    initial_facing: Direction,
    facing: Direction,
    path: Vec<Vec2>,
    path_index: usize,
    goal: Goal,
    alarmed: bool,
    pending: Option<PendingTrigger>,
    last_trigger: Option<Entity>,
    looking: bool,
    look_timer: u32,
    misalign_timer: u32,
    inverted: bool,
    last_direction: Option<Direction>,
    last_position: Option<Vec2>,
    last_step: Vec2,
    tick_seconds: f32,
    stuck: bool,
    expansions: usize,
    speed: f32,
    light: LightSpec,
    tuning: AiConfig,
    planner: PathPlanner,
}

impl GuardBrain {
    /// Build a guard from its level entry. Bad configuration fails here so
    /// the level never starts with a guard that cannot run.
    pub fn new(
        index: usize,
        spec: &GuardSpec,
        grid: &GridMap,
        tuning: &AiConfig,
    ) -> Result<Self, GuardConfigError> {
        if spec.waypoints.is_empty() {
            return Err(GuardConfigError::EmptyPatrolPath { guard: index });
        }
        for (i, wp) in spec.waypoints.iter().enumerate() {
            if !grid.is_valid(wp.x, wp.y) {
                return Err(GuardConfigError::WaypointOutOfBounds {
                    guard: index,
                    index: i,
                    x: wp.x,
                    y: wp.y,
                });
            }
        }
        let light = spec
            .light
            .ok_or(GuardConfigError::MissingLight { guard: index })?;
        if !spec.speed.is_finite() || spec.speed <= 0.0 {
            return Err(GuardConfigError::InvalidSpeed {
                guard: index,
                speed: spec.speed,
            });
        }

        let path: Vec<Vec2> = spec.waypoints.iter().copied().map(center_of).collect();
        let state = match spec.status {
            GuardStatus::Sleep => GuardState::Sleep,
            GuardStatus::Patrol => GuardState::Patrol,
        };
        let goal = Goal {
            point: path[0],
            kind: GoalKind::Waypoint,
        };

        Ok(Self {
            index,
            state,
            initial_facing: spec.facing,
            facing: spec.facing,
            path,
            path_index: 0,
            goal,
            alarmed: false,
            pending: None,
            last_trigger: None,
            looking: false,
            look_timer: 0,
            misalign_timer: 0,
            inverted: false,
            last_direction: None,
            last_position: None,
            last_step: Vec2::ZERO,
            tick_seconds: 0.0,
            stuck: false,
            expansions: 0,
            speed: spec.speed,
            light,
            tuning: *tuning,
            planner: PathPlanner::new(),
        })
    }

    // -- accessors ---------------------------------------------------------

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn path_index(&self) -> usize {
        self.path_index
    }

    pub fn goal(&self) -> Goal {
        self.goal
    }

    pub fn alarmed(&self) -> bool {
        self.alarmed
    }

    /// Source of the most recent alarm this guard responded to.
    pub fn last_trigger(&self) -> Option<Entity> {
        self.last_trigger
    }

    pub fn is_looking(&self) -> bool {
        self.looking
    }

    pub fn look_timer(&self) -> u32 {
        self.look_timer
    }

    pub fn misalign_timer(&self) -> u32 {
        self.misalign_timer
    }

    /// Patrol posts as tile centers.
    pub fn waypoints(&self) -> &[Vec2] {
        &self.path
    }

    pub fn light(&self) -> LightSpec {
        self.light
    }

    /// Planner dequeues spent during the most recent `update`.
    pub fn last_expansions(&self) -> usize {
        self.expansions
    }

    /// `path_index` is in range and the goal is a waypoint, or a tile
    /// center for escape and pursuit goals.
    pub fn invariants_hold(&self) -> bool {
        let goal_ok = match self.goal.kind {
            GoalKind::Waypoint => self.path.contains(&self.goal.point),
            GoalKind::Escape | GoalKind::Pursuit => {
                self.goal.point.is_finite() && is_grid_aligned(self.goal.point)
            }
        };
        self.path_index < self.path.len() && goal_ok
    }

    // -- tick --------------------------------------------------------------

    /// Advance one tick of `dt` seconds and return the movement intent.
    ///
    /// `alarm` is the alarm raised this tick, if any; every guard sees the
    /// same value. The intent never carries the guard past the next tile
    /// center within one tick.
    pub fn update(
        &mut self,
        position: Vec2,
        dt: f32,
        grid: &mut GridMap,
        alarm: Option<&Alarm>,
    ) -> Vec2 {
        let progressed = self
            .last_position
            .replace(position)
            .is_some_and(|prev| made_progress(prev, position, self.last_step));
        self.tick_seconds = dt;
        self.expansions = 0;

        let intent = self.decide(position, grid, alarm, progressed);
        self.last_step = intent * dt;
        intent
    }

    fn decide(
        &mut self,
        position: Vec2,
        grid: &mut GridMap,
        alarm: Option<&Alarm>,
        progressed: bool,
    ) -> Vec2 {
        if let Some(alarm) = alarm {
            self.raise_alarm(position, grid, alarm);
        }

        if self.looking {
            return self.look_around_tick(position);
        }
        if self.state == GuardState::Sleep {
            return Vec2::ZERO;
        }
        if !is_grid_aligned(position) {
            return self.misaligned_tick(position, progressed);
        }
        self.misalign_timer = 0;
        self.inverted = false;

        let here = tile_of(position);
        let mut goal_tile = tile_of(self.goal.point);
        if grid.occupant_at(goal_tile.x, goal_tile.y) == OccupantKind::Box {
            match nearest_accessible_neighbor(grid, goal_tile, self.anchor_tile(), Some(here)) {
                Some(escape) => {
                    self.goal = Goal {
                        point: center_of(escape),
                        kind: GoalKind::Escape,
                    };
                    goal_tile = escape;
                }
                None => return self.on_stuck(position, grid),
            }
        }

        if here == goal_tile {
            return self.arrive(position);
        }

        let step = self.planner.step_toward(grid, here, goal_tile);
        self.expansions = self.planner.last_expansions();
        match step {
            PlanStep::Move(dir) => {
                self.stuck = false;
                self.commit(position, dir)
            }
            PlanStep::Hold => Vec2::ZERO,
            PlanStep::Stuck => self.on_stuck(position, grid),
        }
    }

    fn raise_alarm(&mut self, position: Vec2, grid: &GridMap, alarm: &Alarm) {
        let same_source = self
            .pending
            .as_ref()
            .is_some_and(|p| p.source == alarm.source);
        if self.alarmed && same_source {
            return;
        }

        info!("guard {} alerted by {:?}", self.index, alarm.source);
        self.last_trigger = Some(alarm.source);
        self.pending = Some(PendingTrigger {
            source: alarm.source,
            doors: alarm.doors.clone(),
            tried: Vec::new(),
        });
        self.alarmed = true;
        self.looking = false;
        self.stuck = false;
        self.enter(GuardState::Alert);
        self.retarget(position, grid);
    }

    /// Aim at the nearest untried door's accessible neighbor, or investigate
    /// in place once none is left.
    fn retarget(&mut self, position: Vec2, grid: &GridMap) {
        let here = tile_of(position);
        let anchor = self.anchor_tile();
        let choice = self
            .pending
            .as_ref()
            .and_then(|p| resolve_investigation(grid, &p.doors, here, anchor, &p.tried));

        self.goal = match choice {
            Some((door, target)) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.tried.push(door);
                }
                Goal {
                    point: center_of(target),
                    kind: GoalKind::Pursuit,
                }
            }
            None => Goal {
                point: nearest_center(position),
                kind: GoalKind::Pursuit,
            },
        };
    }

    fn arrive(&mut self, position: Vec2) -> Vec2 {
        match self.state {
            GuardState::Alert => {
                self.begin_look_around();
                self.look_around_tick(position)
            }
            GuardState::Patrol => {
                self.path_index = (self.path_index + 1) % self.path.len();
                self.goal = self.waypoint(self.path_index);
                if self.path.len() == 1 {
                    self.enter(GuardState::Sleep);
                    self.facing = self.initial_facing;
                }
                Vec2::ZERO
            }
            GuardState::Sleep => Vec2::ZERO,
        }
    }

    fn begin_look_around(&mut self) {
        self.looking = true;
        self.look_timer = 0;
        self.last_direction = None;
    }

    fn look_around_tick(&mut self, position: Vec2) -> Vec2 {
        let hold = self.tuning.look_hold_ticks.max(1);
        if self.look_timer >= hold * LOOK_AROUND.len() as u32 {
            self.finish_look_around(position);
            return Vec2::ZERO;
        }
        self.facing = LOOK_AROUND[(self.look_timer / hold) as usize];
        self.look_timer += 1;
        Vec2::ZERO
    }

    fn finish_look_around(&mut self, position: Vec2) {
        self.looking = false;
        self.alarmed = false;
        self.pending = None;
        self.goal = self.waypoint(self.path_index);

        let on_post = is_grid_aligned(position) && tile_of(position) == tile_of(self.path[0]);
        if self.path.len() == 1 && on_post {
            self.enter(GuardState::Sleep);
            self.facing = self.initial_facing;
        } else {
            self.enter(GuardState::Patrol);
        }
    }

    /// Off-center: keep the committed direction until its axis reaches a
    /// center, then recenter the other axis. Ticks that fall short of the
    /// commanded step feed the invert and reset thresholds.
    fn misaligned_tick(&mut self, position: Vec2, progressed: bool) -> Vec2 {
        if !progressed {
            self.misalign_timer += 1;
        }

        if self.misalign_timer >= self.tuning.misalign_reset_ticks {
            warn!(
                "guard {} stuck off-grid at ({}, {}), resetting patrol",
                self.index, position.x, position.y
            );
            self.misalign_timer = 0;
            self.inverted = false;
            self.path_index = 0;
            self.goal = self.waypoint(0);
            self.begin_look_around();
            return self.look_around_tick(position);
        }

        if self.misalign_timer >= self.tuning.misalign_invert_ticks && !self.inverted {
            self.inverted = true;
            let reversed = self
                .last_direction
                .unwrap_or_else(|| recenter_direction(position))
                .opposite();
            self.last_direction = Some(reversed);
        }

        match self.last_direction {
            Some(dir) if !axis_aligned(position, dir) => self.commit(position, dir),
            _ => {
                let dir = recenter_direction(position);
                self.facing = dir;
                self.intent(position, dir)
            }
        }
    }

    fn on_stuck(&mut self, position: Vec2, grid: &GridMap) -> Vec2 {
        if !self.stuck {
            warn!(
                "guard {} cannot reach goal ({}, {})",
                self.index, self.goal.point.x, self.goal.point.y
            );
            self.stuck = true;
        }
        if self.alarmed {
            self.retarget(position, grid);
        } else {
            self.goal = self.waypoint(0);
        }
        self.path_index = 0;
        Vec2::ZERO
    }

    fn commit(&mut self, position: Vec2, dir: Direction) -> Vec2 {
        self.last_direction = Some(dir);
        self.facing = dir;
        self.intent(position, dir)
    }

    fn intent(&self, position: Vec2, dir: Direction) -> Vec2 {
        let mut speed = if self.alarmed {
            self.speed * self.tuning.alert_speed_multiplier
        } else {
            self.speed
        };
        if self.tick_seconds > 0.0 {
            speed = speed.min(distance_to_next_center(position, dir) / self.tick_seconds);
        }
        dir.vector() * speed
    }

    fn enter(&mut self, state: GuardState) {
        self.state = state;
        self.look_timer = 0;
        self.misalign_timer = 0;
        self.inverted = false;
    }

    fn waypoint(&self, index: usize) -> Goal {
        Goal {
            point: self.path[index],
            kind: GoalKind::Waypoint,
        }
    }

    /// The waypoint the guard last left, used to anchor rerouting.
    fn anchor_tile(&self) -> TilePos {
        let len = self.path.len();
        tile_of(self.path[(self.path_index + len - 1) % len])
    }
}

/// Whether the guard covered at least `PROGRESS_FRACTION` of `step` along
/// its direction since the previous tick.
fn made_progress(prev: Vec2, position: Vec2, step: Vec2) -> bool {
    let length = step.length();
    if length <= f32::EPSILON {
        return false;
    }
    (position - prev).dot(step) / length >= PROGRESS_FRACTION * length
}

/// Distance from `position` to the next tile center strictly ahead along
/// `dir`.
fn distance_to_next_center(position: Vec2, dir: Direction) -> f32 {
    let forward = |c: f32| (c - 0.5).floor() + 1.5 - c;
    let backward = |c: f32| c - ((c - 0.5).ceil() - 0.5);
    match dir {
        Direction::Right => forward(position.x),
        Direction::Left => backward(position.x),
        Direction::Up => forward(position.y),
        Direction::Down => backward(position.y),
    }
}

/// Whether `position` sits on a center along the axis `dir` moves on.
fn axis_aligned(position: Vec2, dir: Direction) -> bool {
    let offset = (position - nearest_center(position)).abs();
    match dir {
        Direction::Left | Direction::Right => offset.x <= ALIGN_TOLERANCE,
        Direction::Up | Direction::Down => offset.y <= ALIGN_TOLERANCE,
    }
}

/// Direction toward the nearest tile center along the axis with the larger
/// offset.
fn recenter_direction(position: Vec2) -> Direction {
    let offset = nearest_center(position) - position;
    if offset.x.abs() >= offset.y.abs() {
        if offset.x >= 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if offset.y >= 0.0 {
        Direction::Up
    } else {
        Direction::Down
    }
}
