//! Bounded best-first grid search that yields only the first hop of a route.
//!
//! Each guard owns one `PathPlanner`. The frontier is reused between calls
//! but always left empty, so nodes never leak from one search into the next.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::components::{Direction, TilePos};
use crate::plugins::grid::GridMap;

use super::manhattan;

/// Outcome of one planning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    /// Already on the goal tile; no search was run.
    Hold,
    /// First step of the discovered route.
    Move(Direction),
    /// Goal unreachable, or the expansion cap was hit.
    Stuck,
}

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    tile: TilePos,
    cost: u32,
    first: Direction,
    priority: u32,
    seq: u32,
}

// Min-heap on (priority, seq): lower priority first, earlier insertion on ties.
impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchNode {}

#[derive(Debug, Default)]
pub struct PathPlanner {
    frontier: BinaryHeap<SearchNode>,
    seq: u32,
    expansions: usize,
}

impl PathPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dequeues performed by the most recent call.
    pub fn last_expansions(&self) -> usize {
        self.expansions
    }

    /// Mark `goal` as the only goal on `grid`, then plan from `from`.
    pub fn step_toward(&mut self, grid: &mut GridMap, from: TilePos, goal: TilePos) -> PlanStep {
        grid.clear_marks();
        grid.set_goal(goal.x, goal.y);
        self.step(grid, from)
    }

    /// Plan one step from `from` toward the tile currently marked as goal on
    /// `grid`. Visited marks are reset here; the goal mark is the caller's.
    ///
    /// At most `width * height` nodes are dequeued. Running out of frontier
    /// or hitting the cap reports `Stuck`.
    pub fn step(&mut self, grid: &mut GridMap, from: TilePos) -> PlanStep {
        self.expansions = 0;
        self.frontier.clear();
        self.seq = 0;

        let Some(goal) = grid.goal() else {
            return PlanStep::Stuck;
        };
        if from == goal {
            return PlanStep::Hold;
        }

        grid.clear_visited();
        grid.set_visited(from.x, from.y);
        for dir in Direction::ALL {
            self.push_if_open(grid, from.step(dir), 1, dir, goal);
        }

        let cap = grid.width * grid.height;
        let mut outcome = PlanStep::Stuck;
        while let Some(node) = self.frontier.pop() {
            if self.expansions >= cap {
                break;
            }
            self.expansions += 1;

            if node.tile == goal {
                outcome = PlanStep::Move(node.first);
                break;
            }
            for dir in Direction::ALL {
                self.push_if_open(grid, node.tile.step(dir), node.cost + 1, node.first, goal);
            }
        }

        self.frontier.clear();
        outcome
    }

    fn push_if_open(
        &mut self,
        grid: &mut GridMap,
        tile: TilePos,
        cost: u32,
        first: Direction,
        goal: TilePos,
    ) {
        if grid.is_visited(tile.x, tile.y) || !grid.is_walkable_tile(tile) {
            return;
        }
        grid.set_visited(tile.x, tile.y);
        self.frontier.push(SearchNode {
            tile,
            cost,
            first,
            priority: manhattan(&tile, &goal) + cost,
            seq: self.seq,
        });
        self.seq += 1;
    }
}
