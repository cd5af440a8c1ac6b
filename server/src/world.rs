//! World model: snakes and the food pool. Pure state with narrow mutation
//! entry points; all I/O and scheduling live elsewhere. The simulation loop
//! is the only owner of a `World` while a tick is in progress.

use log::{debug, info};
use rand::Rng;
use shared::{
    Vec2, FOOD_COUNT, FOOD_RADIUS, GRACE_PERIOD, SEGMENT_SPACING, SNAKE_SPEED, START_LENGTH,
    WORLD_SIZE,
};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

pub type PlayerId = u32;

/// Minimum distance between a fresh spawn and every living snake segment.
const SAFE_SPAWN_DISTANCE: f32 = 50.0;
/// Rejection-sampling retry bound for spawn and food placement.
const MAX_PLACEMENT_ATTEMPTS: u32 = 20;
/// Margin kept between a spawn point and the world edge.
const SPAWN_MARGIN: f32 = 200.0;

/// One player's snake. Segments are head-first; a dead snake keeps its entry
/// (score, identity, display attributes) until the session goes away.
#[derive(Debug, Clone)]
pub struct Snake {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub segments: VecDeque<Vec2>,
    pub heading: Vec2,
    pub speed: f32,
    pub score: u32,
    pub alive: bool,
    pub spawned_at: Instant,
    pending_growth: u32,
}

impl Snake {
    /// Lays out `START_LENGTH` segments trailing left from `head`, heading
    /// right, the classic starting pose.
    fn with_layout(id: PlayerId, name: String, color: String, head: Vec2, now: Instant) -> Self {
        let mut segments = VecDeque::with_capacity(START_LENGTH);
        for i in 0..START_LENGTH {
            let trail = Vec2::new(head.x - i as f32 * SEGMENT_SPACING, head.y);
            segments.push_back(trail.wrap(WORLD_SIZE));
        }

        Snake {
            id,
            name,
            color,
            segments,
            heading: Vec2::new(1.0, 0.0),
            speed: SNAKE_SPEED,
            score: 0,
            alive: true,
            spawned_at: now,
            pending_growth: 0,
        }
    }

    pub fn head(&self) -> Vec2 {
        *self.segments.front().expect("snake has at least one segment")
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Applies a requested heading. Zero vectors are ignored, as are
    /// reversals (a turn of more than 90 degrees would fold the snake onto
    /// its own neck).
    pub fn steer(&mut self, requested: Vec2) {
        let normalized = requested.normalized();
        if normalized.magnitude() == 0.0 {
            return;
        }
        if self.heading.dot(&normalized) < 0.0 {
            return;
        }
        self.heading = normalized;
    }

    /// Moves the head one tick along the current heading and lets the body
    /// follow the leader: every segment takes the position previously held by
    /// the segment ahead of it, which a push-front/pop-back pair reproduces
    /// exactly. While growth is pending the tail stays put, so length never
    /// decreases on a living snake.
    pub fn advance(&mut self) {
        if !self.alive {
            return;
        }

        let new_head = self
            .head()
            .add(&self.heading.scale(self.speed))
            .wrap(WORLD_SIZE);
        self.segments.push_front(new_head);

        if self.pending_growth > 0 {
            self.pending_growth -= 1;
        } else {
            self.segments.pop_back();
        }
    }

    /// Schedules one segment of growth, realized on the next advance.
    pub fn grow(&mut self) {
        self.pending_growth += 1;
    }

    /// A snake inside its grace period cannot be eliminated.
    pub fn in_grace(&self, now: Instant) -> bool {
        now.duration_since(self.spawned_at) < GRACE_PERIOD
    }
}

/// The authoritative world: every snake, the fixed-size food pool, dead
/// players awaiting respawn, and the tick counter.
pub struct World {
    pub snakes: HashMap<PlayerId, Snake>,
    pub food: Vec<Vec2>,
    pub dead_since: HashMap<PlayerId, Instant>,
    pub tick: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        let mut world = World {
            snakes: HashMap::new(),
            food: Vec::with_capacity(FOOD_COUNT),
            dead_since: HashMap::new(),
            tick: 0,
        };
        while world.food.len() < FOOD_COUNT {
            let pos = world.sample_food_position();
            world.food.push(pos);
        }
        world
    }

    /// Picks a food position that does not overlap any current food item,
    /// best-effort within the retry bound.
    fn sample_food_position(&self) -> Vec2 {
        let mut rng = rand::thread_rng();
        let mut candidate = Vec2::default();

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            candidate = Vec2::new(
                rng.gen_range(0.0..WORLD_SIZE),
                rng.gen_range(0.0..WORLD_SIZE),
            );
            let clear = self
                .food
                .iter()
                .all(|f| f.distance(&candidate) >= 2.0 * FOOD_RADIUS);
            if clear {
                return candidate;
            }
        }
        candidate
    }

    /// Replaces a consumed food item in place, keeping the pool size fixed.
    pub fn replace_food(&mut self, index: usize) {
        let pos = self.sample_food_position();
        self.food[index] = pos;
    }

    /// Picks a spawn head position away from every living snake, best-effort
    /// within the retry bound.
    fn sample_spawn_position(&self) -> Vec2 {
        let mut rng = rand::thread_rng();
        let mut candidate = Vec2::new(WORLD_SIZE / 2.0, WORLD_SIZE / 2.0);

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            candidate = Vec2::new(
                rng.gen_range(SPAWN_MARGIN..WORLD_SIZE - SPAWN_MARGIN),
                rng.gen_range(SPAWN_MARGIN..WORLD_SIZE - SPAWN_MARGIN),
            );
            let clear = self
                .snakes
                .values()
                .filter(|s| s.alive)
                .flat_map(|s| s.segments.iter())
                .all(|seg| seg.distance(&candidate) >= SAFE_SPAWN_DISTANCE);
            if clear {
                break;
            }
        }
        candidate
    }

    /// Creates a snake for a newly joined player at a safe random position.
    pub fn spawn_snake(&mut self, id: PlayerId, name: String, color: String, now: Instant) {
        let head = self.sample_spawn_position();
        self.spawn_snake_at(id, name, color, head, now);
    }

    /// Creates a snake with an explicit head position. Exposed for the rules
    /// engine's scenario tests.
    pub fn spawn_snake_at(
        &mut self,
        id: PlayerId,
        name: String,
        color: String,
        head: Vec2,
        now: Instant,
    ) {
        let snake = Snake::with_layout(id, name, color, head, now);
        info!(
            "Spawned snake {} ({}) at ({:.0}, {:.0})",
            id, snake.name, head.x, head.y
        );
        self.snakes.insert(id, snake);
    }

    /// Brings a dead player back with starting size, a fresh safe position,
    /// and a new grace period. Identity, display attributes and the
    /// already-halved score carry over.
    pub fn respawn_snake(&mut self, id: PlayerId, now: Instant) {
        let head = self.sample_spawn_position();
        if let Some(snake) = self.snakes.get_mut(&id) {
            let revived = Snake::with_layout(
                id,
                snake.name.clone(),
                snake.color.clone(),
                head,
                now,
            );
            let score = snake.score;
            *snake = revived;
            snake.score = score;
            debug!("Respawned snake {} with score {}", id, score);
        }
    }

    /// Tears down a player entirely (session gone).
    pub fn remove_snake(&mut self, id: PlayerId) {
        self.snakes.remove(&id);
        self.dead_since.remove(&id);
    }
}
