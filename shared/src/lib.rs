//! Types shared between the authoritative snake server and its protocol peers:
//! gameplay constants, 2D vector math with wrap-around arithmetic, and the
//! wire protocol (see [`protocol`]).

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod protocol;

/// Side length of the square, wrap-around world.
pub const WORLD_SIZE: f32 = 3000.0;
/// Number of food items kept alive in the world at all times.
pub const FOOD_COUNT: usize = 1050;
pub const FOOD_RADIUS: f32 = 5.0;
pub const SNAKE_RADIUS: f32 = 10.0;
/// Distance a snake head travels per simulation tick.
pub const SNAKE_SPEED: f32 = 7.0;
/// Segment count of a freshly spawned snake.
pub const START_LENGTH: usize = 5;
/// Spacing between the initial segments of a new snake.
pub const SEGMENT_SPACING: f32 = 3.0;

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 15;
/// A state snapshot goes out every this many ticks (15 Hz / 3 = 5 Hz).
pub const BROADCAST_EVERY: u64 = 3;

/// Window after (re)spawn during which a snake cannot be eliminated.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Delay between elimination and respawn.
pub const RESPAWN_DELAY: Duration = Duration::from_secs(5);
/// Score awarded to the snake that eliminated another.
pub const KILL_REWARD: u32 = 10;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_PLAYERS: usize = 20;

/// Represents a vector (or position) in 2D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or the zero vector if the magnitude is zero.
    pub fn normalized(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2 { x: 0.0, y: 0.0 }
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance(&self, other: &Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Maps both components into `[0, size)`. Idempotent for positions that
    /// are already in range.
    pub fn wrap(&self, size: f32) -> Vec2 {
        Vec2 {
            x: self.x.rem_euclid(size),
            y: self.y.rem_euclid(size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_magnitude_and_normalize() {
        let v = Vec2::new(3.0, 4.0);
        assert_approx_eq!(v.magnitude(), 5.0);

        let n = v.normalized();
        assert_approx_eq!(n.magnitude(), 1.0);
        assert_approx_eq!(n.x, 0.6);
        assert_approx_eq!(n.y, 0.8);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let n = Vec2::new(0.0, 0.0).normalized();
        assert_eq!(n, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_dot_product_sign() {
        let right = Vec2::new(1.0, 0.0);
        let left = Vec2::new(-1.0, 0.0);
        let up = Vec2::new(0.0, 1.0);

        assert!(right.dot(&left) < 0.0);
        assert_approx_eq!(right.dot(&up), 0.0);
        assert!(right.dot(&right) > 0.0);
    }

    #[test]
    fn test_wrap_in_range_is_identity() {
        let p = Vec2::new(1500.0, 42.0);
        assert_eq!(p.wrap(WORLD_SIZE), p);
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let candidates = [
            Vec2::new(-7.0, 3001.0),
            Vec2::new(3000.0, -0.5),
            Vec2::new(12345.0, -9876.0),
            Vec2::new(0.0, 0.0),
        ];

        for p in candidates {
            let once = p.wrap(WORLD_SIZE);
            let twice = once.wrap(WORLD_SIZE);
            assert_eq!(once, twice);
            assert!((0.0..WORLD_SIZE).contains(&once.x));
            assert!((0.0..WORLD_SIZE).contains(&once.y));
        }
    }

    #[test]
    fn test_wrap_crossing_right_edge() {
        // Head at x = 2999 moving right at speed 7 comes out at x = 6.
        let head = Vec2::new(2999.0, 1500.0);
        let next = head
            .add(&Vec2::new(1.0, 0.0).scale(SNAKE_SPEED))
            .wrap(WORLD_SIZE);
        assert_approx_eq!(next.x, 6.0);
        assert_approx_eq!(next.y, 1500.0);
    }

    #[test]
    fn test_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(6.0, 8.0);
        assert_approx_eq!(a.distance(&b), 10.0);
        assert_approx_eq!(b.distance(&a), 10.0);
    }
}
