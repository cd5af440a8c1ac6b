//! Collision and scoring rules, evaluated as total functions over a frozen
//! per-tick view of the world.
//!
//! Every tick runs two phases: `evaluate` computes all consumptions and
//! eliminations without touching the world, then `apply` commits them. No
//! iteration-order dependency can change the outcome within one tick, and
//! snakes are visited in ascending player id so contested food resolves the
//! same way every time.

use crate::world::{PlayerId, World};
use log::info;
use shared::{FOOD_RADIUS, KILL_REWARD, RESPAWN_DELAY, SNAKE_RADIUS};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub victim: PlayerId,
    pub killer: PlayerId,
}

/// All effects of one tick, computed before any are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// (snake, food index) pairs; each food index appears at most once.
    pub eaten: Vec<(PlayerId, usize)>,
    pub eliminations: Vec<Elimination>,
}

fn sorted_ids(world: &World) -> Vec<PlayerId> {
    let mut ids: Vec<PlayerId> = world.snakes.keys().copied().collect();
    ids.sort_unstable();
    ids
}

/// Computes every consumption and elimination for the current tick.
pub fn evaluate(world: &World, now: Instant) -> TickOutcome {
    let ids = sorted_ids(world);
    let mut outcome = TickOutcome::default();

    // Food: lowest player id wins a contested item.
    let mut claimed = vec![false; world.food.len()];
    let pickup_range = SNAKE_RADIUS + FOOD_RADIUS;
    for &id in &ids {
        let snake = &world.snakes[&id];
        if !snake.alive {
            continue;
        }
        let head = snake.head();
        for (index, food) in world.food.iter().enumerate() {
            if !claimed[index] && head.distance(food) < pickup_range {
                claimed[index] = true;
                outcome.eaten.push((id, index));
                break;
            }
        }
    }

    // Snake vs snake: a head touching any part of another snake dies, unless
    // shielded by its grace period. Mutual head-to-head kills both.
    let collision_range = 2.0 * SNAKE_RADIUS;
    for &id in &ids {
        let snake = &world.snakes[&id];
        if !snake.alive || snake.in_grace(now) {
            continue;
        }
        let head = snake.head();

        'others: for &other_id in &ids {
            if other_id == id {
                continue;
            }
            let other = &world.snakes[&other_id];
            if !other.alive {
                continue;
            }
            for segment in &other.segments {
                if head.distance(segment) < collision_range {
                    outcome.eliminations.push(Elimination {
                        victim: id,
                        killer: other_id,
                    });
                    break 'others;
                }
            }
        }
    }

    outcome
}

/// Commits a tick's outcome: growth and scoring for food, then elimination
/// bookkeeping (halve the victim's retained score, reward the killer,
/// schedule the respawn). Consumed food is replaced in the same tick, keeping
/// the pool size invariant.
pub fn apply(world: &mut World, outcome: &TickOutcome, now: Instant) {
    for &(id, index) in &outcome.eaten {
        if let Some(snake) = world.snakes.get_mut(&id) {
            snake.grow();
            snake.score += 1;
        }
        world.replace_food(index);
    }

    for elimination in &outcome.eliminations {
        if let Some(victim) = world.snakes.get_mut(&elimination.victim) {
            victim.score /= 2;
            victim.alive = false;
            world.dead_since.insert(elimination.victim, now);
            info!(
                "Snake {} eliminated by {}, respawn scheduled",
                elimination.victim, elimination.killer
            );
        }
    }

    // Rewards go out after every verdict is booked so a mutual head-to-head
    // credits both sides onto their already-halved scores.
    for elimination in &outcome.eliminations {
        if let Some(killer) = world.snakes.get_mut(&elimination.killer) {
            killer.score += KILL_REWARD;
        }
    }
}

/// Respawns every dead player whose delay has elapsed.
pub fn process_respawns(world: &mut World, now: Instant) {
    let due: Vec<PlayerId> = world
        .dead_since
        .iter()
        .filter(|(_, died)| now.duration_since(**died) >= RESPAWN_DELAY)
        .map(|(id, _)| *id)
        .collect();

    for id in due {
        world.dead_since.remove(&id);
        world.respawn_snake(id, now);
        info!("Snake {} respawned", id);
    }
}
