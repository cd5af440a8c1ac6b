//! Simulation loop: the authoritative clock.
//!
//! Runs on its own task and is the single owner of the `World`. Connection
//! tasks never touch world state directly; joins and leaves arrive over a
//! command channel and are folded in at the top of a tick, inputs come from
//! the registry's last-write-wins slots. Broadcasting runs at a lower cadence
//! than simulation and never awaits a client.

use crate::registry::SharedRegistry;
use crate::rules;
use crate::world::{PlayerId, World};
use log::{debug, error};
use shared::protocol::{encode_line, ServerMessage, SnakeState};
use shared::{Vec2, BROADCAST_EVERY, FOOD_COUNT, TICK_RATE, WORLD_SIZE};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Lifecycle changes the connection layer hands to the simulation loop.
#[derive(Debug)]
pub enum GameCommand {
    Join {
        id: PlayerId,
        name: String,
        color: String,
    },
    Leave {
        id: PlayerId,
    },
}

/// Runs the tick loop until the command channel closes.
pub async fn run(registry: SharedRegistry, mut commands: mpsc::Receiver<GameCommand>) {
    let mut world = World::new();

    let mut ticker = interval(Duration::from_secs_f32(1.0 / TICK_RATE as f32));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let now = Instant::now();

        // Fold in joins and leaves that arrived since the last tick.
        loop {
            match commands.try_recv() {
                Ok(cmd) => apply_command(&mut world, cmd, now),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("Command channel closed, stopping simulation");
                    return;
                }
            }
        }

        // Short critical section: grab this tick's inputs and release.
        let inputs = {
            let mut reg = registry.write().await;
            reg.take_inputs()
        };

        step(&mut world, &inputs, now);

        // Consumption is always paired with replacement inside the same
        // tick; anything else means the world is corrupt and serving it to
        // clients would make things worse.
        if world.food.len() != FOOD_COUNT {
            error!(
                "Food pool invariant violated: {} items, expected {}",
                world.food.len(),
                FOOD_COUNT
            );
            panic!("food pool invariant violated");
        }

        if world.tick % BROADCAST_EVERY == 0 {
            broadcast_state(&world, &registry).await;
        }

        if world.tick % (TICK_RATE as u64 * 10) == 0 {
            debug!(
                "Tick {}: {} snakes, {} awaiting respawn",
                world.tick,
                world.snakes.len(),
                world.dead_since.len()
            );
        }
    }
}

fn apply_command(world: &mut World, cmd: GameCommand, now: Instant) {
    match cmd {
        GameCommand::Join { id, name, color } => world.spawn_snake(id, name, color, now),
        GameCommand::Leave { id } => world.remove_snake(id),
    }
}

/// Advances the world by one tick: steer, move, evaluate and apply the rules,
/// then bring due players back. Pure with respect to time (the caller passes
/// `now`), so tests drive it directly.
pub fn step(world: &mut World, inputs: &[(PlayerId, Vec2)], now: Instant) {
    for (id, heading) in inputs {
        if let Some(snake) = world.snakes.get_mut(id) {
            snake.steer(*heading);
        }
    }

    for snake in world.snakes.values_mut() {
        snake.advance();
    }

    let outcome = rules::evaluate(world, now);
    rules::apply(world, &outcome, now);
    rules::process_respawns(world, now);

    world.tick += 1;
}

/// Builds the periodic state snapshot. Snakes are emitted in ascending id
/// order so identical worlds serialize identically.
pub fn snapshot_message(world: &World) -> ServerMessage {
    let mut ids: Vec<PlayerId> = world.snakes.keys().copied().collect();
    ids.sort_unstable();

    let snakes = ids
        .iter()
        .map(|id| {
            let snake = &world.snakes[id];
            SnakeState {
                id: *id,
                name: snake.name.clone(),
                color: snake.color.clone(),
                segments: snake.segments.iter().copied().collect(),
                score: snake.score,
                alive: snake.alive,
            }
        })
        .collect();

    ServerMessage::StateUpdate {
        tick: world.tick,
        world_size: WORLD_SIZE,
        snakes,
        food: world.food.clone(),
    }
}

async fn broadcast_state(world: &World, registry: &SharedRegistry) {
    match encode_line(&snapshot_message(world)) {
        Ok(line) => registry.read().await.broadcast(&line),
        Err(e) => error!("Failed to serialize state snapshot: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::decode_server_line;
    use shared::{GRACE_PERIOD, SNAKE_SPEED, START_LENGTH};

    fn seeded_world(now: Instant) -> World {
        let mut world = World::new();
        world.spawn_snake_at(1, "a".to_string(), "red".to_string(), Vec2::new(500.0, 500.0), now);
        world.spawn_snake_at(2, "b".to_string(), "blue".to_string(), Vec2::new(2500.0, 2500.0), now);
        world
    }

    #[test]
    fn test_step_applies_inputs_and_moves() {
        let now = Instant::now();
        let mut world = seeded_world(now);

        step(&mut world, &[(1, Vec2::new(0.0, 1.0))], now);

        let head = world.snakes[&1].head();
        assert_eq!(head, Vec2::new(500.0, 500.0 + SNAKE_SPEED));
        assert_eq!(world.tick, 1);

        // Player 2 got no input and keeps moving right.
        let other = world.snakes[&2].head();
        assert_eq!(other, Vec2::new(2500.0 + SNAKE_SPEED, 2500.0));
    }

    #[test]
    fn test_step_ignores_inputs_for_unknown_players() {
        let now = Instant::now();
        let mut world = seeded_world(now);
        step(&mut world, &[(42, Vec2::new(0.0, 1.0))], now);
        assert_eq!(world.tick, 1);
    }

    #[test]
    fn test_same_inputs_any_order_same_world() {
        let now = Instant::now();
        let mut world_a = seeded_world(now);
        let mut world_b = seeded_world(now);

        // Pin the food pools to the same layout, out of both snakes' paths,
        // so the only difference between the runs is input arrival order.
        for world in [&mut world_a, &mut world_b] {
            for food in world.food.iter_mut() {
                *food = Vec2::new(2900.0, 100.0);
            }
        }

        // Same set of per-player inputs, opposite arrival order.
        let forward = [(1, Vec2::new(0.0, 1.0)), (2, Vec2::new(0.0, -1.0))];
        let reversed = [(2, Vec2::new(0.0, -1.0)), (1, Vec2::new(0.0, 1.0))];

        for _ in 0..20 {
            step(&mut world_a, &forward, now);
            step(&mut world_b, &reversed, now);
        }

        for id in [1, 2] {
            let a = &world_a.snakes[&id];
            let b = &world_b.snakes[&id];
            assert_eq!(a.head(), b.head());
            assert_eq!(a.score, b.score);
            assert_eq!(a.alive, b.alive);
        }
        assert_eq!(world_a.tick, world_b.tick);
    }

    #[test]
    fn test_step_runs_full_collision_cycle() {
        let spawned = Instant::now();
        let mut world = World::new();
        world.spawn_snake_at(1, "a".to_string(), "red".to_string(), Vec2::new(1000.0, 1000.0), spawned);
        world.spawn_snake_at(2, "b".to_string(), "blue".to_string(), Vec2::new(1010.0, 1000.0), spawned);

        let now = spawned + GRACE_PERIOD + Duration::from_secs(1);
        step(&mut world, &[], now);

        assert!(!world.snakes[&1].alive);
        assert!(!world.snakes[&2].alive);
        assert_eq!(world.food.len(), FOOD_COUNT);
    }

    #[test]
    fn test_snapshot_is_sorted_and_round_trips() {
        let now = Instant::now();
        let mut world = seeded_world(now);
        world.spawn_snake_at(7, "c".to_string(), "green".to_string(), Vec2::new(1500.0, 100.0), now);

        let msg = snapshot_message(&world);
        let line = encode_line(&msg).unwrap();
        let decoded = decode_server_line(&line).unwrap();
        assert_eq!(decoded, msg);

        match msg {
            ServerMessage::StateUpdate {
                tick,
                world_size,
                snakes,
                food,
            } => {
                assert_eq!(tick, 0);
                assert_eq!(world_size, WORLD_SIZE);
                assert_eq!(food.len(), FOOD_COUNT);
                let ids: Vec<u32> = snakes.iter().map(|s| s.id).collect();
                assert_eq!(ids, vec![1, 2, 7]);
                assert!(snakes.iter().all(|s| s.segments.len() == START_LENGTH));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_apply_command_join_and_leave() {
        let now = Instant::now();
        let mut world = World::new();

        apply_command(
            &mut world,
            GameCommand::Join {
                id: 5,
                name: "joiner".to_string(),
                color: "cyan".to_string(),
            },
            now,
        );
        assert!(world.snakes.contains_key(&5));

        apply_command(&mut world, GameCommand::Leave { id: 5 }, now);
        assert!(!world.snakes.contains_key(&5));
    }
}
