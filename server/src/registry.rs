//! Session registry: connection identity to player state.
//!
//! Connection tasks and the simulation loop share the registry behind an
//! `Arc<RwLock<_>>`; every critical section is short (no lock is held across
//! a tick computation or socket I/O). Outbound delivery is non-blocking:
//! frames go into each session's bounded queue with `try_send`, so a stalled
//! client drops frames instead of delaying whoever is broadcasting.

use crate::error::ServerError;
use crate::world::PlayerId;
use log::{debug, info};
use shared::Vec2;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub type SharedRegistry = Arc<RwLock<SessionRegistry>>;

/// Frames buffered per connection before the oldest broadcasts get dropped.
pub const OUTBOUND_QUEUE: usize = 64;

/// One connected player's session: display attributes, the channel to their
/// writer task, and the latest unapplied input.
#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub color: String,
    outbound: mpsc::Sender<String>,
    /// Last-write-wins slot; the simulation loop drains it once per tick.
    pending_input: Option<Vec2>,
}

/// All sessions, keyed by player id. Ids come from a monotonically increasing
/// counter and are never reused for the lifetime of the process.
pub struct SessionRegistry {
    sessions: HashMap<PlayerId, Session>,
    next_player_id: PlayerId,
    max_players: usize,
}

impl SessionRegistry {
    pub fn new(max_players: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_player_id: 1,
            max_players,
        }
    }

    /// Admits a new player, or fails with `CapacityExceeded` at the cap.
    pub fn register(
        &mut self,
        name: String,
        color: String,
        outbound: mpsc::Sender<String>,
    ) -> Result<PlayerId, ServerError> {
        if self.sessions.len() >= self.max_players {
            return Err(ServerError::CapacityExceeded);
        }

        let id = self.next_player_id;
        self.next_player_id += 1;

        info!("Registered player {} ({})", id, name);
        self.sessions.insert(
            id,
            Session {
                name,
                color,
                outbound,
                pending_input: None,
            },
        );
        Ok(id)
    }

    /// Removes a session. Idempotent; returns whether it was present.
    pub fn unregister(&mut self, id: PlayerId) -> bool {
        if self.sessions.remove(&id).is_some() {
            info!("Unregistered player {}", id);
            true
        } else {
            false
        }
    }

    /// Records the latest heading for a player, replacing any earlier one
    /// that the simulation loop has not consumed yet.
    pub fn record_input(&mut self, id: PlayerId, heading: Vec2) -> bool {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.pending_input = Some(heading);
            true
        } else {
            false
        }
    }

    /// Drains every pending input slot. Called once per tick.
    pub fn take_inputs(&mut self) -> Vec<(PlayerId, Vec2)> {
        self.sessions
            .iter_mut()
            .filter_map(|(id, session)| session.pending_input.take().map(|v| (*id, v)))
            .collect()
    }

    pub fn name_of(&self, id: PlayerId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.name.as_str())
    }

    /// Queues a frame for one client. Best-effort: a full queue means the
    /// client is stalled and the frame is dropped.
    pub fn send_to(&self, id: PlayerId, line: &str) {
        if let Some(session) = self.sessions.get(&id) {
            if session.outbound.try_send(line.to_string()).is_err() {
                debug!("Dropped frame for stalled player {}", id);
            }
        }
    }

    /// Queues a frame for every connected client.
    pub fn broadcast(&self, line: &str) {
        for (id, session) in &self.sessions {
            if session.outbound.try_send(line.to_string()).is_err() {
                debug!("Dropped broadcast frame for stalled player {}", id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
