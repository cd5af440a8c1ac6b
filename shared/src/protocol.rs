//! Wire protocol for the snake arena.
//!
//! Every logical message is one JSON object carrying a `type` tag, terminated
//! by a newline. A stream reader buffers bytes and splits on `\n` boundaries;
//! anything that does not parse into the closed message vocabulary below is a
//! protocol violation and terminates the offending connection.

use crate::Vec2;
use serde::{Deserialize, Serialize};

/// Messages a client may send to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on every connection. `name` must be non-empty.
    Join { name: String, color: String },
    /// Desired heading. Fire-and-forget; only the most recent one before the
    /// next tick is honored.
    Input { dx: f32, dy: f32 },
    Chat { text: String },
    Leave,
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinAck {
        player_id: u32,
    },
    JoinReject {
        reason: String,
    },
    /// Periodic authoritative snapshot of the whole world.
    StateUpdate {
        tick: u64,
        world_size: f32,
        snakes: Vec<SnakeState>,
        food: Vec<Vec2>,
    },
    ChatRelay {
        player_id: u32,
        name: String,
        text: String,
    },
    PlayerLeft {
        player_id: u32,
    },
}

/// One snake as seen in a [`ServerMessage::StateUpdate`], head first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnakeState {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub segments: Vec<Vec2>,
    pub score: u32,
    pub alive: bool,
}

/// Serializes a message into a single newline-terminated frame.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_client_line(line: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}

pub fn decode_server_line(line: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}
