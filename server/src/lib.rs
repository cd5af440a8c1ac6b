//! Authoritative server for a multiplayer snake arena.
//!
//! The engine is split along its concurrency boundaries: [`net`] owns the
//! sockets, [`registry`] tracks live sessions, and [`sim`] owns the world and
//! advances it on a fixed clock. Game state itself lives in [`world`] with
//! the per-tick rules in [`rules`].

pub mod error;
pub mod net;
pub mod registry;
pub mod rules;
pub mod sim;
pub mod tls;
pub mod world;
