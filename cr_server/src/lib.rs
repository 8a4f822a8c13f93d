//! WebSocket front end for the card room session engine.
//!
//! The gateway in front of this process authenticates players and forwards
//! their identity in the `x-player-id` header. Everything else, from session
//! creation to event streaming, flows through one WebSocket per player.

pub mod api;
pub mod archive;
pub mod config;
pub mod logging;
