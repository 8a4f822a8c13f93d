//! Session module providing concurrent game sessions with an async actor model.
//!
//! This module implements:
//! - Session: the synchronous aggregate holding roster, phase and table
//! - SessionActor: async actor serializing every operation on one session
//! - SessionRegistry: spawns, routes to, archives and evicts session actors
//! - Broadcaster: ordered event fan-out with replay and forced resync
//!
//! ## Architecture
//!
//! Each session runs in its own Tokio task with a bounded mpsc inbox. The
//! inbox is the session's serialization boundary: two plays racing for the
//! same turn are applied one after the other, and the second one sees the
//! version the first one produced. Events are handed to subscriber buffers
//! without blocking, so a slow client never stalls its session.
//!
//! ## Example
//!
//! ```ignore
//! use cardroom::{archive::MemoryArchive, session::{RegistryConfig, SessionConfig, SessionRegistry}};
//! use std::sync::Arc;
//!
//! let registry = SessionRegistry::new(RegistryConfig::default(), Arc::new(MemoryArchive::new()))?;
//! let id = registry.create_session("alice".into(), SessionConfig::default()).await?;
//! registry.join_session(id, "bob".into()).await?;
//! ```

pub mod actor;
pub mod broadcast;
pub mod config;
pub mod errors;
pub mod messages;
pub mod registry;
pub mod replay;
pub mod state;

pub use actor::{SessionActor, SessionHandle};
pub use broadcast::{Broadcaster, Event, EventKind, EventStream};
pub use config::{RegistryConfig, SessionConfig};
pub use errors::{SessionError, SessionResult, Unavailable};
pub use messages::{JoinResult, PlayerView, SeatView, SessionMessage, SessionSummary, SubmitAction};
pub use registry::{SessionRegistry, ShutdownReport};
pub use replay::{ReplayError, replay};
pub use state::{AbandonReason, BindingState, Genesis, LoggedAction, Session, SessionPhase};
