//! # Card Room
//!
//! An authoritative server core for turn-based card games.
//!
//! The library owns the state of every running game: the deck, each
//! player's hand, turn order and score. Clients only ever propose actions;
//! the core validates them against a pluggable rule policy, applies them
//! one at a time per session and fans the resulting events out to every
//! connected player.
//!
//! ## Architecture
//!
//! A session moves through a small set of phases:
//!
//! - **Forming**: players join and signal ready
//! - **InProgress**: cards are dealt and players act in turn
//! - **Suspended**: a player lost their connection and the game waits
//! - **Completed**: the rule policy declared an outcome
//! - **Abandoned**: timed out, drained on shutdown, or quarantined after
//!   an invariant violation
//!
//! Each session is an actor task with its own inbox, so unrelated sessions
//! run in parallel while actions within one session are strictly ordered.
//!
//! ## Core Modules
//!
//! - [`game`]: Cards, decks, shuffling and rule policies
//! - [`session`]: Session state machine, actors, registry and event streams
//! - [`archive`]: Hand-off of finished sessions to storage
//! - [`protocol`]: Request and response types for the ingress adapter
//!
//! ## Example
//!
//! ```
//! use cardroom::game::{Deck, DeckKind};
//!
//! // Deal two cards from a freshly shuffled deck
//! let mut deck = Deck::shuffled(DeckKind::French, [42u8; 32]);
//! let cards = deck.deal(2).unwrap();
//! assert_eq!(cards.len(), 2);
//! assert_eq!(deck.len(), 50);
//! ```

/// Card game engine: entities, deck and rule policies.
pub mod game;
pub use game::{Card, Deck, DeckKind, Move, PlayerId, Rejection, SessionId, VariantKind};

/// Session lifecycle and concurrency.
pub mod session;
pub use session::{
    Event, EventKind, EventStream, SessionConfig, SessionError, SessionRegistry, SubmitAction,
};

/// Archival of finished sessions.
pub mod archive;
pub use archive::{GameArchive, GameRecord, MemoryArchive};

/// Ingress protocol.
pub mod protocol;
