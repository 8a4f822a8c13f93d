//! Card game engine - deck, cards and rule policies.
//!
//! This module provides the pure game layer:
//! - Cards, decks and the shuffle/deal engine
//! - Rule policies that validate moves and compute transitions
//! - Rejection reasons shared with the session layer

pub mod entities;
pub mod errors;
pub mod rules;

pub use entities::{Card, ConnectionId, Deck, DeckKind, Hand, Move, PlayerId, Seed, SessionId, Suit};
pub use errors::{DeckError, Rejection};
pub use rules::{Outcome, OutcomeReason, RulePolicy, Table, Transition, Variant, VariantKind};
