use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use uuid::Uuid;

use super::errors::DeckError;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Diamond,
    Heart,
    Spade,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Diamond, Suit::Heart, Suit::Spade];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Diamond => "♦",
            Self::Heart => "♥",
            Self::Spade => "♠",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values.
pub type Value = u8;

/// A card is a tuple of a value and a suit.
///
/// French decks use 2..=14 (ace high). Italian decks use 1..=10 where
/// 8 is the jack (fante), 9 the knight (cavallo) and 10 the king (re).
///
/// The derived ordering compares value first, then suit, which is the
/// ranking used by high-card games.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl Card {
    #[must_use]
    pub fn value(&self) -> Value {
        self.0
    }

    #[must_use]
    pub fn suit(&self) -> Suit {
        self.1
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            1 | 14 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        let repr = format!("{value}/{}", self.1);
        write!(f, "{repr:>4}")
    }
}

/// Canonical card sets a rule variant can be played with.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckKind {
    /// 52 cards, values 2..=14.
    French,
    /// 40 cards, values 1..=10.
    Italian,
}

impl DeckKind {
    fn values(self) -> std::ops::RangeInclusive<Value> {
        match self {
            Self::French => 2..=14,
            Self::Italian => 1..=10,
        }
    }

    #[must_use]
    pub fn size(self) -> usize {
        self.values().count() * Suit::ALL.len()
    }

    /// Whether `card` is part of this deck at all.
    #[must_use]
    pub fn contains(self, card: &Card) -> bool {
        self.values().contains(&card.0)
    }
}

/// 32 bytes of entropy a single shuffle is derived from.
pub type Seed = [u8; 32];

/// Ordered card sequence. Index 0 is the top of the deck.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Deck {
    kind: DeckKind,
    cards: Vec<Card>,
}

impl Deck {
    /// Builds the canonical, unshuffled ordering for `kind`.
    #[must_use]
    pub fn new(kind: DeckKind) -> Self {
        let mut cards = Vec::with_capacity(kind.size());
        for value in kind.values() {
            for suit in Suit::ALL {
                cards.push(Card(value, suit));
            }
        }
        Self { kind, cards }
    }

    /// Builds a deck for `kind` and shuffles it with a generator derived
    /// from `seed`. The same seed always yields the same ordering.
    #[must_use]
    pub fn shuffled(kind: DeckKind, seed: Seed) -> Self {
        let mut deck = Self::new(kind);
        deck.shuffle(&mut StdRng::from_seed(seed));
        deck
    }

    #[must_use]
    pub fn kind(&self) -> DeckKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Uniform Fisher-Yates permutation of the remaining cards.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    /// Removes and returns the top `n` cards. The deck is left untouched
    /// when fewer than `n` cards remain.
    pub fn deal(&mut self, n: usize) -> Result<Vec<Card>, DeckError> {
        if n > self.cards.len() {
            return Err(DeckError::InsufficientCards {
                requested: n,
                remaining: self.cards.len(),
            });
        }
        Ok(self.cards.drain(..n).collect())
    }
}

/// Draws a fresh shuffle seed. Sessions pass an OS-seeded `StdRng`.
#[must_use]
pub fn fresh_seed<R: Rng + ?Sized>(rng: &mut R) -> Seed {
    rng.random()
}

/// Cards currently held by one player.
pub type Hand = BTreeSet<Card>;

/// Opaque player identity handed to us by the authentication provider.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(s: &str) -> Self {
        Self(s.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifies one client connection carrying a player's traffic.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Variant-specific payload of a proposed action.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Move {
    Play { card: Card },
    /// Concedes the game. Accepted out of turn.
    Forfeit,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Play { card } => write!(f, "plays {}", card.to_string().trim_start()),
            Self::Forfeit => write!(f, "forfeits"),
        }
    }
}
