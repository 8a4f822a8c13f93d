//! Pluggable rule policies.
//!
//! A policy is a pure function set over a [`Table`]: it lists the moves a
//! player may make and computes the table that results from a move. It
//! never generates randomness; when a policy needs fresh cards it asks the
//! caller to redeal through [`Transition::redeal`].
//!
//! The set of variants is closed and resolved once, when a session is
//! created, using `enum_dispatch` for zero-cost dispatch.

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    ops::RangeInclusive,
};

use super::{
    entities::{Card, Deck, DeckKind, Hand, Move, PlayerId},
    errors::{DeckError, Rejection},
};

mod high_card;
mod tressette;

pub use high_card::SimpleHighCard;
pub use tressette::{DEFAULT_SCORE_TO_WIN, Tressette};

/// Serializable selector for a rule variant.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    SimpleHighCard,
    Tressette,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::SimpleHighCard => write!(f, "simple_high_card"),
            VariantKind::Tressette => write!(f, "tressette"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeReason {
    /// Highest card on the table.
    HighCard { card: Card },
    /// Final team scores, indexed by team.
    Points { scores: Vec<u32> },
    Forfeit { by: PlayerId },
}

/// How a game ended.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Outcome {
    pub winners: Vec<PlayerId>,
    pub reason: OutcomeReason,
}

/// Card-level state of a session: where every card is and whose turn it is.
///
/// Every card of the deck kind lives in exactly one of `deck`, `hands`,
/// `trick` or `won` at all times.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Table {
    /// Undealt remainder.
    pub deck: Deck,
    pub hands: BTreeMap<PlayerId, Hand>,
    /// Turn order.
    pub seats: Vec<PlayerId>,
    /// Index into `seats` of the player to act.
    pub turn: usize,
    /// Cards played onto the table and not yet collected.
    pub trick: Vec<(PlayerId, Card)>,
    /// Cards collected by each player.
    pub won: BTreeMap<PlayerId, Vec<Card>>,
    /// Running match score, indexed by team.
    pub scores: Vec<u32>,
    pub hands_played: u32,
    pub outcome: Option<Outcome>,
}

impl Table {
    #[must_use]
    pub fn new(seats: Vec<PlayerId>, deck: Deck) -> Self {
        Self {
            deck,
            hands: seats.iter().map(|p| (p.clone(), Hand::new())).collect(),
            won: seats.iter().map(|p| (p.clone(), Vec::new())).collect(),
            seats,
            turn: 0,
            trick: Vec::new(),
            scores: Vec::new(),
            hands_played: 0,
            outcome: None,
        }
    }

    /// The player expected to act next, if the game is still running.
    #[must_use]
    pub fn current_player(&self) -> Option<&PlayerId> {
        if self.outcome.is_some() {
            return None;
        }
        self.seats.get(self.turn)
    }

    #[must_use]
    pub fn seat_of(&self, player: &PlayerId) -> Option<usize> {
        self.seats.iter().position(|p| p == player)
    }

    #[must_use]
    pub fn hand(&self, player: &PlayerId) -> Option<&Hand> {
        self.hands.get(player)
    }

    #[must_use]
    pub fn card_count(&self) -> usize {
        self.deck.len()
            + self.hands.values().map(Hand::len).sum::<usize>()
            + self.trick.len()
            + self.won.values().map(Vec::len).sum::<usize>()
    }

    /// Verifies that every card of the deck kind is in exactly one place.
    pub fn check_integrity(&self) -> Result<(), String> {
        let kind = self.deck.kind();
        let mut seen = HashSet::with_capacity(kind.size());

        let all = self
            .deck
            .cards()
            .iter()
            .chain(self.hands.values().flatten())
            .chain(self.trick.iter().map(|(_, card)| card))
            .chain(self.won.values().flatten());

        for card in all {
            if !kind.contains(card) {
                return Err(format!("card {card} does not belong to a {kind:?} deck"));
            }
            if !seen.insert(*card) {
                return Err(format!("card {card} is held in two places"));
            }
        }

        if seen.len() != kind.size() {
            return Err(format!(
                "card count mismatch: found {}, expected {}",
                seen.len(),
                kind.size()
            ));
        }

        Ok(())
    }

    /// Replaces every card on the table with `deck` and deals `per_seat`
    /// cards to each seat. Scores survive; nothing changes on error.
    pub(crate) fn deal_round(
        &mut self,
        mut deck: Deck,
        per_seat: usize,
        first: usize,
    ) -> Result<(), DeckError> {
        let mut hands = BTreeMap::new();
        for player in &self.seats {
            let cards: Hand = deck.deal(per_seat)?.into_iter().collect();
            hands.insert(player.clone(), cards);
        }

        self.hands = hands;
        self.deck = deck;
        self.trick.clear();
        self.won = self.seats.iter().map(|p| (p.clone(), Vec::new())).collect();
        self.turn = first;
        Ok(())
    }

    fn next_seat(&self, seat: usize) -> usize {
        (seat + 1) % self.seats.len()
    }
}

/// Result of applying a legal move.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub table: Table,
    /// The policy needs a freshly shuffled deck dealt before the next move.
    pub redeal: bool,
}

impl Transition {
    fn settled(table: Table) -> Self {
        Self {
            table,
            redeal: false,
        }
    }
}

/// Contract every rule variant implements.
#[enum_dispatch]
pub trait RulePolicy {
    fn kind(&self) -> VariantKind;

    fn deck_kind(&self) -> DeckKind;

    /// Allowed player counts.
    fn seats(&self) -> RangeInclusive<usize>;

    /// Deals a new hand from `deck`, which the caller has already shuffled.
    fn deal(&self, table: &mut Table, deck: Deck) -> Result<(), DeckError>;

    /// Moves `player` may make right now. Pure.
    #[must_use]
    fn legal_actions(&self, table: &Table, player: &PlayerId) -> Vec<Move>;

    /// Validates `action` and computes the resulting table. Pure.
    fn apply(
        &self,
        table: &Table,
        player: &PlayerId,
        action: &Move,
    ) -> Result<Transition, Rejection>;
}

/// Closed set of rule variants.
#[enum_dispatch(RulePolicy)]
#[derive(Clone, Debug)]
pub enum Variant {
    SimpleHighCard,
    Tressette,
}

impl Variant {
    #[must_use]
    pub fn from_kind(kind: VariantKind, score_to_win: u32) -> Self {
        match kind {
            VariantKind::SimpleHighCard => SimpleHighCard.into(),
            VariantKind::Tressette => Tressette::new(score_to_win).into(),
        }
    }
}

/// Checks shared by every variant before a move is looked at.
fn seat_for(table: &Table, player: &PlayerId) -> Result<usize, Rejection> {
    if table.outcome.is_some() {
        return Err(Rejection::GameAlreadyEnded);
    }
    table.seat_of(player).ok_or(Rejection::UnknownPlayer)
}

/// Turn first, then payload shape, then ownership.
fn check_play(table: &Table, seat: usize, player: &PlayerId, card: &Card) -> Result<(), Rejection> {
    if seat != table.turn {
        return Err(Rejection::NotYourTurn);
    }
    if !table.deck.kind().contains(card) {
        return Err(Rejection::InvalidPayload);
    }
    match table.hand(player) {
        Some(hand) if hand.contains(card) => Ok(()),
        _ => Err(Rejection::IllegalMove),
    }
}

fn forfeit(table: &Table, player: &PlayerId, winners: Vec<PlayerId>) -> Transition {
    let mut next = table.clone();
    next.outcome = Some(Outcome {
        winners,
        reason: OutcomeReason::Forfeit { by: player.clone() },
    });
    Transition::settled(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Suit;

    fn table(players: &[&str]) -> Table {
        Table::new(
            players.iter().map(|p| PlayerId::new(p)).collect(),
            Deck::new(DeckKind::French),
        )
    }

    #[test]
    fn test_fresh_table_passes_integrity() {
        let table = table(&["a", "b"]);
        assert!(table.check_integrity().is_ok());
        assert_eq!(table.card_count(), 52);
    }

    #[test]
    fn test_integrity_detects_duplicate() {
        let mut table = table(&["a", "b"]);
        let card = table.deck.cards()[0];
        table
            .hands
            .get_mut(&PlayerId::new("a"))
            .unwrap()
            .insert(card);

        let err = table.check_integrity().unwrap_err();
        assert!(err.contains("two places"));
    }

    #[test]
    fn test_integrity_detects_missing_card() {
        let mut table = table(&["a", "b"]);
        table.deck.deal(1).unwrap();

        let err = table.check_integrity().unwrap_err();
        assert!(err.contains("mismatch"));
    }

    #[test]
    fn test_integrity_detects_foreign_card() {
        let mut table = table(&["a", "b"]);
        table
            .trick
            .push((PlayerId::new("a"), Card(1, Suit::Heart)));

        assert!(table.check_integrity().is_err());
    }

    #[test]
    fn test_deal_round_failure_keeps_table() {
        let mut table = table(&["a", "b", "c"]);
        let before = table.clone();

        let err = table
            .deal_round(Deck::new(DeckKind::French), 20, 0)
            .unwrap_err();
        assert!(matches!(err, DeckError::InsufficientCards { .. }));
        assert_eq!(table, before);
    }

    #[test]
    fn test_variant_from_kind() {
        assert_eq!(
            Variant::from_kind(VariantKind::SimpleHighCard, 0).kind(),
            VariantKind::SimpleHighCard
        );
        let tressette = Variant::from_kind(VariantKind::Tressette, 11);
        assert_eq!(tressette.kind(), VariantKind::Tressette);
        assert_eq!(tressette.seats(), 4..=4);
    }
}
