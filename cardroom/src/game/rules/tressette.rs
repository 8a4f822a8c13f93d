//! Tressette: four players in two fixed partnerships with a 40-card
//! Italian deck.
//!
//! Players must follow the leading suit when they can. A trick goes to the
//! strongest card of the leading suit, ranked 3, 2, ace, king, knight,
//! jack, 7, 6, 5, 4. Points are counted in thirds: an ace is worth a full
//! point, twos, threes and face cards a third each, and the last trick of
//! a hand is worth a bonus point. Partial points are dropped when a hand
//! is scored. Hands are redealt until one team reaches the target with a
//! strictly higher score.

use std::ops::RangeInclusive;

use super::{
    Outcome, OutcomeReason, RulePolicy, Table, Transition, VariantKind, check_play, forfeit,
    seat_for,
};
use crate::game::{
    entities::{Card, Deck, DeckKind, Move, PlayerId, Value},
    errors::{DeckError, Rejection},
};

pub const DEFAULT_SCORE_TO_WIN: u32 = 21;

const PLAYERS: usize = 4;
const CARDS_PER_HAND: usize = 10;
const TEAMS: usize = 2;
const LAST_TRICK_THIRDS: u32 = 3;

#[derive(Clone, Copy, Debug)]
pub struct Tressette {
    score_to_win: u32,
}

impl Default for Tressette {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_TO_WIN)
    }
}

impl Tressette {
    #[must_use]
    pub fn new(score_to_win: u32) -> Self {
        Self { score_to_win }
    }
}

/// Trick-taking strength within a suit.
fn strength(value: Value) -> u8 {
    match value {
        3 => 10,
        2 => 9,
        1 => 8,
        v => v.saturating_sub(3),
    }
}

fn thirds(card: &Card) -> u32 {
    match card.value() {
        1 => 3,
        2 | 3 | 8 | 9 | 10 => 1,
        _ => 0,
    }
}

fn team_of(seat: usize) -> usize {
    seat % TEAMS
}

fn team_members(table: &Table, team: usize) -> Vec<PlayerId> {
    table
        .seats
        .iter()
        .enumerate()
        .filter(|(seat, _)| team_of(*seat) == team)
        .map(|(_, player)| player.clone())
        .collect()
}

impl Tressette {
    /// Playing `card` would break suit while `player` can still follow.
    fn must_follow(table: &Table, player: &PlayerId, card: &Card) -> bool {
        let Some((_, lead)) = table.trick.first() else {
            return false;
        };
        card.suit() != lead.suit()
            && table
                .hand(player)
                .is_some_and(|hand| hand.iter().any(|c| c.suit() == lead.suit()))
    }

    fn finish_trick(&self, next: &mut Table) -> Result<bool, Rejection> {
        let lead_suit = next
            .trick
            .first()
            .map(|(_, card)| card.suit())
            .ok_or(Rejection::IllegalMove)?;
        let winner = next
            .trick
            .iter()
            .filter(|(_, card)| card.suit() == lead_suit)
            .max_by_key(|(_, card)| strength(card.value()))
            .map(|(player, _)| player.clone())
            .ok_or(Rejection::IllegalMove)?;

        let collected: Vec<Card> = next.trick.drain(..).map(|(_, card)| card).collect();
        next.won.entry(winner.clone()).or_default().extend(collected);
        next.turn = next.seat_of(&winner).ok_or(Rejection::UnknownPlayer)?;

        if !next.hands.values().all(|hand| hand.is_empty()) {
            return Ok(false);
        }

        // Hand is over.
        let mut team_thirds = [0u32; TEAMS];
        for (player, cards) in &next.won {
            let seat = next.seat_of(player).ok_or(Rejection::UnknownPlayer)?;
            team_thirds[team_of(seat)] += cards.iter().map(thirds).sum::<u32>();
        }
        team_thirds[team_of(next.turn)] += LAST_TRICK_THIRDS;

        if next.scores.len() != TEAMS {
            next.scores = vec![0; TEAMS];
        }
        for (score, thirds) in next.scores.iter_mut().zip(team_thirds) {
            *score += thirds / 3;
        }
        next.hands_played += 1;

        let (first, second) = (next.scores[0], next.scores[1]);
        if first.max(second) >= self.score_to_win && first != second {
            let team = if first > second { 0 } else { 1 };
            next.outcome = Some(Outcome {
                winners: team_members(next, team),
                reason: OutcomeReason::Points {
                    scores: next.scores.clone(),
                },
            });
            return Ok(false);
        }

        Ok(true)
    }
}

impl RulePolicy for Tressette {
    fn kind(&self) -> VariantKind {
        VariantKind::Tressette
    }

    fn deck_kind(&self) -> DeckKind {
        DeckKind::Italian
    }

    fn seats(&self) -> RangeInclusive<usize> {
        PLAYERS..=PLAYERS
    }

    fn deal(&self, table: &mut Table, deck: Deck) -> Result<(), DeckError> {
        let leader = table.hands_played as usize % table.seats.len().max(1);
        table.deal_round(deck, CARDS_PER_HAND, leader)?;
        if table.scores.len() != TEAMS {
            table.scores = vec![0; TEAMS];
        }
        Ok(())
    }

    fn legal_actions(&self, table: &Table, player: &PlayerId) -> Vec<Move> {
        let Ok(seat) = seat_for(table, player) else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        if seat == table.turn
            && let Some(hand) = table.hand(player)
        {
            actions.extend(
                hand.iter()
                    .filter(|card| !Self::must_follow(table, player, card))
                    .map(|card| Move::Play { card: *card }),
            );
        }
        actions.push(Move::Forfeit);
        actions
    }

    fn apply(
        &self,
        table: &Table,
        player: &PlayerId,
        action: &Move,
    ) -> Result<Transition, Rejection> {
        let seat = seat_for(table, player)?;

        match action {
            Move::Forfeit => {
                let winners = team_members(table, team_of(seat + 1));
                Ok(forfeit(table, player, winners))
            }
            Move::Play { card } => {
                check_play(table, seat, player, card)?;
                if Self::must_follow(table, player, card) {
                    return Err(Rejection::IllegalMove);
                }

                let mut next = table.clone();
                if let Some(hand) = next.hands.get_mut(player) {
                    hand.remove(card);
                }
                next.trick.push((player.clone(), *card));

                if next.trick.len() < next.seats.len() {
                    next.turn = next.next_seat(seat);
                    return Ok(Transition::settled(next));
                }

                let redeal = self.finish_trick(&mut next)?;
                Ok(Transition {
                    table: next,
                    redeal,
                })
            }
        }
    }
}
