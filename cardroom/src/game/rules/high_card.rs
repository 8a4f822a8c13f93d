//! One card each, highest card wins.

use std::ops::RangeInclusive;

use super::{
    Outcome, OutcomeReason, RulePolicy, Table, Transition, VariantKind, check_play, forfeit,
    seat_for,
};
use crate::game::{
    entities::{Deck, DeckKind, Move, PlayerId},
    errors::{DeckError, Rejection},
};

/// Every seat is dealt one card and plays it in turn order. Once the last
/// card is down the highest one (value, then suit) takes the game.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleHighCard;

impl RulePolicy for SimpleHighCard {
    fn kind(&self) -> VariantKind {
        VariantKind::SimpleHighCard
    }

    fn deck_kind(&self) -> DeckKind {
        DeckKind::French
    }

    fn seats(&self) -> RangeInclusive<usize> {
        2..=8
    }

    fn deal(&self, table: &mut Table, deck: Deck) -> Result<(), DeckError> {
        table.deal_round(deck, 1, 0)
    }

    fn legal_actions(&self, table: &Table, player: &PlayerId) -> Vec<Move> {
        let Ok(seat) = seat_for(table, player) else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        if seat == table.turn
            && let Some(hand) = table.hand(player)
        {
            actions.extend(hand.iter().map(|card| Move::Play { card: *card }));
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
                let winners = table
                    .seats
                    .iter()
                    .filter(|p| *p != player)
                    .cloned()
                    .collect();
                Ok(forfeit(table, player, winners))
            }
            Move::Play { card } => {
                check_play(table, seat, player, card)?;

                let mut next = table.clone();
                if let Some(hand) = next.hands.get_mut(player) {
                    hand.remove(card);
                }
                next.trick.push((player.clone(), *card));

                if next.trick.len() == next.seats.len() {
                    let (winner, best) = next
                        .trick
                        .iter()
                        .max_by_key(|(_, card)| *card)
                        .cloned()
                        .ok_or(Rejection::IllegalMove)?;
                    next.outcome = Some(Outcome {
                        winners: vec![winner],
                        reason: OutcomeReason::HighCard { card: best },
                    });
                } else {
                    next.turn = next.next_seat(seat);
                }

                Ok(Transition::settled(next))
            }
        }
    }
}
