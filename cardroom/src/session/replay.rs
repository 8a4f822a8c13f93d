//! Deterministic reconstruction of a game from its archive record.
//!
//! A record holds the first seed and, for every action that triggered a
//! redeal, the seed of that deal. Re-running the actions through the same
//! rule policy must arrive at the same table.

use thiserror::Error;

use crate::{
    archive::GameRecord,
    game::{Deck, Rejection, RulePolicy, Table, Transition},
};

#[derive(Debug, Error, PartialEq)]
pub enum ReplayError {
    #[error("session never started")]
    NotStarted,

    #[error("action {version} is out of sequence, expected {expected}")]
    OutOfSequence { version: u64, expected: u64 },

    #[error("action {version} was rejected on replay: {rejection}")]
    Rejected { version: u64, rejection: Rejection },

    #[error("action {version} needs a redeal but carries no seed")]
    MissingSeed { version: u64 },

    #[error("deal failed at version {version}: {reason}")]
    Deal { version: u64, reason: String },
}

/// Rebuilds the final table of `record`.
pub fn replay(record: &GameRecord) -> Result<Table, ReplayError> {
    let genesis = record.genesis.as_ref().ok_or(ReplayError::NotStarted)?;
    let rules = record.config.rules();
    let kind = rules.deck_kind();

    let mut table = Table::new(genesis.seats.clone(), Deck::new(kind));
    rules
        .deal(&mut table, Deck::shuffled(kind, genesis.seed))
        .map_err(|e| ReplayError::Deal {
            version: 0,
            reason: e.to_string(),
        })?;

    for (expected, logged) in (1u64..).zip(&record.actions) {
        if logged.version != expected {
            return Err(ReplayError::OutOfSequence {
                version: logged.version,
                expected,
            });
        }

        let Transition {
            table: mut next,
            redeal,
        } = rules
            .apply(&table, &logged.player, &logged.action)
            .map_err(|rejection| ReplayError::Rejected {
                version: logged.version,
                rejection,
            })?;

        if redeal {
            let seed = logged.seed.ok_or(ReplayError::MissingSeed {
                version: logged.version,
            })?;
            rules
                .deal(&mut next, Deck::shuffled(kind, seed))
                .map_err(|e| ReplayError::Deal {
                    version: logged.version,
                    reason: e.to_string(),
                })?;
        }

        table = next;
    }

    Ok(table)
}
