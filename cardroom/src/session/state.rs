//! The session aggregate: roster, lifecycle and the authoritative table.
//!
//! Everything here is synchronous. The owning actor serializes access, so
//! each method sees a consistent state and either commits completely or
//! leaves the session untouched.

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt};
use tokio::time::Instant;

use super::{
    broadcast::{Event, EventKind},
    config::SessionConfig,
    errors::{SessionError, SessionResult, Unavailable},
    messages::{JoinResult, PlayerView, SeatView, SessionSummary, SubmitAction},
};
use crate::{
    archive::GameRecord,
    game::{
        ConnectionId, Deck, Move, PlayerId, Rejection, RulePolicy, Seed, SessionId, Table,
        Transition, Variant, entities::fresh_seed,
    },
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Forming,
    InProgress,
    Suspended,
    Completed,
    Abandoned,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Abandoned)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            SessionPhase::Forming => "forming",
            SessionPhase::InProgress => "in progress",
            SessionPhase::Suspended => "suspended",
            SessionPhase::Completed => "completed",
            SessionPhase::Abandoned => "abandoned",
        };
        write!(f, "{repr}")
    }
}

/// Why a session ended without an outcome.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbandonReason {
    FormingTimeout,
    ReconnectTimeout,
    Shutdown,
    /// Quarantined after an invariant violation.
    Corrupted { diagnostic: String },
}

/// Public connection status of a seat.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Unbound,
    Bound,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Binding {
    /// Never connected, or the connection was handed over cleanly.
    Unbound,
    Bound(ConnectionId),
    /// The connection dropped at `since`.
    Stale { since: Instant },
}

impl Binding {
    fn state(&self) -> BindingState {
        match self {
            Binding::Unbound => BindingState::Unbound,
            Binding::Bound(_) => BindingState::Bound,
            Binding::Stale { .. } => BindingState::Stale,
        }
    }
}

#[derive(Clone, Debug)]
struct Seat {
    player: PlayerId,
    ready: bool,
    binding: Binding,
}

/// One committed action of the log.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LoggedAction {
    pub version: u64,
    pub player: PlayerId,
    pub action: Move,
    /// Seed of the hand that was shuffled and dealt as part of this action.
    pub seed: Option<Seed>,
    pub at: DateTime<Utc>,
}

/// Seating and first shuffle of a started game.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Genesis {
    pub seats: Vec<PlayerId>,
    pub seed: Seed,
    pub started_at: DateTime<Utc>,
}

/// One game instance.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    rules: Variant,
    phase: SessionPhase,
    seats: Vec<Seat>,
    table: Option<Table>,
    genesis: Option<Genesis>,
    log: Vec<LoggedAction>,
    /// Every event ever published, for replay.
    history: Vec<Event>,
    /// Events committed but not yet published.
    outbox: VecDeque<Event>,
    version: u64,
    rng: StdRng,
    created_at: Instant,
    created_at_utc: DateTime<Utc>,
    suspended_at: Option<Instant>,
    ended_at: Option<DateTime<Utc>>,
    abandon_reason: Option<AbandonReason>,
}

impl Session {
    /// Creates a forming session with `creator` in the first seat.
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        creator: PlayerId,
        now: Instant,
    ) -> SessionResult<Self> {
        config.validate().map_err(SessionError::InvalidConfig)?;

        let rules = config.rules();
        let mut session = Self {
            id,
            config,
            rules,
            phase: SessionPhase::Forming,
            seats: Vec::new(),
            table: None,
            genesis: None,
            log: Vec::new(),
            history: Vec::new(),
            outbox: VecDeque::new(),
            version: 0,
            rng: StdRng::from_os_rng(),
            created_at: now,
            created_at_utc: Utc::now(),
            suspended_at: None,
            ended_at: None,
            abandon_reason: None,
        };
        session.join(creator)?;
        Ok(session)
    }

    /// Replaces the shuffle source. Used to make deals reproducible.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn log(&self) -> &[LoggedAction] {
        &self.log
    }

    pub fn genesis(&self) -> Option<&Genesis> {
        self.genesis.as_ref()
    }

    pub fn abandon_reason(&self) -> Option<&AbandonReason> {
        self.abandon_reason.as_ref()
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.seats.iter().map(|s| s.player.clone()).collect()
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.seat_index(player).is_some()
    }

    fn seat_index(&self, player: &PlayerId) -> Option<usize> {
        self.seats.iter().position(|s| &s.player == player)
    }

    /// Takes the events committed since the last drain, in commit order.
    pub fn drain_events(&mut self) -> VecDeque<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, kind: EventKind) -> Event {
        let event = Event::new(self.id, self.version, kind);
        self.history.push(event.clone());
        self.outbox.push_back(event.clone());
        event
    }

    pub fn join(&mut self, player: PlayerId) -> Result<JoinResult, Rejection> {
        if let Some(seat) = self.seat_index(&player) {
            return Ok(JoinResult::AlreadyJoined { seat });
        }
        if self.phase != SessionPhase::Forming {
            return Err(Rejection::SessionNotJoinable);
        }
        if self.seats.len() >= self.config.max_players {
            return Err(Rejection::SessionFull);
        }

        let seat = self.seats.len();
        self.seats.push(Seat {
            player: player.clone(),
            ready: false,
            binding: Binding::Unbound,
        });
        log::info!("Session {}: {} took seat {}", self.id, player, seat);
        self.emit(EventKind::PlayerJoined { player, seat });
        Ok(JoinResult::Joined { seat })
    }

    pub fn leave(&mut self, player: &PlayerId) -> SessionResult<()> {
        if self.phase != SessionPhase::Forming {
            return Err(Rejection::SessionNotJoinable.into());
        }
        let seat = self.seat_index(player).ok_or(Rejection::UnknownPlayer)?;

        self.seats.remove(seat);
        log::info!("Session {}: {} left", self.id, player);
        let seats = self.players();
        self.emit(EventKind::PlayerLeft {
            player: player.clone(),
            seats,
        });
        self.maybe_start()
    }

    /// Marks `player` ready. The game starts once enough seated players are
    /// ready.
    pub fn ready(&mut self, player: &PlayerId) -> SessionResult<()> {
        if self.phase != SessionPhase::Forming {
            return Err(Rejection::SessionNotJoinable.into());
        }
        let seat = self.seat_index(player).ok_or(Rejection::UnknownPlayer)?;

        if !self.seats[seat].ready {
            self.seats[seat].ready = true;
            self.emit(EventKind::PlayerReady {
                player: player.clone(),
            });
        }
        self.maybe_start()
    }

    fn maybe_start(&mut self) -> SessionResult<()> {
        if self.seats.len() >= self.config.min_players && self.seats.iter().all(|s| s.ready) {
            self.start()?;
        }
        Ok(())
    }

    /// Shuffles, deals and enters play as one step.
    fn start(&mut self) -> SessionResult<()> {
        let players = self.players();
        let kind = self.rules.deck_kind();
        let seed = fresh_seed(&mut self.rng);

        let mut table = Table::new(players.clone(), Deck::new(kind));
        if let Err(e) = self.rules.deal(&mut table, Deck::shuffled(kind, seed)) {
            return Err(self.quarantine(format!("initial deal failed: {e}")));
        }
        if let Err(diagnostic) = table.check_integrity() {
            return Err(self.quarantine(diagnostic));
        }

        let hand_sizes = players
            .iter()
            .map(|p| table.hand(p).map_or(0, |h| h.len()))
            .collect();
        let first = table.seats[table.turn].clone();

        log::info!(
            "Session {}: {} started with {} players, seed {}",
            self.id,
            self.rules.kind(),
            players.len(),
            hex::encode(seed)
        );

        self.table = Some(table);
        self.genesis = Some(Genesis {
            seats: players.clone(),
            seed,
            started_at: Utc::now(),
        });
        self.phase = SessionPhase::InProgress;
        self.emit(EventKind::GameStarted {
            seats: players,
            hand_sizes,
            first,
        });
        Ok(())
    }

    /// Validates and applies one action. On success the version has moved
    /// forward by exactly one and the returned event is queued for
    /// publication; on error nothing changed unless the error is fatal.
    pub fn submit(&mut self, request: &SubmitAction) -> SessionResult<Event> {
        match self.phase {
            SessionPhase::Completed | SessionPhase::Abandoned => {
                return Err(Rejection::GameAlreadyEnded.into());
            }
            SessionPhase::Forming => return Err(Rejection::GameNotStarted.into()),
            SessionPhase::Suspended => return Err(Unavailable::Suspended.into()),
            SessionPhase::InProgress => {}
        }

        if request.session_id != self.id {
            return Err(Rejection::InvalidPayload.into());
        }

        if request.expected_version != self.version {
            return Err(Rejection::StaleVersion {
                expected: request.expected_version,
                current: self.version,
            }
            .into());
        }

        let Some(table) = self.table.as_ref() else {
            return Err(self.quarantine("game in progress without a table".to_string()));
        };
        let Transition { mut table, redeal } =
            self.rules
                .apply(table, &request.player_id, &request.action)?;

        let mut seed = None;
        if redeal {
            let next = fresh_seed(&mut self.rng);
            let kind = self.rules.deck_kind();
            if let Err(e) = self.rules.deal(&mut table, Deck::shuffled(kind, next)) {
                return Err(self.quarantine(format!("redeal failed: {e}")));
            }
            log::debug!(
                "Session {}: hand {} dealt, seed {}",
                self.id,
                table.hands_played + 1,
                hex::encode(next)
            );
            seed = Some(next);
        }

        if let Err(diagnostic) = table.check_integrity() {
            return Err(self.quarantine(diagnostic));
        }

        self.version += 1;
        self.log.push(LoggedAction {
            version: self.version,
            player: request.player_id.clone(),
            action: request.action.clone(),
            seed,
            at: Utc::now(),
        });

        let next = table.current_player().cloned();
        let outcome = table.outcome.clone();
        self.table = Some(table);

        if let Some(outcome) = &outcome {
            self.phase = SessionPhase::Completed;
            self.ended_at = Some(Utc::now());
            log::info!(
                "Session {}: completed at version {}, winners {:?}",
                self.id,
                self.version,
                outcome.winners
            );
        }

        Ok(self.emit(EventKind::ActionApplied {
            player: request.player_id.clone(),
            action: request.action.clone(),
            next,
            redealt: redeal,
            phase: self.phase,
            outcome,
        }))
    }

    /// Moves a non-terminal session to `Abandoned`. Returns whether anything
    /// changed.
    pub fn abandon(&mut self, reason: AbandonReason) -> bool {
        if self.phase.is_terminal() {
            return false;
        }

        log::info!(
            "Session {}: abandoned while {} ({:?})",
            self.id,
            self.phase,
            reason
        );
        self.phase = SessionPhase::Abandoned;
        self.suspended_at = None;
        self.ended_at = Some(Utc::now());
        self.abandon_reason = Some(reason.clone());
        self.emit(EventKind::Abandoned { reason });
        true
    }

    /// Abandons the session after an invariant violation and dumps the
    /// action log for reproduction.
    fn quarantine(&mut self, diagnostic: String) -> SessionError {
        let log = serde_json::to_string(&self.log).unwrap_or_else(|e| e.to_string());
        let genesis = serde_json::to_string(&self.genesis).unwrap_or_else(|e| e.to_string());
        log::error!(
            "Session {} corrupted at version {}: {}. Genesis: {} Actions: {}",
            self.id,
            self.version,
            diagnostic,
            genesis,
            log
        );

        self.abandon(AbandonReason::Corrupted {
            diagnostic: diagnostic.clone(),
        });
        SessionError::Fatal {
            session_id: self.id,
            diagnostic,
        }
    }

    /// Attaches a live connection to `player`'s seat, replacing any earlier
    /// one. A suspended session resumes once no seat is stale.
    pub fn bind(&mut self, player: &PlayerId, connection: ConnectionId) -> Result<(), Rejection> {
        let seat = self.seat_index(player).ok_or(Rejection::UnknownPlayer)?;
        self.seats[seat].binding = Binding::Bound(connection);

        if self.phase == SessionPhase::Suspended
            && !self
                .seats
                .iter()
                .any(|s| matches!(s.binding, Binding::Stale { .. }))
        {
            log::info!("Session {}: resumed", self.id);
            self.phase = SessionPhase::InProgress;
            self.suspended_at = None;
            self.emit(EventKind::Resumed);
        }
        Ok(())
    }

    /// Marks `player`'s seat stale if `connection` is still the one bound to
    /// it. Returns whether the binding changed.
    pub fn unbind(&mut self, player: &PlayerId, connection: ConnectionId, now: Instant) -> bool {
        let Some(seat) = self.seat_index(player) else {
            return false;
        };
        if self.seats[seat].binding != Binding::Bound(connection) {
            return false;
        }

        self.seats[seat].binding = Binding::Stale { since: now };
        log::debug!("Session {}: connection of {} went stale", self.id, player);
        true
    }

    /// Advances timers: forming timeout, stale grace and reconnect grace.
    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            SessionPhase::Forming => {
                if now.saturating_duration_since(self.created_at) >= self.config.forming_timeout() {
                    self.abandon(AbandonReason::FormingTimeout);
                }
            }
            SessionPhase::InProgress => {
                let grace = self.config.stale_grace();
                let stale: Vec<PlayerId> = self
                    .seats
                    .iter()
                    .filter(|s| match s.binding {
                        Binding::Stale { since } => now.saturating_duration_since(since) >= grace,
                        _ => false,
                    })
                    .map(|s| s.player.clone())
                    .collect();

                if !stale.is_empty() {
                    log::info!(
                        "Session {}: suspended waiting for {:?}",
                        self.id,
                        stale
                    );
                    self.phase = SessionPhase::Suspended;
                    self.suspended_at = Some(now);
                    self.emit(EventKind::Suspended { stale });
                }
            }
            SessionPhase::Suspended => {
                let since = self.suspended_at.unwrap_or(now);
                if now.saturating_duration_since(since) >= self.config.reconnect_grace() {
                    self.abandon(AbandonReason::ReconnectTimeout);
                }
            }
            SessionPhase::Completed | SessionPhase::Abandoned => {}
        }
    }

    /// Moves `player` may make right now.
    pub fn legal_actions(&self, player: &PlayerId) -> Result<Vec<Move>, Rejection> {
        if !self.is_member(player) {
            return Err(Rejection::UnknownPlayer);
        }
        match (&self.table, self.phase) {
            (Some(table), SessionPhase::InProgress) => Ok(self.rules.legal_actions(table, player)),
            _ => Ok(Vec::new()),
        }
    }

    /// State as seen by `player`: their own hand plus public information.
    pub fn view(&self, player: &PlayerId) -> Result<PlayerView, Rejection> {
        let legal_actions = self.legal_actions(player)?;
        let table = self.table.as_ref();

        let seats = self
            .seats
            .iter()
            .map(|s| SeatView {
                player: s.player.clone(),
                ready: s.ready,
                connection: s.binding.state(),
                cards_held: table
                    .and_then(|t| t.hand(&s.player))
                    .map_or(0, |h| h.len()),
            })
            .collect();

        Ok(PlayerView {
            session_id: self.id,
            version: self.version,
            phase: self.phase,
            player: player.clone(),
            hand: table
                .and_then(|t| t.hand(player))
                .map(|h| h.iter().copied().collect())
                .unwrap_or_default(),
            seats,
            turn: table.and_then(|t| t.current_player().cloned()),
            table_cards: table.map(|t| t.trick.clone()).unwrap_or_default(),
            deck_remaining: table.map_or(0, |t| t.deck.len()),
            scores: table.map(|t| t.scores.clone()).unwrap_or_default(),
            legal_actions,
            outcome: table.and_then(|t| t.outcome.clone()),
            abandon_reason: self.abandon_reason.clone(),
        })
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            variant: self.rules.kind(),
            phase: self.phase,
            version: self.version,
            players: self.players(),
            min_players: self.config.min_players,
            max_players: self.config.max_players,
            created_at: self.created_at_utc,
        }
    }

    /// Events a subscriber that last saw `since_version` still needs:
    /// every later action, plus the abandonment notice if there is one.
    pub fn replay_since(&self, since_version: u64) -> Vec<Event> {
        self.history
            .iter()
            .filter(|e| match e.kind {
                EventKind::ActionApplied { .. } => e.version > since_version,
                EventKind::Abandoned { .. } => true,
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Archive record of a finished session.
    pub fn record(&self) -> Option<GameRecord> {
        if !self.phase.is_terminal() {
            return None;
        }
        Some(GameRecord {
            session_id: self.id,
            config: self.config.clone(),
            players: self.players(),
            genesis: self.genesis.clone(),
            actions: self.log.clone(),
            final_table: self.table.clone(),
            final_phase: self.phase,
            final_version: self.version,
            outcome: self.table.as_ref().and_then(|t| t.outcome.clone()),
            abandon_reason: self.abandon_reason.clone(),
            created_at: self.created_at_utc,
            ended_at: self.ended_at.unwrap_or_else(Utc::now),
        })
    }

    /// Puts a foreign card on the table so the next commit fails its
    /// integrity check.
    #[cfg(test)]
    pub(crate) fn corrupt_table(&mut self) {
        if let Some(table) = self.table.as_mut() {
            let card = table.deck.cards().first().copied();
            if let (Some(card), Some(seat)) = (card, table.seats.first().cloned()) {
                table.trick.push((seat, card));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Card, OutcomeReason, Suit, VariantKind};
    use std::time::Duration;

    fn alice() -> PlayerId {
        PlayerId::new("alice")
    }

    fn bob() -> PlayerId {
        PlayerId::new("bob")
    }

    fn forming() -> Session {
        Session::new(
            SessionId::new(),
            SessionConfig::default(),
            alice(),
            Instant::now(),
        )
        .unwrap()
        .with_rng(StdRng::seed_from_u64(7))
    }

    fn started() -> Session {
        let mut session = forming();
        session.join(bob()).unwrap();
        session.ready(&alice()).unwrap();
        session.ready(&bob()).unwrap();
        session.drain_events();
        session
    }

    fn play(session: &Session, player: &PlayerId, expected_version: u64) -> SubmitAction {
        let card = *session
            .table()
            .unwrap()
            .hand(player)
            .unwrap()
            .iter()
            .next()
            .unwrap();
        SubmitAction {
            session_id: session.id(),
            player_id: player.clone(),
            expected_version,
            action: Move::Play { card },
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            max_players: 1,
            ..SessionConfig::default()
        };
        let err = Session::new(SessionId::new(), config, alice(), Instant::now())
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn test_join_until_full() {
        let mut session = forming();
        assert_eq!(session.join(bob()), Ok(JoinResult::Joined { seat: 1 }));
        assert_eq!(session.join(bob()), Ok(JoinResult::AlreadyJoined { seat: 1 }));
        assert_eq!(
            session.join(PlayerId::new("carol")),
            Err(Rejection::SessionFull)
        );
        assert_eq!(session.version(), 0);
    }

    #[test]
    fn test_leave_frees_seat() {
        let mut session = forming();
        session.join(bob()).unwrap();
        session.leave(&bob()).unwrap();
        assert_eq!(session.players(), vec![alice()]);
        assert_eq!(
            session.leave(&bob()),
            Err(SessionError::Rejected(Rejection::UnknownPlayer))
        );
    }

    #[test]
    fn test_leave_reports_new_seating() {
        let mut session = forming();
        let carol = PlayerId::new("carol");
        session.config.max_players = 3;
        session.join(bob()).unwrap();
        session.join(carol.clone()).unwrap();
        session.drain_events();

        session.leave(&bob()).unwrap();
        let events = session.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::PlayerLeft {
                player: bob(),
                seats: vec![alice(), carol.clone()],
            }
        );
        assert_eq!(session.join(bob()), Ok(JoinResult::Joined { seat: 2 }));
        assert_eq!(session.view(&carol).unwrap().seats[1].player, carol);
    }

    #[test]
    fn test_logged_seed_reproduces_deal() {
        let session = started();
        let genesis = session.genesis().unwrap();

        let logged = hex::encode(genesis.seed);
        assert_eq!(logged.len(), 64);
        let seed: Seed = hex::decode(&logged).unwrap().try_into().unwrap();

        let kind = session.rules.deck_kind();
        let mut table = Table::new(genesis.seats.clone(), Deck::new(kind));
        session
            .rules
            .deal(&mut table, Deck::shuffled(kind, seed))
            .unwrap();
        assert_eq!(Some(&table), session.table());
    }

    #[test]
    fn test_game_starts_when_all_ready() {
        let mut session = forming();
        session.join(bob()).unwrap();
        session.ready(&alice()).unwrap();
        assert_eq!(session.phase(), SessionPhase::Forming);

        session.ready(&bob()).unwrap();
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.version(), 0);

        let table = session.table().unwrap();
        assert_eq!(table.hand(&alice()).unwrap().len(), 1);
        assert_eq!(table.hand(&bob()).unwrap().len(), 1);
        assert_eq!(table.deck.len(), 50);
        assert!(session.genesis().is_some());

        let events = session.drain_events();
        assert!(matches!(
            events.back().unwrap().kind,
            EventKind::GameStarted { .. }
        ));
    }

    #[test]
    fn test_ready_alone_does_not_start() {
        let mut session = forming();
        session.ready(&alice()).unwrap();
        assert_eq!(session.phase(), SessionPhase::Forming);
    }

    #[test]
    fn test_join_after_start_rejected() {
        let mut session = started();
        assert_eq!(
            session.join(PlayerId::new("carol")),
            Err(Rejection::SessionNotJoinable)
        );
    }

    #[test]
    fn test_submit_before_start() {
        let mut session = forming();
        let request = SubmitAction {
            session_id: session.id(),
            player_id: alice(),
            expected_version: 0,
            action: Move::Forfeit,
        };
        assert_eq!(
            session.submit(&request),
            Err(SessionError::Rejected(Rejection::GameNotStarted))
        );
    }

    #[test]
    fn test_two_player_high_card_game() {
        let mut session = started();
        let first = session.table().unwrap().current_player().unwrap().clone();
        assert_eq!(first, alice());

        let event = session.submit(&play(&session, &alice(), 0)).unwrap();
        assert_eq!(event.version, 1);
        match &event.kind {
            EventKind::ActionApplied { next, outcome, .. } => {
                assert_eq!(next, &Some(bob()));
                assert!(outcome.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let alice_card = session.table().unwrap().trick[0].1;
        let bob_card = *session.table().unwrap().hand(&bob()).unwrap().iter().next().unwrap();

        let event = session.submit(&play(&session, &bob(), 1)).unwrap();
        assert_eq!(event.version, 2);
        assert_eq!(session.phase(), SessionPhase::Completed);

        let winner = if alice_card > bob_card { alice() } else { bob() };
        let outcome = session.table().unwrap().outcome.clone().unwrap();
        assert_eq!(outcome.winners, vec![winner]);
        assert_eq!(
            outcome.reason,
            OutcomeReason::HighCard {
                card: alice_card.max(bob_card)
            }
        );

        assert_eq!(
            session.submit(&play(&session, &bob(), 2)),
            Err(SessionError::Rejected(Rejection::GameAlreadyEnded))
        );
    }

    #[test]
    fn test_rejections_leave_state_untouched() {
        let mut session = started();
        let before = session.table().unwrap().clone();

        let out_of_turn = play(&session, &bob(), 0);
        assert_eq!(
            session.submit(&out_of_turn),
            Err(SessionError::Rejected(Rejection::NotYourTurn))
        );

        let stale = play(&session, &alice(), 5);
        assert_eq!(
            session.submit(&stale),
            Err(SessionError::Rejected(Rejection::StaleVersion {
                expected: 5,
                current: 0
            }))
        );

        let stranger = SubmitAction {
            session_id: session.id(),
            player_id: PlayerId::new("mallory"),
            expected_version: 0,
            action: Move::Forfeit,
        };
        assert_eq!(
            session.submit(&stranger),
            Err(SessionError::Rejected(Rejection::UnknownPlayer))
        );

        let bogus = SubmitAction {
            session_id: session.id(),
            player_id: alice(),
            expected_version: 0,
            action: Move::Play {
                card: Card(1, Suit::Club),
            },
        };
        assert_eq!(
            session.submit(&bogus),
            Err(SessionError::Rejected(Rejection::InvalidPayload))
        );

        assert_eq!(session.version(), 0);
        assert_eq!(session.table().unwrap(), &before);
        assert!(session.log().is_empty());
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn test_stale_unbind_suspends_and_rebind_resumes() {
        let mut session = started();
        let now = Instant::now();
        let conn = ConnectionId::new();
        session.bind(&alice(), conn).unwrap();

        assert!(session.unbind(&alice(), conn, now));
        session.tick(now + Duration::from_secs(1));
        assert_eq!(session.phase(), SessionPhase::InProgress);

        session.tick(now + session.config().stale_grace());
        assert_eq!(session.phase(), SessionPhase::Suspended);

        let request = play(&session, &alice(), 0);
        assert_eq!(
            session.submit(&request),
            Err(SessionError::Unavailable(Unavailable::Suspended))
        );

        session.bind(&alice(), ConnectionId::new()).unwrap();
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert!(session.submit(&request).is_ok());
    }

    #[test]
    fn test_unbind_of_superseded_connection_ignored() {
        let mut session = started();
        let old = ConnectionId::new();
        let new = ConnectionId::new();
        session.bind(&alice(), old).unwrap();
        session.bind(&alice(), new).unwrap();

        assert!(!session.unbind(&alice(), old, Instant::now()));
        assert_eq!(
            session.view(&alice()).unwrap().seats[0].connection,
            BindingState::Bound
        );
    }

    #[test]
    fn test_reconnect_grace_abandons() {
        let mut session = started();
        let now = Instant::now();
        let conn = ConnectionId::new();
        session.bind(&bob(), conn).unwrap();
        session.unbind(&bob(), conn, now);

        let suspended_at = now + session.config().stale_grace();
        session.tick(suspended_at);
        session.tick(suspended_at + session.config().reconnect_grace());

        assert_eq!(session.phase(), SessionPhase::Abandoned);
        assert_eq!(
            session.abandon_reason(),
            Some(&AbandonReason::ReconnectTimeout)
        );
        assert!(session.record().is_some());
    }

    #[test]
    fn test_forming_timeout_abandons() {
        let now = Instant::now();
        let mut session =
            Session::new(SessionId::new(), SessionConfig::default(), alice(), now).unwrap();
        session.tick(now + session.config().forming_timeout());
        assert_eq!(session.phase(), SessionPhase::Abandoned);
        assert_eq!(
            session.abandon_reason(),
            Some(&AbandonReason::FormingTimeout)
        );
    }

    #[test]
    fn test_corruption_quarantines_session() {
        let mut session = started();
        session.corrupt_table();

        let err = session.submit(&play(&session, &alice(), 0)).unwrap_err();
        assert!(matches!(err, SessionError::Fatal { .. }));
        assert_eq!(session.phase(), SessionPhase::Abandoned);
        assert_eq!(session.version(), 0);
        assert!(matches!(
            session.abandon_reason(),
            Some(AbandonReason::Corrupted { .. })
        ));
    }

    #[test]
    fn test_replay_since_returns_later_actions() {
        let mut session = started();
        session.submit(&play(&session, &alice(), 0)).unwrap();
        session.submit(&play(&session, &bob(), 1)).unwrap();

        let versions: Vec<u64> = session.replay_since(1).iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![2]);
        assert_eq!(session.replay_since(0).len(), 2);
    }

    #[test]
    fn test_view_hides_other_hands() {
        let session = started();
        let view = session.view(&alice()).unwrap();
        assert_eq!(view.hand.len(), 1);
        assert_eq!(view.seats[1].cards_held, 1);
        assert_eq!(view.legal_actions.len(), 2);
        assert_eq!(
            session.view(&PlayerId::new("mallory")),
            Err(Rejection::UnknownPlayer)
        );
        assert!(session.view(&bob()).unwrap().legal_actions.iter().all(|m| *m == Move::Forfeit));
    }

    #[test]
    fn test_summary_reports_variant() {
        let session = forming();
        let summary = session.summary();
        assert_eq!(summary.variant, VariantKind::SimpleHighCard);
        assert_eq!(summary.players, vec![alice()]);
        assert_eq!(summary.phase, SessionPhase::Forming);
    }

    #[test]
    fn test_seeded_sessions_deal_identically() {
        let a = started();
        let b = started();
        assert_eq!(a.genesis().unwrap().seed, b.genesis().unwrap().seed);
        assert_eq!(a.table(), b.table());
    }
}
