use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cardroom::{
    archive::MemoryArchive,
    game::{Deck, DeckKind, Move, PlayerId, SessionId},
    session::{RegistryConfig, Session, SessionConfig, SessionRegistry, SubmitAction},
};
use rand::{SeedableRng, rngs::StdRng};
use std::{hint::black_box, sync::Arc};
use tokio::{runtime::Runtime, time::Instant};

/// Helper to create a started session with N players
fn started_session(config: SessionConfig, n_players: usize) -> Session {
    let players: Vec<PlayerId> = (0..n_players)
        .map(|i| PlayerId::new(&format!("player{i}")))
        .collect();

    let mut session = Session::new(SessionId::new(), config, players[0].clone(), Instant::now())
        .unwrap()
        .with_rng(StdRng::seed_from_u64(1));
    for player in &players[1..] {
        session.join(player.clone()).unwrap();
    }
    for player in &players {
        session.ready(player).unwrap();
    }
    session
}

/// Plays the current player's first legal card until the game ends
fn play_out(session: &mut Session) {
    while let Some(player) = session.table().and_then(|t| t.current_player().cloned()) {
        let action = session
            .legal_actions(&player)
            .unwrap()
            .into_iter()
            .find(|m| *m != Move::Forfeit)
            .unwrap();
        session
            .submit(&SubmitAction {
                session_id: session.id(),
                player_id: player,
                expected_version: session.version(),
                action,
            })
            .unwrap();
    }
}

/// Benchmark shuffling a fresh deck from a seed
fn bench_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("shuffle");
    for kind in [DeckKind::French, DeckKind::Italian] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{kind:?}")), &kind, |b, &kind| {
            b.iter(|| Deck::shuffled(black_box(kind), black_box([7u8; 32])));
        });
    }
    group.finish();
}

/// Benchmark validating and applying a single high card play
fn bench_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit");

    for n_players in [2, 4, 8] {
        let config = SessionConfig {
            min_players: n_players,
            max_players: n_players,
            ..SessionConfig::default()
        };
        let player = PlayerId::new("player0");
        // Seeded deals are identical, so every fresh session holds the same card
        let card = started_session(config.clone(), n_players)
            .view(&player)
            .unwrap()
            .hand[0];

        group.bench_with_input(
            BenchmarkId::from_parameter(n_players),
            &n_players,
            |b, _| {
                b.iter_batched(
                    || started_session(config.clone(), n_players),
                    |mut session| {
                        session
                            .submit(&SubmitAction {
                                session_id: session.id(),
                                player_id: player.clone(),
                                expected_version: 0,
                                action: Move::Play { card },
                            })
                            .unwrap()
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark a whole tressette match played by first legal card
fn bench_tressette_match(c: &mut Criterion) {
    c.bench_function("tressette_match", |b| {
        b.iter_batched(
            || started_session(SessionConfig::tressette(), 4),
            |mut session| play_out(&mut session),
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark a two-player game through the registry and session actor
fn bench_registry_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let _guard = runtime.enter();
    let config = RegistryConfig {
        retention_secs: 0,
        ..RegistryConfig::default()
    };
    let registry = SessionRegistry::new(config, Arc::new(MemoryArchive::new())).unwrap();
    let (alice, bob) = (PlayerId::new("alice"), PlayerId::new("bob"));

    c.bench_function("registry_game", |b| {
        b.to_async(&runtime).iter(|| async {
            let id = registry
                .create_session(alice.clone(), SessionConfig::default())
                .await
                .unwrap();
            registry.join_session(id, bob.clone()).await.unwrap();
            registry.ready(id, alice.clone()).await.unwrap();
            registry.ready(id, bob.clone()).await.unwrap();

            for (version, player) in [&alice, &bob].into_iter().enumerate() {
                let card = registry.snapshot(id, player.clone()).await.unwrap().hand[0];
                registry
                    .submit(SubmitAction {
                        session_id: id,
                        player_id: player.clone(),
                        expected_version: version as u64,
                        action: Move::Play { card },
                    })
                    .await
                    .unwrap();
            }
        });
    });
}

criterion_group!(deck_operations, bench_shuffle);

criterion_group!(
    session_operations,
    bench_submit,
    bench_tressette_match,
    bench_registry_round_trip,
);

criterion_main!(deck_operations, session_operations);
