//! End-to-end lifecycle tests driving the public API only: create,
//! negotiate, accept with escrow, submit proof, and settle.

use std::sync::Arc;

use serde_json::json;
use tokio::time::{timeout, Duration};

use coliseum_core::escrow::SimulatedEscrowProvider;
use coliseum_core::gateway::{collections, DocumentGateway, MemoryGateway, WriteBatch};
use coliseum_core::model::{EscrowStatus, ResponseKind};
use coliseum_core::notify::LoggingNotifier;
use coliseum_core::pipeline::ResponsePipeline;
use coliseum_core::storage::MemoryObjectStore;
use coliseum_core::{
    Acceptance, Actor, Challenge, ChallengeEngine, ChallengeStatus, ChallengeWatcher,
    EngineConfig, EngineError, EngineEvent, EventBus, NegotiationService, NewChallenge,
    ProposedTerms, VideoSubmission, WagerToken,
};
use coliseum_core::model::VideoPayload;

struct App {
    gateway: Arc<MemoryGateway>,
    escrow: Arc<SimulatedEscrowProvider>,
    events: Arc<EventBus>,
    engine: Arc<ChallengeEngine>,
    negotiation: NegotiationService,
    pipeline: ResponsePipeline,
}

fn app(escrow: SimulatedEscrowProvider) -> App {
    // RUST_LOG=coliseum_core=debug for engine traces
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let gateway = Arc::new(MemoryGateway::new());
    let escrow = Arc::new(escrow);
    let events = Arc::new(EventBus::new());
    let engine = Arc::new(ChallengeEngine::new(
        gateway.clone(),
        escrow.clone(),
        events.clone(),
        EngineConfig::default(),
    ));
    App {
        gateway,
        escrow,
        events,
        negotiation: NegotiationService::new(engine.clone()),
        pipeline: ResponsePipeline::new(
            engine.clone(),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(LoggingNotifier),
        ),
        engine,
    }
}

async fn make_buddies(gateway: &MemoryGateway, a: &str, b: &str) {
    gateway
        .commit(WriteBatch::new().create(
            collections::BUDDY_REQUESTS,
            &format!("br-{}-{}", a, b),
            json!({
                "id": format!("br-{}-{}", a, b),
                "fromUserId": a,
                "toUserId": b,
                "status": "accepted",
            }),
        ))
        .await
        .unwrap();
}

async fn fetch_challenge(gateway: &MemoryGateway, id: &str) -> Challenge {
    let doc = gateway
        .get(collections::CHALLENGES, id)
        .await
        .unwrap()
        .expect("challenge exists");
    serde_json::from_value(doc).unwrap()
}

fn alice() -> Actor {
    Actor::new("alice", "Alice")
}

fn bob() -> Actor {
    Actor::new("bob", "Bob")
}

fn proof() -> VideoPayload {
    VideoPayload {
        uri: "file:///tmp/proof.mp4".into(),
        bytes: vec![7u8; 4096],
        thumbnail: Some(vec![1u8; 128]),
        duration_secs: 31.0,
    }
}

async fn submit_proof(app: &App, challenge_id: &str) -> VideoSubmission {
    app.pipeline
        .submit_video_response(challenge_id, Some(&bob()), proof(), true)
        .await
        .unwrap()
}

#[tokio::test]
async fn wagered_challenge_full_happy_path() {
    let app = app(SimulatedEscrowProvider::with_wallet("pk-bob"));
    app.escrow.set_balance("pk-bob", WagerToken::Sol, 50.0).await;
    make_buddies(&app.gateway, "alice", "bob").await;

    let mut events = app.events.subscribe();

    // Alice issues a wagered challenge
    let challenge = app
        .engine
        .create_challenge(
            Some(&alice()),
            NewChallenge {
                to: "bob".into(),
                to_name: "Bob".into(),
                challenge_text: "100 pushups in one set".into(),
                reward_text: "eternal glory".into(),
                wager_amount: 10.0,
                wager_token: Some(WagerToken::Sol),
                expiry_days: Some(7),
            },
        )
        .await
        .unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Pending);

    // Bob counters, Alice accepts the counter
    app.negotiation
        .propose_counter_offer(
            &challenge.id,
            Some(&bob()),
            ProposedTerms {
                challenge_text: "80 pushups in one set".into(),
                wager_amount: 8.0,
                wager_token: Some(WagerToken::Sol),
                expiry_days: 7,
            },
        )
        .await
        .unwrap();

    // The connected wallet funds whoever accepts
    let outcome = app
        .negotiation
        .accept(&challenge.id, Some(&alice()))
        .await
        .unwrap();
    let Acceptance::Accepted(accepted) = outcome else {
        panic!("expected acceptance");
    };
    assert_eq!(accepted.status, ChallengeStatus::Accepted);
    assert_eq!(accepted.challenge_text, "80 pushups in one set");
    assert_eq!(accepted.wager_amount, 8.0);
    let escrow = accepted.escrow.clone().expect("escrow funded");
    assert_eq!(escrow.status, EscrowStatus::Funded);
    // 8 SOL x 2 x 1.10 = 17.6 pot, 2.5% fee
    assert!((escrow.breakdown.total_pot - 17.6).abs() < 1e-9);
    assert!((escrow.breakdown.winner_payout - 17.16).abs() < 1e-9);

    // Bob submits video proof
    let submission = submit_proof(&app, &challenge.id).await;
    let after_submit = fetch_challenge(&app.gateway, &challenge.id).await;
    assert_eq!(after_submit.status, ChallengeStatus::ResponseSubmitted);
    assert_eq!(
        after_submit.response_id.as_deref(),
        Some(submission.response_id.as_str())
    );
    assert_eq!(
        after_submit.response_data.as_ref().unwrap().kind,
        ResponseKind::Video
    );

    // Alice approves; payout goes to Bob
    let completed = app
        .engine
        .approve_response(&challenge.id, Some(&alice()))
        .await
        .unwrap();
    assert_eq!(completed.status, ChallengeStatus::Completed);
    assert_eq!(completed.escrow.unwrap().status, EscrowStatus::Released);

    let state = app.escrow.escrow_state(&escrow.account).await.unwrap();
    assert_eq!(
        state,
        coliseum_core::escrow::simulated::SimulatedEscrowState::Released {
            recipient: "bob".into(),
            amount: escrow.breakdown.winner_payout,
        }
    );

    // Every stage emitted an event, in order
    let mut seen = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(100), events.recv()).await {
        seen.push(event);
    }
    assert!(matches!(seen[0], EngineEvent::ChallengeCreated { .. }));
    assert!(matches!(seen[1], EngineEvent::OfferProposed { .. }));
    assert!(matches!(seen[2], EngineEvent::ChallengeAccepted { .. }));
    assert!(matches!(seen[3], EngineEvent::ResponseSubmitted { .. }));
    assert!(matches!(
        seen[4],
        EngineEvent::ResponseApproved { payout: Some(_), .. }
    ));
}

#[tokio::test]
async fn wallet_pending_acceptance_resumes_after_connection() {
    let app = app(SimulatedEscrowProvider::disconnected());
    make_buddies(&app.gateway, "alice", "bob").await;

    let challenge = app
        .engine
        .create_challenge(
            Some(&alice()),
            NewChallenge {
                to: "bob".into(),
                to_name: "Bob".into(),
                challenge_text: "5k under 25 minutes".into(),
                reward_text: String::new(),
                wager_amount: 5.0,
                wager_token: Some(WagerToken::Usdc),
                expiry_days: None,
            },
        )
        .await
        .unwrap();

    // No wallet: intent is recorded, nothing else moves
    let outcome = app
        .engine
        .accept_challenge(&challenge.id, Some(&bob()))
        .await
        .unwrap();
    assert!(matches!(outcome, Acceptance::WalletRequired { .. }));
    let pending = fetch_challenge(&app.gateway, &challenge.id).await;
    assert!(pending.pending_acceptance);
    assert_eq!(pending.status, ChallengeStatus::Pending);
    assert!(pending.escrow.is_none());

    // Connect and fund, then re-enter
    app.escrow.connect("pk-bob").await;
    app.escrow.set_balance("pk-bob", WagerToken::Usdc, 100.0).await;
    let outcome = app
        .engine
        .accept_challenge(&challenge.id, Some(&bob()))
        .await
        .unwrap();
    let Acceptance::Accepted(accepted) = outcome else {
        panic!("expected acceptance after connection");
    };
    assert_eq!(accepted.status, ChallengeStatus::Accepted);
    assert!(!accepted.pending_acceptance);
    // USDC pot carries no bonus
    let escrow = accepted.escrow.unwrap();
    assert!((escrow.breakdown.total_pot - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn retry_then_dispute_freezes_escrow() {
    let app = app(SimulatedEscrowProvider::with_wallet("pk-bob"));
    app.escrow
        .set_balance("pk-bob", WagerToken::Bonk, 10_000.0)
        .await;
    make_buddies(&app.gateway, "alice", "bob").await;

    let challenge = app
        .engine
        .create_challenge(
            Some(&alice()),
            NewChallenge {
                to: "bob".into(),
                to_name: "Bob".into(),
                challenge_text: "handstand for 60 seconds".into(),
                reward_text: String::new(),
                wager_amount: 1000.0,
                wager_token: Some(WagerToken::Bonk),
                expiry_days: Some(3),
            },
        )
        .await
        .unwrap();
    app.engine
        .accept_challenge(&challenge.id, Some(&bob()))
        .await
        .unwrap();

    // First attempt rejected with a retry; funds stay held
    submit_proof(&app, &challenge.id).await;
    let retried = app
        .engine
        .request_retry(&challenge.id, Some(&alice()))
        .await
        .unwrap();
    assert_eq!(retried.status, ChallengeStatus::RetryRequested);
    let escrow = retried.escrow.clone().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Funded);

    // Second attempt disputed; escrow freezes for manual resolution
    submit_proof(&app, &challenge.id).await;
    let disputed = app
        .engine
        .initiate_dispute(&challenge.id, Some(&bob()))
        .await
        .unwrap();
    assert_eq!(disputed.status, ChallengeStatus::Disputed);
    assert_eq!(disputed.escrow.unwrap().status, EscrowStatus::Frozen);
    let state = app.escrow.escrow_state(&escrow.account).await.unwrap();
    assert_eq!(
        state,
        coliseum_core::escrow::simulated::SimulatedEscrowState::Frozen
    );

    // Terminal for further verdicts
    let result = app
        .engine
        .approve_response(&challenge.id, Some(&alice()))
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn watcher_sees_lifecycle_progress() {
    let app = app(SimulatedEscrowProvider::disconnected());
    make_buddies(&app.gateway, "alice", "bob").await;

    let challenge = app
        .engine
        .create_challenge(
            Some(&alice()),
            NewChallenge {
                to: "bob".into(),
                to_name: "Bob".into(),
                challenge_text: "plank for 3 minutes".into(),
                reward_text: String::new(),
                wager_amount: 0.0,
                wager_token: None,
                expiry_days: None,
            },
        )
        .await
        .unwrap();

    let watcher = ChallengeWatcher::new(app.gateway.clone());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    watcher
        .watch(&challenge.id, move |snapshot| {
            let _ = tx.send(snapshot.status);
        })
        .await
        .unwrap();

    app.engine
        .accept_challenge(&challenge.id, Some(&bob()))
        .await
        .unwrap();

    let status = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed");
    assert_eq!(status, ChallengeStatus::Accepted);
    watcher.unwatch(&challenge.id);
}

#[tokio::test]
async fn declined_challenge_is_terminal() {
    let app = app(SimulatedEscrowProvider::disconnected());
    make_buddies(&app.gateway, "alice", "bob").await;

    let challenge = app
        .engine
        .create_challenge(
            Some(&alice()),
            NewChallenge {
                to: "bob".into(),
                to_name: "Bob".into(),
                challenge_text: "cold plunge every day for a week".into(),
                reward_text: String::new(),
                wager_amount: 0.0,
                wager_token: None,
                expiry_days: None,
            },
        )
        .await
        .unwrap();

    let declined = app
        .engine
        .decline_challenge(&challenge.id, Some(&bob()))
        .await
        .unwrap();
    assert_eq!(declined.status, ChallengeStatus::Declined);

    let result = app
        .engine
        .accept_challenge(&challenge.id, Some(&bob()))
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}
