mod common;

use common::{FlakyLedger, Harness, USER};
use payrecon::application::confirmation::OutcomeKind;
use payrecon::application::engine::PaymentEngine;
use payrecon::config::EngineConfig;
use payrecon::domain::event::EventType;
use payrecon::domain::intent::IntentStatus;
use payrecon::domain::money::{Balance, Currency, MinorUnits};
use payrecon::domain::ports::LedgerStore;
use payrecon::domain::transaction::{TransactionRecord, TransactionStatus};
use payrecon::domain::user::{User, UserId};
use payrecon::infrastructure::in_memory::InMemoryLedger;
use payrecon::infrastructure::sandbox::SandboxProcessor;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_settlement_is_idempotent_for_any_delivery_count() {
    for deliveries in 1..=5 {
        let h = Harness::new();
        h.mapped_user().await;
        let intent_id = h.submit(1234, "pm_card_visa").await;
        let body = h
            .sandbox
            .event_body(&intent_id, EventType::IntentSucceeded)
            .unwrap();

        let mut records = Vec::new();
        for _ in 0..deliveries {
            h.engine
                .handle_raw_event(&body, &h.engine.webhook_context())
                .await
                .unwrap();
            records.push(h.engine.transaction(&intent_id).await.unwrap().unwrap());
        }

        assert!(records.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(h.user().await.balance, Balance::new(dec!(12.34)));
        assert_eq!(h.engine.transactions().await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_status_never_returns_to_pending() {
    let h = Harness::new();
    h.mapped_user().await;

    for terminal in [TransactionStatus::Completed, TransactionStatus::Failed] {
        let intent_id = h.submit(500, "pm_card_visa").await;
        let record = |status| {
            TransactionRecord::deposit(
                intent_id.clone(),
                UserId::new(USER),
                status,
                MinorUnits(500),
                Currency::parse("usd").unwrap(),
                chrono::Utc::now(),
            )
        };

        h.ledger.apply(record(terminal)).await.unwrap();
        h.ledger.apply(record(TransactionStatus::Pending)).await.unwrap();
        let other = match terminal {
            TransactionStatus::Completed => TransactionStatus::Failed,
            _ => TransactionStatus::Completed,
        };
        h.ledger.apply(record(other)).await.unwrap();

        let stored = h.ledger.get_transaction(&intent_id).await.unwrap().unwrap();
        assert_eq!(stored.status, terminal);
    }
    assert_eq!(h.user().await.balance, Balance::new(dec!(5.00)));
}

#[tokio::test]
async fn test_bounded_retry() {
    let h = Harness::new();
    h.mapped_user().await;

    let settles = h.submit(2000, "pm_card_visa").await;
    h.sandbox.script_confirm(
        &settles,
        vec![IntentStatus::RequiresConfirmation, IntentStatus::Succeeded],
    );
    let outcome = h.engine.confirm_intent(&settles, &h.ctx()).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Succeeded);
    assert_eq!(h.sandbox.confirm_calls(&settles), 2);
    assert_eq!(h.engine.transactions().await.unwrap().len(), 1);

    let gives_up = h.submit(2000, "pm_card_visa").await;
    h.sandbox.script_confirm(
        &gives_up,
        vec![
            IntentStatus::RequiresConfirmation,
            IntentStatus::RequiresConfirmation,
        ],
    );
    let outcome = h.engine.confirm_intent(&gives_up, &h.ctx()).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert_eq!(h.sandbox.confirm_calls(&gives_up), 2);
    assert!(h.engine.transaction(&gives_up).await.unwrap().is_none());
}

#[tokio::test]
async fn test_identity_mapping_is_idempotent() {
    let h = Harness::new();
    let first = h.mapped_user().await;
    let before = h.user().await;

    let second = h.engine.map_customer(&h.ctx()).await.unwrap();
    assert_eq!(second.customer, first);
    assert!(!second.created);
    assert_eq!(h.sandbox.customers_created(), 1);
    assert_eq!(h.user().await, before);
}

#[tokio::test]
async fn test_concurrent_confirm_and_duplicate_webhooks_credit_once() {
    let h = Harness::new();
    h.mapped_user().await;
    let intent_id = h.submit(2000, "pm_card_visa").await;
    let body = h
        .sandbox
        .event_body(&intent_id, EventType::IntentSucceeded)
        .unwrap();

    #[derive(Clone, Copy)]
    enum Op {
        Confirm,
        Webhook,
    }
    let mut ops: Vec<Op> = (0..16)
        .map(|i| if i % 4 == 0 { Op::Confirm } else { Op::Webhook })
        .collect();
    ops.shuffle(&mut rand::thread_rng());

    let mut handles = Vec::new();
    for op in ops {
        let engine = Arc::clone(&h.engine);
        let body = body.clone();
        let intent_id = intent_id.clone();
        handles.push(tokio::spawn(async move {
            match op {
                Op::Confirm => {
                    let ctx = engine.context_for(UserId::new(USER));
                    engine.confirm_intent(&intent_id, &ctx).await.map(|_| ())
                }
                Op::Webhook => engine
                    .handle_raw_event(&body, &engine.webhook_context())
                    .await
                    .map(|_| ()),
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = h.engine.transaction(&intent_id).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(h.user().await.balance, Balance::new(dec!(20.00)));
}

#[tokio::test]
async fn test_distinct_intents_settle_independently() {
    let h = Harness::new();
    h.mapped_user().await;

    let mut bodies = Vec::new();
    for _ in 0..10 {
        let intent_id = h.submit(100, "pm_card_visa").await;
        bodies.push(
            h.sandbox
                .event_body(&intent_id, EventType::IntentSucceeded)
                .unwrap(),
        );
    }

    let handles: Vec<_> = bodies
        .into_iter()
        .map(|body| {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move {
                engine
                    .handle_raw_event(&body, &engine.webhook_context())
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().accepted);
    }

    assert_eq!(h.user().await.balance, Balance::new(Decimal::new(1000, 2)));
    assert_eq!(h.engine.transactions().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_store_failure_is_retryable_and_retry_applies_once() {
    let ledger = InMemoryLedger::new();
    let sandbox = SandboxProcessor::with_prefix("flaky");
    let engine = PaymentEngine::new(
        Box::new(FlakyLedger::failing(ledger.clone(), 1)),
        Box::new(sandbox.clone()),
        EngineConfig::default(),
    );
    engine
        .register_user(User::new(UserId::new(USER), "Ada", "ada@example.com"))
        .await
        .unwrap();
    let ctx = engine.context_for(UserId::new(USER));
    engine.map_customer(&ctx).await.unwrap();
    let intent_id = engine
        .submit_intent(
            payrecon::domain::intent::IntentSubmission {
                amount: 2000,
                currency: "usd".into(),
                payment_method: "pm_card_visa".into(),
            },
            &ctx,
        )
        .await
        .unwrap()
        .intent_id;
    let body = sandbox
        .event_body(&intent_id, EventType::IntentSucceeded)
        .unwrap();

    let err = engine
        .handle_raw_event(&body, &engine.webhook_context())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(ledger.get_transaction(&intent_id).await.unwrap().is_none());

    for _ in 0..2 {
        engine
            .handle_raw_event(&body, &engine.webhook_context())
            .await
            .unwrap();
    }
    let user = ledger.get_user(&UserId::new(USER)).await.unwrap().unwrap();
    assert_eq!(user.balance, Balance::new(dec!(20.00)));
}
