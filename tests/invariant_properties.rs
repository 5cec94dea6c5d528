// Property-Based Testing for Dispatch Invariants
// Random operation sequences against the engine; after every step the
// worker/status invariant, the workload ledger and cool-down must hold.

mod fixtures;

use chrono::Duration;
use fixtures::{curtain_worker, engine_with, TestEngine, PUTUO};
use proptest::prelude::*;

use field_dispatch::dispatch::OrderFilter;
use field_dispatch::{Actor, AssignTarget, OrderId, OrderStatus, WorkerId};

const WORKERS: [&str; 3] = ["w1", "w2", "w3"];

#[derive(Debug, Clone)]
enum Op {
    Create,
    Assign(usize),
    Accept(usize),
    Reject(usize),
    Reassign(usize),
    Advance(usize, OrderStatus),
    Cancel(usize),
    Wait(i64),
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let idx = 0usize..6;
    prop_oneof![
        2 => Just(Op::Create),
        4 => idx.clone().prop_map(Op::Assign),
        2 => idx.clone().prop_map(Op::Accept),
        2 => idx.clone().prop_map(Op::Reject),
        2 => idx.clone().prop_map(Op::Reassign),
        3 => (
            idx.clone(),
            prop_oneof![
                Just(OrderStatus::Visiting),
                Just(OrderStatus::PendingConfirmation),
                Just(OrderStatus::Completed),
                Just(OrderStatus::Assigning),
            ],
        )
            .prop_map(|(i, target)| Op::Advance(i, target)),
        1 => idx.prop_map(Op::Cancel),
        1 => (1i64..30).prop_map(Op::Wait),
        1 => Just(Op::Sweep),
    ]
}

async fn apply(t: &TestEngine, ids: &mut Vec<OrderId>, op: &Op) {
    let (id, before) = match op {
        Op::Create => {
            ids.push(t.create("curtain", PUTUO).await.order.id);
            return;
        }
        Op::Wait(hours) => {
            t.clock.advance(Duration::hours(*hours));
            return;
        }
        Op::Sweep => {
            t.engine.escalate_timeouts().await;
            return;
        }
        Op::Assign(i)
        | Op::Accept(i)
        | Op::Reject(i)
        | Op::Reassign(i)
        | Op::Advance(i, _)
        | Op::Cancel(i) => match ids.get(*i % ids.len().max(1)).copied() {
            Some(id) => (id, t.engine.get(id).unwrap().order),
            None => return,
        },
    };
    let v = before.version;

    let result = match op {
        Op::Assign(_) => t.engine.assign(id, v, AssignTarget::Auto).await,
        Op::Accept(_) => t.engine.record_worker_response(id, v, true, None).await,
        Op::Reject(_) => {
            t.engine
                .record_worker_response(id, v, false, Some("busy".into()))
                .await
        }
        Op::Reassign(_) => t.engine.reassign(id, v, "rebalance", Actor::Supervisor).await,
        Op::Advance(_, target) => t.engine.advance(id, v, *target).await,
        Op::Cancel(_) => t.engine.cancel(id, v, "withdrawn").await,
        Op::Create | Op::Wait(_) | Op::Sweep => unreachable!(),
    };

    match result {
        Ok(view) => {
            assert_eq!(view.order.version, v + 1);
            if let (Op::Assign(_), Some(cooling)) = (op, &before.cooldown_worker_id) {
                // Three eligible workers: the previous one is never re-picked.
                assert_ne!(view.order.assigned_worker_id.as_ref(), Some(cooling));
            }
        }
        Err(_) => assert_eq!(t.engine.get(id).unwrap().order, before),
    }
}

fn check_invariants(t: &TestEngine) {
    let all = t.engine.list_with_sla(&OrderFilter {
        include_closed: true,
        ..OrderFilter::default()
    });
    for view in &all {
        assert_eq!(
            view.order.assigned_worker_id.is_some(),
            view.order.status.holds_worker(),
            "worker/status mismatch on {:?}",
            view.order
        );
    }
    for id in WORKERS {
        let worker = WorkerId::from(id);
        let holding = all
            .iter()
            .filter(|v| v.order.assigned_worker_id.as_ref() == Some(&worker))
            .count() as u32;
        assert_eq!(t.engine.open_assignments(&worker), holding, "ledger drift for {id}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operation_sequences_preserve_invariants(
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        tokio_test::block_on(async {
            let t = engine_with(WORKERS.iter().map(|id| curtain_worker(id, 0.9)).collect());
            let mut ids = Vec::new();
            for op in &ops {
                apply(&t, &mut ids, op).await;
                check_invariants(&t);
            }
            t.engine.settle().await;
        });
    }
}

#[tokio::test]
async fn cancel_is_not_idempotent() {
    let t = engine_with(vec![curtain_worker("w1", 0.9)]);
    let created = t.create("curtain", PUTUO).await;
    let cancelled = t
        .engine
        .cancel(created.order.id, created.order.version, "duplicate")
        .await
        .unwrap();

    let err = t
        .engine
        .cancel(created.order.id, cancelled.order.version, "duplicate")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), field_dispatch::ErrorKind::InvalidTransition);
    assert_eq!(t.engine.get(created.order.id).unwrap().order, cancelled.order);
}

#[tokio::test]
async fn cooldown_skips_the_previous_worker_even_when_best_ranked() {
    let t = engine_with(vec![curtain_worker("star", 0.99), curtain_worker("backup", 0.50)]);
    let first = t.create_assigned().await;
    assert_eq!(first.order.assigned_worker_id, Some(WorkerId::from("star")));

    let back = t
        .engine
        .reassign(
            first.order.id,
            first.order.version,
            "customer asked for another crew",
            Actor::Supervisor,
        )
        .await
        .unwrap();
    let next = t
        .engine
        .assign(back.order.id, back.order.version, AssignTarget::Auto)
        .await
        .unwrap();
    assert_eq!(next.order.assigned_worker_id, Some(WorkerId::from("backup")));
    assert_eq!(next.order.cooldown_worker_id, None);
}
