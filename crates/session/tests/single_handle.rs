//! Random concurrent interleavings never leave two model handles alive.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{manager_with_resolver, model, MockBackend, MockResolver};
use murmur_session::SessionState;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Request(usize),
    Generate,
    Dispose,
}

const MODELS: [&str; 4] = ["A", "B", "C", "Broken"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..MODELS.len()).prop_map(Op::Request),
        Just(Op::Generate),
        Just(Op::Dispose),
    ]
}

fn run_interleaving(ops: Vec<(Op, u8)>) -> (usize, usize, SessionState) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let backend = Arc::new(MockBackend::with_delays(
            Duration::from_millis(3),
            Duration::from_millis(2),
        ));
        backend.fail_load_of("broken.gguf");
        let session = manager_with_resolver(backend.clone(), MockResolver::default());

        let tasks: Vec<_> = ops
            .into_iter()
            .map(|(op, delay_ms)| {
                let session = session.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                    // Outcomes don't matter here, only the handle count
                    match op {
                        Op::Request(i) => {
                            let _ = session.request_model(&model(MODELS[i])).await;
                        }
                        Op::Generate => {
                            let _ = session.generate("hello").await;
                        }
                        Op::Dispose => {
                            let _ = session.dispose().await;
                        }
                    }
                })
            })
            .collect();

        for result in futures_util::future::join_all(tasks).await {
            result.unwrap();
        }

        (backend.max_live(), backend.live(), session.state())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_at_most_one_live_handle(
        ops in prop::collection::vec((op_strategy(), 0u8..8), 1..12),
    ) {
        let (max_live, live, state) = run_interleaving(ops);

        prop_assert!(max_live <= 1, "{} handles were alive at once", max_live);

        let expected_live = usize::from(state.is_ready());
        prop_assert_eq!(
            live, expected_live,
            "live handles must match final state {:?}", state
        );
        prop_assert!(
            matches!(state, SessionState::Unloaded | SessionState::Ready { .. }),
            "settled in transient state {:?}", state
        );
    }
}
