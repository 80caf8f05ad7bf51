mod common;

use std::sync::Arc;
use std::time::Duration;

use call_guard::config::DecisionConfig;
use call_guard::{BlockingDecisionEngine, BlocklistStore, Decision, ErrorKind, MemoryBlocklistStore};
use common::{FailingStore, SlowStore};
use proptest::prelude::*;

#[tokio::test]
async fn test_unreachable_store_allows_call() {
    let engine = BlockingDecisionEngine::new(Arc::new(FailingStore), &DecisionConfig::default());

    assert_eq!(engine.decide("5550100").await, Decision::Allowed);
    let err = engine.lookup("5550100").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_allows_call_after_bound() {
    let store = Arc::new(SlowStore::new(Duration::from_secs(30)));
    store.add("5550100", "spam").await.unwrap();
    let engine = BlockingDecisionEngine::new(store, &DecisionConfig::default());

    let started = tokio::time::Instant::now();
    assert_eq!(engine.decide("5550100").await, Decision::Allowed);
    assert_eq!(started.elapsed(), Duration::from_secs(2));

    let err = engine.lookup("5550100").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_formatted_numbers_match_stored_entry() {
    let store = Arc::new(MemoryBlocklistStore::new());
    store.add("5550100", "spam").await.unwrap();
    let engine = BlockingDecisionEngine::new(store, &DecisionConfig::default());

    for raw in ["5550100", "555-0100", "+1-555-0100", "+1 (555) 0100"] {
        assert_eq!(engine.decide(raw).await, Decision::Blocked { reason: "spam".into() }, "{raw}");
    }
    assert_eq!(engine.decide("5550101").await, Decision::Allowed);
}

#[tokio::test]
async fn test_suffix_matching_can_be_disabled() {
    let store = Arc::new(MemoryBlocklistStore::new());
    store.add("5550100", "spam").await.unwrap();
    let config = DecisionConfig { suffix_match_digits: 0, ..Default::default() };
    let engine = BlockingDecisionEngine::new(store, &config);

    assert!(engine.decide("555 0100").await.is_blocked());
    assert_eq!(engine.decide("+1-555-0100").await, Decision::Allowed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_added_number_is_blocked_until_removed(
        number in "\\+?[0-9]{4,14}",
        reason in "[a-z]{1,12}",
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let store = Arc::new(MemoryBlocklistStore::new());
            let engine = BlockingDecisionEngine::new(store.clone(), &DecisionConfig::default());

            store.add(&number, &reason).await.unwrap();
            prop_assert_eq!(
                engine.decide(&number).await,
                Decision::Blocked { reason: reason.clone() }
            );

            store.remove(&number).await.unwrap();
            prop_assert_eq!(engine.decide(&number).await, Decision::Allowed);
            Ok(())
        })?;
    }
}
