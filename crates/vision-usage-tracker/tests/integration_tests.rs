use std::sync::Arc;
use tokio::sync::Barrier;
use vision_usage_tracker::*;

fn setup() -> (Arc<InMemoryStorage>, UsageTracker, UsageReporter) {
    let storage = Arc::new(InMemoryStorage::new());
    let tracker = UsageTracker::new(storage.clone());
    let reporter = UsageReporter::new(storage.clone());
    (storage, tracker, reporter)
}

#[tokio::test]
async fn test_unseen_identities_report_zero() {
    let (storage, _tracker, reporter) = setup();

    for id in ["a", "b", "user_2Zx9", ""] {
        assert_eq!(storage.get(id).await.unwrap().analyses_used, 0);
        assert_eq!(reporter.report(id, Tier::Free).await.unwrap().analyses_used, 0);
    }
}

#[tokio::test]
async fn test_free_tier_scenario() {
    let (_storage, tracker, reporter) = setup();

    // First analysis is admitted and uses the whole allowance
    let first = tracker.evaluate(Tier::Free, "u1").await.unwrap();
    assert!(first.allowed);
    assert_eq!(first.analyses_used, 1);
    assert_eq!(first.remaining, Limit::Limited(0));

    // Second is denied and not counted
    let second = tracker.evaluate(Tier::Free, "u1").await.unwrap();
    assert!(!second.allowed);
    assert_eq!(second.analyses_used, 1);
    assert_eq!(second.remaining, Limit::Limited(0));

    let report = reporter.report("u1", Tier::Free).await.unwrap();
    assert_eq!(
        report,
        UsageReport {
            user_id: "u1".to_string(),
            tier: Tier::Free,
            analyses_used: 1,
            limit: Limit::Limited(1),
        }
    );
}

#[tokio::test]
async fn test_premium_tier_scenario() {
    let (_storage, tracker, reporter) = setup();

    for _ in 0..5 {
        let decision = tracker.evaluate(Tier::Premium, "u2").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, Limit::Unlimited);
    }

    let report = reporter.report("u2", Tier::Premium).await.unwrap();
    assert_eq!(report.analyses_used, 5);
    assert_eq!(report.limit, Limit::Unlimited);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["limit"], "unlimited");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_free_requests_admit_exactly_one() {
    for k in [2usize, 8, 64, 256] {
        let (storage, tracker, _reporter) = setup();
        let barrier = Arc::new(Barrier::new(k));
        let user_id = format!("fresh-{k}");

        let handles: Vec<_> = (0..k)
            .map(|_| {
                let tracker = tracker.clone();
                let barrier = barrier.clone();
                let user_id = user_id.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    tracker.evaluate(Tier::Free, &user_id).await.unwrap()
                })
            })
            .collect();

        let mut allowed = 0;
        let mut denied = 0;
        for handle in handles {
            let decision = handle.await.unwrap();
            if decision.allowed {
                allowed += 1;
            } else {
                denied += 1;
                assert_eq!(decision.remaining, Limit::Limited(0));
            }
        }

        assert_eq!(allowed, 1, "k = {k}");
        assert_eq!(denied, k - 1, "k = {k}");
        assert_eq!(storage.get(&user_id).await.unwrap().analyses_used, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_premium_requests_all_counted() {
    let (storage, tracker, _reporter) = setup();
    let n = 200;
    let barrier = Arc::new(Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let tracker = tracker.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                tracker.evaluate(Tier::Premium, "premium-user").await.unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().allowed);
    }

    assert_eq!(storage.get("premium-user").await.unwrap().analyses_used, n as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_identities() {
    let (storage, tracker, _reporter) = setup();
    let users: Vec<String> = (0..16).map(|i| format!("user-{i}")).collect();

    // Four racing requests per user
    let mut handles = Vec::new();
    for user in &users {
        for _ in 0..4 {
            let tracker = tracker.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                tracker.evaluate(Tier::Free, &user).await.unwrap().allowed
            }));
        }
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, users.len());
    for user in &users {
        assert_eq!(storage.get(user).await.unwrap().analyses_used, 1);
    }
}

#[tokio::test]
async fn test_report_does_not_mutate() {
    let (storage, tracker, reporter) = setup();
    tracker.evaluate(Tier::Free, "u1").await.unwrap();

    for _ in 0..10 {
        reporter.report("u1", Tier::Free).await.unwrap();
        storage.get("u1").await.unwrap();
    }

    assert_eq!(storage.get("u1").await.unwrap().analyses_used, 1);
    // The denied path still works afterwards: the count was never bumped
    assert!(!tracker.evaluate(Tier::Free, "u1").await.unwrap().allowed);
}

#[tokio::test]
async fn test_fresh_store_starts_empty() {
    // A new store is what a process restart produces: prior usage is gone.
    let (_storage, tracker, _reporter) = setup();
    tracker.evaluate(Tier::Free, "u1").await.unwrap();

    let (storage, tracker, _reporter) = setup();
    assert!(storage.is_empty());
    assert!(tracker.evaluate(Tier::Free, "u1").await.unwrap().allowed);
}
