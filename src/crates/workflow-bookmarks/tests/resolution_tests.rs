//! Integration tests for stimulus resolution and bookmark lifecycle

mod common;

use common::{order_paid, setup_service, FlakyStore};
use serde_json::json;
use std::sync::Arc;
use workflow_bookmarks::{
    Bookmark, BookmarkConfig, BookmarkError, BookmarkKey, BookmarkService, BookmarkStore,
    CorrelationFilter, CorrelationPolicy, Stimulus, StimulusDescriptor, SuspendRequest,
};

fn paid(order_id: &str) -> Stimulus {
    Stimulus::new("OrderPaid").with_payload(json!({ "orderId": order_id }))
}

#[tokio::test]
async fn test_order_paid_resolves_once_then_empty() {
    let (store, service) = setup_service(BookmarkConfig::default());
    let bookmark = service
        .suspend_with_bookmark(order_paid("wf-1", "42"))
        .await
        .unwrap();
    assert!(bookmark.auto_burn);

    let found = service
        .resolver()
        .find(&paid("42"), &CorrelationFilter::Any)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].bookmark, bookmark);

    let resumed = service.resume(&paid("42"), &CorrelationFilter::Any).await.unwrap().targets;
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].instance_id, "wf-1");

    assert!(service
        .resolver()
        .find(&paid("42"), &CorrelationFilter::Any)
        .await
        .unwrap()
        .is_empty());
    let duplicate = service.resume(&paid("42"), &CorrelationFilter::Any).await.unwrap();
    assert!(duplicate.targets.is_empty());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_different_payloads_never_cross_match() {
    let (_, service) = setup_service(BookmarkConfig::default());
    let first = service.suspend_with_bookmark(order_paid("wf-1", "1")).await.unwrap();
    let second = service.suspend_with_bookmark(order_paid("wf-2", "2")).await.unwrap();
    assert_ne!(first.hash, second.hash);

    let found = service
        .resolver()
        .find(&paid("1"), &CorrelationFilter::Any)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].bookmark.id, first.id);

    assert!(service
        .resolver()
        .find(&paid("3"), &CorrelationFilter::Any)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_all_for_instance_clears_every_hash() {
    let (store, service) = setup_service(BookmarkConfig::default());
    let mut hashes = Vec::new();
    for order in ["1", "2", "3"] {
        hashes.push(service.suspend_with_bookmark(order_paid("wf-1", order)).await.unwrap().hash);
    }
    let survivor = service.suspend_with_bookmark(order_paid("wf-2", "1")).await.unwrap();

    assert_eq!(service.on_instance_terminated("wf-1").await.unwrap(), 3);

    for hash in &hashes {
        let keys = store.find_by_hash(hash).await.unwrap();
        assert!(keys.iter().all(|key| key.instance_id != "wf-1"));
    }
    assert_eq!(store.find_by_hash(&survivor.hash).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_find_twice_returns_identical_order() {
    let (_, service) = setup_service(BookmarkConfig::default());
    for instance in ["wf-c", "wf-a", "wf-b", "wf-d"] {
        service
            .suspend_with_bookmark(order_paid(instance, "same").with_auto_burn(false))
            .await
            .unwrap();
    }

    let first = service
        .resolver()
        .find(&paid("same"), &CorrelationFilter::Any)
        .await
        .unwrap();
    let second = service
        .resolver()
        .find(&paid("same"), &CorrelationFilter::Any)
        .await
        .unwrap();

    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
    assert!(first
        .windows(2)
        .all(|pair| pair[0].bookmark.created_at <= pair[1].bookmark.created_at));
}

#[tokio::test]
async fn test_tenant_filter_from_metadata() {
    let (store, service) = setup_service(BookmarkConfig::default());
    for (instance, tenant) in [("wf-1", "acme"), ("wf-2", "globex")] {
        service
            .suspend_with_bookmark(order_paid(instance, "77").with_metadata_entry("tenant", tenant))
            .await
            .unwrap();
    }

    let acme = CorrelationFilter::predicate(|record| {
        record
            .bookmark
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("tenant"))
            .map(String::as_str)
            == Some("acme")
    });
    let resumed = service.resume(&paid("77"), &acme).await.unwrap().targets;

    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].instance_id, "wf-1");
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_declared_correlation_fields() {
    let config = BookmarkConfig::new().with_stimulus(
        StimulusDescriptor::new("Approval").with_correlation(
            CorrelationPolicy::new()
                .with_fields(["documentId", "approvers"])
                .unordered("approvers"),
        ),
    );
    let (_, service) = setup_service(config);
    service
        .suspend_with_bookmark(
            SuspendRequest::new("wf-1", "Approval", "approve", "review:approve")
                .with_payload(json!({"documentId": 5, "approvers": ["ann", "bob"], "note": "x"})),
        )
        .await
        .unwrap();

    let stimulus = Stimulus::new("Approval")
        .with_payload(json!({"approvers": ["bob", "ann"], "documentId": 5, "note": "y"}));
    let outcome = service.resume(&stimulus, &CorrelationFilter::Any).await.unwrap();
    assert_eq!(outcome.targets.len(), 1);
}

#[tokio::test]
async fn test_transient_errors_surface_and_are_retryable() {
    let store = Arc::new(FlakyStore::new());
    let service = BookmarkService::new(store.clone(), BookmarkConfig::default()).unwrap();
    service.suspend_with_bookmark(order_paid("wf-1", "5")).await.unwrap();

    store.fail_deletes(true);
    let err = service
        .resume(&paid("5"), &CorrelationFilter::Any)
        .await
        .unwrap_err();
    assert!(matches!(err, BookmarkError::Transient(_)));
    assert!(err.is_retryable());
    assert_eq!(store.inner().count().await.unwrap(), 1);

    store.fail_deletes(false);
    let outcome = service.resume(&paid("5"), &CorrelationFilter::Any).await.unwrap();
    assert_eq!(outcome.targets.len(), 1);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_transient_get_is_not_treated_as_stale() {
    let store = Arc::new(FlakyStore::new());
    let service = BookmarkService::new(store.clone(), BookmarkConfig::default()).unwrap();
    service.suspend_with_bookmark(order_paid("wf-1", "6")).await.unwrap();

    store.fail_gets(true);
    let result = service.resolver().find(&paid("6"), &CorrelationFilter::Any).await;
    assert!(matches!(result, Err(BookmarkError::Transient(_))));
    assert!(store.failed_calls() >= 1);
}

#[tokio::test]
async fn test_fan_out_defers_bookmark_whose_burn_failed() {
    let store = Arc::new(FlakyStore::new());
    let service = BookmarkService::new(store.clone(), BookmarkConfig::default()).unwrap();
    let hash = service.resolver().hash_of(&paid("9"));
    let now = chrono::Utc::now();

    for (instance, offset) in [("wf-1", 0), ("wf-2", 1)] {
        let id = format!("bm-{}", instance);
        let bookmark = Bookmark::new(id, "OrderPaid", hash.clone(), "a", "n")
            .with_payload(json!({"orderId": "9"}))
            .with_created_at(now + chrono::Duration::seconds(offset));
        store.inner().create(instance, bookmark).await.unwrap();
    }

    store.fail_deletes_of("bm-wf-2", true);
    let outcome = service.resume(&paid("9"), &CorrelationFilter::Any).await.unwrap();
    assert_eq!(outcome.targets.len(), 1);
    assert_eq!(outcome.targets[0].bookmark_id, "bm-wf-1");
    assert!(!outcome.is_complete());
    assert_eq!(outcome.deferred.len(), 1);
    let (key, err) = &outcome.deferred[0];
    assert_eq!(key, &BookmarkKey::new("wf-2", "bm-wf-2"));
    assert!(err.is_retryable());
    assert!(store.inner().get("wf-2", "bm-wf-2").await.is_ok());

    store.fail_deletes_of("bm-wf-2", false);
    let retried = service.resume(&paid("9"), &CorrelationFilter::Any).await.unwrap();
    assert!(retried.is_complete());
    assert_eq!(retried.targets.len(), 1);
    assert_eq!(retried.targets[0].bookmark_id, "bm-wf-2");
}
