//! Order payment walkthrough
//!
//! Suspends a few checkout workflows on `OrderPaid`, persists the bookmarks, simulates a
//! restart, then delivers payment events (including a duplicate) and prints what the engine
//! would resume.
//!
//! ```bash
//! RUST_LOG=workflow_bookmarks=debug cargo run --example order_paid
//! # optional: BOOKMARKS_RESUME_MODE=first BOOKMARKS_SNAPSHOT_FORMAT=bincode
//! ```

use serde_json::json;
use std::sync::Arc;
use workflow_bookmarks::{
    serializer_for, BookmarkConfig, BookmarkService, CorrelationFilter, CorrelationPolicy,
    InMemoryBookmarkStore, SnapshotConfig, SnapshotFormat, Stimulus, StimulusDescriptor,
    SuspendRequest,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let snapshot_dir = tempfile::tempdir()?;
    let mut config = BookmarkConfig::from_env("BOOKMARKS")?.with_stimulus(
        StimulusDescriptor::new("OrderPaid")
            .with_correlation(CorrelationPolicy::new().exclude("paidAt")),
    );
    let snapshot = match config.snapshot.clone() {
        Some(snapshot) => snapshot,
        None => {
            let format = match std::env::var("BOOKMARKS_SNAPSHOT_FORMAT") {
                Ok(format) => format.parse::<SnapshotFormat>()?,
                Err(_) => SnapshotFormat::default(),
            };
            let path = snapshot_dir.path().join("bookmarks.snapshot");
            let snapshot = SnapshotConfig::new(path, format);
            config = config.with_snapshot(snapshot.clone());
            snapshot
        }
    };
    let serializer = serializer_for(snapshot.format);

    // First process: workflows suspend
    let store = Arc::new(InMemoryBookmarkStore::new());
    let service = BookmarkService::new(store.clone(), config.clone())?;
    let waiting = [("checkout-1", "A-100"), ("checkout-2", "A-101"), ("audit-1", "A-100")];
    for (instance, order) in waiting {
        let node = format!("{}:wait", instance);
        let bookmark = service
            .suspend_with_bookmark(
                SuspendRequest::new(instance, "OrderPaid", "wait-payment", node)
                    .with_payload(json!({"orderId": order, "paidAt": null}))
                    .with_callback_method_name("OnPaid")
                    .with_auto_burn(!instance.starts_with("audit")),
            )
            .await?;
        println!("{} suspended on {} ({})", instance, bookmark.id, &bookmark.hash[..12]);
    }
    let saved = store.save_snapshot(&snapshot.path, serializer.as_ref()).await?;
    println!("snapshot: {} bookmarks -> {}", saved, snapshot.path.display());

    // Second process: recover and dispatch events
    let restored = InMemoryBookmarkStore::load_snapshot(&snapshot.path, serializer.as_ref()).await?;
    let store = Arc::new(restored);
    let service = BookmarkService::new(store, config)?;

    for order in ["A-100", "A-100", "A-101"] {
        let stimulus = Stimulus::new("OrderPaid")
            .with_payload(json!({"orderId": order, "paidAt": chrono::Utc::now().to_rfc3339()}));
        let outcome = service.resume(&stimulus, &CorrelationFilter::Any).await?;

        println!("OrderPaid {} -> {} target(s)", order, outcome.targets.len());
        for (key, err) in &outcome.deferred {
            println!("  deferred {}/{}: {}", key.instance_id, key.bookmark_id, err);
        }
        for target in outcome.targets {
            println!(
                "  resume {} at {} via {}",
                target.instance_id,
                target.activity_node_id,
                target.callback_method_name.as_deref().unwrap_or("<default>")
            );
        }
    }

    Ok(())
}
