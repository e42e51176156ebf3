//! ---
//! logd_section: "15-testing-qa-runbook"
//! logd_subsection: "integration-tests"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Behaviour every log store backend must share."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use logd_persistence::{FileStore, LogStore, MemoryStore, TimeoutStore};
use logd_schema::{normalize, normalize_at, LogPayload};
use tempfile::TempDir;

async fn backends() -> Result<(TempDir, Vec<Arc<dyn LogStore>>)> {
    let dir = tempfile::tempdir()?;
    let file = FileStore::open(&dir.path().join("logs.jsonl")).await?;
    let stores: Vec<Arc<dyn LogStore>> = vec![
        Arc::new(MemoryStore::new()),
        Arc::new(file),
        Arc::new(TimeoutStore::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(5),
        )),
    ];
    Ok((dir, stores))
}

#[tokio::test]
async fn appended_record_round_trips() -> Result<()> {
    let (_dir, stores) = backends().await?;
    for store in stores {
        let event = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = normalize(LogPayload::new("auth", "login ok").with_timestamp(event))?;
        store.append(&record).await?;

        let found = store.query_by_service("auth").await?;
        assert_eq!(found, vec![record], "backend {}", store.backend());
    }
    Ok(())
}

#[tokio::test]
async fn repeated_queries_are_stable() -> Result<()> {
    let (_dir, stores) = backends().await?;
    for store in stores {
        for message in ["a", "b", "c"] {
            store.append(&normalize(LogPayload::new("billing", message))?).await?;
        }
        let first = store.query_by_service("billing").await?;
        let second = store.query_by_service("billing").await?;
        assert_eq!(first, second, "backend {}", store.backend());
        assert_eq!(first.len(), 3);
    }
    Ok(())
}

#[tokio::test]
async fn results_are_ordered_by_creation() -> Result<()> {
    let (_dir, stores) = backends().await?;
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for store in stores {
        let late = normalize_at(LogPayload::new("svc", "late"), base + chrono::Duration::seconds(10))?;
        let early = normalize_at(LogPayload::new("svc", "early"), base)?;
        store.append(&late).await?;
        store.append(&early).await?;

        let messages: Vec<_> = store
            .query_all()
            .await?
            .into_iter()
            .map(|record| record.message)
            .collect();
        assert_eq!(messages, vec!["early", "late"], "backend {}", store.backend());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_all_land_once() -> Result<()> {
    let (_dir, stores) = backends().await?;
    for store in stores {
        let mut tasks = Vec::new();
        for n in 0..50 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let record = normalize(LogPayload::new(format!("svc-{}", n % 5), format!("msg-{n}")))
                    .expect("valid payload");
                store.append(&record).await.map(|_| record.id)
            }));
        }

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await??);
        }

        let all = store.query_all().await?;
        assert_eq!(all.len(), 50, "backend {}", store.backend());
        let stored: HashSet<_> = all.iter().map(|record| record.id).collect();
        assert_eq!(stored, ids);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_reads_never_see_a_partial_append() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::open(&dir.path().join("large.jsonl")).await?;
    // Far larger than the writer's buffer, so each append reaches the file in pieces.
    let body = "x".repeat(512 * 1024);

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for n in 0..20 {
                let record = normalize(LogPayload::new("bulk", format!("{n}:{body}")))?;
                store.append(&record).await?;
            }
            anyhow::Ok(())
        })
    };

    loop {
        let seen = store.query_all().await?;
        assert!(seen.iter().all(|record| record.message.len() > 512 * 1024));
        if writer.is_finished() {
            break;
        }
        tokio::task::yield_now().await;
    }
    writer.await??;

    assert_eq!(store.query_by_service("bulk").await?.len(), 20);
    Ok(())
}
