use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rs_priority::{
    Error, EngineBuilder, FileGrantStore, GrantStore, MemoryDirectory, MemoryGrantStore,
    RevokeReason, RoleId, SubjectId, duration,
};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn subject(value: &str) -> SubjectId {
    SubjectId::try_from(value).unwrap()
}

fn role(value: &str) -> RoleId {
    RoleId::try_from(value).unwrap()
}

#[tokio::test]
async fn grant_expires_through_sweep() {
    let store = MemoryGrantStore::new();
    let directory = MemoryDirectory::new(10).with_role(role("R1"), 1);
    let engine = EngineBuilder::new(store.clone(), directory.clone()).build();

    engine
        .issue(subject("U1"), role("R1"), duration::parse("2s").unwrap(), t0())
        .await
        .unwrap();
    assert!(directory.holds(&subject("U1"), &role("R1")));

    let status = engine
        .status(&subject("U1"), t0() + TimeDelta::seconds(1))
        .await
        .unwrap()
        .expect("grant active");
    assert_eq!(status.remaining, TimeDelta::seconds(1));
    assert_eq!(duration::format(status.remaining), "1 second(s)");

    let later = t0() + TimeDelta::seconds(3);
    let revoked = engine.sweep(later).await.unwrap();
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0].subject, subject("U1"));
    assert!(engine.status(&subject("U1"), later).await.unwrap().is_none());
    assert!(!directory.holds(&subject("U1"), &role("R1")));
    assert_eq!(directory.remove_calls(), 1);

    assert!(engine.sweep(later).await.unwrap().is_empty());
    assert_eq!(directory.remove_calls(), 1);
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn outranked_role_is_never_added() {
    let directory = MemoryDirectory::new(5).with_role(role("owner"), 7);
    let engine = EngineBuilder::new(MemoryGrantStore::new(), directory.clone()).build();

    let err = engine
        .issue(subject("U1"), role("owner"), TimeDelta::days(1), t0())
        .await
        .expect_err("must deny");

    assert!(matches!(err, Error::AuthorizationDenied { .. }));
    assert_eq!(directory.add_calls(), 0);
}

#[tokio::test]
async fn store_outage_during_sweep_keeps_grant_for_retry() {
    let store = MemoryGrantStore::new();
    let directory = MemoryDirectory::new(10).with_role(role("R1"), 1);
    let engine = EngineBuilder::new(store.clone(), directory.clone()).build();
    engine
        .issue(subject("U1"), role("R1"), TimeDelta::seconds(1), t0())
        .await
        .unwrap();

    store.set_fail_writes(true);
    let later = t0() + TimeDelta::minutes(1);
    assert!(engine.sweep(later).await.unwrap().is_empty());
    assert_eq!(store.snapshot().len(), 1);

    store.set_fail_writes(false);
    let revoked = engine.sweep(later).await.unwrap();
    assert_eq!(revoked.len(), 1);
    // The role was already gone after the first attempt.
    assert_eq!(directory.remove_calls(), 1);
}

#[tokio::test]
async fn store_outage_during_issue_leaves_no_orphaned_role() {
    let store = MemoryGrantStore::new();
    let directory = MemoryDirectory::new(10).with_role(role("R1"), 1);
    let engine = EngineBuilder::new(store.clone(), directory.clone()).build();

    store.set_fail_writes(true);
    let err = engine
        .issue(subject("U1"), role("R1"), TimeDelta::hours(1), t0())
        .await
        .expect_err("store is down");
    assert!(matches!(err, Error::Store(_)));
    assert!(!directory.holds(&subject("U1"), &role("R1")));
    assert!(store.snapshot().is_empty());

    store.set_fail_writes(false);
    engine
        .issue(subject("U1"), role("R1"), TimeDelta::hours(1), t0())
        .await
        .unwrap();
    assert!(directory.holds(&subject("U1"), &role("R1")));
}

#[tokio::test]
async fn file_backed_grants_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    let directory = MemoryDirectory::new(10).with_role(role("R1"), 1);

    {
        let engine = EngineBuilder::new(
            FileGrantStore::open(&path).await.unwrap(),
            directory.clone(),
        )
        .build();
        engine
            .issue(subject("U1"), role("R1"), TimeDelta::hours(1), t0())
            .await
            .unwrap();
        engine
            .issue(subject("U2"), role("R1"), TimeDelta::hours(2), t0())
            .await
            .unwrap();
    }

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"expireDate\": \"2024-06-01T13:00:00.000Z\""));

    let engine = EngineBuilder::new(FileGrantStore::open(&path).await.unwrap(), directory).build();
    let page = engine.list(1, 10, t0()).await.unwrap();
    let subjects: Vec<&str> = page.entries.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects, vec!["U1", "U2"]);

    engine
        .revoke(&subject("U1"), t0(), RevokeReason::Manual)
        .await
        .unwrap();
    let reopened = FileGrantStore::open(&path).await.unwrap();
    assert_eq!(reopened.all().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issues_keep_one_grant_per_subject() {
    let directory = MemoryDirectory::new(10).with_role(role("R1"), 1);
    let store = MemoryGrantStore::new();
    let engine = Arc::new(EngineBuilder::new(store.clone(), directory.clone()).build());

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine
                .issue(subject("U1"), role("R1"), TimeDelta::hours(1), t0())
                .await
        }));
    }
    let sweeper = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.sweep(t0()).await })
    };

    let mut issued = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => issued += 1,
            Err(Error::AlreadyActive { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(sweeper.await.unwrap().unwrap().is_empty());

    assert_eq!(issued, 1);
    assert_eq!(store.snapshot().len(), 1);
    assert_eq!(directory.add_calls(), 1);
}

#[tokio::test]
async fn pagination_over_twenty_five_grants() {
    let directory = MemoryDirectory::new(10).with_role(role("R1"), 1);
    let engine = EngineBuilder::new(MemoryGrantStore::new(), directory).build();
    for i in 0..25 {
        engine
            .issue(subject(&format!("U{i}")), role("R1"), TimeDelta::days(1), t0())
            .await
            .unwrap();
    }

    assert_eq!(engine.list(3, 10, t0()).await.unwrap().entries.len(), 5);
    assert!(engine.list(4, 10, t0()).await.unwrap().entries.is_empty());
}
