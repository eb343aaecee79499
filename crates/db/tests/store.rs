mod support;

use std::collections::BTreeSet;

use rusqlite::Connection;
use support::{make_entry, make_limit_event, make_track, setup_db, usage};
use usage_core::{DateRange, HourBucket, LimitType, UsageSnapshot};
use usage_db::{Db, DbError, LATEST_SCHEMA_VERSION};

fn bucket(date: &str, hour: u32) -> HourBucket {
    HourBucket::parse(&format!("{date} {hour:02}:00:00")).expect("bucket")
}

fn june() -> DateRange {
    DateRange {
        from: "2025-06-01".to_string(),
        to: "2025-06-30".to_string(),
    }
}

#[test]
fn migrate_records_schema_version_and_is_repeatable() {
    let mut test_db = setup_db();
    assert_eq!(
        test_db.db.schema_version().expect("version"),
        LATEST_SCHEMA_VERSION
    );
    test_db.db.migrate().expect("second migrate");
    let conn = Connection::open(&test_db.path).expect("open conn");
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, LATEST_SCHEMA_VERSION);
    test_db.db.check_integrity().expect("integrity");
}

#[test]
fn newer_schema_version_is_an_integrity_failure() {
    let test_db = setup_db();
    let conn = Connection::open(&test_db.path).expect("open conn");
    conn.execute(
        "INSERT INTO schema_version (version, name, applied_at) VALUES (99, 'future', 'now')",
        [],
    )
    .expect("insert version");
    drop(conn);

    let err = test_db.db.check_integrity().expect_err("integrity should fail");
    assert!(matches!(err, DbError::Integrity(_)));
    assert!(err.to_string().contains("rebuild"));

    let mut reopened = Db::open(&test_db.path).expect("reopen");
    assert!(matches!(reopened.migrate(), Err(DbError::Integrity(_))));
}

#[test]
fn commit_file_is_idempotent_per_identity_key() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let entries = vec![
        make_entry("m1:r1", "2025-06-01T10:05:00Z", "s1", "claude-sonnet-4", usage(10, 20, 0, 0), None, "p"),
        make_entry("m2:r2", "2025-06-01T10:15:00Z", "s1", "claude-sonnet-4", usage(1, 2, 3, 4), None, "p"),
        make_entry("m1:r1", "2025-06-01T10:05:00Z", "s1", "claude-sonnet-4", usage(10, 20, 0, 0), None, "p"),
    ];
    let limits = vec![make_limit_event("leaf-1", "2025-06-01T11:00:00Z", LimitType::FiveHour)];
    let track = make_track("/logs/p/s1.jsonl", 1, 100, 2);

    let first = db.commit_file(&track, &entries, &limits).expect("commit");
    assert_eq!(first.entries_inserted, 2);
    assert_eq!(first.limit_events_inserted, 1);

    let second = db.commit_file(&track, &entries, &limits).expect("recommit");
    assert_eq!(second.entries_inserted, 0);
    assert_eq!(second.limit_events_inserted, 0);

    assert_eq!(db.count_message_entries().expect("count"), 2);
    assert_eq!(db.count_limit_events().expect("count"), 1);
    assert_eq!(db.count_inconsistent_totals().expect("totals"), 0);
    let stored = db.file_track("/logs/p/s1.jsonl").expect("track").expect("tracked");
    assert_eq!(stored.size_bytes, 100);
    assert_eq!(stored.entry_count, 2);
}

#[test]
fn inserts_span_multiple_batches() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.set_batch_size(7);
    let entries: Vec<_> = (0..250)
        .map(|index| {
            make_entry(
                &format!("m{index}:r{index}"),
                "2025-06-02T08:30:00Z",
                "s2",
                "claude-opus-4",
                usage(1, 1, 1, 1),
                Some(0.01),
                "p",
            )
        })
        .collect();
    let inserted = db.insert_message_entries(&entries).expect("insert");
    assert_eq!(inserted, 250);
    assert_eq!(db.insert_message_entries(&entries).expect("reinsert"), 0);
}

#[test]
fn file_track_update_replaces_metadata() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.upsert_file_track(&make_track("/a.jsonl", 1, 10, 1)).expect("insert");
    db.upsert_file_track(&make_track("/a.jsonl", 2, 20, 3)).expect("update");
    let tracks = db.file_tracks().expect("tracks");
    assert_eq!(tracks.len(), 1);
    let track = &tracks["/a.jsonl"];
    assert_eq!((track.mtime_ns, track.size_bytes, track.entry_count), (2, 20, 3));
}

#[test]
fn recompute_matches_fresh_derivation() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let entries = vec![
        make_entry("a:1", "2025-06-01T10:05:00Z", "s1", "claude-sonnet-4", usage(100, 50, 0, 0), Some(0.5), "p"),
        make_entry("b:1", "2025-06-01T10:55:00Z", "s2", "claude-sonnet-4", usage(10, 5, 0, 0), Some(0.25), "p"),
        make_entry("c:1", "2025-06-01T11:00:00Z", "s2", "claude-opus-4", usage(1, 1, 1, 1), None, "p"),
        make_entry("d:1", "2024-12-31T23:00:00Z", "s3", "claude-opus-4", usage(2, 2, 2, 2), Some(1.0), "q"),
    ];
    db.insert_message_entries(&entries).expect("insert");
    let buckets: BTreeSet<_> = entries.iter().map(|entry| entry.bucket()).collect();
    let years: BTreeSet<_> = entries.iter().map(|entry| entry.local_year).collect();

    let recompute = db.recompute_rollups(&buckets, &years).expect("recompute");
    assert_eq!(recompute.hours, 3);
    assert_eq!(recompute.years, 2);
    assert!(db.rollup_drift().expect("drift").is_clean());

    let hours = db.hourly_aggregates(&june()).expect("hours");
    assert_eq!(hours.len(), 2);
    let ten = &hours[0];
    assert_eq!((ten.date.as_str(), ten.hour), ("2025-06-01", 10));
    assert_eq!(ten.message_count, 2);
    assert_eq!(ten.session_count, 2);
    assert_eq!(ten.total_tokens, 165);
    assert!((ten.total_cost - 0.75).abs() < 1e-9);

    let models_2025 = db.model_aggregates(Some(2025)).expect("models");
    assert_eq!(models_2025.len(), 2);
    assert_eq!(models_2025[0].model, "claude-sonnet-4");
    assert_eq!(models_2025[0].total_tokens, 165);
    assert_eq!(db.model_aggregates(None).expect("all").len(), 3);
    assert_eq!(db.top_models(2025, 1).expect("top").len(), 1);
}

#[test]
fn recompute_is_targeted_and_repeatable() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let first = make_entry("a:1", "2025-06-01T10:05:00Z", "s1", "m", usage(1, 0, 0, 0), None, "p");
    db.insert_message_entries(std::slice::from_ref(&first)).expect("insert");
    db.recompute_rollups(&BTreeSet::from([first.bucket()]), &BTreeSet::from([2025]))
        .expect("recompute");

    let late = make_entry("b:1", "2025-06-01T10:45:00Z", "s1", "m", usage(2, 0, 0, 0), None, "p");
    db.insert_message_entries(std::slice::from_ref(&late)).expect("insert late");
    assert!(!db.rollup_drift().expect("drift").is_clean());

    db.recompute_rollups(&BTreeSet::from([late.bucket()]), &BTreeSet::from([2025]))
        .expect("recompute");
    db.recompute_rollups(&BTreeSet::from([late.bucket()]), &BTreeSet::from([2025]))
        .expect("recompute again");
    assert!(db.rollup_drift().expect("drift").is_clean());
    let hours = db.hourly_aggregates(&june()).expect("hours");
    assert_eq!(hours.len(), 1);
    assert_eq!(hours[0].message_count, 2);
}

#[test]
fn recompute_of_empty_bucket_leaves_no_row() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.recompute_rollups(&BTreeSet::from([bucket("2025-06-03", 4)]), &BTreeSet::from([2025]))
        .expect("recompute");
    assert!(db.hourly_aggregates(&june()).expect("hours").is_empty());
    assert!(db.model_aggregates(None).expect("models").is_empty());
}

#[test]
fn limit_events_roundtrip_by_local_date() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let events = vec![
        make_limit_event("leaf-2", "2025-06-02T09:00:00Z", LimitType::Session),
        make_limit_event("leaf-1", "2025-06-01T09:00:00Z", LimitType::SpendingCap),
        make_limit_event("leaf-3", "2025-07-01T09:00:00Z", LimitType::Context),
    ];
    assert_eq!(db.insert_limit_events(&events).expect("insert"), 3);
    let june_events = db.limit_events(&june()).expect("events");
    assert_eq!(june_events.len(), 2);
    assert_eq!(june_events[0], events[1]);
    assert_eq!(june_events[1].limit_type, LimitType::Session);
    let latest = db.latest_limit_event().expect("latest").expect("some");
    assert_eq!(latest.identity_key, "leaf-3");
}

#[test]
fn reset_all_clears_data_and_tracking() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let entry = make_entry("a:1", "2025-06-01T10:05:00Z", "s1", "m", usage(1, 0, 0, 0), None, "p");
    db.commit_file(&make_track("/x.jsonl", 1, 1, 1), &[entry], &[])
        .expect("commit");
    db.reset_all().expect("reset");
    assert_eq!(db.count_message_entries().expect("count"), 0);
    assert!(db.file_tracks().expect("tracks").is_empty());
    assert!(db.pending_rollups().expect("pending").0.is_empty());
    assert_eq!(db.schema_version().expect("version"), LATEST_SCHEMA_VERSION);
}

#[test]
fn committed_files_leave_pending_rollups_until_rebuilt() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let nine = make_entry("a:1", "2025-06-01T09:05:00Z", "s1", "m", usage(1, 0, 0, 0), None, "p");
    let late = make_entry("b:1", "2024-12-31T23:05:00Z", "s2", "m", usage(2, 0, 0, 0), None, "p");
    db.commit_file(&make_track("/a.jsonl", 1, 1, 1), &[nine], &[])
        .expect("commit a");
    db.commit_file(&make_track("/b.jsonl", 1, 1, 1), &[late], &[])
        .expect("commit b");

    let (hours, years) = db.pending_rollups().expect("pending");
    assert_eq!(
        hours,
        BTreeSet::from([bucket("2025-06-01", 9), bucket("2024-12-31", 23)])
    );
    assert_eq!(years, BTreeSet::from([2024, 2025]));
    assert!(!db.rollup_drift().expect("drift").is_clean());

    let recompute = db.recompute_pending_rollups().expect("recompute");
    assert_eq!(recompute.hours, 2);
    assert_eq!(recompute.years, 2);
    assert!(db.rollup_drift().expect("drift").is_clean());
    let (hours, years) = db.pending_rollups().expect("pending");
    assert!(hours.is_empty());
    assert!(years.is_empty());

    let again = db.recompute_pending_rollups().expect("recompute again");
    assert_eq!(again.hours, 0);
    assert_eq!(again.years, 0);
}

#[test]
fn targeted_recompute_clears_only_its_pending_markers() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let nine = make_entry("a:1", "2025-06-01T09:05:00Z", "s1", "m", usage(1, 0, 0, 0), None, "p");
    let ten = make_entry("a:2", "2025-06-01T10:05:00Z", "s1", "m", usage(1, 0, 0, 0), None, "p");
    db.commit_file(&make_track("/a.jsonl", 1, 1, 2), &[nine.clone(), ten], &[])
        .expect("commit");

    db.recompute_rollups(&BTreeSet::from([nine.bucket()]), &BTreeSet::new())
        .expect("recompute");
    let (hours, years) = db.pending_rollups().expect("pending");
    assert_eq!(hours, BTreeSet::from([bucket("2025-06-01", 10)]));
    assert_eq!(years, BTreeSet::from([2025]));
}

#[test]
fn latest_snapshot_per_email() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let snapshot = |email: &str, pct: f64, captured_at: &str| UsageSnapshot {
        email: email.to_string(),
        logfile: None,
        session_used_pct: Some(pct),
        session_resets: Some("6pm".to_string()),
        week_used_pct: Some(10.0),
        week_resets: None,
        week_reset_at: None,
        captured_at: captured_at.to_string(),
    };
    db.insert_usage_snapshot(&snapshot("b@example.com", 5.0, "2025-06-01T10:00:00Z"))
        .expect("insert");
    db.insert_usage_snapshot(&snapshot("a@example.com", 10.0, "2025-06-01T10:00:00Z"))
        .expect("insert");
    db.insert_usage_snapshot(&snapshot("a@example.com", 40.0, "2025-06-01T12:00:00Z"))
        .expect("insert");
    let latest = db.latest_snapshots().expect("latest");
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].email, "a@example.com");
    assert_eq!(latest[0].session_used_pct, Some(40.0));
    assert_eq!(latest[1].session_used_pct, Some(5.0));
}
