mod support;

use std::collections::BTreeSet;

use support::{make_entry, setup_db, usage};
use usage_core::{DateRange, MessageEntry, TimelineGranularity};
use usage_db::Db;

fn range(from: &str, to: &str) -> DateRange {
    DateRange {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn seed(db: &mut Db) -> Vec<MessageEntry> {
    let entries = vec![
        make_entry("a:1", "2025-05-31T22:00:00Z", "s0", "claude-opus-4", usage(5, 5, 0, 0), Some(0.1), "-home-me-api"),
        make_entry("b:1", "2025-06-01T09:00:00Z", "s1", "claude-sonnet-4", usage(100, 50, 10, 0), Some(1.0), "-home-me-app"),
        make_entry("c:1", "2025-06-01T09:30:00Z", "s1", "claude-sonnet-4", usage(20, 10, 0, 0), Some(0.5), "-home-me-app"),
        make_entry("d:1", "2025-06-02T14:00:00Z", "s2", "claude-opus-4", usage(1, 1, 1, 1), None, "-home-me-api"),
        make_entry("e:1", "2025-06-10T14:10:00Z", "s3", "claude-sonnet-4", usage(0, 0, 0, 40), Some(0.2), "-home-me-app"),
    ];
    db.insert_message_entries(&entries).expect("insert");
    let buckets: BTreeSet<_> = entries.iter().map(|entry| entry.bucket()).collect();
    let years: BTreeSet<_> = entries.iter().map(|entry| entry.local_year).collect();
    db.recompute_rollups(&buckets, &years).expect("recompute");
    entries
}

#[test]
fn totals_respect_range_and_project() {
    let mut test_db = setup_db();
    seed(&mut test_db.db);
    let db = &test_db.db;
    let june = range("2025-06-01", "2025-06-30");

    let all = db.usage_totals(&june, None).expect("totals");
    assert_eq!(all.messages, 4);
    assert_eq!(all.sessions, 3);
    assert_eq!(all.total_tokens, 150 + 10 + 30 + 4 + 40);
    assert_eq!(all.input_tokens, 121);
    assert_eq!(all.cache_write_tokens, 41);
    assert!((all.total_cost - 1.7).abs() < 1e-9);
    assert_eq!(
        all.first_session.as_deref(),
        Some("2025-06-01T09:00:00.000+00:00")
    );

    let api = db.usage_totals(&june, Some("-home-me-api")).expect("api");
    assert_eq!(api.messages, 1);
    assert_eq!(api.total_tokens, 4);

    let empty = db
        .usage_totals(&range("2030-01-01", "2030-01-31"), None)
        .expect("empty");
    assert_eq!(empty.messages, 0);
    assert_eq!(empty.first_session, None);
    assert_eq!(
        db.activity_bounds().expect("bounds"),
        Some(("2025-05-31".to_string(), "2025-06-10".to_string()))
    );
}

#[test]
fn scoped_and_unscoped_daily_activity_agree() {
    let mut test_db = setup_db();
    seed(&mut test_db.db);
    let db = &test_db.db;
    let june = range("2025-06-01", "2025-06-30");

    let daily = db.daily_activity(&june, None).expect("daily");
    let dates: Vec<_> = daily.iter().map(|day| day.date.as_str()).collect();
    assert_eq!(dates, vec!["2025-06-01", "2025-06-02", "2025-06-10"]);
    assert_eq!(daily[0].messages, 2);
    assert_eq!(daily[0].total_tokens, 190);

    let app = db.daily_activity(&june, Some("-home-me-app")).expect("app");
    assert_eq!(app.len(), 2);
    assert_eq!(app[0].messages, 2);
}

#[test]
fn timeline_groups_by_month_and_week() {
    let mut test_db = setup_db();
    seed(&mut test_db.db);
    let db = &test_db.db;
    let spring = range("2025-05-01", "2025-06-30");

    let monthly = db
        .timeline(&spring, None, TimelineGranularity::Month)
        .expect("monthly");
    let periods: Vec<_> = monthly.iter().map(|point| point.period.as_str()).collect();
    assert_eq!(periods, vec!["2025-05", "2025-06"]);
    assert_eq!(monthly[1].messages, 4);

    let weekly = db
        .timeline(&spring, Some("-home-me-app"), TimelineGranularity::Week)
        .expect("weekly");
    assert_eq!(weekly.iter().map(|point| point.messages).sum::<u64>(), 3);
}

#[test]
fn model_distribution_and_hourly_profile() {
    let mut test_db = setup_db();
    seed(&mut test_db.db);
    let db = &test_db.db;
    let june = range("2025-06-01", "2025-06-30");

    let models = db.model_distribution(&june, None).expect("models");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].model, "claude-sonnet-4");
    assert_eq!(models[0].messages, 3);
    assert_eq!(models[1].total_tokens, 4);

    let profile = db.hourly_profile(&june, None).expect("profile");
    assert_eq!(profile.len(), 24);
    assert_eq!(profile[9].messages, 2);
    assert_eq!(profile[14].messages, 2);
    assert_eq!(profile[0].messages, 0);

    let scoped = db
        .hourly_profile(&june, Some("-home-me-api"))
        .expect("scoped");
    assert_eq!(scoped[14].messages, 1);
    assert_eq!(scoped[9].messages, 0);
}

#[test]
fn sessions_and_drilldowns() {
    let mut test_db = setup_db();
    seed(&mut test_db.db);
    let db = &test_db.db;
    let june = range("2025-06-01", "2025-06-30");

    let recent = db.recent_sessions(&june, None, 2).expect("recent");
    let ids: Vec<_> = recent.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["s3", "s2"]);

    let day = db.day_details("2025-06-01", None).expect("day");
    assert_eq!(day.totals.messages, 2);
    assert_eq!(day.hourly[9].messages, 2);
    assert_eq!(day.models.len(), 1);
    assert_eq!(day.sessions.len(), 1);
    assert_eq!(day.sessions[0].messages, 2);

    let model = db
        .model_details("claude-opus-4", &range("2025-05-01", "2025-06-30"), None)
        .expect("model");
    assert_eq!(model.totals.messages, 2);
    assert_eq!(model.daily.len(), 2);
    assert_eq!(model.top_sessions.len(), 2);
    assert_eq!(model.top_sessions[0].session_id, "s0");

    let session = db.session_details("s1").expect("session").expect("exists");
    assert_eq!(session.summary.project_id, "-home-me-app");
    assert_eq!(session.summary.model.as_deref(), Some("claude-sonnet-4"));
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.totals.total_tokens, 190);
    assert!(db.session_details("missing").expect("lookup").is_none());
}
