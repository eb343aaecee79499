use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streaks {
    pub max_streak: u32,
    pub current_streak: u32,
}

/// Longest run of consecutive active days, plus the run ending today (or
/// yesterday, when nothing has happened yet today).
pub fn compute_streaks<'a, I>(active_dates: I, today: NaiveDate) -> Streaks
where
    I: IntoIterator<Item = &'a str>,
{
    let days: BTreeSet<NaiveDate> = active_dates
        .into_iter()
        .filter_map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .collect();

    let mut max_streak = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for day in &days {
        run = match previous {
            Some(prev) if *day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        max_streak = max_streak.max(run);
        previous = Some(*day);
    }

    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut current_streak = 0u32;
    while days.contains(&cursor) {
        current_streak += 1;
        cursor -= Duration::days(1);
    }

    Streaks {
        max_streak,
        current_streak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn counts_longest_and_current_runs() {
        let dates = [
            "2025-06-01",
            "2025-06-02",
            "2025-06-03",
            "2025-06-10",
            "2025-06-11",
        ];
        let streaks = compute_streaks(dates, day("2025-06-11"));
        assert_eq!(streaks.max_streak, 3);
        assert_eq!(streaks.current_streak, 2);
    }

    #[test]
    fn current_streak_may_end_yesterday() {
        let streaks = compute_streaks(["2025-06-09", "2025-06-10"], day("2025-06-11"));
        assert_eq!(streaks.current_streak, 2);
        let broken = compute_streaks(["2025-06-08", "2025-06-09"], day("2025-06-11"));
        assert_eq!(broken.current_streak, 0);
        assert_eq!(broken.max_streak, 2);
    }

    #[test]
    fn empty_history_has_no_streaks() {
        assert_eq!(
            compute_streaks(std::iter::empty(), day("2025-06-11")),
            Streaks::default()
        );
    }
}
