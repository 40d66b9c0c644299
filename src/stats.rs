use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::roster::{AttendanceStatus, StudentStatus};

/// The row shape the aggregations need; handlers project query results into
/// this instead of threading full entities through. The status stays a raw
/// key so rows written by a newer build still group (with a fallback color)
/// instead of erroring.
#[derive(Debug, Clone)]
pub struct StudentFacts {
    pub status: String,
    pub year: i64,
    pub course: String,
}

impl StudentFacts {
    fn is_active(&self) -> bool {
        self.status == StudentStatus::Active.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct MarkRow {
    pub date: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearBucket {
    pub year: i64,
    pub count: usize,
}

/// Active students per academic year. All four buckets are always emitted so
/// chart axes stay stable even when a year has nobody enrolled.
pub fn count_by_year(students: &[StudentFacts]) -> Vec<YearBucket> {
    (1..=4)
        .map(|year| YearBucket {
            year,
            count: students
                .iter()
                .filter(|s| s.is_active() && s.year == year)
                .count(),
        })
        .collect()
}

const STATUS_PALETTE: &[(&str, &str)] = &[
    ("active", "hsl(var(--chart-1))"),
    ("inactive", "hsl(var(--chart-2))"),
    ("graduated", "hsl(var(--chart-3))"),
    ("transferred", "hsl(var(--chart-4))"),
];

const FALLBACK_FILL: &str = "hsl(var(--chart-5))";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSlice {
    pub status: String,
    pub count: usize,
    pub fill: String,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn fill_for(status: &str) -> String {
    STATUS_PALETTE
        .iter()
        .find(|(key, _)| *key == status)
        .map(|(_, fill)| fill.to_string())
        .unwrap_or_else(|| FALLBACK_FILL.to_string())
}

/// Lifecycle-status slices over all students, labeled for display with the
/// fixed palette color per status key. Only statuses that occur are emitted,
/// in first-seen order.
pub fn count_by_status(students: &[StudentFacts]) -> Vec<StatusSlice> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for s in students {
        let key = s.status.as_str();
        if !counts.contains_key(key) {
            order.push(key);
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    order
        .into_iter()
        .map(|key| StatusSlice {
            status: capitalize(key),
            count: counts[key],
            fill: fill_for(key),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBucket {
    pub date: String,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
}

/// Per-date present/absent/late counts over the trailing window
/// `today - window_days ..= today`. Only dates that occur in the input produce
/// a bucket; a day nobody marked is absent from the series, not zero. Buckets
/// come back in ascending calendar order. Rows whose date fails to parse are
/// skipped.
pub fn count_by_date_window(records: &[MarkRow], today: NaiveDate, window_days: u64) -> Vec<DateBucket> {
    let cutoff = today
        .checked_sub_days(Days::new(window_days))
        .unwrap_or(NaiveDate::MIN);

    let mut buckets: Vec<DateBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for r in records {
        let Ok(day) = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d") else {
            continue;
        };
        if day < cutoff || day > today {
            continue;
        }
        let i = *index.entry(r.date.clone()).or_insert_with(|| {
            buckets.push(DateBucket {
                date: r.date.clone(),
                present: 0,
                absent: 0,
                late: 0,
            });
            buckets.len() - 1
        });
        match r.status {
            AttendanceStatus::Present => buckets[i].present += 1,
            AttendanceStatus::Absent => buckets[i].absent += 1,
            AttendanceStatus::Late => buckets[i].late += 1,
            // Excused days are tracked in the sheet summary, not this series.
            AttendanceStatus::Excused => {}
        }
    }
    buckets.sort_by(|a, b| a.date.cmp(&b.date));
    buckets
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseCount {
    pub course: String,
    pub count: usize,
}

/// Active-student enrollment per course, descending, truncated to `limit`.
/// The sort is stable, so equal counts keep their first-seen input order.
pub fn top_courses(students: &[StudentFacts], limit: usize) -> Vec<CourseCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for s in students {
        if !s.is_active() {
            continue;
        }
        let key = s.course.as_str();
        if !counts.contains_key(key) {
            order.push(key);
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut out: Vec<CourseCount> = order
        .into_iter()
        .map(|course| CourseCount {
            course: course.to_string(),
            count: counts[course],
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out.truncate(limit);
    out
}

/// Present share of the day's marked records, as a percentage. The denominator
/// is marked records, not the roster; zero marked records yields 0, not NaN.
pub fn attendance_rate(records: &[MarkRow]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let present = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    (present as f64 / records.len() as f64) * 100.0
}
