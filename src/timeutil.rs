use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Milliseconds since the Unix epoch for a UTC datetime.
pub fn to_timepoint(t: DateTime<Utc>) -> u64 {
    t.timestamp_millis().max(0) as u64
}

pub fn timepoint_now() -> u64 {
    to_timepoint(Utc::now())
}

pub fn from_timepoint(timepoint: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timepoint as i64).unwrap_or_default()
}

fn month_timepoint(year: i32, month: u32) -> u64 {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .map(to_timepoint)
        .unwrap_or(0)
}

/// Start of the UTC calendar month containing `timepoint`.
pub fn month_start(timepoint: u64) -> u64 {
    let t = from_timepoint(timepoint);
    month_timepoint(t.year(), t.month())
}

/// Start of the UTC calendar month following the one containing `timepoint`.
pub fn next_month_start(timepoint: u64) -> u64 {
    let t = from_timepoint(timepoint);
    let (year, month) = next_month(t.year(), t.month());
    month_timepoint(year, month)
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Both year and month must match; a timepoint from the same month of an
/// earlier year is historical.
pub fn is_current_month(timepoint: u64, now: u64) -> bool {
    let t = from_timepoint(timepoint);
    let n = from_timepoint(now);
    t.year() == n.year() && t.month() == n.month()
}

/// Month starts from `from` to `to` inclusive, both given as any timepoint
/// inside the month.
pub fn months_between(from: u64, to: u64) -> Vec<u64> {
    let last = month_start(to);
    let mut current = month_start(from);
    let mut months = Vec::new();
    while current <= last {
        months.push(current);
        current = next_month_start(current);
    }
    months
}
