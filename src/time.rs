//! Conversions between server-side UTC timestamps and the device's local
//! calendar.
//!
//! Every function that depends on a timezone has an `_in` variant taking the
//! zone explicitly; the plain variant uses the device zone (`chrono::Local`).

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Accepted shapes for timestamps that arrive without a zone designator.
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Source of "now" for anything that needs the local calendar day.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local calendar day containing `instant`.
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate;

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    fn today_key(&self) -> String {
        date_key(self.today())
    }
}

/// Wall clock in the device timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&Local).date_naive()
    }
}

/// Fixed-width RFC 3339 in UTC with millisecond precision, e.g.
/// `2026-01-05T16:02:00.000Z`.
pub fn to_utc<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a server timestamp. A value without an explicit offset is UTC,
/// never local time.
pub fn from_utc(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), DATE_KEY_FORMAT).ok()
}

pub fn local_date_key(instant: DateTime<Utc>) -> String {
    local_date_key_in(instant, &Local)
}

pub fn local_date_key_in<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> String {
    date_key(instant.with_timezone(tz).date_naive())
}

pub fn today_key() -> String {
    date_key(Local::now().date_naive())
}

pub fn is_same_local_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    is_same_local_day_in(a, b, &Local)
}

pub fn is_same_local_day_in<Tz: TimeZone>(a: DateTime<Utc>, b: DateTime<Utc>, tz: &Tz) -> bool {
    a.with_timezone(tz).date_naive() == b.with_timezone(tz).date_naive()
}

pub fn is_today(instant: DateTime<Utc>) -> bool {
    is_same_local_day(instant, Utc::now())
}

pub fn is_yesterday(instant: DateTime<Utc>) -> bool {
    is_yesterday_in(instant, Utc::now(), &Local)
}

pub fn is_yesterday_in<Tz: TimeZone>(instant: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> bool {
    let today = now.with_timezone(tz).date_naive();
    instant.with_timezone(tz).date_naive() == today - Duration::days(1)
}

pub fn last_n_local_days(n: usize) -> Vec<String> {
    last_n_local_days_from(Local::now().date_naive(), n)
}

/// `n` day keys ending at `today`, most recent first. Steps are calendar days
/// on the local date, so a DST transition never skips or repeats a day.
pub fn last_n_local_days_from(today: NaiveDate, n: usize) -> Vec<String> {
    (0..n)
        .map(|offset| date_key(today - Duration::days(offset as i64)))
        .collect()
}

/// Human time such as `8:02 AM`.
pub fn format_time(instant: DateTime<Utc>) -> String {
    format_time_in(instant, &Local)
}

pub fn format_time_in<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant
        .with_timezone(tz)
        .naive_local()
        .format("%-I:%M %p")
        .to_string()
}

/// `Today`, `Yesterday`, or a date like `Monday, Jan 5`.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if date == today - Duration::days(1) {
        "Yesterday".to_string()
    } else {
        date.format("%A, %b %-d").to_string()
    }
}

/// Long form used for page headers, e.g. `January 5, 2026`.
pub fn header_label(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}
