use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::models::{FeedingBucket, FeedingEvent};
use crate::time::format_time_in;

pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;

struct Pending {
    bucket: FeedingBucket,
    earliest: DateTime<Utc>,
}

/// Groups one day's feedings into `interval_minutes` windows of device-local
/// time, most recent window first.
pub fn group(events: &[FeedingEvent], interval_minutes: u32) -> Vec<FeedingBucket> {
    group_in(events, interval_minutes, &Local)
}

pub fn group_in<Tz: TimeZone>(
    events: &[FeedingEvent],
    interval_minutes: u32,
    tz: &Tz,
) -> Vec<FeedingBucket> {
    let interval = interval_minutes.clamp(1, 60);

    let mut parsed: Vec<(DateTime<Utc>, &FeedingEvent)> = events
        .iter()
        .filter_map(|event| match event.instant() {
            Some(instant) => Some((instant, event)),
            None => {
                warn!(id = %event.id, timestamp = %event.timestamp, "skipping feeding with invalid timestamp");
                None
            }
        })
        .collect();
    parsed.sort_by(|a, b| b.0.cmp(&a.0));

    let mut buckets: BTreeMap<NaiveDateTime, Pending> = BTreeMap::new();
    for (instant, event) in parsed {
        let Some(start) = bucket_start(instant, interval, tz) else {
            warn!(id = %event.id, "skipping feeding outside representable local time");
            continue;
        };

        let pending = buckets.entry(start).or_insert_with(|| Pending {
            bucket: FeedingBucket {
                bucket_start: start,
                label: format_time_in(instant, tz),
                total_amount: 0.0,
                events: Vec::new(),
            },
            earliest: instant,
        });

        if instant < pending.earliest {
            pending.earliest = instant;
            pending.bucket.label = format_time_in(instant, tz);
        }
        pending.bucket.total_amount += event.amount;
        pending.bucket.events.push(event.clone());
    }

    buckets.into_values().rev().map(|pending| pending.bucket).collect()
}

fn bucket_start<Tz: TimeZone>(instant: DateTime<Utc>, interval: u32, tz: &Tz) -> Option<NaiveDateTime> {
    let local = instant.with_timezone(tz).naive_local();
    let minute = local.minute() / interval * interval;
    local.date().and_hms_opt(local.hour(), minute, 0)
}
