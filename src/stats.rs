use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::models::DailyAggregate;
use crate::time::{day_label, last_n_local_days_from, parse_date_key};

/// Where a day stands against its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedingStatus {
    Over(f64),
    Met,
    Remaining(f64),
}

impl fmt::Display for FeedingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedingStatus::Over(by) => write!(f, "Over by {by:.2} cups"),
            FeedingStatus::Met => f.write_str("Target met!"),
            FeedingStatus::Remaining(left) => write!(f, "{left:.2} cups remaining"),
        }
    }
}

pub fn feeding_status(amount_fed: f64, target: f64) -> FeedingStatus {
    if amount_fed > target {
        FeedingStatus::Over(amount_fed - target)
    } else if amount_fed >= target {
        FeedingStatus::Met
    } else {
        FeedingStatus::Remaining(target - amount_fed)
    }
}

impl DailyAggregate {
    pub fn status(&self) -> FeedingStatus {
        feeding_status(self.amount_fed, self.target)
    }

    /// Uncapped share of the target fed so far; zero when no target is set.
    pub fn percent_of_goal(&self) -> f64 {
        if self.target > 0.0 {
            self.amount_fed / self.target * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HistorySummary {
    pub avg_amount: f64,
    pub days_on_target: usize,
    pub total_entries: usize,
    pub on_target_percentage: f64,
}

pub fn summarize(history: &[DailyAggregate]) -> HistorySummary {
    if history.is_empty() {
        return HistorySummary {
            avg_amount: 0.0,
            days_on_target: 0,
            total_entries: 0,
            on_target_percentage: 0.0,
        };
    }

    let total: f64 = history.iter().map(|day| day.amount_fed).sum();
    let days_on_target = history
        .iter()
        .filter(|day| day.amount_fed >= day.target)
        .count();
    let entries = history.len() as f64;

    HistorySummary {
        avg_amount: total / entries,
        days_on_target,
        total_entries: history.len(),
        on_target_percentage: days_on_target as f64 / entries * 100.0,
    }
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub label: String,
    pub amount_fed: f64,
    pub target: f64,
    /// Capped at 100.
    pub percent_complete: f64,
}

/// One point per calendar day ending at `today`, most recent first. Days the
/// server reported nothing for come back empty.
pub fn last_n_days_at(today: NaiveDate, history: &[DailyAggregate], n: usize) -> Vec<DailyPoint> {
    let by_date: HashMap<&str, &DailyAggregate> =
        history.iter().map(|day| (day.date.as_str(), day)).collect();

    last_n_local_days_from(today, n)
        .into_iter()
        .map(|date| {
            let label = parse_date_key(&date)
                .map(|parsed| day_label(parsed, today))
                .unwrap_or_else(|| date.clone());
            match by_date.get(date.as_str()) {
                Some(day) => DailyPoint {
                    label,
                    amount_fed: day.amount_fed,
                    target: day.target,
                    percent_complete: day.percent_of_goal().min(100.0),
                    date,
                },
                None => DailyPoint {
                    label,
                    amount_fed: 0.0,
                    target: 0.0,
                    percent_complete: 0.0,
                    date,
                },
            }
        })
        .collect()
}
