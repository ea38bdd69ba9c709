use chrono::{DateTime, TimeDelta, Utc};

use crate::core::price::PricePoint;

/// Contiguous charging window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChargeWindow {
    pub start: DateTime<Utc>,
    pub hours: u32,
}

impl ChargeWindow {
    #[must_use]
    pub fn end(self) -> DateTime<Utc> {
        self.start + hours(self.hours)
    }
}

/// Find the start of the cheapest run of `n_hours` consecutive points.
///
/// A window is eligible when it ends at or before `stop_bound` and its first hour
/// ends after `start_bound`, so that a window which has already started may still be picked.
/// The earliest window wins a tie. Windows with a `NaN` price are never picked.
///
/// Falls back to `stop_bound - n_hours` when nothing is eligible.
#[must_use]
pub fn find_cheapest_start(
    timeline: &[PricePoint],
    n_hours: u32,
    start_bound: DateTime<Utc>,
    stop_bound: DateTime<Utc>,
) -> DateTime<Utc> {
    if n_hours < 1 {
        return stop_bound;
    }
    let duration = hours(n_hours);
    let fallback = stop_bound - duration;
    let n_hours = n_hours as usize;
    if timeline.len() < 2 || timeline.len() < n_hours {
        return fallback;
    }

    // Sliding sum over the finite prices, plus the number of `NaN`s inside the window:
    let mut sum = 0.0;
    let mut n_nans = 0_usize;
    for point in &timeline[..n_hours] {
        add(&mut sum, &mut n_nans, point.price);
    }

    let mut best: Option<(f64, DateTime<Utc>)> = None;
    for start_index in 0..=(timeline.len() - n_hours) {
        if start_index != 0 {
            remove(&mut sum, &mut n_nans, timeline[start_index - 1].price);
            add(&mut sum, &mut n_nans, timeline[start_index + n_hours - 1].price);
        }

        let first = &timeline[start_index];
        if first.start_time + duration > stop_bound {
            // Start times only grow from here on.
            break;
        }
        if first.end_time() <= start_bound || n_nans != 0 {
            continue;
        }
        if best.is_none_or(|(best_sum, _)| sum < best_sum) {
            best = Some((sum, first.start_time));
        }
    }

    best.map_or(fallback, |(_, start_time)| start_time)
}

fn add(sum: &mut f64, n_nans: &mut usize, price: f64) {
    if price.is_nan() {
        *n_nans += 1;
    } else {
        *sum += price;
    }
}

fn remove(sum: &mut f64, n_nans: &mut usize, price: f64) {
    if price.is_nan() {
        *n_nans -= 1;
    } else {
        *sum -= price;
    }
}

fn hours(n_hours: u32) -> TimeDelta {
    TimeDelta::hours(i64::from(n_hours))
}
