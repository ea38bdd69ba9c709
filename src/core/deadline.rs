use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use itertools::Either;

pub const DEFAULT_MARKER: &str = "[T]";
pub const DEFAULT_HORIZON: TimeDelta = TimeDelta::hours(48);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Frequency {
    Daily,
    Weekly,
}

/// Repetition rule of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recurrence {
    pub frequency: Frequency,

    /// Every n-th day or week, at least one.
    pub interval: u32,

    /// Total number of occurrences, including the first one.
    pub count: Option<u32>,

    /// Latest possible start, inclusive.
    pub until: Option<DateTime<Utc>>,

    /// Weekdays on which the event occurs.
    ///
    /// Empty means the weekday of the first occurrence for the weekly frequency and every day
    /// for the daily one.
    pub by_day: Vec<Weekday>,
}

impl Recurrence {
    /// Occurrence starts in ascending order, beginning with `first`.
    ///
    /// The wall-clock time is kept in the specified zone, occurrences that fall into a DST gap
    /// are skipped.
    fn starts(
        &self,
        first: DateTime<Utc>,
        time_zone: Tz,
    ) -> impl Iterator<Item = DateTime<Utc>> + use<> {
        let local = first.with_timezone(&time_zone).naive_local();
        let (first_date, time) = (local.date(), local.time());
        let (anchor, period_days, offsets) = match self.frequency {
            Frequency::Daily => (first_date, 1, vec![0]),
            Frequency::Weekly => {
                let mut offsets = if self.by_day.is_empty() {
                    vec![i64::from(first_date.weekday().num_days_from_monday())]
                } else {
                    self.by_day
                        .iter()
                        .map(|weekday| i64::from(weekday.num_days_from_monday()))
                        .collect()
                };
                offsets.sort_unstable();
                offsets.dedup();
                let monday = first_date
                    - TimeDelta::days(i64::from(first_date.weekday().num_days_from_monday()));
                (monday, 7, offsets)
            }
        };
        let step = i64::from(self.interval.max(1)) * period_days;
        let daily_weekdays =
            if self.frequency == Frequency::Daily { self.by_day.clone() } else { Vec::new() };
        let count = self.count.map_or(usize::MAX, |count| {
            usize::try_from(count).unwrap_or(usize::MAX)
        });
        let until = self.until;

        (0_i64..)
            .map_while(move |index| anchor.checked_add_signed(TimeDelta::days(index * step)))
            .flat_map(move |period_start: NaiveDate| {
                offsets.clone().into_iter().filter_map(move |offset| {
                    period_start.checked_add_signed(TimeDelta::days(offset))
                })
            })
            .filter(move |date| *date >= first_date)
            .filter(move |date| {
                daily_weekdays.is_empty() || daily_weekdays.contains(&date.weekday())
            })
            .filter_map(move |date| time_zone.from_local_datetime(&date.and_time(time)).earliest())
            .map(|start| start.with_timezone(&Utc))
            .take(count)
            .take_while(move |start| until.is_none_or(|until| *start <= until))
    }
}

/// Calendar event reduced to what the deadline needs.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct CalendarEvent {
    pub start: DateTime<Utc>,

    #[builder(into)]
    pub summary: String,

    /// Zone in which a recurring event keeps its wall-clock time.
    #[builder(default = Tz::UTC)]
    pub time_zone: Tz,

    pub recurrence: Option<Recurrence>,

    /// Excluded occurrence starts.
    #[builder(default)]
    pub exceptions: Vec<DateTime<Utc>>,
}

impl CalendarEvent {
    /// Starts of the occurrences within `[from, until)`.
    #[must_use]
    pub fn occurrences(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let starts = match &self.recurrence {
            Some(recurrence) => Either::Left(recurrence.starts(self.start, self.time_zone)),
            None => Either::Right(std::iter::once(self.start)),
        };
        starts
            .take_while(|start| *start < until)
            .filter(|start| *start >= from)
            .filter(|start| !self.exceptions.contains(start))
            .collect()
    }
}

/// Charging deadline: the earliest charge-marked event within the look-ahead horizon.
#[must_use]
#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct DeadlineFinder<'a> {
    now: DateTime<Utc>,

    /// Token in the event summary that marks the event as needing a charged vehicle.
    #[builder(default = DEFAULT_MARKER)]
    marker: &'a str,

    #[builder(default = DEFAULT_HORIZON)]
    horizon: TimeDelta,
}

impl DeadlineFinder<'_> {
    /// Earliest occurrence of a marked event starting in `[now, now + horizon)`.
    ///
    /// Falls back to `now + horizon` when there is none.
    #[must_use]
    pub fn find<'e>(&self, events: impl IntoIterator<Item = &'e CalendarEvent>) -> DateTime<Utc> {
        let fallback = self.now + self.horizon;
        events
            .into_iter()
            .filter(|event| event.summary.contains(self.marker))
            .flat_map(|event| event.occurrences(self.now, fallback))
            .min()
            .unwrap_or(fallback)
    }
}
