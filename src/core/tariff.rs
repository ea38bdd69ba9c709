use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Grid operator's time-of-day transport fee, valid within a date range.
#[derive(Clone, Debug, PartialEq)]
pub struct TariffRecord {
    /// Inclusive, local time.
    pub valid_from: NaiveDateTime,

    /// Exclusive, local time. Open-ended when missing.
    pub valid_to: Option<NaiveDateTime>,

    /// Fee per local hour of day.
    pub hourly: [f64; 24],
}

impl TariffRecord {
    #[must_use]
    pub fn is_valid_at(&self, local: NaiveDateTime) -> bool {
        (self.valid_from <= local) && self.valid_to.is_none_or(|valid_to| local < valid_to)
    }
}

/// Tariffs of a single grid operator.
#[derive(Clone, Debug)]
pub struct TariffSchedule {
    /// Zone in which the hours of [`TariffRecord::hourly`] are counted.
    pub time_zone: Tz,

    pub records: Vec<TariffRecord>,
}

impl TariffSchedule {
    /// Fee for the hour starting at the specified time.
    ///
    /// When multiple records are valid, the most recently started one applies.
    #[must_use]
    pub fn at(&self, time: DateTime<Utc>) -> Option<f64> {
        let local = time.with_timezone(&self.time_zone).naive_local();
        self.records
            .iter()
            .filter(|record| record.is_valid_at(local))
            .max_by_key(|record| record.valid_from)
            .map(|record| record.hourly[local.hour() as usize])
    }

    /// Multiply every fee, used to express the fees in the spot price unit.
    #[must_use]
    pub fn rescaled(mut self, factor: f64) -> Self {
        for record in &mut self.records {
            for fee in &mut record.hourly {
                *fee *= factor;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn schedule() -> TariffSchedule {
        let mut winter = [0.2; 24];
        winter[17] = 0.6;
        TariffSchedule {
            time_zone: chrono_tz::Europe::Copenhagen,
            records: vec![
                TariffRecord {
                    valid_from: midnight(2022, 1, 1),
                    valid_to: Some(midnight(2022, 4, 1)),
                    hourly: winter,
                },
                TariffRecord {
                    valid_from: midnight(2022, 4, 1),
                    valid_to: None,
                    hourly: [0.1; 24],
                },
            ],
        }
    }

    #[test]
    fn test_local_hour_of_day() {
        // 16:00 UTC is 17:00 in Copenhagen in winter:
        let time = Utc.with_ymd_and_hms(2022, 2, 7, 16, 0, 0).unwrap();
        assert_eq!(schedule().at(time), Some(0.6));
    }

    #[test]
    fn test_validity_range() {
        let time = Utc.with_ymd_and_hms(2022, 6, 1, 16, 0, 0).unwrap();
        assert_eq!(schedule().at(time), Some(0.1));
    }

    #[test]
    fn test_no_record() {
        let time = Utc.with_ymd_and_hms(2021, 6, 1, 16, 0, 0).unwrap();
        assert_eq!(schedule().at(time), None);
    }

    #[test]
    fn test_rescaled() {
        let time = Utc.with_ymd_and_hms(2022, 2, 7, 16, 0, 0).unwrap();
        assert_abs_diff_eq!(schedule().rescaled(10.0).at(time).unwrap(), 6.0);
    }
}
