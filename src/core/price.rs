use chrono::{DateTime, TimeDelta, Utc};
use itertools::{Itertools, MinMaxResult};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{core::tariff::TariffSchedule, prelude::*};

/// Price applicable for the hour `[start_time, start_time + 1h)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, derive_more::Constructor)]
pub struct PricePoint {
    pub start_time: DateTime<Utc>,

    /// May be `NaN` when the source has no value for the hour.
    pub price: f64,
}

impl PricePoint {
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + TimeDelta::hours(1)
    }

    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        (self.start_time <= time) && (time < self.end_time())
    }
}

/// Affine conversion of the source prices into the owner's currency and unit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Conversion {
    pub scale: f64,

    /// Constant taxes and levies added after scaling.
    pub levy: f64,
}

impl Default for Conversion {
    fn default() -> Self {
        Self { scale: 1.0, levy: 0.0 }
    }
}

impl Conversion {
    #[must_use]
    pub fn apply(self, price: f64) -> f64 {
        price.mul_add(self.scale, self.levy)
    }
}

/// Ascending hourly prices with unique start times.
#[must_use]
#[derive(Clone, Debug, Default, derive_more::Deref, derive_more::IntoIterator)]
pub struct PriceTimeline(#[into_iterator(owned, ref)] Vec<PricePoint>);

#[bon::bon]
impl PriceTimeline {
    /// Number of hours appended by repeating the last known price when there is no forecast.
    pub const N_EXTRAPOLATED_HOURS: i64 = 4;

    /// Merge the spot prices with the optional forecast and tariffs.
    ///
    /// Duplicate start times are resolved in favour of the point that comes last
    /// in the merged sequence.
    #[builder]
    pub fn new(
        spot: Vec<PricePoint>,
        forecast: Option<Vec<PricePoint>>,
        tariffs: Option<&TariffSchedule>,
        #[builder(default)] conversion: Conversion,
    ) -> Result<Self> {
        let mut points = spot;
        points.sort_by_key(|point| point.start_time);
        let Some(last) = points.last().copied() else {
            bail!("no spot prices, nothing to decide on");
        };

        if let Some(forecast) = forecast {
            let n_spot = points.len();
            points.extend(forecast.into_iter().filter(|point| point.start_time > last.start_time));
            debug!(n_forecast = points.len() - n_spot, "appended the forecast");
        } else {
            points.extend((1..=Self::N_EXTRAPOLATED_HOURS).map(|hours| {
                PricePoint::new(last.start_time + TimeDelta::hours(hours), last.price)
            }));
        }

        if let Some(tariffs) = tariffs {
            for point in &mut points {
                match tariffs.at(point.start_time) {
                    Some(tariff) => point.price += tariff,
                    None => {
                        warn!(start_time = %point.start_time, "no tariff, keeping the bare price");
                    }
                }
            }
        }

        for point in &mut points {
            point.price = conversion.apply(point.price);
        }

        points.sort_by_key(|point| point.start_time);
        let points = points
            .into_iter()
            .coalesce(|previous, next| {
                if previous.start_time == next.start_time {
                    Ok(next)
                } else {
                    Err((previous, next))
                }
            })
            .collect_vec();

        info!(n_points = points.len(), "built the price timeline");
        Ok(Self(points))
    }
}

impl PriceTimeline {
    pub const fn from_points(points: Vec<PricePoint>) -> Self {
        Self(points)
    }

    /// Point covering the specified time, if any.
    #[must_use]
    pub fn at(&self, time: DateTime<Utc>) -> Option<&PricePoint> {
        let index = self.0.partition_point(|point| point.start_time <= time).checked_sub(1)?;
        let point = &self.0[index];
        point.contains(time).then_some(point)
    }

    /// Lowest and highest non-`NaN` price.
    #[must_use]
    pub fn price_range(&self) -> Option<(f64, f64)> {
        match self
            .0
            .iter()
            .map(|point| point.price)
            .filter(|price| !price.is_nan())
            .minmax_by_key(|price| OrderedFloat(*price))
        {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(price) => Some((price, price)),
            MinMaxResult::MinMax(min, max) => Some((min, max)),
        }
    }
}
