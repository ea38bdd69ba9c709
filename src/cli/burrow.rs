use chrono::{TimeDelta, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use itertools::Itertools;

use crate::{
    cli::{prices::PriceArgs, tesla::TeslaArgs},
    core::{
        deadline::DEFAULT_HORIZON,
        gateway::VehicleGateway,
        limits::ChargeLimits,
        planner::ChargePlanner,
        price::PriceTimeline,
        window::ChargeWindow,
        zone::TariffRef,
    },
    prelude::*,
    tables::{build_snapshot_table, build_timeline_table, build_windows_table},
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    command: BurrowCommand,
}

impl BurrowArgs {
    pub async fn run(self) -> Result {
        match self.command {
            BurrowCommand::Prices(args) => args.run().await,
            BurrowCommand::Vehicle(args) => args.run().await,
        }
    }
}

#[derive(Subcommand)]
pub enum BurrowCommand {
    /// Fetch the price timeline and show the cheapest windows.
    Prices(BurrowPricesArgs),

    /// Fetch the vehicle data.
    Vehicle(BurrowVehicleArgs),
}

#[derive(Parser)]
pub struct BurrowPricesArgs {
    #[clap(long = "price-area", env = "PRICE_AREA", default_value = "DK2")]
    price_area: String,

    /// Grid operator to add the tariffs of, requires `--tariff-note`.
    #[clap(long = "grid-operator", env = "GRID_OPERATOR", requires = "tariff_note")]
    grid_operator: Option<String>,

    #[clap(long = "tariff-note", env = "TARIFF_NOTE", requires = "grid_operator")]
    tariff_note: Option<String>,

    /// Length of the window to highlight in the timeline.
    #[clap(long, default_value = "3")]
    hours: u32,

    #[clap(long = "time-zone", env = "TIME_ZONE", default_value = "Europe/Copenhagen")]
    time_zone: Tz,

    #[clap(flatten)]
    prices: PriceArgs,

    #[clap(flatten)]
    limits: ChargeLimits,
}

impl BurrowPricesArgs {
    #[instrument(skip_all, fields(price_area = %self.price_area))]
    async fn run(self) -> Result {
        let now = Utc::now();
        let tariff = self
            .grid_operator
            .zip(self.tariff_note)
            .map(|(grid_operator, note)| TariffRef { grid_operator, note });
        let timeline = self
            .prices
            .build_timeline(&self.price_area, tariff.as_ref(), self.time_zone, now)
            .await?;
        let planner =
            ChargePlanner::with_limits(&timeline, &self.limits, now, now + DEFAULT_HORIZON);

        let highlighted = ChargeWindow { start: planner.find(self.hours), hours: self.hours };
        println!("{}", build_timeline_table(&timeline, Some(highlighted), self.time_zone));

        let windows = (1..=self.limits.max_charge_hours)
            .map(|hours| {
                let window = ChargeWindow { start: planner.find(hours), hours };
                (window, average_price(&timeline, window))
            })
            .collect_vec();
        println!("{}", build_windows_table(&windows, self.time_zone));

        let earliest_start = planner.earliest_start();
        info!(
            start_time = %earliest_start.start_time,
            window_level = earliest_start.window_level,
            "earliest start",
        );
        Ok(())
    }
}

/// Average price over the window, `None` when the timeline does not fully cover it.
fn average_price(timeline: &PriceTimeline, window: ChargeWindow) -> Option<f64> {
    let prices = (0..window.hours)
        .map(|hour| {
            timeline
                .at(window.start + TimeDelta::hours(i64::from(hour)))
                .map(|point| point.price)
        })
        .collect::<Option<Vec<_>>>()?;
    (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64)
}

#[derive(Parser)]
pub struct BurrowVehicleArgs {
    #[clap(long, env = "VIN")]
    vin: String,

    /// Wake the vehicle up if it is asleep.
    #[clap(long)]
    wake: bool,

    /// Also print the raw vehicle data.
    #[clap(long)]
    raw: bool,

    #[clap(flatten)]
    tesla: TeslaArgs,
}

impl BurrowVehicleArgs {
    #[instrument(skip_all, fields(vin = %self.vin))]
    async fn run(self) -> Result {
        let tesla = self.tesla.connect().await?;
        if !tesla.is_reachable(&self.vin).await? {
            ensure!(self.wake, "the vehicle is asleep, pass `--wake` to wake it up");
            tesla.wake(&self.vin).await?;
        }
        let fetched = tesla.fetch_snapshot(&self.vin).await?;
        println!("{}", build_snapshot_table(&fetched.snapshot, self.tesla.time_zone));
        if self.raw {
            println!("{}", serde_json::to_string_pretty(&fetched.raw)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, TimeZone};

    use super::*;
    use crate::core::price::PricePoint;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, 7, 12, 0, 0).unwrap()
    }

    fn timeline() -> PriceTimeline {
        PriceTimeline::from_points(vec![
            PricePoint::new(now(), 10.0),
            PricePoint::new(now() + TimeDelta::hours(1), 20.0),
            PricePoint::new(now() + TimeDelta::hours(2), 60.0),
        ])
    }

    #[test]
    fn test_average_price() {
        let window = ChargeWindow { start: now(), hours: 3 };
        let average = average_price(&timeline(), window);
        assert!(average.is_some());
        assert_abs_diff_eq!(average.unwrap_or_default(), 30.0);
    }

    #[test]
    fn test_average_price_outside_of_timeline() {
        let window = ChargeWindow { start: now() + TimeDelta::hours(2), hours: 2 };
        assert_eq!(average_price(&timeline(), window), None);
    }
}
