use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;
use reqwest::Url;

use crate::{
    api::{energi_data, forecast},
    core::{
        price::{Conversion, PriceTimeline},
        zone::TariffRef,
    },
    prelude::*,
};

#[derive(Parser)]
pub struct PriceArgs {
    /// Optional price forecast endpoint, the spot prices are extrapolated without it.
    #[clap(long = "forecast-url", env = "FORECAST_URL")]
    forecast_url: Option<Url>,

    /// Multiplier applied to every price, for example to convert EUR/MWh into the local currency.
    #[clap(long = "price-scale", env = "PRICE_SCALE", default_value = "1")]
    price_scale: f64,

    /// Constant taxes and levies added after scaling.
    #[clap(long = "price-levy", env = "PRICE_LEVY", default_value = "0")]
    price_levy: f64,

    /// Converts the grid tariffs into the spot price unit (DKK/kWh to EUR/MWh by default).
    #[clap(long = "tariff-scale", env = "TARIFF_SCALE", default_value = "134.05")]
    tariff_scale: f64,
}

impl PriceArgs {
    #[must_use]
    pub const fn conversion(&self) -> Conversion {
        Conversion { scale: self.price_scale, levy: self.price_levy }
    }

    /// Fetch everything the price timeline of the area is built from.
    #[instrument(skip_all, fields(price_area = price_area))]
    pub async fn build_timeline(
        &self,
        price_area: &str,
        tariff: Option<&TariffRef>,
        time_zone: Tz,
        now: DateTime<Utc>,
    ) -> Result<PriceTimeline> {
        let energi_data = energi_data::Api::try_new()?;
        let spot = energi_data.get_spot_prices(price_area, now).await?;

        let forecast = match &self.forecast_url {
            Some(url) => {
                match forecast::Api::try_new(url.clone())?.get_forecast(price_area).await {
                    Ok(points) => Some(points),
                    Err(error) => {
                        warn!("failed to fetch the forecast, extrapolating: {error:#}");
                        None
                    }
                }
            }
            None => None,
        };

        let tariffs = match tariff {
            Some(tariff) => Some(
                energi_data
                    .get_tariffs(&tariff.grid_operator, &tariff.note, time_zone)
                    .await?
                    .rescaled(self.tariff_scale),
            ),
            None => None,
        };

        PriceTimeline::builder()
            .spot(spot)
            .maybe_forecast(forecast)
            .maybe_tariffs(tariffs.as_ref())
            .conversion(self.conversion())
            .build()
    }
}
