use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use itertools::Itertools;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    core::{
        price::PricePoint,
        tariff::{TariffRecord, TariffSchedule},
    },
    prelude::*,
};

/// Energi Data Service, the open data of the Danish transmission system operator.
pub struct Api {
    client: Client,
}

impl Api {
    const BASE_URL: &'static str = "https://api.energidataservice.dk/dataset";

    /// Enough to cover the published day-ahead prices.
    const N_SPOT_RECORDS: usize = 100;

    pub fn try_new() -> Result<Self> {
        Ok(Self { client: super::client::try_new()? })
    }

    /// Get the spot prices in EUR/MWh whose hour has not fully elapsed yet.
    #[instrument(skip_all, fields(price_area = price_area))]
    pub async fn get_spot_prices(
        &self,
        price_area: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        info!("fetching…");
        let filter = serde_json::json!({ "PriceArea": [price_area] }).to_string();
        let limit = Self::N_SPOT_RECORDS.to_string();
        let records: Vec<SpotPriceRecord> = self
            .get(
                "Elspotprices",
                &[("filter", filter.as_str()), ("sort", "HourUTC desc"), ("limit", limit.as_str())],
            )
            .await?;
        let points = spot_points(records, now);
        info!(n_points = points.len(), "fetched");
        Ok(points)
    }

    /// Get the tariffs of the grid operator, the hours are counted in the specified zone.
    #[instrument(skip_all, fields(grid_operator = grid_operator, note = note))]
    pub async fn get_tariffs(
        &self,
        grid_operator: &str,
        note: &str,
        time_zone: Tz,
    ) -> Result<TariffSchedule> {
        info!("fetching…");
        let filter =
            serde_json::json!({ "ChargeOwner": [grid_operator], "Note": [note] }).to_string();
        let records: Vec<TariffRecordDto> =
            self.get("DatahubPricelist", &[("filter", filter.as_str())]).await?;
        let records = records.into_iter().map(TariffRecord::from).collect_vec();
        ensure!(!records.is_empty(), "no tariffs found for `{grid_operator}` and `{note}`");
        info!(n_records = records.len(), "fetched");
        Ok(TariffSchedule { time_zone, records })
    }

    async fn get<R: DeserializeOwned>(&self, dataset: &str, query: &[(&str, &str)]) -> Result<R> {
        self.client
            .get(format!("{}/{dataset}", Self::BASE_URL))
            .query(query)
            .send()
            .await
            .with_context(|| format!("failed to request `{dataset}`"))?
            .error_for_status()
            .with_context(|| format!("`{dataset}` request failed"))?
            .json::<Response<R>>()
            .await
            .with_context(|| format!("failed to deserialize `{dataset}` records"))
            .map(|response| response.records)
    }
}

#[derive(Deserialize)]
struct Response<R> {
    records: R,
}

#[derive(Deserialize)]
struct SpotPriceRecord {
    #[serde(rename = "HourUTC")]
    hour_utc: NaiveDateTime,

    /// Sometimes missing.
    #[serde(rename = "SpotPriceEUR")]
    price: Option<f64>,
}

fn spot_points(records: Vec<SpotPriceRecord>, now: DateTime<Utc>) -> Vec<PricePoint> {
    records
        .into_iter()
        .filter_map(|record| Some(PricePoint::new(record.hour_utc.and_utc(), record.price?)))
        .filter(|point| point.start_time + TimeDelta::hours(1) > now)
        .sorted_by_key(|point| point.start_time)
        .collect()
}

#[derive(Deserialize)]
struct TariffRecordDto {
    #[serde(rename = "ValidFrom")]
    valid_from: NaiveDateTime,

    #[serde(rename = "ValidTo")]
    valid_to: Option<NaiveDateTime>,

    /// `Price1` through `Price24`, the later ones are `null` for a flat tariff.
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl From<TariffRecordDto> for TariffRecord {
    fn from(dto: TariffRecordDto) -> Self {
        let price_at = |hour: usize| {
            dto.other.get(&format!("Price{hour}")).and_then(serde_json::Value::as_f64)
        };
        let flat = price_at(1).unwrap_or_default();
        let mut hourly = [flat; 24];
        for (hour, fee) in hourly.iter_mut().enumerate() {
            if let Some(price) = price_at(hour + 1) {
                *fee = price;
            }
        }
        Self { valid_from: dto.valid_from, valid_to: dto.valid_to, hourly }
    }
}
