use reqwest::{Client, Url};

use crate::{core::price::PricePoint, prelude::*};

/// Price forecast endpoint returning `[{"start_time": …, "price": …}]` in the spot price unit.
pub struct Api {
    client: Client,
    url: Url,
}

impl Api {
    pub fn try_new(url: Url) -> Result<Self> {
        Ok(Self { client: super::client::try_new()?, url })
    }

    #[instrument(skip_all, fields(price_area = price_area))]
    pub async fn get_forecast(&self, price_area: &str) -> Result<Vec<PricePoint>> {
        info!("fetching…");
        let points = self
            .client
            .get(self.url.clone())
            .query(&[("price_area", price_area)])
            .send()
            .await
            .context("failed to request the forecast")?
            .error_for_status()
            .context("forecast request failed")?
            .json::<Vec<PricePoint>>()
            .await
            .context("failed to deserialize the forecast")?;
        info!(n_points = points.len(), "fetched");
        Ok(points)
    }
}
