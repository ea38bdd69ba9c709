use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    core::gateway::{Fetched, VehicleGateway},
    prelude::*,
    quantity::percent::Percent,
};

/// Dry run: queries pass through, commands are only logged.
pub struct Scout<G>(pub G);

#[async_trait]
impl<G: VehicleGateway> VehicleGateway for Scout<G> {
    async fn is_reachable(&self, vin: &str) -> Result<bool> {
        self.0.is_reachable(vin).await
    }

    async fn wake(&self, vin: &str) -> Result {
        self.0.wake(vin).await
    }

    async fn fetch_snapshot(&self, vin: &str) -> Result<Fetched> {
        self.0.fetch_snapshot(vin).await
    }

    async fn start_charge(&self, vin: &str) -> Result {
        warn!(vin, "scouting, not starting the charge");
        Ok(())
    }

    async fn set_charge_limit(&self, vin: &str, percent: Percent) -> Result {
        warn!(vin, %percent, "scouting, not setting the charge limit");
        Ok(())
    }

    async fn schedule_departure(
        &self,
        vin: &str,
        end_off_peak: DateTime<Utc>,
        departure: DateTime<Utc>,
        preheat: bool,
    ) -> Result {
        warn!(vin, %end_off_peak, %departure, preheat, "scouting, not scheduling the departure");
        Ok(())
    }

    async fn schedule_charging(
        &self,
        vin: &str,
        start: DateTime<Utc>,
        _reference_deadline: DateTime<Utc>,
    ) -> Result {
        warn!(vin, %start, "scouting, not scheduling the charging");
        Ok(())
    }

    async fn schedule_disable(
        &self,
        vin: &str,
        _reference_start: DateTime<Utc>,
        _reference_deadline: DateTime<Utc>,
    ) -> Result {
        warn!(vin, "scouting, not disabling the schedule");
        Ok(())
    }
}
