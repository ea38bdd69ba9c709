use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{core::vehicle::VehicleSnapshot, prelude::*, quantity::percent::Percent};

/// Freshly fetched vehicle data, parsed and raw.
#[must_use]
pub struct Fetched {
    pub snapshot: VehicleSnapshot,

    /// As returned by the vehicle, this is what gets persisted.
    pub raw: serde_json::Value,
}

/// Vehicle commands and queries.
///
/// Schedule times are absolute here, converting them into the vehicle's local time of day
/// is up to the implementation.
#[async_trait]
pub trait VehicleGateway: Sync {
    async fn is_reachable(&self, vin: &str) -> Result<bool>;

    /// Wake the vehicle up and wait until it responds.
    async fn wake(&self, vin: &str) -> Result;

    async fn fetch_snapshot(&self, vin: &str) -> Result<Fetched>;

    /// Start charging, ignoring the failure when it is charging already or not plugged in.
    async fn start_charge(&self, vin: &str) -> Result;

    async fn set_charge_limit(&self, vin: &str, percent: Percent) -> Result;

    async fn schedule_departure(
        &self,
        vin: &str,
        end_off_peak: DateTime<Utc>,
        departure: DateTime<Utc>,
        preheat: bool,
    ) -> Result;

    /// Schedule the start of charging, disabling any departure schedule.
    async fn schedule_charging(
        &self,
        vin: &str,
        start: DateTime<Utc>,
        reference_deadline: DateTime<Utc>,
    ) -> Result;

    async fn schedule_disable(
        &self,
        vin: &str,
        reference_start: DateTime<Utc>,
        reference_deadline: DateTime<Utc>,
    ) -> Result;
}
