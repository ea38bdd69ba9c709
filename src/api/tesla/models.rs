use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_with::serde_as;

use super::response::Response;
use crate::{
    core::vehicle::{ChargingState, Location, ScheduledMode, VehicleSnapshot},
    prelude::*,
    quantity::percent::Percent,
};

#[derive(Deserialize)]
pub struct VehicleSummary {
    pub state: String,
}

impl VehicleSummary {
    pub fn is_online(&self) -> bool {
        self.state == "online"
    }
}

#[derive(Deserialize)]
pub struct VehicleData {
    vin: String,
    charge_state: ChargeState,
    drive_state: DriveState,
}

#[serde_as]
#[derive(Deserialize)]
struct ChargeState {
    battery_level: Percent,
    charge_limit_soc: Percent,
    charging_state: ChargingState,
    scheduled_charging_mode: ScheduledMode,

    #[serde_as(as = "Option<serde_with::TimestampMilliSeconds<i64>>")]
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct DriveState {
    latitude: f64,
    longitude: f64,

    /// `null` or `P` when parked.
    #[serde(default)]
    shift_state: Option<String>,

    #[serde(default)]
    speed: Option<f64>,
}

impl DriveState {
    fn is_moving(&self) -> bool {
        self.speed.is_some_and(|speed| speed > 0.0)
            || self.shift_state.as_deref().is_some_and(|shift_state| shift_state != "P")
    }
}

impl From<VehicleData> for VehicleSnapshot {
    fn from(data: VehicleData) -> Self {
        Self::builder()
            .vin(data.vin)
            .battery_level(data.charge_state.battery_level)
            .charge_limit_soc(data.charge_state.charge_limit_soc)
            .charging_state(data.charge_state.charging_state)
            .scheduled_mode(data.charge_state.scheduled_charging_mode)
            .is_moving(data.drive_state.is_moving())
            .location(Location {
                latitude: data.drive_state.latitude,
                longitude: data.drive_state.longitude,
            })
            .maybe_taken_at(data.charge_state.timestamp)
            .build()
    }
}

/// Parse the raw `vehicle_data` response.
pub fn parse_snapshot(raw: serde_json::Value) -> Result<VehicleSnapshot> {
    let response: Response<VehicleData> =
        serde_json::from_value(raw).context("unexpected vehicle data")?;
    Ok(Result::<VehicleData>::from(response)?.into())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn raw() -> serde_json::Value {
        json!({
            "response": {
                "vin": "5YJ3E7EB2NF000001",
                "state": "online",
                "charge_state": {
                    "battery_level": 57,
                    "charge_limit_soc": 80,
                    "charging_state": "Stopped",
                    "scheduled_charging_mode": "DepartBy",
                    "scheduled_charging_start_time": null,
                    "timestamp": 1_644_235_200_000_i64
                },
                "drive_state": {
                    "latitude": 55.6761,
                    "longitude": 12.5683,
                    "shift_state": null,
                    "speed": null,
                    "timestamp": 1_644_235_200_000_i64
                }
            }
        })
    }

    #[test]
    fn test_parse_snapshot() -> Result {
        let snapshot = parse_snapshot(raw())?;
        assert_eq!(snapshot.vin, "5YJ3E7EB2NF000001");
        assert_eq!(snapshot.battery_level, Percent(57));
        assert_eq!(snapshot.charge_limit_soc, Percent(80));
        assert_eq!(snapshot.charging_state, ChargingState::Stopped);
        assert_eq!(snapshot.scheduled_mode, ScheduledMode::DepartBy);
        assert!(!snapshot.is_moving);
        assert_eq!(snapshot.taken_at, Some(Utc.with_ymd_and_hms(2022, 2, 7, 12, 0, 0).unwrap()));
        Ok(())
    }

    #[test]
    fn test_driving() -> Result {
        let mut raw = raw();
        raw["response"]["drive_state"]["shift_state"] = json!("D");
        assert!(parse_snapshot(raw)?.is_moving);
        Ok(())
    }

    #[test]
    fn test_unexpected_shape() {
        let mut raw = raw();
        raw["response"]["charge_state"]["scheduled_charging_mode"] = json!(42);
        assert!(parse_snapshot(raw).is_err());
    }
}
