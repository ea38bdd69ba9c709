use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quantity::percent::Percent;

#[must_use]
#[derive(Clone, Debug, PartialEq, bon::Builder)]
pub struct VehicleSnapshot {
    #[builder(into)]
    pub vin: String,

    pub battery_level: Percent,
    pub charge_limit_soc: Percent,
    pub charging_state: ChargingState,
    pub scheduled_mode: ScheduledMode,

    #[builder(default)]
    pub is_moving: bool,

    pub location: Location,

    /// When the vehicle reported the data.
    pub taken_at: Option<DateTime<Utc>>,
}

impl VehicleSnapshot {
    #[must_use]
    pub fn is_charging(&self) -> bool {
        self.charging_state == ChargingState::Charging
    }
}

#[derive(Debug, Hash, Deserialize, Serialize, enumset::EnumSetType)]
pub enum ChargingState {
    Disconnected,
    Charging,
    Complete,
    Stopped,

    /// Anything else the vehicle reports: `Starting`, `NoPower` and alike.
    #[serde(other)]
    Unknown,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum ScheduledMode {
    Off,
    StartAt,
    DepartBy,
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Great-circle distance in kilometers.
    #[must_use]
    pub fn distance_km(self, other: Self) -> f64 {
        let delta_latitude = (other.latitude - self.latitude).to_radians();
        let delta_longitude = (other.longitude - self.longitude).to_radians();
        let haversine = (delta_latitude / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (delta_longitude / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * haversine.sqrt().atan2((1.0 - haversine).sqrt())
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_distance_km() {
        let copenhagen = Location { latitude: 55.6761, longitude: 12.5683 };
        let aarhus = Location { latitude: 56.1629, longitude: 10.2039 };
        assert_abs_diff_eq!(copenhagen.distance_km(aarhus), 156.9, epsilon = 1.0);
        assert_abs_diff_eq!(copenhagen.distance_km(copenhagen), 0.0);
    }

    #[test]
    fn test_unknown_charging_state() -> crate::prelude::Result {
        assert_eq!(serde_json::from_str::<ChargingState>(r#""NoPower""#)?, ChargingState::Unknown);
        assert_eq!(
            serde_json::from_str::<ChargingState>(r#""Disconnected""#)?,
            ChargingState::Disconnected,
        );
        Ok(())
    }

    #[test]
    fn test_unexpected_scheduled_mode_is_error() {
        assert!(serde_json::from_str::<ScheduledMode>(r#""Sometimes""#).is_err());
    }
}
