use std::path::Path;

use reqwest::Url;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{core::zone::Zone, prelude::*};

/// Vehicles to manage and the zones they may be charged in.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fleet {
    #[serde(default, rename = "vehicle")]
    pub vehicles: Vec<VehicleConfig>,

    #[serde(default, rename = "zone")]
    pub zones: Vec<Zone>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleConfig {
    pub vin: String,

    /// iCalendar feeds with the trips.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(default)]
    pub calendars: Vec<Url>,
}

impl Fleet {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let fleet: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        ensure!(!fleet.vehicles.is_empty(), "no vehicles configured");
        ensure!(!fleet.zones.is_empty(), "no zones configured");
        info!(n_vehicles = fleet.vehicles.len(), n_zones = fleet.zones.len(), "loaded the fleet");
        Ok(fleet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() -> Result {
        let fleet: Fleet = toml::from_str(
            r#"
                [[vehicle]]
                vin = "5YJ3E7EB2NF000001"
                calendars = ["https://calendar.example.com/family.ics"]

                [[vehicle]]
                vin = "5YJ3E7EB2NF000002"

                [[zone]]
                name = "home"
                latitude = 55.6761
                longitude = 12.5683
                radius_km = 30.0
                price_area = "DK2"
                tariff = { grid_operator = "Radius Elnet A/S", note = "Nettarif C time" }
            "#,
        )?;
        assert_eq!(fleet.vehicles.len(), 2);
        assert_eq!(
            fleet.vehicles[0].calendars.iter().map(Url::as_str).collect::<Vec<_>>(),
            ["https://calendar.example.com/family.ics"],
        );
        assert!(fleet.vehicles[1].calendars.is_empty());
        assert_eq!(fleet.zones[0].price_area, "DK2");
        assert_eq!(
            fleet.zones[0].tariff.as_ref().map(|tariff| tariff.grid_operator.as_str()),
            Some("Radius Elnet A/S"),
        );
        Ok(())
    }

    #[test]
    fn test_invalid_calendar_url() {
        let result = toml::from_str::<Fleet>(
            r#"
                [[vehicle]]
                vin = "5YJ3E7EB2NF000001"
                calendars = ["not a url"]
            "#,
        );
        assert!(result.is_err());
    }
}
