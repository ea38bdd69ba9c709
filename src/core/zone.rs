use serde::Deserialize;

use crate::{core::vehicle::Location, prelude::*};

/// Geographic area with its electricity market and grid operator.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Zone {
    pub name: String,

    #[serde(flatten)]
    pub center: Location,

    pub radius_km: f64,

    /// Spot market price area, for example `DK2`.
    pub price_area: String,

    /// Grid operator tariffs, none when not configured.
    #[serde(default)]
    pub tariff: Option<TariffRef>,
}

/// Reference to the grid operator tariff records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct TariffRef {
    /// `ChargeOwner` of the tariff records.
    pub grid_operator: String,

    /// `Note` of the tariff records, for example `Nettarif C time`.
    pub note: String,
}

/// Find the only zone that contains the location.
pub fn locate(zones: &[Zone], location: Location) -> Result<&Zone> {
    let mut matching =
        zones.iter().filter(|zone| zone.center.distance_km(location) <= zone.radius_km);
    let zone = matching
        .next()
        .with_context(|| format!("`{location}` is not within any configured zone"))?;
    if let Some(other) = matching.next() {
        bail!("`{location}` is within both `{}` and `{}`", zone.name, other.name);
    }
    Ok(zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> Vec<Zone> {
        vec![
            Zone {
                name: "home".to_string(),
                center: Location { latitude: 55.6761, longitude: 12.5683 },
                radius_km: 50.0,
                price_area: "DK2".to_string(),
                tariff: None,
            },
            Zone {
                name: "summer house".to_string(),
                center: Location { latitude: 56.1629, longitude: 10.2039 },
                radius_km: 50.0,
                price_area: "DK1".to_string(),
                tariff: None,
            },
        ]
    }

    #[test]
    fn test_locate() -> Result {
        let zones = zones();
        let zone = locate(&zones, Location { latitude: 55.70, longitude: 12.50 })?;
        assert_eq!(zone.price_area, "DK2");
        Ok(())
    }

    #[test]
    fn test_outside_of_any_zone() {
        assert!(locate(&zones(), Location { latitude: 48.8566, longitude: 2.3522 }).is_err());
    }

    #[test]
    fn test_ambiguous_location() {
        let mut zones = zones();
        zones[1].radius_km = 500.0;
        assert!(locate(&zones, Location { latitude: 55.70, longitude: 12.50 }).is_err());
    }
}
