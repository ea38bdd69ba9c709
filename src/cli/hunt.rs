use std::{
    collections::{HashMap, hash_map::Entry},
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use clap::Parser;

use crate::{
    api::{
        calendar,
        retry::{RetryPolicy, Retrying},
        scout::Scout,
        tesla::parse_snapshot,
    },
    cli::{
        fleet::{Fleet, VehicleConfig},
        heartbeat::HeartbeatArgs,
        prices::PriceArgs,
        tesla::TeslaArgs,
    },
    core::{
        deadline::{DEFAULT_MARKER, DeadlineFinder},
        gateway::VehicleGateway,
        limits::ChargeLimits,
        machine::{Inputs, Runner},
        price::PriceTimeline,
        vehicle::VehicleSnapshot,
        zone::{Zone, locate},
    },
    prelude::*,
    storage::{FileStore, SnapshotStore},
};

#[derive(Parser)]
pub struct HuntArgs {
    /// Only log the vehicle commands instead of sending them (dry run).
    #[clap(long)]
    pub scout: bool,

    /// TOML file with the vehicles and zones.
    #[clap(long, env = "FLEET", default_value = "fleet.toml")]
    pub fleet: PathBuf,

    /// Directory with the last fetched vehicle data.
    #[clap(long, env = "SNAPSHOT_DIR", default_value = "/var/tmp/cheapest-charge/snapshots")]
    pub snapshot_dir: PathBuf,

    /// Pause before re-reading the vehicle state after the commands.
    #[clap(long, env = "SETTLE_DELAY", default_value = "5s")]
    pub settle_delay: humantime::Duration,

    /// Number of attempts for every vehicle call.
    #[clap(long, env = "RETRY_ATTEMPTS", default_value = "10")]
    pub retry_attempts: usize,

    #[clap(long, env = "RETRY_BACKOFF", default_value = "1min")]
    pub retry_backoff: humantime::Duration,

    /// Calendar events containing this token are trips that need a charged vehicle.
    #[clap(long, env = "CALENDAR_MARKER", default_value = DEFAULT_MARKER)]
    pub marker: String,

    #[clap(flatten)]
    pub limits: ChargeLimits,

    #[clap(flatten)]
    pub tesla: TeslaArgs,

    #[clap(flatten)]
    pub prices: PriceArgs,

    #[clap(flatten)]
    pub heartbeat: HeartbeatArgs,
}

impl HuntArgs {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { n_attempts: self.retry_attempts, backoff: *self.retry_backoff }
    }

    pub async fn run(self) -> Result {
        let fleet = Fleet::read_from(&self.fleet)?;
        let tesla = self.tesla.connect().await?;
        let store = FileStore::new(self.snapshot_dir.clone());
        let calendar = calendar::Api::try_new()?;
        let now = Utc::now();
        let mut timelines = HashMap::new();

        if self.scout {
            let gateway = Retrying::new(Scout(tesla), self.retry_policy());
            self.hunt(now, &fleet.zones, &gateway, &store, &calendar)
                .run(&fleet.vehicles, &mut timelines)
                .await?;
        } else {
            let gateway = Retrying::new(tesla, self.retry_policy());
            self.hunt(now, &fleet.zones, &gateway, &store, &calendar)
                .run(&fleet.vehicles, &mut timelines)
                .await?;
        }

        self.heartbeat.send().await;
        Ok(())
    }

    const fn hunt<'a, G, S>(
        &'a self,
        now: DateTime<Utc>,
        zones: &'a [Zone],
        gateway: &'a G,
        store: &'a S,
        calendar: &'a calendar::Api,
    ) -> Hunt<'a, G, S> {
        Hunt { args: self, now, zones, gateway, store, calendar }
    }
}

/// Everything shared by the vehicle cycles of one invocation.
struct Hunt<'a, G, S> {
    args: &'a HuntArgs,
    now: DateTime<Utc>,
    zones: &'a [Zone],
    gateway: &'a G,
    store: &'a S,
    calendar: &'a calendar::Api,
}

impl<G: VehicleGateway, S: SnapshotStore> Hunt<'_, G, S> {
    /// Run the cycle for every vehicle, a failed vehicle does not stop the others.
    ///
    /// The timelines are cached per zone name.
    #[instrument(skip_all, fields(scout = self.args.scout))]
    async fn run(
        &self,
        vehicles: &[VehicleConfig],
        timelines: &mut HashMap<String, PriceTimeline>,
    ) -> Result {
        let mut n_failed = 0_usize;
        for vehicle in vehicles {
            if let Err(error) = self.run_vehicle(vehicle, timelines).await {
                error!(vin = %vehicle.vin, "vehicle cycle failed: {error:#}");
                n_failed += 1;
            }
        }
        ensure!(n_failed == 0, "{n_failed} of {} vehicles failed", vehicles.len());
        Ok(())
    }

    #[instrument(skip_all, fields(vin = %vehicle.vin))]
    async fn run_vehicle(
        &self,
        vehicle: &VehicleConfig,
        timelines: &mut HashMap<String, PriceTimeline>,
    ) -> Result {
        let vin = vehicle.vin.as_str();
        let (known, fresh) = match self.load_cached(vin) {
            Some(cached) => (cached, None),
            None => {
                let fetched = self.wake_and_fetch(vin).await?;
                (fetched.clone(), Some(fetched))
            }
        };

        let zone = locate(self.zones, known.location)?;
        info!(zone = %zone.name, price_area = %zone.price_area, "located");
        let timeline = match timelines.entry(zone.name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                self.args
                    .prices
                    .build_timeline(
                        &zone.price_area,
                        zone.tariff.as_ref(),
                        self.args.tesla.time_zone,
                        self.now,
                    )
                    .await?,
            ),
        };
        let price = timeline
            .at(self.now)
            .with_context(|| format!("no current price in `{}`", zone.price_area))?
            .price;

        let deadline = self.find_deadline(vehicle).await?;
        info!(%deadline, price, "deciding…");

        // The snapshot fetched above is persisted already, and it is not fetched again.
        let inputs = Inputs::builder()
            .limits(self.args.limits)
            .timeline(timeline)
            .now(self.now)
            .deadline(deadline)
            .cached(known.clone())
            .maybe_fresh(fresh)
            .build();
        let window_level = inputs.planner().earliest_start().window_level;
        let outcome = Runner::builder()
            .gateway(self.gateway)
            .store(self.store)
            .settle_delay(self.args.settle_delay.into())
            .build()
            .run(vin, inputs)
            .await?;

        let latest = outcome.fresh.as_ref().unwrap_or(&known);
        info!(
            price,
            battery_level = latest.battery_level.0,
            window_level,
            charging = latest.is_charging(),
            final_state = ?outcome.states.last(),
            "telemetry",
        );
        Ok(())
    }

    /// Cached snapshot, `None` when missing or malformed.
    fn load_cached(&self, vin: &str) -> Option<VehicleSnapshot> {
        let raw = self.store.load(vin)?;
        parse_snapshot(raw)
            .inspect_err(|error| warn!("malformed cached snapshot, ignoring: {error:#}"))
            .ok()
    }

    /// Wake the vehicle, fetch and persist its data, so that its location is known.
    async fn wake_and_fetch(&self, vin: &str) -> Result<VehicleSnapshot> {
        info!("no cached snapshot, waking up…");
        self.gateway.wake(vin).await?;
        let fetched = self.gateway.fetch_snapshot(vin).await?;
        if let Err(error) = self.store.save(vin, &fetched.raw) {
            warn!("failed to persist the snapshot: {error:#}");
        }
        Ok(fetched.snapshot)
    }

    async fn find_deadline(&self, vehicle: &VehicleConfig) -> Result<DateTime<Utc>> {
        let mut events = Vec::new();
        for url in &vehicle.calendars {
            events.extend(self.calendar.get_events(url.clone()).await?);
        }
        Ok(DeadlineFinder::builder()
            .now(self.now)
            .marker(&self.args.marker)
            .build()
            .find(&events))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{
        core::{
            gateway::fake::FakeGateway,
            price::PricePoint,
            vehicle::{ChargingState, Location, ScheduledMode},
        },
        quantity::percent::Percent,
        storage::MemoryStore,
    };

    const FIRST_VIN: &str = "5YJ3E7EB2NF000001";
    const SECOND_VIN: &str = "5YJ3E7EB2NF000002";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, 7, 12, 0, 0).unwrap()
    }

    fn args() -> Result<HuntArgs> {
        Ok(HuntArgs::try_parse_from([
            "hunt",
            "--tesla-client-id",
            "test",
            "--settle-delay",
            "0s",
        ])?)
    }

    fn zones() -> Vec<Zone> {
        vec![Zone {
            name: "home".to_string(),
            center: Location { latitude: 55.6761, longitude: 12.5683 },
            radius_km: 30.0,
            price_area: "DK2".to_string(),
            tariff: None,
        }]
    }

    /// Already built, so that nothing is fetched from the network.
    fn timelines() -> HashMap<String, PriceTimeline> {
        let points =
            (0..48).map(|hours| PricePoint::new(now() + TimeDelta::hours(hours), 1.0)).collect();
        HashMap::from([("home".to_string(), PriceTimeline::from_points(points))])
    }

    /// Parked and unplugged at home, with the limit above the minimal one.
    fn snapshot() -> VehicleSnapshot {
        VehicleSnapshot::builder()
            .vin(FIRST_VIN)
            .battery_level(Percent(60))
            .charge_limit_soc(Percent(80))
            .charging_state(ChargingState::Disconnected)
            .scheduled_mode(ScheduledMode::Off)
            .location(Location { latitude: 55.6761, longitude: 12.5683 })
            .build()
    }

    fn vehicle(vin: &str) -> VehicleConfig {
        VehicleConfig { vin: vin.to_string(), calendars: Vec::new() }
    }

    #[tokio::test]
    async fn test_uncached_vehicle_is_fetched_twice_at_most() -> Result {
        let args = args()?;
        let zones = zones();
        let gateway = FakeGateway::new(true, snapshot());
        let store = MemoryStore::default();
        let calendar = calendar::Api::try_new()?;

        args.hunt(now(), &zones, &gateway, &store, &calendar)
            .run(&[vehicle(FIRST_VIN)], &mut timelines())
            .await?;

        assert_eq!(gateway.calls(), ["wake", "fetch", "set_charge_limit 50%", "fetch"]);
        assert_eq!(store.saved.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_vehicle_does_not_stop_the_others() -> Result {
        let args = args()?;
        let zones = zones();
        let mut gateway = FakeGateway::new(true, snapshot());
        gateway.broken_vin = Some(FIRST_VIN);
        let store = MemoryStore::default();
        let calendar = calendar::Api::try_new()?;

        let result = args
            .hunt(now(), &zones, &gateway, &store, &calendar)
            .run(&[vehicle(FIRST_VIN), vehicle(SECOND_VIN)], &mut timelines())
            .await;

        assert!(result.is_err());
        assert_eq!(gateway.calls(), ["wake", "fetch", "set_charge_limit 50%", "fetch"]);
        let saved = store.saved.lock().unwrap();
        assert!(saved.iter().all(|(vin, _)| vin == SECOND_VIN));
        assert_eq!(saved.len(), 2);
        Ok(())
    }
}
