use std::time::Duration;

use crate::{
    core::{
        gateway::VehicleGateway,
        machine::{Command, Inputs, State},
        vehicle::VehicleSnapshot,
    },
    prelude::*,
    storage::SnapshotStore,
};

/// Result of one vehicle cycle.
#[must_use]
pub struct Outcome {
    /// States in the order they were entered, starting with `Init`.
    pub states: Vec<State>,

    /// The latest snapshot fetched in this cycle.
    pub fresh: Option<VehicleSnapshot>,
}

/// Drives the machine to the end, executing the entry commands against the vehicle.
#[must_use]
#[derive(bon::Builder)]
pub struct Runner<'a, G, S> {
    gateway: &'a G,
    store: &'a S,

    /// Pause before the final fetch.
    #[builder(default = Duration::from_secs(5))]
    settle_delay: Duration,
}

impl<G: VehicleGateway, S: SnapshotStore> Runner<'_, G, S> {
    #[instrument(skip_all, fields(vin = vin))]
    pub async fn run(&self, vin: &str, mut inputs: Inputs<'_>) -> Result<Outcome> {
        inputs.is_reachable = self.gateway.is_reachable(vin).await?;
        info!(inputs.is_reachable, is_seeded = inputs.fresh.is_some(), "running…");

        let mut state = State::Init;
        let mut states = vec![state];
        while state != State::End {
            let (next, commands) = state.transition(&inputs)?;
            debug!(from = ?state, to = ?next, n_commands = commands.len(), "transition");
            for command in commands {
                self.execute(vin, command, &mut inputs)
                    .await
                    .with_context(|| format!("failed to execute `{command:?}` in `{next:?}`"))?;
            }
            states.push(next);
            state = next;
        }

        Ok(Outcome { states, fresh: inputs.fresh })
    }

    async fn execute(&self, vin: &str, command: Command, inputs: &mut Inputs<'_>) -> Result {
        debug!(?command, "executing…");
        match command {
            Command::Wake => self.gateway.wake(vin).await,
            Command::FetchSnapshot => {
                let fetched = self.gateway.fetch_snapshot(vin).await?;
                if let Err(error) = self.store.save(vin, &fetched.raw) {
                    warn!("failed to persist the snapshot: {error:#}");
                }
                inputs.fresh = Some(fetched.snapshot);
                Ok(())
            }
            Command::StartCharge => self.gateway.start_charge(vin).await,
            Command::SetChargeLimit(percent) => self.gateway.set_charge_limit(vin, percent).await,
            Command::ScheduleDeparture { end_off_peak, departure, preheat } => {
                self.gateway.schedule_departure(vin, end_off_peak, departure, preheat).await
            }
            Command::ScheduleCharging { start, reference_deadline } => {
                self.gateway.schedule_charging(vin, start, reference_deadline).await
            }
            Command::ScheduleDisable { reference_start, reference_deadline } => {
                self.gateway.schedule_disable(vin, reference_start, reference_deadline).await
            }
            Command::Settle => {
                tokio::time::sleep(self.settle_delay).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{
        core::{
            gateway::fake::FakeGateway,
            limits::ChargeLimits,
            price::{PricePoint, PriceTimeline},
            vehicle::{ChargingState, Location, ScheduledMode},
        },
        quantity::percent::Percent,
        storage::MemoryStore,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, 7, 12, 0, 0).unwrap()
    }

    fn timeline() -> PriceTimeline {
        PriceTimeline::from_points(
            (0..48)
                .map(|hours| {
                    let price = if (10..13).contains(&hours) { 1.0 } else { 10.0 };
                    PricePoint::new(now() + TimeDelta::hours(hours), price)
                })
                .collect(),
        )
    }

    fn snapshot() -> VehicleSnapshot {
        VehicleSnapshot::builder()
            .vin("5YJ3E7EB2NF000001")
            .battery_level(Percent(60))
            .charge_limit_soc(Percent(80))
            .charging_state(ChargingState::Disconnected)
            .scheduled_mode(ScheduledMode::Off)
            .location(Location { latitude: 55.6761, longitude: 12.5683 })
            .build()
    }

    fn inputs(timeline: &PriceTimeline, cached: Option<VehicleSnapshot>) -> Inputs<'_> {
        Inputs::builder()
            .limits(ChargeLimits::default())
            .timeline(timeline)
            .now(now())
            .deadline(now() + TimeDelta::hours(40))
            .maybe_cached(cached)
            .build()
    }

    #[tokio::test]
    async fn test_disconnected_vehicle_gets_minimal_limit() -> Result {
        let gateway = FakeGateway::new(true, snapshot());
        let store = MemoryStore::default();
        let runner =
            Runner::builder().gateway(&gateway).store(&store).settle_delay(Duration::ZERO).build();
        let timeline = timeline();

        let outcome = runner.run("5YJ3E7EB2NF000001", inputs(&timeline, None)).await?;

        assert_eq!(outcome.states.last(), Some(&State::End));
        assert!(outcome.states.contains(&State::SetLimitMin));
        assert_eq!(gateway.calls(), ["fetch", "set_charge_limit 50%", "fetch"]);
        assert_eq!(store.saved.lock().unwrap().len(), 2);
        assert!(outcome.fresh.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_seeded_snapshot_is_not_fetched_again() -> Result {
        let gateway = FakeGateway::new(true, snapshot());
        let store = MemoryStore::default();
        let runner =
            Runner::builder().gateway(&gateway).store(&store).settle_delay(Duration::ZERO).build();
        let timeline = timeline();
        let mut inputs = inputs(&timeline, None);
        inputs.fresh = Some(snapshot());

        let outcome = runner.run("5YJ3E7EB2NF000001", inputs).await?;

        assert_eq!(gateway.calls(), ["set_charge_limit 50%", "fetch"]);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
        assert!(outcome.fresh.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_sleeping_vehicle_stays_asleep() -> Result {
        let cached = VehicleSnapshot {
            charging_state: ChargingState::Stopped,
            scheduled_mode: ScheduledMode::StartAt,
            charge_limit_soc: Percent(70),
            ..snapshot()
        };
        let gateway = FakeGateway::new(false, cached.clone());
        let store = MemoryStore::default();
        let runner =
            Runner::builder().gateway(&gateway).store(&store).settle_delay(Duration::ZERO).build();
        let timeline = timeline();

        let outcome = runner.run("5YJ3E7EB2NF000001", inputs(&timeline, Some(cached))).await?;

        assert_eq!(outcome.states, [State::Init, State::Sleeping, State::End]);
        assert!(gateway.calls().is_empty());
        assert!(store.saved.lock().unwrap().is_empty());
        assert!(outcome.fresh.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_moving_vehicle_is_woken_and_scheduled() -> Result {
        let fresh = VehicleSnapshot {
            charging_state: ChargingState::Stopped,
            charge_limit_soc: Percent(70),
            ..snapshot()
        };
        let cached = VehicleSnapshot { is_moving: true, ..fresh.clone() };
        let gateway = FakeGateway::new(false, fresh);
        let store = MemoryStore::default();
        let runner =
            Runner::builder().gateway(&gateway).store(&store).settle_delay(Duration::ZERO).build();
        let timeline = timeline();

        let outcome = runner.run("5YJ3E7EB2NF000001", inputs(&timeline, Some(cached))).await?;

        assert_eq!(
            outcome.states,
            [
                State::Init,
                State::Sleeping,
                State::WakeUp,
                State::UpdateData,
                State::Plugged,
                State::ScheduledStart,
                State::End,
            ],
        );
        assert_eq!(
            gateway.calls(),
            ["wake", "fetch", "set_charge_limit 70%", "schedule_charging 22:00", "fetch"],
        );
        assert!(store.load("5YJ3E7EB2NF000001").is_some());
        Ok(())
    }
}
