mod runner;

use chrono::{DateTime, TimeDelta, Utc};
use enumset::{EnumSet, enum_set};

pub use self::runner::Runner;
use crate::{
    core::{
        limits::ChargeLimits,
        planner::{ChargePlanner, Strategy},
        price::PriceTimeline,
        vehicle::{ChargingState, ScheduledMode, VehicleSnapshot},
    },
    prelude::*,
    quantity::percent::Percent,
};

/// Plugged-in states in which the charging may be started right away.
const STARTABLE: EnumSet<ChargingState> =
    enum_set!(ChargingState::Complete | ChargingState::Stopped | ChargingState::Unknown);

/// Vehicle call issued on entering a state.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    Wake,

    /// Fetch and persist a fresh snapshot.
    FetchSnapshot,

    StartCharge,
    SetChargeLimit(Percent),
    ScheduleDeparture { end_off_peak: DateTime<Utc>, departure: DateTime<Utc>, preheat: bool },
    ScheduleCharging { start: DateTime<Utc>, reference_deadline: DateTime<Utc> },
    ScheduleDisable { reference_start: DateTime<Utc>, reference_deadline: DateTime<Utc> },

    /// Give the vehicle a moment to apply the commands.
    Settle,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum State {
    Init,
    Sleeping,
    WakeUp,
    UpdateData,
    StartChargeNow,
    Disconnected,
    Plugged,
    Charging,
    ChargingDepartBy,
    ChargingScheduledStart,
    DepartBy,
    ScheduledStart,
    NoSchedule,
    CheckLimitMin,
    SetLimitMin,
    End,
}

/// Everything the machine decides on.
#[derive(bon::Builder)]
pub struct Inputs<'a> {
    pub limits: ChargeLimits,
    pub timeline: &'a PriceTimeline,
    pub now: DateTime<Utc>,
    pub deadline: DateTime<Utc>,

    /// Filled in by the runner.
    #[builder(default)]
    pub is_reachable: bool,

    /// Last persisted snapshot, `None` when missing or unreadable.
    pub cached: Option<VehicleSnapshot>,

    /// Snapshot fetched during this cycle.
    ///
    /// The caller may seed it with a snapshot it has just fetched and persisted.
    pub fresh: Option<VehicleSnapshot>,
}

impl Inputs<'_> {
    pub fn planner(&self) -> ChargePlanner<'_> {
        ChargePlanner::with_limits(self.timeline, &self.limits, self.now, self.deadline)
    }

    fn fresh(&self) -> Result<&VehicleSnapshot> {
        self.fresh.as_ref().context("no fresh vehicle snapshot in this cycle")
    }

    /// Decide whether the sleeping vehicle is to be woken up.
    ///
    /// Only the cached snapshot is available here, including its charge limit.
    fn should_wake(&self) -> bool {
        let Some(cached) = &self.cached else {
            info!("no usable cached snapshot");
            return true;
        };
        let planner = self.planner();

        let earliest_start = planner.earliest_start().start_time;
        if earliest_start <= self.now + TimeDelta::hours(1) {
            info!(%earliest_start, "cheap window within an hour");
            return true;
        }
        if cached.is_moving {
            info!("vehicle is moving");
            return true;
        }
        if cached.battery_level < self.limits.charge_now_limit {
            info!(battery_level = %cached.battery_level, "battery is low");
            return true;
        }

        let plan = planner.plan(
            cached.battery_level,
            cached.charge_limit_soc,
            self.limits.charge_limit_scheduled,
        );
        let is_applied = match plan.strategy {
            Strategy::DepartBy => {
                cached.scheduled_mode == ScheduledMode::DepartBy
                    && cached.charge_limit_soc == self.limits.charge_limit_depart
            }
            Strategy::StartAt => {
                cached.scheduled_mode == ScheduledMode::StartAt
                    && cached.charge_limit_soc == self.limits.charge_limit_scheduled
            }
            Strategy::Disable => cached.scheduled_mode == ScheduledMode::Off,
        };
        if !is_applied {
            info!(
                ?plan.strategy,
                ?cached.scheduled_mode,
                %cached.charge_limit_soc,
                "schedule is outdated",
            );
        }
        !is_applied
    }
}

impl State {
    /// Pick the next state and return the commands to issue on entering it.
    pub fn transition(self, inputs: &Inputs) -> Result<(Self, Vec<Command>)> {
        let next = self.next(inputs)?;
        let commands = next.on_entry(inputs)?;
        Ok((next, commands))
    }

    fn next(self, inputs: &Inputs) -> Result<Self> {
        let limits = &inputs.limits;
        let next = match self {
            Self::Init => {
                if inputs.is_reachable {
                    Self::UpdateData
                } else {
                    Self::Sleeping
                }
            }

            Self::Sleeping => {
                if inputs.should_wake() {
                    Self::WakeUp
                } else {
                    Self::End
                }
            }

            Self::WakeUp => Self::UpdateData,

            Self::UpdateData => {
                let fresh = inputs.fresh()?;
                match fresh.charging_state {
                    ChargingState::Disconnected => Self::Disconnected,
                    ChargingState::Charging => Self::Charging,
                    state
                        if STARTABLE.contains(state)
                            && fresh.battery_level < limits.charge_now_limit =>
                    {
                        Self::StartChargeNow
                    }
                    _ => Self::Plugged,
                }
            }

            Self::StartChargeNow => Self::Charging,

            Self::Disconnected => Self::CheckLimitMin,

            Self::Plugged => {
                let fresh = inputs.fresh()?;
                let plan = inputs.planner().plan(
                    fresh.battery_level,
                    fresh.charge_limit_soc,
                    limits.charge_limit_scheduled,
                );
                match plan.strategy {
                    Strategy::DepartBy => Self::DepartBy,
                    Strategy::StartAt => Self::ScheduledStart,
                    Strategy::Disable => Self::NoSchedule,
                }
            }

            Self::Charging => {
                let fresh = inputs.fresh()?;
                let plan = inputs.planner().plan(
                    fresh.battery_level,
                    fresh.charge_limit_soc,
                    limits.charge_limit_scheduled,
                );
                // Only raise the limit, touching the schedule would interrupt the charging:
                match plan.strategy {
                    Strategy::DepartBy if fresh.charge_limit_soc < limits.charge_limit_depart => {
                        Self::ChargingDepartBy
                    }
                    Strategy::StartAt if fresh.charge_limit_soc < limits.charge_limit_scheduled => {
                        Self::ChargingScheduledStart
                    }
                    _ => Self::End,
                }
            }

            Self::CheckLimitMin => {
                if inputs.fresh()?.charge_limit_soc > limits.charge_limit_min {
                    Self::SetLimitMin
                } else {
                    Self::End
                }
            }

            Self::ChargingDepartBy
            | Self::ChargingScheduledStart
            | Self::DepartBy
            | Self::ScheduledStart
            | Self::NoSchedule
            | Self::SetLimitMin
            | Self::End => Self::End,
        };
        Ok(next)
    }

    fn on_entry(self, inputs: &Inputs) -> Result<Vec<Command>> {
        let limits = &inputs.limits;
        let commands = match self {
            Self::Init
            | Self::Sleeping
            | Self::Disconnected
            | Self::Plugged
            | Self::Charging
            | Self::CheckLimitMin => Vec::new(),

            Self::WakeUp => vec![Command::Wake],

            Self::UpdateData => {
                if inputs.fresh.is_some() {
                    // Already fetched and persisted in this cycle.
                    Vec::new()
                } else {
                    vec![Command::FetchSnapshot]
                }
            }

            Self::StartChargeNow => vec![Command::StartCharge],

            Self::ChargingDepartBy => {
                vec![Command::SetChargeLimit(limits.charge_limit_depart), Command::StartCharge]
            }

            Self::ChargingScheduledStart => {
                vec![Command::SetChargeLimit(limits.charge_limit_scheduled), Command::StartCharge]
            }

            Self::DepartBy => {
                let fresh = inputs.fresh()?;
                let planner = inputs.planner();
                let target_hours = planner.target_hours(
                    fresh.battery_level,
                    fresh.charge_limit_soc,
                    limits.charge_limit_depart,
                );
                let start_time = planner.find(target_hours);
                vec![
                    Command::SetChargeLimit(limits.charge_limit_depart),
                    Command::ScheduleDeparture {
                        end_off_peak: start_time + TimeDelta::hours(i64::from(target_hours)),
                        departure: inputs.deadline,
                        preheat: true,
                    },
                ]
            }

            Self::ScheduledStart => {
                let fresh = inputs.fresh()?;
                let plan = inputs.planner().plan(
                    fresh.battery_level,
                    fresh.charge_limit_soc,
                    limits.charge_limit_scheduled,
                );
                vec![
                    Command::SetChargeLimit(limits.charge_limit_scheduled),
                    Command::ScheduleCharging {
                        start: plan.start_time,
                        reference_deadline: inputs.deadline,
                    },
                ]
            }

            Self::NoSchedule => {
                let fresh = inputs.fresh()?;
                let plan = inputs.planner().plan(
                    fresh.battery_level,
                    fresh.charge_limit_soc,
                    limits.charge_limit_scheduled,
                );
                vec![Command::ScheduleDisable {
                    reference_start: plan.start_time,
                    reference_deadline: inputs.deadline,
                }]
            }

            Self::SetLimitMin => vec![Command::SetChargeLimit(limits.charge_limit_min)],

            Self::End => {
                if inputs.fresh.is_some() {
                    vec![Command::Settle, Command::FetchSnapshot]
                } else {
                    // Do not wake the vehicle just for the telemetry.
                    Vec::new()
                }
            }
        };
        Ok(commands)
    }
}
