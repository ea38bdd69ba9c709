use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    core::{
        limits::ChargeLimits,
        price::PriceTimeline,
        window::find_cheapest_start,
    },
    quantity::percent::Percent,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Strategy {
    /// The deadline is close: schedule a departure, which also enables pre-conditioning.
    DepartBy,

    /// Schedule the start of charging.
    StartAt,

    /// Neither schedule can be represented, clear any existing one.
    Disable,
}

#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PlannerResult {
    pub target_hours: u32,
    pub start_time: DateTime<Utc>,
    pub strategy: Strategy,
    pub window_level: u32,
}

/// Earliest feasible start over all charge durations.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EarliestStart {
    pub start_time: DateTime<Utc>,

    /// Grows with the size of the cheap window that is already open, zero when none is open.
    pub window_level: u32,
}

#[must_use]
#[derive(Copy, Clone, bon::Builder)]
pub struct ChargePlanner<'a> {
    timeline: &'a PriceTimeline,
    now: DateTime<Utc>,
    deadline: DateTime<Utc>,
    max_charge_hours: u32,
}

impl ChargePlanner<'_> {
    /// Departure scheduling is used when the deadline is closer than this.
    pub const DEPART_BY_HORIZON: TimeDelta = TimeDelta::hours(20);

    /// The vehicle starts charging right away when a scheduled start is this far ahead or farther.
    const SCHEDULE_HORIZON_HOURS: i64 = 24;

    pub fn earliest_start(&self) -> EarliestStart {
        let mut start_time = self.deadline;
        let mut window_level = 0;
        for n_hours in (1..=self.max_charge_hours).rev() {
            let window_start = self.find(n_hours);
            start_time = start_time.min(window_start);
            if window_level == 0 && window_start <= self.now {
                window_level = self.max_charge_hours - n_hours + 1;
            }
        }
        EarliestStart { start_time, window_level }
    }

    /// Hours needed to reach the target limit, with an extra hour of margin.
    #[must_use]
    pub fn target_hours(
        &self,
        battery_level: Percent,
        charge_limit_soc: Percent,
        target_limit: Percent,
    ) -> u32 {
        let missing = target_limit.max(charge_limit_soc).points_above(battery_level).max(0);
        let max_charge_hours = i64::from(self.max_charge_hours);
        let hours = i64::from(missing) * max_charge_hours / 100 + 1;
        u32::try_from(hours).unwrap_or(u32::MAX)
    }

    pub fn plan(
        &self,
        battery_level: Percent,
        charge_limit_soc: Percent,
        target_limit: Percent,
    ) -> PlannerResult {
        let target_hours = self.target_hours(battery_level, charge_limit_soc, target_limit);
        let start_time = self.find(target_hours);
        let strategy = if self.deadline < self.now + Self::DEPART_BY_HORIZON {
            Strategy::DepartBy
        } else if start_time < self.now + self.schedule_horizon() {
            Strategy::StartAt
        } else {
            Strategy::Disable
        };
        PlannerResult {
            target_hours,
            start_time,
            strategy,
            window_level: self.earliest_start().window_level,
        }
    }

    pub fn find(&self, n_hours: u32) -> DateTime<Utc> {
        find_cheapest_start(self.timeline, n_hours, self.now, self.deadline)
    }

    fn schedule_horizon(&self) -> TimeDelta {
        TimeDelta::hours(Self::SCHEDULE_HORIZON_HOURS - i64::from(self.max_charge_hours))
    }
}

impl<'a> ChargePlanner<'a> {
    /// Planner with the thresholds from the configuration.
    pub fn with_limits(
        timeline: &'a PriceTimeline,
        limits: &ChargeLimits,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self { timeline, now, deadline, max_charge_hours: limits.max_charge_hours }
    }
}
