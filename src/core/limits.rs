use clap::Parser;

use crate::quantity::percent::Percent;

/// Tunable thresholds of the charge planner and the decision machine.
#[derive(Copy, Clone, Debug, Parser)]
pub struct ChargeLimits {
    /// Hours needed to charge from empty to full.
    #[clap(long, default_value = "6", env = "MAX_CHARGE_HOURS")]
    pub max_charge_hours: u32,

    /// Below this battery level, charging starts immediately regardless of the prices.
    #[clap(long, default_value = "30", env = "CHARGE_NOW_LIMIT")]
    pub charge_now_limit: Percent,

    /// Charge limit to fall back to while unplugged.
    #[clap(long, default_value = "50", env = "CHARGE_LIMIT_MIN")]
    pub charge_limit_min: Percent,

    /// Charge limit for a scheduled start.
    #[clap(long, default_value = "70", env = "CHARGE_LIMIT_SCHEDULED")]
    pub charge_limit_scheduled: Percent,

    /// Charge limit when departing for a calendar event.
    #[clap(long, default_value = "90", env = "CHARGE_LIMIT_DEPART")]
    pub charge_limit_depart: Percent,
}

impl Default for ChargeLimits {
    fn default() -> Self {
        Self {
            max_charge_hours: 6,
            charge_now_limit: Percent(30),
            charge_limit_min: Percent(50),
            charge_limit_scheduled: Percent(70),
            charge_limit_depart: Percent(90),
        }
    }
}
