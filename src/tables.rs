use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::core::{
    price::PriceTimeline,
    vehicle::{ChargingState, VehicleSnapshot},
    window::ChargeWindow,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn format_time(time: DateTime<Utc>, time_zone: Tz) -> String {
    time.with_timezone(&time_zone).format("%a %H:%M").to_string()
}

/// Hourly prices, the hours of the highlighted window are marked.
#[must_use]
pub fn build_timeline_table(
    timeline: &PriceTimeline,
    highlighted: Option<ChargeWindow>,
    time_zone: Tz,
) -> Table {
    let (min_price, max_price) = timeline.price_range().unwrap_or_default();
    let mid_price = f64::midpoint(min_price, max_price);

    let mut table = new_table();
    table.set_header(vec!["Start", "End", "Price", "Window"]);
    for point in timeline {
        let is_highlighted = highlighted.is_some_and(|window| {
            (window.start <= point.start_time) && (point.start_time < window.end())
        });
        let price_color = if point.price.is_nan() {
            Color::Magenta
        } else if point.price > mid_price {
            Color::Red
        } else {
            Color::Green
        };
        table.add_row(vec![
            Cell::new(format_time(point.start_time, time_zone)),
            Cell::new(format_time(point.end_time(), time_zone)).add_attribute(Attribute::Dim),
            Cell::new(format!("{:.2}", point.price))
                .set_alignment(CellAlignment::Right)
                .fg(price_color),
            Cell::new(if is_highlighted { "⚡" } else { "" }),
        ]);
    }
    table
}

/// Cheapest windows per charge duration with their average price.
#[must_use]
pub fn build_windows_table(windows: &[(ChargeWindow, Option<f64>)], time_zone: Tz) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Hours", "Start", "End", "Average price"]);
    for (window, average_price) in windows {
        table.add_row(vec![
            Cell::new(window.hours).set_alignment(CellAlignment::Right),
            Cell::new(format_time(window.start, time_zone)),
            Cell::new(format_time(window.end(), time_zone)).add_attribute(Attribute::Dim),
            Cell::new(
                average_price.map_or_else(|| "n/a".to_string(), |price| format!("{price:.2}")),
            )
            .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[must_use]
pub fn build_snapshot_table(snapshot: &VehicleSnapshot, time_zone: Tz) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec![Cell::new("VIN"), Cell::new(&snapshot.vin)]);
    table.add_row(vec![
        Cell::new("Battery level"),
        Cell::new(snapshot.battery_level).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Charge limit"),
        Cell::new(snapshot.charge_limit_soc).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Charging state"),
        Cell::new(format!("{:?}", snapshot.charging_state)).fg(match snapshot.charging_state {
            ChargingState::Charging => Color::Green,
            ChargingState::Disconnected => Color::DarkYellow,
            ChargingState::Complete | ChargingState::Stopped => Color::Reset,
            ChargingState::Unknown => Color::Magenta,
        }),
    ]);
    table.add_row(vec![
        Cell::new("Scheduled mode"),
        Cell::new(format!("{:?}", snapshot.scheduled_mode)),
    ]);
    table.add_row(vec![
        Cell::new("Moving"),
        Cell::new(snapshot.is_moving)
            .fg(if snapshot.is_moving { Color::Red } else { Color::Reset }),
    ]);
    table.add_row(vec![Cell::new("Location"), Cell::new(snapshot.location)]);
    if let Some(taken_at) = snapshot.taken_at {
        table.add_row(vec![Cell::new("Taken at"), Cell::new(format_time(taken_at, time_zone))]);
    }
    table
}
