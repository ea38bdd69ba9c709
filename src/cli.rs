mod burrow;
mod fleet;
mod heartbeat;
mod hunt;
mod prices;
mod tesla;

use clap::{Parser, Subcommand};

use crate::cli::{burrow::BurrowArgs, hunt::HuntArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: fetch the prices and the calendars, and steer the charging of every vehicle.
    #[clap(name = "hunt")]
    Hunt(Box<HuntArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}
