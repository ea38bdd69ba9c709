use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

use crate::{api::tesla, prelude::*};

#[derive(Parser)]
pub struct TeslaArgs {
    #[clap(long = "tesla-client-id", env = "TESLA_CLIENT_ID")]
    client_id: String,

    /// Directory with `refresh_token.txt`, refreshed tokens are written back there.
    #[clap(
        long = "tesla-token-dir",
        env = "TESLA_TOKEN_DIR",
        default_value = "/var/tmp/cheapest-charge"
    )]
    token_dir: PathBuf,

    #[clap(
        long = "tesla-audience",
        env = "TESLA_AUDIENCE",
        default_value = "https://fleet-api.prd.eu.vn.cloud.tesla.com"
    )]
    audience: String,

    /// Vehicle command signing proxy.
    #[clap(
        long = "tesla-proxy-url",
        env = "TESLA_PROXY_URL",
        default_value = "https://localhost:4443"
    )]
    proxy: String,

    /// Accept the self-signed certificate of a local proxy.
    #[clap(long = "tesla-proxy-insecure", env = "TESLA_PROXY_INSECURE")]
    proxy_insecure: bool,

    /// Zone of the vehicle clock.
    #[clap(long = "time-zone", env = "TIME_ZONE", default_value = "Europe/Copenhagen")]
    pub time_zone: Tz,
}

impl TeslaArgs {
    pub async fn connect(&self) -> Result<tesla::Api> {
        tesla::Api::authorize()
            .client_id(&self.client_id)
            .token_dir(&self.token_dir)
            .audience(&self.audience)
            .proxy(&self.proxy)
            .time_zone(self.time_zone)
            .accept_invalid_proxy_certs(self.proxy_insecure)
            .call()
            .await
    }
}
