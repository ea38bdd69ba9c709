mod models;
mod response;

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use http::{HeaderMap, HeaderValue, Method, header::AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub use self::models::parse_snapshot;
use self::{
    models::VehicleSummary,
    response::{CommandResult, Response},
};
use crate::{
    core::gateway::{Fetched, VehicleGateway},
    prelude::*,
    quantity::percent::Percent,
};

/// Tesla Fleet API.
///
/// Queries go to the audience URL, commands go through the signing proxy.
pub struct Api {
    client: Client,
    proxy_client: Client,
    audience: String,
    proxy: String,

    /// Zone of the vehicle clock, schedule times are sent as minutes since its midnight.
    time_zone: Tz,
}

#[bon::bon]
impl Api {
    const TOKEN_URL: &'static str = "https://auth.tesla.com/oauth2/v3/token";
    const VEHICLE_DATA_ENDPOINTS: &'static str = "charge_state;drive_state;location_data";
    const WAKE_UP_POLL_INTERVAL: Duration = Duration::from_secs(15);
    const N_WAKE_UP_POLLS: usize = 4;

    /// Exchange the stored refresh token for a new token pair and build the clients.
    #[builder]
    pub async fn authorize(
        client_id: &str,
        token_dir: &Path,
        audience: &str,
        proxy: &str,
        time_zone: Tz,
        #[builder(default)] accept_invalid_proxy_certs: bool,
    ) -> Result<Self> {
        let access_token = refresh_token(client_id, token_dir).await?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .context("invalid access token")?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        let proxy_client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(accept_invalid_proxy_certs)
            .build()?;
        Ok(Self {
            client,
            proxy_client,
            audience: audience.trim_end_matches('/').to_string(),
            proxy: proxy.trim_end_matches('/').to_string(),
            time_zone,
        })
    }
}

impl Api {
    #[instrument(skip_all, level = Level::DEBUG, fields(path = path))]
    async fn call<R: DeserializeOwned>(
        &self,
        client: &Client,
        method: Method,
        url: String,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<R> {
        let mut request = client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to call `{path}`"))?
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("failed to deserialize `{path}` response JSON"))?;
        debug!(?response, "call succeeded");
        let response: Response<R> = serde_json::from_value(response)
            .with_context(|| format!("failed to deserialize `{path}` response structure"))?;
        Result::<R>::from(response).with_context(|| format!("`{path}` failed"))
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.call(&self.client, Method::GET, format!("{}/{path}", self.audience), path, None).await
    }

    #[instrument(skip_all, fields(vin = vin, command = command))]
    async fn command(&self, vin: &str, command: &str, body: serde_json::Value) -> Result {
        info!(%body, "sending…");
        let path = format!("api/1/vehicles/{vin}/command/{command}");
        let url = format!("{}/{path}", self.proxy);
        let result: CommandResult =
            self.call(&self.proxy_client, Method::POST, url, &path, Some(&body)).await?;
        Result::<()>::from(result).with_context(|| format!("`{command}` failed"))
    }

    fn minutes_of_day(&self, time: DateTime<Utc>) -> u32 {
        let local = time.with_timezone(&self.time_zone);
        local.hour() * 60 + local.minute()
    }
}

#[async_trait]
impl VehicleGateway for Api {
    #[instrument(skip_all, fields(vin = vin))]
    async fn is_reachable(&self, vin: &str) -> Result<bool> {
        let summary: VehicleSummary = self.get(&format!("api/1/vehicles/{vin}")).await?;
        info!(state = %summary.state, "checked");
        Ok(summary.is_online())
    }

    #[instrument(skip_all, fields(vin = vin))]
    async fn wake(&self, vin: &str) -> Result {
        info!("waking up…");
        let path = format!("api/1/vehicles/{vin}/wake_up");
        let url = format!("{}/{path}", self.audience);
        let _: VehicleSummary = self.call(&self.client, Method::POST, url, &path, None).await?;
        for _ in 0..Self::N_WAKE_UP_POLLS {
            tokio::time::sleep(Self::WAKE_UP_POLL_INTERVAL).await;
            if self.is_reachable(vin).await? {
                info!("woke up");
                return Ok(());
            }
        }
        bail!("the vehicle did not wake up")
    }

    #[instrument(skip_all, fields(vin = vin))]
    async fn fetch_snapshot(&self, vin: &str) -> Result<Fetched> {
        info!("fetching…");
        let raw: serde_json::Value = self
            .client
            .get(format!("{}/api/1/vehicles/{vin}/vehicle_data", self.audience))
            .query(&[("endpoints", Self::VEHICLE_DATA_ENDPOINTS)])
            .send()
            .await
            .context("failed to request the vehicle data")?
            .error_for_status()
            .context("vehicle data request failed")?
            .json()
            .await
            .context("failed to deserialize the vehicle data JSON")?;
        let snapshot = parse_snapshot(raw.clone())?;
        info!(
            battery_level = %snapshot.battery_level,
            charge_limit_soc = %snapshot.charge_limit_soc,
            charging_state = ?snapshot.charging_state,
            scheduled_mode = ?snapshot.scheduled_mode,
            "fetched",
        );
        Ok(Fetched { snapshot, raw })
    }

    async fn start_charge(&self, vin: &str) -> Result {
        if let Err(error) = self.command(vin, "charge_start", serde_json::json!({})).await {
            // Also fails when charging already or unplugged:
            warn!(vin, "failed to start charging: {error:#}");
        }
        Ok(())
    }

    async fn set_charge_limit(&self, vin: &str, percent: Percent) -> Result {
        self.command(vin, "set_charge_limit", serde_json::json!({ "percent": percent })).await
    }

    async fn schedule_departure(
        &self,
        vin: &str,
        end_off_peak: DateTime<Utc>,
        departure: DateTime<Utc>,
        preheat: bool,
    ) -> Result {
        let end_off_peak = self.minutes_of_day(end_off_peak);
        self.command(
            vin,
            "set_scheduled_charging",
            serde_json::to_value(ScheduledCharging { enable: false, time: end_off_peak })?,
        )
        .await?;
        self.command(
            vin,
            "set_scheduled_departure",
            serde_json::to_value(
                ScheduledDeparture::builder()
                    .enable(true)
                    .preconditioning_enabled(preheat)
                    .departure_time(self.minutes_of_day(departure))
                    .end_off_peak_time(end_off_peak)
                    .build(),
            )?,
        )
        .await
    }

    async fn schedule_charging(
        &self,
        vin: &str,
        start: DateTime<Utc>,
        reference_deadline: DateTime<Utc>,
    ) -> Result {
        let departure = self.minutes_of_day(reference_deadline);
        self.command(
            vin,
            "set_scheduled_departure",
            serde_json::to_value(
                ScheduledDeparture::builder()
                    .enable(false)
                    .departure_time(departure)
                    .end_off_peak_time(departure)
                    .build(),
            )?,
        )
        .await?;
        self.command(
            vin,
            "set_scheduled_charging",
            serde_json::to_value(ScheduledCharging {
                enable: true,
                time: self.minutes_of_day(start),
            })?,
        )
        .await
    }

    async fn schedule_disable(
        &self,
        vin: &str,
        reference_start: DateTime<Utc>,
        reference_deadline: DateTime<Utc>,
    ) -> Result {
        let departure = self.minutes_of_day(reference_deadline);
        self.command(
            vin,
            "set_scheduled_departure",
            serde_json::to_value(
                ScheduledDeparture::builder()
                    .enable(false)
                    .departure_time(departure)
                    .end_off_peak_time(departure)
                    .build(),
            )?,
        )
        .await?;
        self.command(
            vin,
            "set_scheduled_charging",
            serde_json::to_value(ScheduledCharging {
                enable: false,
                time: self.minutes_of_day(reference_start),
            })?,
        )
        .await
    }
}

#[derive(Serialize)]
struct ScheduledCharging {
    enable: bool,

    /// Minutes since the local midnight.
    time: u32,
}

#[derive(Serialize, bon::Builder)]
struct ScheduledDeparture {
    enable: bool,

    #[builder(default)]
    off_peak_charging_enabled: bool,

    #[builder(default)]
    preconditioning_enabled: bool,

    #[builder(default)]
    preconditioning_weekdays_only: bool,

    #[builder(default)]
    off_peak_charging_weekdays_only: bool,

    departure_time: u32,
    end_off_peak_time: u32,
}

#[derive(Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct Tokens {
    access_token: String,
    refresh_token: String,
}

/// Refresh the token pair and store the new one, returning the access token.
#[instrument(skip_all, fields(token_dir = %token_dir.display()))]
async fn refresh_token(client_id: &str, token_dir: &Path) -> Result<String> {
    info!("refreshing the token…");
    let refresh_token_path = token_dir.join("refresh_token.txt");
    let refresh_token = std::fs::read_to_string(&refresh_token_path)
        .with_context(|| format!("failed to read `{}`", refresh_token_path.display()))?;
    let tokens = super::client::try_new()?
        .post(Api::TOKEN_URL)
        .json(&RefreshTokenRequest {
            grant_type: "refresh_token",
            client_id,
            refresh_token: refresh_token.trim(),
        })
        .send()
        .await
        .context("failed to request the token")?
        .error_for_status()
        .context("token request failed")?
        .json::<Tokens>()
        .await
        .context("failed to deserialize the tokens")?;
    write_secret(&token_dir.join("access_token.txt"), &tokens.access_token)?;
    write_secret(&refresh_token_path, &tokens.refresh_token)?;
    Ok(tokens.access_token)
}

/// Write the file readable and writable only by the owner.
fn write_secret(path: &Path, contents: &str) -> Result {
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write `{}`", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict `{}`", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_scheduled_departure_body() -> Result {
        let body = serde_json::to_value(
            ScheduledDeparture::builder()
                .enable(true)
                .preconditioning_enabled(true)
                .departure_time(450)
                .end_off_peak_time(360)
                .build(),
        )?;
        assert_eq!(
            body,
            serde_json::json!({
                "enable": true,
                "off_peak_charging_enabled": false,
                "preconditioning_enabled": true,
                "preconditioning_weekdays_only": false,
                "off_peak_charging_weekdays_only": false,
                "departure_time": 450,
                "end_off_peak_time": 360,
            }),
        );
        Ok(())
    }

    #[test]
    fn test_minutes_of_day() -> Result {
        let api = Api {
            client: Client::new(),
            proxy_client: Client::new(),
            audience: String::new(),
            proxy: String::new(),
            time_zone: chrono_tz::Europe::Copenhagen,
        };
        let time = Utc.with_ymd_and_hms(2022, 2, 7, 23, 30, 0).unwrap();
        assert_eq!(api.minutes_of_day(time), 30);
        let time = Utc.with_ymd_and_hms(2022, 7, 1, 4, 15, 0).unwrap();
        assert_eq!(api.minutes_of_day(time), 6 * 60 + 15);
        Ok(())
    }
}
