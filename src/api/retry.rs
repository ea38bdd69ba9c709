use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    core::gateway::{Fetched, VehicleGateway},
    prelude::*,
    quantity::percent::Percent,
};

/// Bounded number of attempts with a fixed pause in between.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    pub n_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { n_attempts: 10, backoff: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    /// Call the function until it succeeds, returning the last error when out of attempts.
    pub async fn run<T, F, Fut>(self, what: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.n_attempts => {
                    warn!(what, attempt, "failed, retrying: {error:#}");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(error.context(format!("`{what}` failed after {attempt} attempts")));
                }
            }
        }
    }
}

/// Retries every call of the wrapped gateway.
pub struct Retrying<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> Retrying<G> {
    pub const fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: VehicleGateway> VehicleGateway for Retrying<G> {
    async fn is_reachable(&self, vin: &str) -> Result<bool> {
        self.policy.run("is_reachable", || self.inner.is_reachable(vin)).await
    }

    async fn wake(&self, vin: &str) -> Result {
        self.policy.run("wake", || self.inner.wake(vin)).await
    }

    async fn fetch_snapshot(&self, vin: &str) -> Result<Fetched> {
        self.policy.run("fetch_snapshot", || self.inner.fetch_snapshot(vin)).await
    }

    async fn start_charge(&self, vin: &str) -> Result {
        self.policy.run("start_charge", || self.inner.start_charge(vin)).await
    }

    async fn set_charge_limit(&self, vin: &str, percent: Percent) -> Result {
        self.policy.run("set_charge_limit", || self.inner.set_charge_limit(vin, percent)).await
    }

    async fn schedule_departure(
        &self,
        vin: &str,
        end_off_peak: DateTime<Utc>,
        departure: DateTime<Utc>,
        preheat: bool,
    ) -> Result {
        self.policy
            .run("schedule_departure", || {
                self.inner.schedule_departure(vin, end_off_peak, departure, preheat)
            })
            .await
    }

    async fn schedule_charging(
        &self,
        vin: &str,
        start: DateTime<Utc>,
        reference_deadline: DateTime<Utc>,
    ) -> Result {
        self.policy
            .run("schedule_charging", || {
                self.inner.schedule_charging(vin, start, reference_deadline)
            })
            .await
    }

    async fn schedule_disable(
        &self,
        vin: &str,
        reference_start: DateTime<Utc>,
        reference_deadline: DateTime<Utc>,
    ) -> Result {
        self.policy
            .run("schedule_disable", || {
                self.inner.schedule_disable(vin, reference_start, reference_deadline)
            })
            .await
    }
}
