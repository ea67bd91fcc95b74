//! Cron trigger for scheduled functions (the memory heartbeat).
//!
//! Expressions are evaluated in UTC. Five-field crontab syntax is accepted
//! and normalized to the six-field form the `cron` crate parses (a `0`
//! seconds column is prepended). Missed ticks are skipped, never queued.

use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, RuntimeError};

pub struct CronTrigger {
    schedule: Schedule,
    expr: String,
}

impl CronTrigger {
    /// Parse a cron expression (5 or 6 fields).
    pub fn parse(expr: &str) -> Result<Self> {
        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };

        let schedule = Schedule::from_str(&normalized).map_err(|e| RuntimeError::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            schedule,
            expr: expr.to_string(),
        })
    }

    /// Next fire instant strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// Drive the trigger until `cancel` fires, invoking `tick` at each
    /// scheduled instant. The callback runs to completion before the next
    /// instant is computed; an instant that passed while the callback was
    /// still running is skipped.
    pub async fn run<F, Fut>(self, cancel: CancellationToken, tick: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(cron = %self.expr, "cron trigger started");
        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                warn!(cron = %self.expr, "cron schedule exhausted, trigger stopping");
                return;
            };

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => tick().await,
                _ = cancel.cancelled() => {
                    info!(cron = %self.expr, "cron trigger stopped");
                    return;
                }
            }
        }
    }
}
