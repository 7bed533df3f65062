//! Periodic scheduler for the recurrence generator and the retention purger.
//!
//! Each task sleeps until the next instant its cron expression matches, runs
//! one pass, and repeats. A failed pass is logged and the task keeps going.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use jotter_core::defaults::{RECURRENCE_CRON, RETENTION_CRON};
use jotter_core::{next_run, CronSpec, Error, Result};
use jotter_db::{recurrence, retention};

/// Configuration for the periodic tasks.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub recurrence_cron: CronSpec,
    pub retention_cron: CronSpec,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recurrence_cron: CronSpec::every_minute(),
            retention_cron: daily_midnight(),
        }
    }
}

fn daily_midnight() -> CronSpec {
    RETENTION_CRON
        .parse()
        .unwrap_or_else(|_| CronSpec::every_minute())
}

impl SchedulerConfig {
    /// Read `SCHEDULER_ENABLED`, `RECURRENCE_CRON` and `RETENTION_CRON`.
    ///
    /// An unparseable cron expression is a configuration error, not a silent default.
    pub fn from_env() -> Result<Self> {
        let enabled = std::env::var("SCHEDULER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        Ok(Self {
            enabled,
            recurrence_cron: cron_from_env("RECURRENCE_CRON", RECURRENCE_CRON)?,
            retention_cron: cron_from_env("RETENTION_CRON", RETENTION_CRON)?,
        })
    }
}

fn cron_from_env(var: &str, default: &str) -> Result<CronSpec> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e: Error| Error::Config(format!("{var}: {e}")))
}

/// Time to sleep from `now` until the next run of `spec`.
pub fn delay_until_next(spec: &CronSpec, now: DateTime<Utc>) -> Result<Duration> {
    let next = next_run(spec, now, None)?;
    Ok((next - now).to_std().unwrap_or(Duration::ZERO))
}

/// Handle for stopping the periodic tasks.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop both tasks; a pass already running finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = ?e, "Scheduler task panicked");
            }
        }
        info!(subsystem = "scheduler", "Scheduler stopped");
    }
}

/// Start the recurrence and retention tasks against `pool`.
pub fn start(pool: PgPool, config: SchedulerConfig) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if !config.enabled {
        info!(subsystem = "scheduler", "Scheduler is disabled, not starting");
        return SchedulerHandle { shutdown_tx, tasks };
    }

    let recurrence_pool = pool.clone();
    tasks.push(tokio::spawn(run_periodic(
        "recurrence",
        config.recurrence_cron,
        shutdown_rx.clone(),
        move |now| {
            let pool = recurrence_pool.clone();
            async move {
                let report = recurrence::run_pass(&pool, now).await?;
                Ok(report.data_points + report.occurrences)
            }
        },
    )));

    tasks.push(tokio::spawn(run_periodic(
        "retention",
        config.retention_cron,
        shutdown_rx,
        move |now| {
            let pool = pool.clone();
            async move {
                let report = retention::purge_expired(&pool, now).await?;
                Ok(report.data_deleted + report.occurrences_deleted)
            }
        },
    )));

    info!(subsystem = "scheduler", "Scheduler started");
    SchedulerHandle { shutdown_tx, tasks }
}

/// Run `pass` at every instant `spec` matches until shutdown is signalled.
async fn run_periodic<F, Fut>(
    name: &'static str,
    spec: CronSpec,
    mut shutdown_rx: watch::Receiver<bool>,
    pass: F,
) where
    F: Fn(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    loop {
        let delay = match delay_until_next(&spec, Utc::now()) {
            Ok(delay) => delay,
            Err(e) => {
                error!(subsystem = "scheduler", component = name, error = %e, "Cron never fires; task exiting");
                return;
            }
        };

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let now = Utc::now();
        match pass(now).await {
            Ok(rows) => info!(subsystem = "scheduler", component = name, rows, "Periodic pass finished"),
            Err(e) => warn!(subsystem = "scheduler", component = name, error = %e, "Periodic pass failed"),
        }
    }
}
