/// The supervision loop: walk the device registry, read each device's status,
/// reboot devices that stopped injecting and went stale, sleep, repeat.
///
/// Everything runs on one task. The cooldown after a reboot blocks the whole
/// cycle, so at most one recovery command starts per cooldown window.
use crate::config::MonitorConfig;
use crate::reboot::RecoveryAction;
use crate::registry::DeviceRegistry;
use crate::staleness::StalenessEvaluator;
use crate::status_client::{StatusError, StatusSource};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where the loop is for the device currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    FetchingStatus,
    Evaluating,
    Healthy,
    Triggering,
}

/// Status of one device at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReading {
    pub origin: String,
    pub injection_status: Option<bool>,
    pub minutes_since_last_data: i64,
}

impl DeviceReading {
    fn inject_label(&self) -> &'static str {
        match self.injection_status {
            Some(true) => "true",
            Some(false) => "false",
            None => "unknown",
        }
    }
}

/// Reboot when the device is not injecting and has been quiet for longer
/// than `threshold_mins`. An unknown injection status never reboots.
pub fn should_reboot(reading: &DeviceReading, threshold_mins: i64) -> bool {
    reading.injection_status == Some(false) && reading.minutes_since_last_data > threshold_mins
}

/// What happened during one pass over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub healthy: Vec<String>,
    pub rebooted: Vec<String>,
    /// Devices whose status could not be read this cycle.
    pub skipped: Vec<String>,
    /// Devices whose recovery command failed to start.
    pub failed: Vec<String>,
}

pub struct Monitor<S, R> {
    registry: DeviceRegistry,
    source: S,
    action: R,
    staleness: StalenessEvaluator,
    stale_threshold_mins: i64,
    cooldown: Duration,
    cycle_delay: Duration,
    state: MonitorState,
    cycles: u64,
}

impl<S: StatusSource, R: RecoveryAction> Monitor<S, R> {
    pub fn new(config: &MonitorConfig, registry: DeviceRegistry, source: S, action: R) -> Self {
        Self {
            registry,
            source,
            action,
            staleness: StalenessEvaluator::default(),
            stale_threshold_mins: config.monitor.stale_threshold_mins,
            cooldown: config.cooldown(),
            cycle_delay: config.cycle_delay(),
            state: MonitorState::Idle,
            cycles: 0,
        }
    }

    /// Replace the wall clock used for staleness.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> chrono::DateTime<chrono::Utc>) -> Self {
        self.staleness = StalenessEvaluator::new(clock);
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn transition(&mut self, next: MonitorState) {
        debug!(from = ?self.state, to = ?next, "monitor state");
        self.state = next;
    }

    /// Fetch one device's status and compute its staleness.
    pub async fn evaluate(&mut self, origin: &str) -> Result<DeviceReading, StatusError> {
        self.transition(MonitorState::FetchingStatus);
        let status = self.source.device_status(origin).await?;
        self.transition(MonitorState::Evaluating);
        Ok(DeviceReading {
            origin: origin.to_string(),
            injection_status: status.injection_status,
            minutes_since_last_data: self.staleness.minutes(&status),
        })
    }

    pub fn should_reboot(&self, reading: &DeviceReading) -> bool {
        should_reboot(reading, self.stale_threshold_mins)
    }

    /// One pass over every configured device, in configuration order.
    ///
    /// Does not include the inter-cycle sleep.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let origins: Vec<String> = self.registry.origins().map(str::to_string).collect();

        for origin in origins {
            let reading = match self.evaluate(&origin).await {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(origin = %origin, error = %e, "skipping device this cycle");
                    summary.skipped.push(origin);
                    self.transition(MonitorState::Idle);
                    continue;
                }
            };

            info!(
                "Device = {}\tMinutes_since_last_Connect = {}\tInject = {}",
                reading.origin,
                reading.minutes_since_last_data,
                reading.inject_label()
            );

            if !self.should_reboot(&reading) {
                self.transition(MonitorState::Healthy);
                summary.healthy.push(origin);
                self.transition(MonitorState::Idle);
                continue;
            }

            self.transition(MonitorState::Triggering);
            info!(
                origin = %origin,
                minutes_since_last_data = reading.minutes_since_last_data,
                threshold = self.stale_threshold_mins,
                "device stalled, triggering reboot"
            );
            match self.action.trigger(&origin) {
                Ok(()) => {
                    summary.rebooted.push(origin);
                    debug!(cooldown_secs = self.cooldown.as_secs(), "reboot cooldown");
                    tokio::time::sleep(self.cooldown).await;
                }
                Err(e) => {
                    error!(error = %e, "reboot trigger failed");
                    summary.failed.push(origin);
                }
            }
            self.transition(MonitorState::Idle);
        }

        self.cycles += 1;
        info!(
            cycle = self.cycles,
            healthy = summary.healthy.len(),
            rebooted = summary.rebooted.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "cycle complete"
        );
        summary
    }

    /// Run cycles forever, sleeping `cycle_delay` between them.
    pub async fn run(&mut self) {
        loop {
            self.run_cycle().await;
            debug!(delay_secs = self.cycle_delay.as_secs(), "sleeping until next cycle");
            tokio::time::sleep(self.cycle_delay).await;
        }
    }
}
