//! Periodic safety evaluation task.
//!
//! One spawned task owns the whole cycle: read the shared stores, run the
//! pure evaluation, publish the report, hand findings to the alert
//! aggregator. Because every run happens on this one task and missed timer
//! ticks are skipped rather than queued, runs can never overlap or pile up
//! behind a slow alert path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alerts::{AlertAggregator, AlertInput};
use crate::models::{AlertKind, AlertSeverity};
use crate::store::GroupState;

use super::{evaluate, proximity_hits, ProximityHit, SafetyReport, SafetyStatus};

/// Default evaluation period.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

enum Command {
    RunNow,
    Stop,
}

/// Handle to the running evaluation task.
pub struct SafetyMonitor {
    commands: mpsc::Sender<Command>,
    reports: watch::Receiver<SafetyReport>,
    handle: JoinHandle<()>,
}

impl SafetyMonitor {
    /// Spawns the evaluation loop for `observer_id`. The first run happens
    /// immediately, then every `config.interval`.
    pub fn spawn(
        observer_id: impl Into<String>,
        state: Arc<GroupState>,
        alerts: Arc<AlertAggregator>,
        config: MonitorConfig,
    ) -> Self {
        let observer_id = observer_id.into();
        let (commands, rx) = mpsc::channel(8);
        let (report_tx, reports) = watch::channel(SafetyReport::safe(observer_id.clone()));

        info!(
            observer_id = %observer_id,
            interval_secs = config.interval.as_secs(),
            "starting safety monitor"
        );
        let handle = tokio::spawn(run_loop(observer_id, state, alerts, config, rx, report_tx));

        Self {
            commands,
            reports,
            handle,
        }
    }

    /// A live view of the latest report. Every run publishes, even when the
    /// outcome is unchanged, so `changed()` can be awaited per run.
    pub fn reports(&self) -> watch::Receiver<SafetyReport> {
        self.reports.clone()
    }

    pub fn latest(&self) -> SafetyReport {
        self.reports.borrow().clone()
    }

    /// Requests an out-of-band evaluation. Runs on the loop task, serialized
    /// with the periodic ones.
    pub async fn run_now(&self) {
        let _ = self.commands.send(Command::RunNow).await;
    }

    /// Stops the loop and waits for the task to finish.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop).await;
        let _ = self.handle.await;
    }
}

async fn run_loop(
    observer_id: String,
    state: Arc<GroupState>,
    alerts: Arc<AlertAggregator>,
    config: MonitorConfig,
    mut commands: mpsc::Receiver<Command>,
    report_tx: watch::Sender<SafetyReport>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_status = SafetyStatus::Safe;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                last_status = run_once(&observer_id, &state, &alerts, &report_tx, last_status).await;
            }
            cmd = commands.recv() => match cmd {
                Some(Command::RunNow) => {
                    last_status = run_once(&observer_id, &state, &alerts, &report_tx, last_status).await;
                }
                Some(Command::Stop) | None => break,
            },
        }
    }
    debug!(observer_id = %observer_id, "safety monitor stopped");
}

async fn run_once(
    observer_id: &str,
    state: &GroupState,
    alerts: &AlertAggregator,
    report_tx: &watch::Sender<SafetyReport>,
    last_status: SafetyStatus,
) -> SafetyStatus {
    let threshold = alerts.settings().await.proximity_threshold_m;

    let (report, hits) = {
        let positions = state.positions.read().await;
        let zones = state.zones.read().await;
        (
            evaluate(observer_id, &positions, &zones),
            proximity_hits(observer_id, &positions, threshold),
        )
    };

    if report.status != last_status {
        if report.status > last_status {
            warn!(
                observer_id = %observer_id,
                status = %report.status,
                findings = report.findings.len(),
                "safety status degraded"
            );
        } else {
            info!(observer_id = %observer_id, status = %report.status, "safety status recovered");
        }
    }

    for finding in &report.findings {
        let input = AlertInput::new(finding.kind.alert_kind(), finding.status.alert_severity())
            .with_member(finding.member_id.clone())
            .with_zone(finding.zone_id)
            .with_finding(finding.kind.as_str())
            .with_data("distance_m", serde_json::json!(finding.distance_m.round()))
            .with_action("locate");
        alerts.submit_at(input, report.generated_at).await;
    }
    for hit in &hits {
        alerts.submit_at(proximity_input(hit), report.generated_at).await;
    }

    let status = report.status;
    // Receivers may all be gone; the monitor keeps running for the alerts.
    let _ = report_tx.send(report);
    status
}

fn proximity_input(hit: &ProximityHit) -> AlertInput {
    AlertInput::new(AlertKind::Proximity, AlertSeverity::Warning)
        .with_member(hit.member_id.clone())
        .with_finding("proximity")
        .with_data("distance_m", serde_json::json!(hit.distance_m.round()))
        .with_action("locate")
}
