//! Run summary counters collected by the driver.

use serde::Serialize;
use tracing::info;

/// Aggregate statistics for one scheduling run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    /// Decision epochs executed (commits plus deadlock handling).
    pub epochs: u64,
    /// Requests committed to the plan.
    pub commits: u64,
    /// Times a stuck user's clock was force-advanced.
    pub deadlock_breaks: u64,
    /// Commits that moved a user off its previous NPU.
    pub migrations: u64,
    /// Latest projected finish time across all commits.
    pub makespan: i64,
    /// Samples left unscheduled at termination (0 on feasible instances).
    pub unscheduled_samples: i64,
    /// Mean accumulated NPU busy time at the end of the run.
    pub mean_utilization: f64,
    /// Busiest NPU's accumulated busy time.
    pub max_utilization: i64,
}

impl RunMetrics {
    /// Emit the one-line run summary.
    pub fn log_summary(&self) {
        info!(
            epochs = self.epochs,
            commits = self.commits,
            deadlock_breaks = self.deadlock_breaks,
            migrations = self.migrations,
            makespan = self.makespan,
            unscheduled_samples = self.unscheduled_samples,
            mean_utilization = self.mean_utilization,
            max_utilization = self.max_utilization,
            "scheduling run complete"
        );
    }
}
