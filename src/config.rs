//! Cost-weight configuration for the dispatcher.
//!
//! All scoring knobs live in one record so alternative strategies are a
//! matter of constants: zeroing `size_bonus` recovers the pure
//! efficiency-max batch search, zeroing `migration_penalty` and
//! `load_weight` recovers the greedy finish-time dispatcher.

use serde::{Deserialize, Serialize};

use crate::catalog::MAX_REQUESTS_PER_USER;

/// Tunable weights and thresholds for batch planning, cost evaluation, and
/// candidate selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedConfig {
    /// Weight on the exponential deadline-overshoot penalty.
    pub deadline_weight: f64,
    /// Base penalty for moving a user off its previous NPU; doubled for a
    /// server change and ramped with the number of requests already sent.
    pub migration_penalty: f64,
    /// Per-millisecond penalty for landing on an over-utilized NPU.
    pub load_weight: f64,
    /// Strength of the efficiency reward divisor.
    pub efficiency_weight: f64,
    /// Coefficient of the `sqrt(batch)` bonus in the batch search score.
    pub size_bonus: f64,
    /// Deadline slack (ms) below which a user counts as time-pressed.
    pub urgent_slack: i64,
    /// Urgency level above which a user counts as backlogged.
    pub urgent_threshold: f64,
    /// Simulated time after which selection widens to the top five.
    pub late_phase_start: i64,
    /// Candidate pool size for stochastic selection in the normal phase.
    pub top_k: usize,
    /// Hard limit on requests per user.
    pub max_requests_per_user: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            deadline_weight: 10_000.0,
            migration_penalty: 30.0,
            load_weight: 5.0,
            efficiency_weight: 50.0,
            size_bonus: 0.1,
            urgent_slack: 3_000,
            urgent_threshold: 0.8,
            late_phase_start: 30_000,
            top_k: 1,
            max_requests_per_user: MAX_REQUESTS_PER_USER,
        }
    }
}

impl SchedConfig {
    /// Fully deterministic selection: always commit the cheapest candidate.
    #[must_use]
    pub fn deterministic() -> Self {
        SchedConfig {
            top_k: 1,
            ..SchedConfig::default()
        }
    }

    /// Wider stochastic exploration over the five cheapest candidates.
    #[must_use]
    pub fn exploratory() -> Self {
        SchedConfig {
            top_k: 5,
            ..SchedConfig::default()
        }
    }

    /// Override the stochastic pool size.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Override the migration penalty.
    #[must_use]
    pub fn with_migration_penalty(mut self, penalty: f64) -> Self {
        self.migration_penalty = penalty;
        self
    }

    /// Override the per-user request limit.
    #[must_use]
    pub fn with_max_requests(mut self, limit: usize) -> Self {
        self.max_requests_per_user = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_weights() {
        let cfg = SchedConfig::default();
        assert_eq!(cfg.deadline_weight, 10_000.0);
        assert_eq!(cfg.migration_penalty, 30.0);
        assert_eq!(cfg.load_weight, 5.0);
        assert_eq!(cfg.efficiency_weight, 50.0);
        assert_eq!(cfg.size_bonus, 0.1);
        assert_eq!(cfg.urgent_slack, 3_000);
        assert_eq!(cfg.urgent_threshold, 0.8);
        assert_eq!(cfg.late_phase_start, 30_000);
        assert_eq!(cfg.top_k, 1);
        assert_eq!(cfg.max_requests_per_user, 300);
    }

    #[test]
    fn presets_and_builders() {
        assert_eq!(SchedConfig::deterministic().top_k, 1);
        assert_eq!(SchedConfig::exploratory().top_k, 5);
        assert_eq!(SchedConfig::default().with_top_k(0).top_k, 1);
        assert_eq!(
            SchedConfig::default().with_migration_penalty(0.0).migration_penalty,
            0.0
        );
        assert_eq!(SchedConfig::default().with_max_requests(2).max_requests_per_user, 2);
    }
}
