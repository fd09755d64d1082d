//! The epoch loop.
//!
//! ```text
//! while any user has samples left:
//!     now   = earliest pending send time          (stop if none)
//!     ready = users able to send at now, by urgency
//!     M     = batch-plan + score every (ready user, NPU) pair
//!     if M is non-empty: commit the selected assignment
//!     else:              force-advance one stuck user past the next
//!                        NPU release (stop if every NPU is idle)
//! ```

use rand::rngs::StdRng;
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::config::SchedConfig;
use crate::metrics::RunMetrics;
use crate::plan::Plan;
use crate::scheduler::state::{LiveState, NpuState};
use crate::scheduler::{cost, select};

/// Result of a full scheduling run.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub plan: Plan,
    pub metrics: RunMetrics,
    /// Final NPU occupancy, for replay checks and reporting.
    pub npus: Vec<NpuState>,
}

/// Run the dispatcher to completion over a catalog.
pub fn run(catalog: &Catalog, cfg: &SchedConfig, rng: &mut StdRng) -> DriverOutcome {
    let mut state = LiveState::new(catalog);
    let mut plan = Plan::new(catalog.user_count());
    let mut metrics = RunMetrics::default();

    while state.total_remaining() > 0 {
        let Some(now) = state.current_time() else {
            break;
        };
        metrics.epochs += 1;

        state.refresh_urgency(catalog, now);
        let ready = state.ready_users(now);
        let candidates = cost::candidate_matrix(catalog, cfg, &state, &plan, &ready, now);

        match select::select(candidates, &state, &ready, cfg, now, rng) {
            Some(winner) => {
                let migrated = state.commit(catalog, &mut plan, &winner);
                metrics.commits += 1;
                if migrated {
                    metrics.migrations += 1;
                }
                metrics.makespan = metrics.makespan.max(winner.finish);
                trace!(
                    now,
                    user = winner.user + 1,
                    npu = winner.npu,
                    batch = winner.batch,
                    finish = winner.finish,
                    "committed request"
                );
            }
            None => match state.break_deadlock(now) {
                Some(advanced_to) => {
                    metrics.deadlock_breaks += 1;
                    debug!(now, advanced_to, "no feasible assignment, advancing a stuck user");
                }
                None => {
                    debug!(now, "no feasible assignment and no pending NPU release, stopping");
                    break;
                }
            },
        }
    }

    metrics.unscheduled_samples = state.total_remaining();
    metrics.mean_utilization = state.mean_utilization();
    metrics.max_utilization = state.npus.iter().map(|n| n.utilization).max().unwrap_or(0);

    DriverOutcome {
        plan,
        metrics,
        npus: state.npus,
    }
}
