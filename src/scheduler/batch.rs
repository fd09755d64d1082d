//! Batch planning for one (server, user) pair.
//!
//! The planner balances three constraints: the remaining-request budget
//! imposes a floor (a user must never strand samples it can no longer fit
//! into its allowed request count), the memory cap imposes a ceiling, and
//! within that range the batch maximizes server efficiency plus a mild
//! square-root size bonus. Users under real time pressure skip the search
//! and drain most of their backlog in one request.

use crate::catalog::Server;
use crate::config::SchedConfig;

/// Smallest admissible batch for a user with `remaining` samples after
/// `sent` requests: spreading the rest evenly over the remaining request
/// budget, or everything at once when the budget is spent.
pub fn min_batch(remaining: i64, sent: usize, max_requests: usize) -> i64 {
    let budget = max_requests.saturating_sub(sent) as i64;
    if budget > 0 {
        ((remaining + budget - 1) / budget).max(1)
    } else if remaining > 0 {
        remaining
    } else {
        1
    }
}

/// Pick the batch for a candidate assignment, or `None` when the memory
/// cap cannot accommodate the request-budget floor this epoch.
pub fn plan_batch(
    server: &Server,
    mem_cap: i64,
    remaining: i64,
    min_b: i64,
    deadline_slack: i64,
    urgency: f64,
    cfg: &SchedConfig,
) -> Option<i64> {
    let search_limit = remaining.min(mem_cap);
    if search_limit < min_b || search_limit <= 0 {
        return None;
    }

    // A pressed user both short on slack and carrying a backlog does not
    // optimize for throughput; it drains 90% of what is left in one shot.
    if deadline_slack < cfg.urgent_slack && urgency > cfg.urgent_threshold {
        let bulk = (remaining as f64 * 0.9).floor() as i64;
        return Some(min_b.max(bulk).min(search_limit));
    }

    let mut best_b = min_b;
    let mut best_score = f64::NEG_INFINITY;
    for b in min_b..=search_limit {
        let score = server.efficiency(b) + (b as f64).sqrt() * cfg.size_bonus;
        // Strict comparison: ties go to the smaller batch.
        if score > best_score {
            best_score = score;
            best_b = b;
        }
    }
    Some(best_b)
}
