//! Composite cost evaluation for candidate assignments.
//!
//! For each (ready user, NPU) pair the evaluator asks the batch planner for
//! a batch, projects the finish time against the NPU's occupancy, and folds
//! deadline overshoot, backlog pressure, efficiency, migration, load
//! balance, and batch size into a single scalar. Lower is better; `None`
//! means the pair cannot host a request this epoch.

use rayon::prelude::*;

use crate::catalog::Catalog;
use crate::config::SchedConfig;
use crate::plan::Plan;
use crate::scheduler::batch;
use crate::scheduler::state::LiveState;

/// A feasible assignment with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// User index (0-based).
    pub user: usize,
    /// Flat NPU index.
    pub npu: usize,
    pub cost: f64,
    pub batch: i64,
    /// Projected completion time of the request.
    pub finish: i64,
}

/// Score one (user, NPU) pair at epoch `now`.
///
/// `sent` and `min_b` are the user's emitted-request count and batch floor,
/// computed once per user by [`candidate_matrix`]; `mean_util` is the
/// epoch-wide mean NPU utilization.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    catalog: &Catalog,
    cfg: &SchedConfig,
    state: &LiveState,
    user: usize,
    npu: usize,
    now: i64,
    sent: usize,
    min_b: i64,
    mean_util: f64,
) -> Option<Candidate> {
    let slot = catalog.npus()[npu];
    let server = &catalog.servers()[slot.server];
    let cap = catalog.mem_cap(slot.server, user);
    if cap <= 0 {
        return None;
    }

    let live = &state.users[user];
    let spec = &catalog.users()[user];
    let slack = spec.deadline - now;
    let batch = batch::plan_batch(server, cap, live.remaining, min_b, slack, live.urgency, cfg)?;

    let send_time = live.next_send_time;
    let arrival = send_time + catalog.latency(slot.server, user);
    let start = arrival.max(state.npus[npu].free_at);
    let finish = start + server.inference_time(batch);

    let mut cost = finish as f64;

    // Deadline overshoot grows exponentially in the overshoot relative to
    // the window length.
    let over = finish - spec.deadline;
    if over > 0 {
        let ratio = over as f64 / (spec.deadline - spec.window_start).max(1) as f64;
        cost += cfg.deadline_weight * (2.0 * ratio).exp();
    }

    // Backlogged users pay a surcharge everywhere, which steers commits
    // toward pairs that clear their work early.
    if live.urgency > cfg.urgent_threshold {
        cost *= 1.0 + live.urgency * 0.2;
    }

    // Reward efficient batches.
    cost /= 1.0 + server.efficiency(batch) * cfg.efficiency_weight / 10_000.0;

    // Migration: doubled for a server change, ramped as the user's request
    // history grows; staying on the exact same slot earns a small discount.
    if let (Some(last_server), Some(last_npu)) = (live.last_server_id, live.last_npu_id) {
        let ramp = (1 + sent / 5) as f64;
        if last_server != server.id {
            cost += 2.0 * cfg.migration_penalty * ramp;
        } else if last_npu != slot.index_in_server {
            cost += cfg.migration_penalty * ramp;
        } else {
            cost *= 0.95;
        }
    }

    // Load balance relative to the fleet mean.
    let delta = state.npus[npu].utilization as f64 - mean_util;
    if delta > 0.0 {
        cost += delta * cfg.load_weight;
    } else {
        cost *= 1.0 + delta / 10_000.0;
    }

    // Mild global preference for larger batches.
    cost /= 1.0 + (batch as f64).sqrt() * 2.0 / 1000.0;

    Some(Candidate {
        user,
        npu,
        cost: cost.max(1.0),
        batch,
        finish,
    })
}

/// Evaluate the full candidate matrix for this epoch.
///
/// Users are scored in parallel but collected in the caller's enumeration
/// order (urgency-ranked users, then NPUs ascending), so the selector sees
/// the same deterministic sequence as a sequential scan.
pub fn candidate_matrix(
    catalog: &Catalog,
    cfg: &SchedConfig,
    state: &LiveState,
    plan: &Plan,
    ready: &[usize],
    now: i64,
) -> Vec<Candidate> {
    let mean_util = state.mean_utilization();
    let rows: Vec<Vec<Candidate>> = ready
        .par_iter()
        .map(|&user| {
            let sent = plan.request_count(user);
            let min_b = batch::min_batch(
                state.users[user].remaining,
                sent,
                cfg.max_requests_per_user,
            );
            (0..catalog.npu_count())
                .filter_map(|npu| {
                    evaluate(catalog, cfg, state, user, npu, now, sent, min_b, mean_util)
                })
                .collect()
        })
        .collect();
    rows.into_iter().flatten().collect()
}
