//! Plan replay and validation.
//!
//! The replay walks a plan in commit order and re-simulates NPU occupancy
//! from scratch, recomputing the `free_at` and `utilization` trajectories
//! the dispatcher produced. Along the way it enforces every structural
//! guarantee a plan must carry: batch caps, request-count bounds, window
//! containment, and per-user resend spacing. A contest-style score over
//! the replayed schedule is provided for grading experiments.

use thiserror::Error;

use crate::catalog::{Catalog, MAX_REQUESTS_PER_USER};
use crate::plan::Plan;

/// Structural defects a replay can surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanViolation {
    #[error("user {user}: {count} requests exceed the limit of {limit}")]
    TooManyRequests {
        user: usize,
        count: usize,
        limit: usize,
    },
    #[error("user {user} request {index}: no NPU {npu_id} on server {server_id}")]
    UnknownNpu {
        user: usize,
        index: usize,
        server_id: usize,
        npu_id: usize,
    },
    #[error("user {user} request {index}: batch {batch} outside (0, {cap}]")]
    BatchOutOfRange {
        user: usize,
        index: usize,
        batch: i64,
        cap: i64,
    },
    #[error("user {user} request {index}: sent at {send} before the window opens at {window_start}")]
    SendBeforeWindow {
        user: usize,
        index: usize,
        send: i64,
        window_start: i64,
    },
    #[error("user {user} request {index}: sent at {send}, earliest legal resend is {earliest}")]
    ResendTooEarly {
        user: usize,
        index: usize,
        send: i64,
        earliest: i64,
    },
}

/// Trajectories reconstructed from a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Final idle time per NPU.
    pub free_at: Vec<i64>,
    /// Accumulated busy time per NPU.
    pub utilization: Vec<i64>,
    /// Latest request finish per user, `None` for users with no requests.
    pub user_finish: Vec<Option<i64>>,
    /// Per-user count of (server, NPU) changes between consecutive requests.
    pub migrations: Vec<u64>,
}

/// Re-simulate a plan and verify its structural invariants.
pub fn replay(catalog: &Catalog, plan: &Plan) -> Result<Replay, PlanViolation> {
    let mut free_at = vec![0i64; catalog.npu_count()];
    let mut utilization = vec![0i64; catalog.npu_count()];
    let mut user_finish = vec![None; catalog.user_count()];
    let mut migrations = vec![0u64; catalog.user_count()];

    // Per-user walk position: request index, previous (send, server index),
    // and previous (server_id, npu_id) slot.
    let mut seen = vec![0usize; catalog.user_count()];
    let mut prev_send: Vec<Option<(i64, usize)>> = vec![None; catalog.user_count()];
    let mut prev_slot: Vec<Option<(usize, usize)>> = vec![None; catalog.user_count()];

    for req in plan.entries() {
        let user = req.user;
        let index = seen[user];
        seen[user] += 1;
        if seen[user] > MAX_REQUESTS_PER_USER {
            return Err(PlanViolation::TooManyRequests {
                user,
                count: seen[user],
                limit: MAX_REQUESTS_PER_USER,
            });
        }

        let npu = catalog
            .npu_index(req.server_id, req.npu_id)
            .ok_or(PlanViolation::UnknownNpu {
                user,
                index,
                server_id: req.server_id,
                npu_id: req.npu_id,
            })?;
        let server_idx = req.server_id - 1;
        let cap = catalog.mem_cap(server_idx, user);
        if req.batch < 1 || req.batch > cap {
            return Err(PlanViolation::BatchOutOfRange {
                user,
                index,
                batch: req.batch,
                cap,
            });
        }

        let spec = &catalog.users()[user];
        if req.send_time < spec.window_start {
            return Err(PlanViolation::SendBeforeWindow {
                user,
                index,
                send: req.send_time,
                window_start: spec.window_start,
            });
        }
        if let Some((send, server)) = prev_send[user] {
            let earliest = send + catalog.latency(server, user) + 1;
            if req.send_time < earliest {
                return Err(PlanViolation::ResendTooEarly {
                    user,
                    index,
                    send: req.send_time,
                    earliest,
                });
            }
        }
        prev_send[user] = Some((req.send_time, server_idx));

        if let Some(last) = prev_slot[user] {
            if last != (req.server_id, req.npu_id) {
                migrations[user] += 1;
            }
        }
        prev_slot[user] = Some((req.server_id, req.npu_id));

        let server = &catalog.servers()[server_idx];
        let arrival = req.send_time + catalog.latency(server_idx, user);
        let start = arrival.max(free_at[npu]);
        let finish = start + server.inference_time(req.batch);
        utilization[npu] += finish - start;
        free_at[npu] = finish;
        user_finish[user] = Some(user_finish[user].map_or(finish, |f: i64| f.max(finish)));
    }

    Ok(Replay {
        free_at,
        utilization,
        user_finish,
        migrations,
    })
}

/// Per-user sample deficit: requested minus scheduled. Zero everywhere on
/// feasible instances; positive entries mark users the dispatcher had to
/// surrender on.
pub fn deficits(catalog: &Catalog, plan: &Plan) -> Vec<i64> {
    catalog
        .users()
        .iter()
        .enumerate()
        .map(|(u, spec)| spec.samples - plan.scheduled_samples(u))
        .collect()
}

/// Contest-style score of a replayed plan: each served user contributes
/// `10_000 * 2^(-delay_ratio/100) * 2^(-migrations/200)`, and the total is
/// discounted by `2^(-K/100)` over the `K` users finishing past deadline.
pub fn score(catalog: &Catalog, replay: &Replay) -> f64 {
    let mut total = 0.0;
    let mut overtime_users = 0u32;
    for (user, spec) in catalog.users().iter().enumerate() {
        let Some(finish) = replay.user_finish[user] else {
            continue;
        };
        if finish > spec.deadline {
            overtime_users += 1;
        }
        let window = (spec.deadline - spec.window_start).max(1) as f64;
        let delay_ratio = ((finish - spec.deadline).max(0)) as f64 / window;
        let h_delay = (2f64).powf(-delay_ratio / 100.0);
        let p_migration = (2f64).powf(-(replay.migrations[user] as f64) / 200.0);
        total += h_delay * p_migration * 10_000.0;
    }
    (2f64).powf(-f64::from(overtime_users) / 100.0) * total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedConfig;
    use crate::input::{Instance, RawServer, RawUser};
    use crate::plan::ScheduledRequest;
    use crate::scheduler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> Catalog {
        Catalog::from_instance(Instance {
            servers: vec![
                RawServer {
                    npu_count: 1,
                    speed: 1,
                    memory: 100,
                },
                RawServer {
                    npu_count: 2,
                    speed: 2,
                    memory: 100,
                },
            ],
            users: vec![
                RawUser {
                    window_start: 0,
                    deadline: 10_000,
                    samples: 60,
                },
                RawUser {
                    window_start: 0,
                    deadline: 8_000,
                    samples: 40,
                },
            ],
            latency: vec![vec![1, 2], vec![2, 1]],
            memory_params: vec![(1, 0), (2, 0)],
        })
    }

    #[test]
    fn replay_matches_a_live_run() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(11);
        let outcome = scheduler::run(&catalog, &SchedConfig::default(), &mut rng);
        assert_eq!(outcome.metrics.unscheduled_samples, 0);

        let replay = replay(&catalog, &outcome.plan).unwrap();
        let live_free: Vec<i64> = outcome.npus.iter().map(|n| n.free_at).collect();
        let live_util: Vec<i64> = outcome.npus.iter().map(|n| n.utilization).collect();
        assert_eq!(replay.free_at, live_free);
        assert_eq!(replay.utilization, live_util);
        assert_eq!(
            replay.migrations.iter().sum::<u64>(),
            outcome.metrics.migrations
        );
        assert_eq!(
            replay.user_finish.iter().flatten().copied().max().unwrap(),
            outcome.metrics.makespan
        );
    }

    #[test]
    fn rejects_batch_above_cap() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 1,
            send_time: 0,
            server_id: 1,
            npu_id: 1,
            batch: 60, // cap for user 2 on server 1 is 50
        });
        assert_eq!(
            replay(&catalog, &plan).unwrap_err(),
            PlanViolation::BatchOutOfRange {
                user: 1,
                index: 0,
                batch: 60,
                cap: 50,
            }
        );
    }

    #[test]
    fn rejects_premature_resend() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 0,
            send_time: 0,
            server_id: 1,
            npu_id: 1,
            batch: 10,
        });
        // latency(server 1, user 1) = 1, so the earliest resend is 2.
        plan.push(ScheduledRequest {
            user: 0,
            send_time: 1,
            server_id: 1,
            npu_id: 1,
            batch: 10,
        });
        assert_eq!(
            replay(&catalog, &plan).unwrap_err(),
            PlanViolation::ResendTooEarly {
                user: 0,
                index: 1,
                send: 1,
                earliest: 2,
            }
        );
    }

    #[test]
    fn rejects_send_before_window_and_unknown_npu() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 0,
            send_time: -1,
            server_id: 1,
            npu_id: 1,
            batch: 1,
        });
        assert!(matches!(
            replay(&catalog, &plan).unwrap_err(),
            PlanViolation::SendBeforeWindow { .. }
        ));

        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 0,
            send_time: 0,
            server_id: 1,
            npu_id: 2,
            batch: 1,
        });
        assert!(matches!(
            replay(&catalog, &plan).unwrap_err(),
            PlanViolation::UnknownNpu { .. }
        ));
    }

    #[test]
    fn counts_migrations_between_slots() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        for (i, (server_id, npu_id)) in [(1, 1), (2, 1), (2, 2), (2, 2)].iter().enumerate() {
            plan.push(ScheduledRequest {
                user: 0,
                send_time: (i as i64) * 10,
                server_id: *server_id,
                npu_id: *npu_id,
                batch: 5,
            });
        }
        let replay = replay(&catalog, &plan).unwrap();
        assert_eq!(replay.migrations[0], 2);
    }

    #[test]
    fn deficits_report_unscheduled_samples() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 0,
            send_time: 0,
            server_id: 1,
            npu_id: 1,
            batch: 25,
        });
        assert_eq!(deficits(&catalog, &plan), vec![35, 40]);
    }

    #[test]
    fn on_time_single_slot_user_scores_full_marks() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 0,
            send_time: 0,
            server_id: 1,
            npu_id: 1,
            batch: 60,
        });
        let replay = replay(&catalog, &plan).unwrap();
        let s = score(&catalog, &replay);
        // One user on time with no migrations, the other unserved.
        assert!((s - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn late_finishes_are_discounted() {
        let catalog = catalog();
        let mut plan = Plan::new(2);
        plan.push(ScheduledRequest {
            user: 0,
            send_time: 20_000,
            server_id: 1,
            npu_id: 1,
            batch: 60,
        });
        let replay = replay(&catalog, &plan).unwrap();
        assert!(score(&catalog, &replay) < 10_000.0);
    }
}
