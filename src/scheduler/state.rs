//! Mutable run-time state: the simulated clock, user progress, and NPU
//! occupancy. All mutation funnels through [`LiveState::commit`] and
//! [`LiveState::break_deadlock`], one of which runs exactly once per epoch.

use crate::catalog::Catalog;
use crate::plan::{Plan, ScheduledRequest};
use crate::scheduler::cost::Candidate;

/// Per-user mutable state.
#[derive(Debug, Clone)]
pub struct UserState {
    /// Samples not yet covered by a committed request.
    pub remaining: i64,
    /// Earliest time the user may send its next request.
    pub next_send_time: i64,
    /// Server id (1-based) of the previous request, if any.
    pub last_server_id: Option<usize>,
    /// NPU id within that server (1-based) of the previous request.
    pub last_npu_id: Option<usize>,
    /// Backlog pressure, refreshed each epoch.
    pub urgency: f64,
}

/// Per-NPU mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpuState {
    /// Time at which the slot next becomes idle.
    pub free_at: i64,
    /// Accumulated busy milliseconds, used for load balancing.
    pub utilization: i64,
}

/// All mutable arrays owned by the driver.
#[derive(Debug, Clone)]
pub struct LiveState {
    pub users: Vec<UserState>,
    pub npus: Vec<NpuState>,
}

impl LiveState {
    pub fn new(catalog: &Catalog) -> Self {
        let users = catalog
            .users()
            .iter()
            .map(|u| UserState {
                remaining: u.samples,
                next_send_time: u.window_start,
                last_server_id: None,
                last_npu_id: None,
                urgency: 0.0,
            })
            .collect();
        let npus = vec![
            NpuState {
                free_at: 0,
                utilization: 0,
            };
            catalog.npu_count()
        ];
        LiveState { users, npus }
    }

    pub fn total_remaining(&self) -> i64 {
        self.users.iter().map(|u| u.remaining.max(0)).sum()
    }

    /// Next decision epoch: the earliest pending send time among users with
    /// work left. `None` means the run is over.
    pub fn current_time(&self) -> Option<i64> {
        self.users
            .iter()
            .filter(|u| u.remaining > 0)
            .map(|u| u.next_send_time)
            .min()
    }

    /// Recompute every user's urgency for the epoch at `now`:
    /// `remaining / max(1, deadline - now)`, zero for finished users.
    pub fn refresh_urgency(&mut self, catalog: &Catalog, now: i64) {
        for (user, spec) in self.users.iter_mut().zip(catalog.users()) {
            if user.remaining <= 0 {
                user.urgency = 0.0;
            } else {
                let slack = (spec.deadline - now).max(1);
                user.urgency = user.remaining as f64 / slack as f64;
            }
        }
    }

    /// Users able to send at `now`, ordered by decreasing urgency (ties
    /// keep ascending index). The ordering only affects tie-breaking in
    /// the selector, not which assignments are feasible.
    pub fn ready_users(&self, now: i64) -> Vec<usize> {
        let mut ready: Vec<usize> = self
            .users
            .iter()
            .enumerate()
            .filter(|(_, u)| u.remaining > 0 && u.next_send_time <= now)
            .map(|(i, _)| i)
            .collect();
        ready.sort_by(|&a, &b| {
            self.users[b]
                .urgency
                .partial_cmp(&self.users[a].urgency)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ready
    }

    /// Mean accumulated utilization over all NPUs.
    pub fn mean_utilization(&self) -> f64 {
        if self.npus.is_empty() {
            return 0.0;
        }
        self.npus.iter().map(|n| n.utilization as f64).sum::<f64>() / self.npus.len() as f64
    }

    /// Apply the winning assignment: append it to the plan and update user
    /// and NPU state. Returns true when the request moved the user off its
    /// previous NPU.
    pub fn commit(&mut self, catalog: &Catalog, plan: &mut Plan, winner: &Candidate) -> bool {
        let slot = catalog.npus()[winner.npu];
        let server = &catalog.servers()[slot.server];
        let latency = catalog.latency(slot.server, winner.user);

        let user = &mut self.users[winner.user];
        let send_time = user.next_send_time;

        let migrated = match (user.last_server_id, user.last_npu_id) {
            (Some(s), Some(n)) => s != server.id || n != slot.index_in_server,
            _ => false,
        };

        plan.push(ScheduledRequest {
            user: winner.user,
            send_time,
            server_id: server.id,
            npu_id: slot.index_in_server,
            batch: winner.batch,
        });

        user.remaining -= winner.batch;
        user.last_server_id = Some(server.id);
        user.last_npu_id = Some(slot.index_in_server);
        // The response travels back over the same link; the user may resend
        // one tick after it arrives.
        user.next_send_time = send_time + latency + 1;

        let npu = &mut self.npus[winner.npu];
        let start = (send_time + latency).max(npu.free_at);
        npu.utilization += winner.finish - start;
        npu.free_at = winner.finish;

        migrated
    }

    /// No ready user had a feasible NPU this epoch: advance the first stuck
    /// user's clock to the next NPU release so `now` keeps moving. Returns
    /// the new time, or `None` when every NPU is already idle and the run
    /// must stop.
    pub fn break_deadlock(&mut self, now: i64) -> Option<i64> {
        let t_next = self
            .npus
            .iter()
            .map(|n| n.free_at)
            .filter(|&t| t > now)
            .min()?;
        let stuck = self
            .users
            .iter_mut()
            .find(|u| u.remaining > 0 && u.next_send_time <= now)?;
        stuck.next_send_time = t_next;
        Some(t_next)
    }
}
