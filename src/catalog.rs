//! Static problem description shared by all scheduler stages.
//!
//! The catalog is built once from a parsed [`Instance`] and never mutated
//! afterwards. It owns the server fleet, the user population, the
//! server×user latency matrix, and two derived tables: the per-server
//! efficiency curve over every admissible batch size and the per-(server,
//! user) memory-bounded batch cap. All run-time state (remaining samples,
//! NPU occupancy) lives elsewhere.

use crate::input::Instance;

/// Upper cap on a single inference batch.
pub const B_MAX: i64 = 1000;

/// Hard limit on requests emitted per user.
pub const MAX_REQUESTS_PER_USER: usize = 300;

/// Stand-in duration for batches a zero-speed server can never finish.
/// Large enough to dominate any real schedule, small enough that
/// `start + UNREACHABLE_MS` stays far from `i64::MAX`.
const UNREACHABLE_MS: i64 = 1 << 42;

/// Wall-clock cost in milliseconds of one batch on a server with speed
/// coefficient `speed`: `ceil(batch / (speed * sqrt(batch)))`, floored at 1.
pub fn inference_time(batch: i64, speed: i64) -> i64 {
    if batch <= 0 {
        return 0;
    }
    let b = batch as f64;
    let t = b / (speed as f64 * b.sqrt());
    if !t.is_finite() {
        return UNREACHABLE_MS;
    }
    (t.ceil() as i64).max(1)
}

/// Samples processed per millisecond for a given batch size.
pub fn efficiency(batch: i64, speed: i64) -> f64 {
    if batch <= 0 {
        return 0.0;
    }
    batch as f64 / inference_time(batch, speed) as f64
}

/// One inference server with its precomputed efficiency curve.
#[derive(Debug, Clone)]
pub struct Server {
    /// 1-based identifier, as emitted in the output plan.
    pub id: usize,
    pub npu_count: usize,
    /// Speed coefficient `k`.
    pub speed: i64,
    /// Memory size `m`.
    pub memory: i64,
    /// `efficiency[b]` for `b in 0..=B_MAX` (index 0 unused).
    efficiency: Vec<f64>,
    /// `inference_time[b]` for `b in 0..=B_MAX` (index 0 unused).
    inference_time: Vec<i64>,
    /// Batch in `[1, B_MAX]` with the highest efficiency on this server.
    pub optimal_b: i64,
}

impl Server {
    fn new(id: usize, npu_count: usize, speed: i64, memory: i64) -> Self {
        let mut eff = vec![0.0; (B_MAX + 1) as usize];
        let mut times = vec![0i64; (B_MAX + 1) as usize];
        let mut optimal_b = 1;
        let mut best = 0.0;
        for b in 1..=B_MAX {
            times[b as usize] = inference_time(b, speed);
            eff[b as usize] = efficiency(b, speed);
            if eff[b as usize] > best {
                best = eff[b as usize];
                optimal_b = b;
            }
        }
        Server {
            id,
            npu_count,
            speed,
            memory,
            efficiency: eff,
            inference_time: times,
            optimal_b,
        }
    }

    /// Precomputed efficiency for `batch`, which must lie in `[1, B_MAX]`.
    pub fn efficiency(&self, batch: i64) -> f64 {
        self.efficiency[batch as usize]
    }

    /// Precomputed inference duration for `batch` in `[1, B_MAX]`.
    pub fn inference_time(&self, batch: i64) -> i64 {
        self.inference_time[batch as usize]
    }
}

/// Static description of one user.
#[derive(Debug, Clone)]
pub struct UserSpec {
    /// 1-based identifier, as emitted in the output plan.
    pub id: usize,
    /// Start of the request window (inclusive).
    pub window_start: i64,
    /// Target completion time (exclusive); finishing later is penalized.
    pub deadline: i64,
    /// Total samples to schedule.
    pub samples: i64,
    /// Memory model slope `a` in `mem = a * batch + b`.
    pub mem_slope: i64,
    /// Memory model intercept `b`.
    pub mem_intercept: i64,
}

/// One compute slot. NPUs are flattened across servers in
/// (server ascending, index ascending) order.
#[derive(Debug, Clone, Copy)]
pub struct NpuSlot {
    /// Index into [`Catalog::servers`].
    pub server: usize,
    /// 1-based index within the owning server, as emitted in the plan.
    pub index_in_server: usize,
}

/// Immutable problem catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    servers: Vec<Server>,
    users: Vec<UserSpec>,
    /// `latency[server][user]` in milliseconds.
    latency: Vec<Vec<i64>>,
    /// `mem_cap[server][user]`, clamped to `[0, B_MAX]`; 0 means the pair
    /// is infeasible.
    mem_cap: Vec<Vec<i64>>,
    npus: Vec<NpuSlot>,
    /// Flat NPU index of each server's first slot.
    npu_offsets: Vec<usize>,
}

impl Catalog {
    pub fn from_instance(inst: Instance) -> Catalog {
        let servers: Vec<Server> = inst
            .servers
            .iter()
            .enumerate()
            .map(|(i, s)| Server::new(i + 1, s.npu_count.max(0) as usize, s.speed, s.memory))
            .collect();

        let users: Vec<UserSpec> = inst
            .users
            .iter()
            .zip(&inst.memory_params)
            .enumerate()
            .map(|(i, (u, &(a, b)))| UserSpec {
                id: i + 1,
                window_start: u.window_start,
                deadline: u.deadline,
                samples: u.samples,
                mem_slope: a,
                mem_intercept: b,
            })
            .collect();

        let mem_cap = servers
            .iter()
            .map(|s| {
                users
                    .iter()
                    .map(|u| memory_cap(s.memory, u.mem_slope, u.mem_intercept))
                    .collect()
            })
            .collect();

        let mut npus = Vec::new();
        let mut npu_offsets = Vec::with_capacity(servers.len());
        for (si, server) in servers.iter().enumerate() {
            npu_offsets.push(npus.len());
            for j in 0..server.npu_count {
                npus.push(NpuSlot {
                    server: si,
                    index_in_server: j + 1,
                });
            }
        }

        Catalog {
            servers,
            users,
            latency: inst.latency,
            mem_cap,
            npus,
            npu_offsets,
        }
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn users(&self) -> &[UserSpec] {
        &self.users
    }

    pub fn npus(&self) -> &[NpuSlot] {
        &self.npus
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn npu_count(&self) -> usize {
        self.npus.len()
    }

    /// Network latency between a server (by index) and a user (by index).
    pub fn latency(&self, server: usize, user: usize) -> i64 {
        self.latency[server][user]
    }

    /// Memory-bounded batch cap for a (server, user) pair; 0 = infeasible.
    pub fn mem_cap(&self, server: usize, user: usize) -> i64 {
        self.mem_cap[server][user]
    }

    /// Largest memory cap any server offers this user.
    pub fn max_mem_cap(&self, user: usize) -> i64 {
        self.mem_cap.iter().map(|row| row[user]).max().unwrap_or(0)
    }

    /// Flat NPU index for 1-based `(server_id, npu_id)` coordinates, as
    /// they appear in an emitted plan.
    pub fn npu_index(&self, server_id: usize, npu_id: usize) -> Option<usize> {
        let server = self.servers.get(server_id.checked_sub(1)?)?;
        if npu_id == 0 || npu_id > server.npu_count {
            return None;
        }
        Some(self.npu_offsets[server_id - 1] + npu_id - 1)
    }
}

/// Memory-bounded batch cap: `B_MAX` when the slope is zero, otherwise
/// `(m - b) / a` clamped to `[0, B_MAX]`.
fn memory_cap(memory: i64, slope: i64, intercept: i64) -> i64 {
    if slope == 0 {
        return B_MAX;
    }
    ((memory - intercept) / slope).clamp(0, B_MAX)
}
