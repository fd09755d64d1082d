//! Offline batch-inference scheduler for heterogeneous NPU fleets.
//!
//! Given a fixed fleet of inference servers, a user population with request
//! windows and sample budgets, and a server×user latency matrix, the crate
//! produces for every user an ordered list of `(send_time, server, npu,
//! batch)` requests covering all of its samples. The dispatcher is a
//! single-threaded event loop over simulated time, deterministic up to one
//! seeded PRNG used for top-k exploration.

pub mod catalog;
pub mod config;
pub mod input;
pub mod metrics;
pub mod plan;
pub mod scheduler;
pub mod validate;

pub use catalog::{Catalog, B_MAX, MAX_REQUESTS_PER_USER};
pub use config::SchedConfig;
pub use input::{parse_instance, Instance, ParseError};
pub use metrics::RunMetrics;
pub use plan::{Plan, ScheduledRequest};
pub use scheduler::{run, DriverOutcome};
