//! Scheduling binary: reads an instance from stdin, writes the plan to
//! stdout. Logs go to stderr so the plan stream stays bit-exact.
//!
//! Environment:
//! - `RUST_LOG`: tracing filter (default `info`).
//! - `NPUSCHED_SEED`: u64 PRNG seed for reproducible runs; fresh entropy
//!   when unset.

use std::io::{self, BufWriter, Read, Write};

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use npusched::{parse_instance, scheduler, Catalog, SchedConfig};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
}

fn rng_from_env() -> anyhow::Result<StdRng> {
    match std::env::var("NPUSCHED_SEED") {
        Ok(value) => {
            let seed: u64 = value
                .parse()
                .with_context(|| format!("NPUSCHED_SEED must be a u64, got `{value}`"))?;
            Ok(StdRng::seed_from_u64(seed))
        }
        Err(_) => Ok(StdRng::from_entropy()),
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("reading instance from stdin")?;
    let instance = parse_instance(&text).context("malformed instance")?;
    let catalog = Catalog::from_instance(instance);

    let mut rng = rng_from_env()?;
    let cfg = SchedConfig::default();
    let outcome = scheduler::run(&catalog, &cfg, &mut rng);
    outcome.metrics.log_summary();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    outcome.plan.write_to(&mut out).context("writing plan")?;
    out.flush().context("flushing plan")?;
    Ok(())
}
