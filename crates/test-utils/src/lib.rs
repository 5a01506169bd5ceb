pub mod builders;
pub mod recording;

use std::num::NonZeroUsize;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};
use workgraph::ExecutionConfig;
use workgraph::types::FailurePolicy;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// `NonZeroUsize` from a literal; panics on 0.
pub fn workers(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("worker count must be >= 1")
}

/// Execution settings with `n` workers and the given policy.
pub fn config(n: usize, policy: FailurePolicy) -> ExecutionConfig {
    ExecutionConfig::default()
        .with_max_workers(workers(n))
        .with_failure_policy(policy)
}
