//! Shared fixtures for the logictree integration tests: job builders,
//! recording plugins, a scripted executor backend and [`CoreHarness`].

pub mod builders;
pub mod fake_executor;
pub mod harness;
pub mod plugins;

pub use harness::CoreHarness;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Upper bound for a whole runtime test; checks themselves finish in
/// milliseconds.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured tracing output for tests, `logictree=debug` unless `RUST_LOG`
/// says otherwise. Shown only for failing tests (or with `--nocapture`).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,logictree=debug"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`] so a runtime that never goes
/// idle fails the test instead of hanging it.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("runtime did not stop within {TEST_TIMEOUT:?}"),
    }
}
