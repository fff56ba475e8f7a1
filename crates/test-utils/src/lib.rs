//! Shared fixtures for phasedag integration tests.

pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use phasedag::logging::LOG_ENV_VAR;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{diamond, task, ConfigFileBuilder, WorkConfigBuilder};
pub use fake_executor::{ExecutionRecord, RecordingExecutor};

/// Upper bound for any single awaited run in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured by the harness and shown for failing tests only.
/// The filter is read from `PHASEDAG_LOG` (e.g. `PHASEDAG_LOG=phasedag=debug`),
/// defaulting to `warn`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another harness may have installed one already.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test future did not finish within {TEST_TIMEOUT:?}"),
    }
}
