//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;

use energy_infrastructure::MetricsCollector;
use tokio::time::sleep;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    ///
    /// Polls on the tokio clock, so it also works with a paused runtime.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        while tokio::time::Instant::now() < deadline {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }

        condition().await
    }
}

/// Metrics collector for tests; without an installed recorder every call is a no-op
pub fn test_metrics() -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::new())
}
