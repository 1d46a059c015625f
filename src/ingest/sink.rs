use anyhow::{Context, Result};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::outcome::Backend;

/// Counter of commit attempts, labelled by `backend` and `outcome`.
pub const STORE_WRITES_TOTAL: &str = "store_writes_total";

/// Receives one increment per store per ingestion.
///
/// Implementations must tolerate concurrent calls from many requests.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn inc_success(&self, backend: Backend);
    fn inc_failure(&self, backend: Backend);
}

/// Records through the `metrics` facade, so whichever recorder the process
/// installed (Prometheus in production) receives the counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn inc_success(&self, backend: Backend) {
        counter!(STORE_WRITES_TOTAL, "backend" => backend.as_str(), "outcome" => "success")
            .increment(1);
    }

    fn inc_failure(&self, backend: Backend) {
        counter!(STORE_WRITES_TOTAL, "backend" => backend.as_str(), "outcome" => "failure")
            .increment(1);
    }
}

/// Install the process-wide Prometheus recorder. Call once at startup.
///
/// All four `backend × outcome` series are registered at zero so a scrape
/// shows them before the first reading arrives.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus metrics recorder")?;

    register_series();
    Ok(handle)
}

fn register_series() {
    describe_counter!(
        STORE_WRITES_TOTAL,
        "Store write attempts by backend and outcome"
    );
    for backend in Backend::ALL {
        for outcome in ["success", "failure"] {
            counter!(STORE_WRITES_TOTAL, "backend" => backend.as_str(), "outcome" => outcome)
                .absolute(0);
        }
    }
}
