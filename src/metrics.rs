// Prometheus metrics for the recipe gate
//
// - Attempt outcomes (counter)
// - Admission rejections by reason (counter)
// - Attempts currently running (gauge)
// - Attempt durations (histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref GATE_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("gate_attempts_total", "Admitted attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create gate attempts metric");

    pub static ref GATE_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("gate_rejections_total", "Attempts refused by admission control"),
        &["reason"]
    ).expect("Failed to create gate rejections metric");

    pub static ref GATE_IN_FLIGHT: IntGauge = IntGauge::new(
        "gate_in_flight",
        "Admitted attempts still running"
    ).expect("Failed to create gate in-flight metric");

    pub static ref GATE_ATTEMPT_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("gate_attempt_duration_seconds", "Duration of admitted attempts"),
    ).expect("Failed to create gate attempt duration metric");
}

/// Register the gate metrics; safe to call more than once
pub fn init() -> prometheus::Result<()> {
    register(Box::new(GATE_ATTEMPTS_TOTAL.clone()))?;
    register(Box::new(GATE_REJECTIONS_TOTAL.clone()))?;
    register(Box::new(GATE_IN_FLIGHT.clone()))?;
    register(Box::new(GATE_ATTEMPT_DURATION_SECONDS.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Decrements the in-flight gauge when the attempt ends, however it ends
#[derive(Debug)]
pub(crate) struct InFlightGuard;

impl InFlightGuard {
    pub(crate) fn enter() -> Self {
        GATE_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        GATE_IN_FLIGHT.dec();
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_counters_show_up_in_output() {
        init().unwrap();
        GATE_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
        GATE_REJECTIONS_TOTAL
            .with_label_values(&["daily_limit_reached"])
            .inc();

        let output = gather_metrics().unwrap();
        assert!(output.contains("gate_attempts_total"));
        assert!(output.contains("gate_rejections_total"));
    }
}
