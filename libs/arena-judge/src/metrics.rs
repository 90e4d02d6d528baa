// Prometheus metrics for the judge pipeline
use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref SUBMISSIONS_COMPLETED: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_submissions_completed_total", "Submissions that reached a verdict"),
        &["verdict"]
    )
    .expect("metric can be created");

    pub static ref TEST_CASES: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_test_cases_total", "Evaluated test cases by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref SANDBOX_EXECUTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_sandbox_executions_total", "Sandbox executions by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref QUEUE_DEPTH: IntGauge =
        IntGauge::new("arena_queue_depth", "Submission ids waiting in the queue")
            .expect("metric can be created");
}

/// Register all collectors. Safe to call more than once.
pub fn register() {
    // AlreadyReg errors on repeat calls are expected
    let _ = REGISTRY.register(Box::new(SUBMISSIONS_COMPLETED.clone()));
    let _ = REGISTRY.register(Box::new(TEST_CASES.clone()));
    let _ = REGISTRY.register(Box::new(SANDBOX_EXECUTIONS.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_DEPTH.clone()));
}

/// Text exposition of the registry
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_exposes_registered_metrics() {
        register();
        register();
        SUBMISSIONS_COMPLETED.with_label_values(&["passed"]).inc();
        let text = gather();
        assert!(text.contains("arena_submissions_completed_total"));
    }
}
