use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref REQUEST_TOTAL: Counter = Counter::new(
        "sampler_requests_total",
        "Total number of assignment requests"
    ).unwrap();

    pub static ref REQUEST_ERRORS: Counter = Counter::new(
        "sampler_request_errors_total",
        "Total number of failed assignment requests"
    ).unwrap();

    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sampler_request_duration_seconds",
            "Assignment request duration in seconds"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1])
    ).unwrap();

    // Per-experiment outcomes: bucket, unsampled, none, override
    pub static ref ASSIGNMENT_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("sampler_assignments_total", "Assignments by outcome"),
        &["outcome"]
    ).unwrap();

    // Experiment metrics
    pub static ref RELOAD_TOTAL: IntCounter = IntCounter::new(
        "sampler_experiment_reload_total",
        "Total number of experiment reloads"
    ).unwrap();

    pub static ref RELOAD_ERRORS: IntCounter = IntCounter::new(
        "sampler_experiment_reload_errors_total",
        "Total number of experiment reload errors"
    ).unwrap();

    pub static ref ACTIVE_EXPERIMENTS: IntGauge = IntGauge::new(
        "sampler_active_experiments",
        "Number of loaded experiments"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all collectors. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(REQUEST_TOTAL.clone()),
            Box::new(REQUEST_ERRORS.clone()),
            Box::new(REQUEST_DURATION.clone()),
            Box::new(ASSIGNMENT_OUTCOMES.clone()),
            Box::new(RELOAD_TOTAL.clone()),
            Box::new(RELOAD_ERRORS.clone()),
            Box::new(ACTIVE_EXPERIMENTS.clone()),
        ];

        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn record_outcome(outcome: &str) {
    ASSIGNMENT_OUTCOMES.with_label_values(&[outcome]).inc();
}
