use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Metric name prefix for all wishlist metrics
const PREFIX: &str = "wishlist";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Background Job Metrics
    pub static ref BACKGROUND_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_jobs_total"), "Background jobs by outcome"),
        &["outcome"]
    ).expect("Failed to create background_jobs_total metric");

    pub static ref BACKGROUND_JOBS_PENDING: Gauge = Gauge::new(
        format!("{PREFIX}_background_jobs_pending"),
        "Number of dispatched jobs that have not terminated yet"
    ).expect("Failed to create background_jobs_pending metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job run duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    ).expect("Failed to create background_job_duration_seconds metric");
}

/// Terminal or intermediate outcome of a dispatched job, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Started,
    Succeeded,
    Failed,
    Overdue,
    Discarded,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Started => "started",
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Overdue => "overdue",
            JobOutcome::Discarded => "discarded",
        }
    }
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOBS_PENDING.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a job reaching `outcome`
pub fn record_job_outcome(outcome: JobOutcome) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[outcome.as_str()])
        .inc();
}

/// Record how long a job's run took
pub fn record_job_duration(duration: Duration) {
    BACKGROUND_JOB_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Update the pending jobs count
pub fn set_pending_jobs(count: usize) {
    BACKGROUND_JOBS_PENDING.set(count as f64);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8(buffer).unwrap_or_default(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            String::new()
        }
    }
}
