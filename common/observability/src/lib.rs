use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct SettlementMetrics {
    pub registry: Registry,
    pub messages_total: IntCounterVec,
    pub dead_letters_total: IntCounterVec,
    pub dead_letter_publish_failures: IntCounter,
    pub retries_total: IntCounter,
    pub ack_failures: IntCounter,
    pub batch_duration_seconds: Histogram,
    pub global_sequence: IntGauge,
}

impl SettlementMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let messages_total = IntCounterVec::new(
            Opts::new("settlement_messages_total", "Messages settled, by outcome"),
            &["outcome"],
        )?;
        let dead_letters_total = IntCounterVec::new(
            Opts::new("settlement_dead_letters_total", "Messages routed to the dead-letter topic, by reason"),
            &["reason"],
        )?;
        let dead_letter_publish_failures = IntCounter::new(
            "settlement_dead_letter_publish_failures_total",
            "Dead-letter envelopes that could not be published",
        )?;
        let retries_total = IntCounter::new(
            "settlement_retries_total",
            "Batch transactions retried after a transient store error",
        )?;
        let ack_failures = IntCounter::new(
            "settlement_ack_failures_total",
            "Offset commits that failed",
        )?;
        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_batch_duration_seconds",
                "Wall time to settle one batch, retries included",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        )?;
        let global_sequence = IntGauge::new(
            "settlement_global_sequence",
            "Last global sequence assigned by this process",
        )?;
        registry.register(Box::new(messages_total.clone()))?;
        registry.register(Box::new(dead_letters_total.clone()))?;
        registry.register(Box::new(dead_letter_publish_failures.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(ack_failures.clone()))?;
        registry.register(Box::new(batch_duration_seconds.clone()))?;
        registry.register(Box::new(global_sequence.clone()))?;
        Ok(Self {
            registry,
            messages_total,
            dead_letters_total,
            dead_letter_publish_failures,
            retries_total,
            ack_failures,
            batch_duration_seconds,
            global_sequence,
        })
    }
}

#[derive(Clone)]
pub struct AggregationMetrics {
    pub registry: Registry,
    pub runs_total: IntCounterVec,
    pub rows_updated_total: IntCounter,
    pub run_duration_seconds: Histogram,
}

impl AggregationMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let runs_total = IntCounterVec::new(
            Opts::new("aggregation_runs_total", "Aggregation runs, by outcome"),
            &["outcome"],
        )?;
        let rows_updated_total = IntCounter::new(
            "aggregation_rows_updated_total",
            "Daily stats rows written by aggregation",
        )?;
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("aggregation_run_duration_seconds", "Duration of one aggregation run")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(rows_updated_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        Ok(Self { registry, runs_total, rows_updated_total, run_duration_seconds })
    }
}

#[derive(Clone)]
pub struct AdmissionMetrics {
    pub registry: Registry,
    pub participations_total: IntCounterVec,
}

impl AdmissionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let participations_total = IntCounterVec::new(
            Opts::new("participation_requests_total", "Participation requests, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(participations_total.clone()))?;
        Ok(Self { registry, participations_total })
    }
}

#[derive(Clone)]
pub struct HttpErrorMetrics {
    pub http_errors_total: IntCounterVec,
}

impl HttpErrorMetrics {
    /// Registers `http_errors_total` on an existing registry so it shares the service's `/metrics`.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let http_errors_total = IntCounterVec::new(
            Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
            &["service", "code", "status"],
        )?;
        registry.register(Box::new(http_errors_total.clone()))?;
        Ok(Self { http_errors_total })
    }
}

/// Renders a registry in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> prometheus::Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
