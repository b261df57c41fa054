use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Ingestion pipeline throughput and latency
// - Dropped messages, labelled by drop reason
// - Cache hit/miss rates on the lookup path
// - Producer circuit breaker state
//
// Dropped messages are never retried, so the per-reason counter is the
// operator's only signal that ingestion is silently losing work. All
// metrics are scraped via /metrics on the main HTTP server.
// ============================================================================

/// Central metrics registry for the service.
pub struct Metrics {
    registry: Registry,

    // Ingestion pipeline
    pub orders_consumed: IntCounter,
    pub orders_ingested: IntCounter,
    pub orders_dropped: IntCounterVec,
    pub ingest_duration: Histogram,

    // Lookup path
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,

    // Submit path
    pub orders_submitted: IntCounter,
    pub producer_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_consumed = IntCounter::new(
            "orders_consumed_total",
            "Order messages received from the channel",
        )?;
        registry.register(Box::new(orders_consumed.clone()))?;

        let orders_ingested = IntCounter::new(
            "orders_ingested_total",
            "Orders durably persisted and written through to the cache",
        )?;
        registry.register(Box::new(orders_ingested.clone()))?;

        let orders_dropped = IntCounterVec::new(
            Opts::new("orders_dropped_total", "Order messages discarded without retry"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_dropped.clone()))?;

        let ingest_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ingest_duration_seconds",
                "Per-message ingestion duration, receive to cache write",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        let cache_hits = IntCounter::new(
            "cache_hits_total",
            "Lookups answered from the order cache",
        )?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounter::new(
            "cache_misses_total",
            "Lookups that fell through to the durable store",
        )?;
        registry.register(Box::new(cache_misses.clone()))?;

        let orders_submitted = IntCounter::new(
            "orders_submitted_total",
            "Orders accepted over HTTP and queued to the channel",
        )?;
        registry.register(Box::new(orders_submitted.clone()))?;

        let producer_breaker_state = IntGauge::new(
            "producer_breaker_state",
            "Producer circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(producer_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_consumed,
            orders_ingested,
            orders_dropped,
            ingest_duration,
            cache_hits,
            cache_misses,
            orders_submitted,
            producer_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one successfully ingested order and its latency.
    pub fn record_ingested(&self, duration_secs: f64) {
        self.orders_ingested.inc();
        self.ingest_duration.observe(duration_secs);
    }

    /// Record one dropped message with the stage it was lost at.
    pub fn record_drop(&self, reason: &str) {
        self.orders_dropped.with_label_values(&[reason]).inc();
    }
}
