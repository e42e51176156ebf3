//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Prometheus counters describing ingestion outcomes per channel."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::fmt;
use std::sync::Arc;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Path through which a log entry entered the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestChannel {
    Http,
    Queue,
}

impl IngestChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestChannel::Http => "http",
            IngestChannel::Queue => "queue",
        }
    }
}

impl fmt::Display for IngestChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion counters shared by the HTTP handlers and the queue consumer.
#[derive(Clone)]
pub struct IngestMetrics {
    records_ingested: IntCounterVec,
    records_rejected: IntCounterVec,
    store_failures: IntCounterVec,
    queue_messages: IntCounterVec,
    store_latency: HistogramVec,
    registry: Arc<Registry>,
}

impl IngestMetrics {
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let records_ingested = IntCounterVec::new(
            Opts::new(
                "logd_records_ingested_total",
                "Log records successfully persisted",
            ),
            &["channel"],
        )?;
        registry.register(Box::new(records_ingested.clone()))?;

        let records_rejected = IntCounterVec::new(
            Opts::new(
                "logd_records_rejected_total",
                "Log entries dropped before reaching the store",
            ),
            &["channel", "reason"],
        )?;
        registry.register(Box::new(records_rejected.clone()))?;

        let store_failures = IntCounterVec::new(
            Opts::new(
                "logd_store_failures_total",
                "Store operations that returned an error",
            ),
            &["channel"],
        )?;
        registry.register(Box::new(store_failures.clone()))?;

        let queue_messages = IntCounterVec::new(
            Opts::new(
                "logd_queue_messages_total",
                "Messages delivered by the queue transport",
            ),
            &["queue"],
        )?;
        registry.register(Box::new(queue_messages.clone()))?;

        let store_latency = HistogramVec::new(
            HistogramOpts::new(
                "logd_store_append_seconds",
                "Latency of store appends",
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 14)?),
            &["channel"],
        )?;
        registry.register(Box::new(store_latency.clone()))?;

        Ok(Self {
            records_ingested,
            records_rejected,
            store_failures,
            queue_messages,
            store_latency,
            registry,
        })
    }

    /// Metrics bound to a private registry, for tests and embedded use.
    pub fn unregistered() -> Self {
        Self::new(Arc::new(Registry::new()))
            .unwrap_or_else(|err| unreachable!("fresh registry rejected metric: {err}"))
    }

    pub fn record_ingested(&self, channel: IngestChannel, elapsed_secs: f64) {
        self.records_ingested
            .with_label_values(&[channel.as_str()])
            .inc();
        self.store_latency
            .with_label_values(&[channel.as_str()])
            .observe(elapsed_secs);
    }

    pub fn record_rejected(&self, channel: IngestChannel, reason: &str) {
        self.records_rejected
            .with_label_values(&[channel.as_str(), reason])
            .inc();
    }

    pub fn record_store_failure(&self, channel: IngestChannel) {
        self.store_failures
            .with_label_values(&[channel.as_str()])
            .inc();
    }

    pub fn record_queue_message(&self, queue: &str) {
        self.queue_messages.with_label_values(&[queue]).inc();
    }

    pub fn ingested(&self, channel: IngestChannel) -> u64 {
        self.records_ingested
            .with_label_values(&[channel.as_str()])
            .get()
    }

    pub fn rejected(&self, channel: IngestChannel, reason: &str) -> u64 {
        self.records_rejected
            .with_label_values(&[channel.as_str(), reason])
            .get()
    }

    pub fn store_failures(&self, channel: IngestChannel) -> u64 {
        self.store_failures
            .with_label_values(&[channel.as_str()])
            .get()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Render every metric in the registry using the Prometheus text format.
    pub fn encode(&self) -> Result<(String, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        let body = String::from_utf8(buffer)
            .map_err(|err| prometheus::Error::Msg(format!("metrics are not utf-8: {err}")))?;
        Ok((encoder.format_type().to_owned(), body))
    }
}

impl fmt::Debug for IngestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_tracked_per_channel() {
        let metrics = IngestMetrics::unregistered();
        metrics.record_ingested(IngestChannel::Http, 0.001);
        metrics.record_ingested(IngestChannel::Http, 0.002);
        metrics.record_ingested(IngestChannel::Queue, 0.001);
        metrics.record_rejected(IngestChannel::Queue, "invalid");
        metrics.record_store_failure(IngestChannel::Http);

        assert_eq!(metrics.ingested(IngestChannel::Http), 2);
        assert_eq!(metrics.ingested(IngestChannel::Queue), 1);
        assert_eq!(metrics.rejected(IngestChannel::Queue, "invalid"), 1);
        assert_eq!(metrics.rejected(IngestChannel::Http, "invalid"), 0);
        assert_eq!(metrics.store_failures(IngestChannel::Http), 1);
    }

    #[test]
    fn encode_renders_text_format() {
        let metrics = IngestMetrics::unregistered();
        metrics.record_queue_message("log_queue");
        let (content_type, body) = metrics.encode().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("logd_queue_messages_total{queue=\"log_queue\"} 1"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        IngestMetrics::new(Arc::clone(&registry)).unwrap();
        assert!(IngestMetrics::new(registry).is_err());
    }
}
