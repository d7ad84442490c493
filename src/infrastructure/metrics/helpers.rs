//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::store::QueueStats;

use super::{
    EMAILS_ENQUEUED_TOTAL, EMAILS_EXHAUSTED_TOTAL, EMAILS_FAILED_TOTAL, EMAILS_REJECTED_TOTAL,
    EMAILS_SENT_TOTAL,
    QUEUE_BATCH_SIZE, QUEUE_DEPTH, QUEUE_TICKS_TOTAL, QUEUE_TICK_ERRORS_TOTAL,
    RETRIES_SCHEDULED_TOTAL, SEND_LATENCY, TEMPLATE_CACHE_HITS_TOTAL, TEMPLATE_CACHE_MISSES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record messages accepted into the queue
    pub fn record_enqueued(source: &str, count: u64) {
        EMAILS_ENQUEUED_TOTAL.with_label_values(&[source]).inc_by(count);
    }

    pub fn record_sent(provider: &str) {
        EMAILS_SENT_TOTAL.with_label_values(&[provider]).inc();
    }

    pub fn record_failed(kind: &str) {
        EMAILS_FAILED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_retry_scheduled() {
        RETRIES_SCHEDULED_TOTAL.inc();
    }

    pub fn record_exhausted() {
        EMAILS_EXHAUSTED_TOTAL.inc();
    }

    pub fn record_rejected() {
        EMAILS_REJECTED_TOTAL.inc();
    }

    pub fn observe_send_latency(provider: &str, seconds: f64) {
        SEND_LATENCY.with_label_values(&[provider]).observe(seconds);
    }
}

/// Helper struct for recording queue processor metrics
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a tick that fetched `batch` due messages
    pub fn record_tick(batch: usize) {
        QUEUE_TICKS_TOTAL.inc();
        QUEUE_BATCH_SIZE.observe(batch as f64);
    }

    pub fn record_tick_error() {
        QUEUE_TICKS_TOTAL.inc();
        QUEUE_TICK_ERRORS_TOTAL.inc();
    }

    pub fn set_depth(stats: &QueueStats) {
        let gauge = |state: &str, value: u64| {
            QUEUE_DEPTH
                .with_label_values(&[state])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        };
        gauge("queued", stats.queued);
        gauge("awaiting_retry", stats.awaiting_retry);
        gauge("exhausted", stats.exhausted);
        gauge("due", stats.due);
    }
}

/// Helper struct for recording template cache metrics
pub struct TemplateMetrics;

impl TemplateMetrics {
    pub fn record_cache_hit() {
        TEMPLATE_CACHE_HITS_TOTAL.inc();
    }

    pub fn record_cache_miss() {
        TEMPLATE_CACHE_MISSES_TOTAL.inc();
    }
}
