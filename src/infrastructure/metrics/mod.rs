//! Prometheus metrics for the mailer.
//!
//! - Intake metrics (messages accepted by source)
//! - Delivery metrics (sent by provider, failures by kind, retries, latency)
//! - Queue processor metrics (ticks, batch sizes, queue depth)
//! - Template render cache metrics

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, QueueMetrics, TemplateMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "mailer";

lazy_static! {
    // ============================================================================
    // Intake Metrics
    // ============================================================================

    /// Messages accepted into the queue, by request kind
    pub static ref EMAILS_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_enqueued_total", METRIC_PREFIX),
        "Total emails accepted into the queue",
        &["source"]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    pub static ref EMAILS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_sent_total", METRIC_PREFIX),
        "Total emails handed off to a provider",
        &["provider"]
    ).unwrap();

    /// Failed attempts by failure kind (validation, transient, permanent)
    pub static ref EMAILS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_failed_total", METRIC_PREFIX),
        "Total failed delivery attempts",
        &["kind"]
    ).unwrap();

    pub static ref RETRIES_SCHEDULED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retries_scheduled_total", METRIC_PREFIX),
        "Total retries scheduled after a transient failure"
    ).unwrap();

    /// Messages that used up every retry attempt
    pub static ref EMAILS_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_emails_exhausted_total", METRIC_PREFIX),
        "Total emails that failed on their last allowed attempt"
    ).unwrap();

    /// Messages the provider refused outright, never retried
    pub static ref EMAILS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_emails_rejected_total", METRIC_PREFIX),
        "Total emails rejected by the provider with a non-retryable error"
    ).unwrap();

    pub static ref SEND_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_send_latency_seconds", METRIC_PREFIX),
        "Provider send latency in seconds",
        &["provider"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // ============================================================================
    // Queue Processor Metrics
    // ============================================================================

    pub static ref QUEUE_TICKS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_ticks_total", METRIC_PREFIX),
        "Total queue processor ticks"
    ).unwrap();

    /// Ticks whose fetch from the store failed
    pub static ref QUEUE_TICK_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_tick_errors_total", METRIC_PREFIX),
        "Total queue processor ticks that could not read the store"
    ).unwrap();

    pub static ref QUEUE_BATCH_SIZE: Histogram = register_histogram!(
        format!("{}_queue_batch_size", METRIC_PREFIX),
        "Number of due messages fetched per tick",
        vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]
    ).unwrap();

    /// Messages per queue state (queued, awaiting_retry, exhausted, due)
    pub static ref QUEUE_DEPTH: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_queue_depth", METRIC_PREFIX),
        "Messages currently in each queue state",
        &["state"]
    ).unwrap();

    // ============================================================================
    // Template Metrics
    // ============================================================================

    pub static ref TEMPLATE_CACHE_HITS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_cache_hits_total", METRIC_PREFIX),
        "Total template renders served from the cache"
    ).unwrap();

    pub static ref TEMPLATE_CACHE_MISSES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_cache_misses_total", METRIC_PREFIX),
        "Total template renders computed from the template"
    ).unwrap();
}
