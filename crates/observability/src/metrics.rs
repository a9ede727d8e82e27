//! Pull-model metrics: all names are contracts consumed by dashboards, so
//! every counter/histogram is registered and set to 0 at startup instead
//! of lazily appearing on first use.

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static NOTIFICATIONS_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("notifications_received", "Webhook deliveries accepted").unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static EMAILS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("emails_processed", "Messages that yielded at least one attachment job")
        .unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static EMAILS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("emails_skipped", "Messages skipped as already processed").unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static ATTACHMENTS_EXTRACTED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("attachments_extracted", "Attachments that completed extraction")
        .unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static PROCESSING_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("processing_errors", "Errors encountered during processing"),
        &["type"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static OCR_CALLS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("ocr_calls", "OCR provider invocations").unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static OCR_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("ocr_errors", "OCR provider terminal failures").unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static WEBHOOK_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("webhook_duration_seconds", "Webhook handler latency"),
        &[],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

pub static OCR_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("ocr_duration_seconds", "End-to-end OCR call latency"),
        &[],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

pub static OCR_CONFIDENCE: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("ocr_confidence", "Aggregate confidence of completed extractions")
            .buckets(vec![0.0, 10.0, 25.0, 50.0, 70.0, 85.0, 95.0, 100.0]),
        &[],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "Operator API request latency"),
        &["route", "status"],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

pub static BLOB_PUT_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("blob_put_duration_seconds", "Blob staging upload latency"),
        &[],
    )
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

pub static ACTIVE_WATCHES: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("active_watches", "Currently active per-user push watches").unwrap();
    REGISTRY.register(Box::new(g.clone())).unwrap();
    g
});

/// Forces every metric to register (and therefore appear at 0) before the
/// first scrape, rather than waiting for first use.
pub fn init() {
    Lazy::force(&NOTIFICATIONS_RECEIVED);
    Lazy::force(&EMAILS_PROCESSED);
    Lazy::force(&EMAILS_SKIPPED);
    Lazy::force(&ATTACHMENTS_EXTRACTED);
    Lazy::force(&PROCESSING_ERRORS);
    Lazy::force(&OCR_CALLS);
    Lazy::force(&OCR_ERRORS);
    Lazy::force(&WEBHOOK_DURATION_SECONDS);
    Lazy::force(&OCR_DURATION_SECONDS);
    Lazy::force(&OCR_CONFIDENCE);
    Lazy::force(&HTTP_REQUEST_DURATION_SECONDS);
    Lazy::force(&BLOB_PUT_DURATION_SECONDS);
    Lazy::force(&ACTIVE_WATCHES);
}
