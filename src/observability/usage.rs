//! Per-request usage reporting.
//!
//! One metric increment and one structured usage event per completed
//! request, both tagged `{function, operation_id, streaming}`. Reporting
//! is fail-open: nothing here can fail a request; exporter trouble stays
//! in the telemetry pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;

const METER_NAME: &str = "chatmeter";
const TOKEN_COUNTER_NAME: &str = "openai_tokens";
pub const USAGE_EVENT_NAME: &str = "openai-tokens";

/// In-process totals, surfaced by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageTotals {
    pub events: u64,
    pub total_tokens: u64,
}

struct Inner {
    token_counter: Counter<u64>,
    service_name: String,
    events: AtomicU64,
    total_tokens: AtomicU64,
}

/// Emits token-usage telemetry for completed requests.
///
/// Cheap to clone; clones share the same counters.
#[derive(Clone)]
pub struct UsageReporter {
    inner: Arc<Inner>,
}

impl UsageReporter {
    #[must_use]
    pub fn new(service_name: &str) -> Self {
        let meter = opentelemetry::global::meter(METER_NAME);
        let token_counter = meter
            .u64_counter(TOKEN_COUNTER_NAME)
            .with_description("Tokens consumed by relayed chat completions")
            .build();
        Self {
            inner: Arc::new(Inner {
                token_counter,
                service_name: service_name.to_string(),
                events: AtomicU64::new(0),
                total_tokens: AtomicU64::new(0),
            }),
        }
    }

    /// Record usage for one completed request.
    ///
    /// Must be called exactly once per request lifecycle, after the
    /// response (or stream) is complete.
    pub fn report(&self, total_tokens: u64, operation_id: &str, streaming: bool) {
        let inner = &self.inner;
        let attributes = [
            KeyValue::new("function", inner.service_name.clone()),
            KeyValue::new("operation_id", operation_id.to_string()),
            KeyValue::new("streaming", streaming),
        ];
        inner.token_counter.add(total_tokens, &attributes);

        inner.events.fetch_add(1, Ordering::Relaxed);
        inner.total_tokens.fetch_add(total_tokens, Ordering::Relaxed);

        tracing::info!(
            target: "usage",
            event = USAGE_EVENT_NAME,
            function = %inner.service_name,
            total_tokens,
            operation_id,
            streaming,
            "usage recorded"
        );
    }

    #[must_use]
    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            events: self.inner.events.load(Ordering::Relaxed),
            total_tokens: self.inner.total_tokens.load(Ordering::Relaxed),
        }
    }
}
