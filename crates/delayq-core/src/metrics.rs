use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

/// Client-side OTel metrics. Created once per `DelayQueue` and shared with its
/// script cache.
#[derive(Clone)]
pub struct Metrics {
    pub messages_enqueued: Counter<u64>,
    pub messages_dequeued: Counter<u64>,
    pub scripts_reloaded: Counter<u64>,
    pub envelopes_undecodable: Counter<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create metrics from the global meter provider. If no meter provider
    /// is configured, the instruments are no-op.
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("delayq");
        Self::from_meter(&meter)
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            messages_enqueued: meter
                .u64_counter("delayq.messages.enqueued")
                .with_description("Total messages enqueued")
                .build(),
            messages_dequeued: meter
                .u64_counter("delayq.messages.dequeued")
                .with_description("Total messages removed by dequeue")
                .build(),
            scripts_reloaded: meter
                .u64_counter("delayq.scripts.reloaded")
                .with_description("Script re-registrations after the store forgot a handle")
                .build(),
            envelopes_undecodable: meter
                .u64_counter("delayq.envelopes.undecodable")
                .with_description("Dequeued members returned raw because they carried no envelope")
                .build(),
        }
    }

    pub fn record_enqueue(&self, queue_id: &str) {
        self.messages_enqueued
            .add(1, &[KeyValue::new("queue_id", queue_id.to_string())]);
    }

    pub fn record_dequeue(&self, queue_id: &str, count: usize) {
        self.messages_dequeued.add(
            count as u64,
            &[KeyValue::new("queue_id", queue_id.to_string())],
        );
    }

    pub fn record_script_reload(&self, script: &'static str) {
        self.scripts_reloaded
            .add(1, &[KeyValue::new("script", script)]);
    }

    pub fn record_undecodable(&self, queue_id: &str) {
        self.envelopes_undecodable
            .add(1, &[KeyValue::new("queue_id", queue_id.to_string())]);
    }
}
