//! Per-exchange network metadata and its telemetry sink.

use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::Response;

/// Network metadata for one request, recorded once a response arrives.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    url: Option<url::Url>,
    tracking_id: String,
    start_time: i64,
    end_time: i64,
    bytes_sent: u64,
    bytes_received: u64,
    status: Option<u16>,
    finalized: bool,
}

impl RequestMetadata {
    /// Start tracking a request now.
    pub fn new(url: Option<url::Url>, tracking_id: impl Into<String>) -> Self {
        Self {
            url,
            tracking_id: tracking_id.into(),
            start_time: now_millis(),
            end_time: 0,
            bytes_sent: 0,
            bytes_received: 0,
            status: None,
            finalized: false,
        }
    }

    /// Correlation id.
    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    /// Target URL.
    pub fn url(&self) -> Option<&url::Url> {
        self.url.as_ref()
    }

    /// Start time in Unix epoch milliseconds.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// End time in Unix epoch milliseconds, 0 until a response is observed.
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Request bytes sent.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Response bytes received.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Status of the observed response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether [`finalize`](Self::finalize) already ran.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Milliseconds between start and end; 0 if the end is not after the start.
    pub fn round_trip_time(&self) -> i64 {
        if self.end_time > self.start_time {
            self.end_time - self.start_time
        } else {
            0
        }
    }

    /// Capture counters, status and end time from a received response.
    pub fn observe(&mut self, response: &Response) {
        self.status = Some(response.status().as_u16());
        self.bytes_sent = response.bytes_sent();
        self.bytes_received = response.bytes_received();
        self.end_time = now_millis();
    }

    /// All metadata as one JSON object for analytics.
    pub fn combined(&self) -> Value {
        let mut metadata = Map::new();
        metadata.insert("$category".into(), json!("network"));
        metadata.insert("$trackingid".into(), json!(self.tracking_id));
        metadata.insert("$outboundTimestamp".into(), json!(self.start_time));
        metadata.insert("$inboundTimestamp".into(), json!(self.end_time));
        metadata.insert("$roundTripTime".into(), json!(self.round_trip_time()));
        metadata.insert("$bytesSent".into(), json!(self.bytes_sent));
        metadata.insert("$bytesReceived".into(), json!(self.bytes_received));
        if let Some(url) = &self.url {
            metadata.insert("$path".into(), json!(url.as_str()));
        }
        if let Some(status) = self.status {
            metadata.insert("$responseCode".into(), json!(status));
        }
        Value::Object(metadata)
    }

    /// Hand the metadata to `recorder` at most once.
    ///
    /// Does nothing when already finalized or when no response was observed.
    /// Returns whether the sink received the record.
    pub fn finalize(&mut self, recorder: &MetadataRecorder) -> bool {
        if self.finalized || self.status.is_none() {
            return false;
        }
        self.finalized = true;
        recorder.record(self)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Receives finalized request metadata.
pub trait TelemetrySink: Send + Sync {
    /// Record one request's metadata.
    fn record(&self, metadata: &RequestMetadata);
}

/// Sink that emits metadata as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, metadata: &RequestMetadata) {
        info!(
            target: "bluepic_session::analytics",
            metadata = %metadata.combined(),
            "Network request metadata"
        );
    }
}

/// Forwards metadata to a sink while recording is enabled.
pub struct MetadataRecorder {
    enabled: AtomicBool,
    sink: Arc<dyn TelemetrySink>,
}

impl MetadataRecorder {
    /// Create a recorder.
    pub fn new(sink: Arc<dyn TelemetrySink>, enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            sink,
        }
    }

    /// Whether records reach the sink.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn recording on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn record(&self, metadata: &RequestMetadata) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.sink.record(metadata);
        true
    }
}

impl Default for MetadataRecorder {
    fn default() -> Self {
        Self::new(Arc::new(TracingTelemetrySink), false)
    }
}

impl std::fmt::Debug for MetadataRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRecorder")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
