//! Data models for litestash
//!
//! Defines the row shapes returned by the repository: `Document<T>` for
//! serialized objects and `Signal`/`SignalRecord` for binary payloads.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document with its bookkeeping timestamps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document<T> {
    /// Unique key within the table
    pub id: String,
    /// The deserialized payload
    pub data: T,
    /// When the row was first inserted
    pub created_at: DateTime<Utc>,
    /// When the row was last upserted
    pub updated_at: DateTime<Utc>,
}

/// A binary signal with optional acquisition metadata
///
/// This is the write shape. The bytes in `data` are never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    /// Unique key within the table
    pub id: String,
    /// Free-text tag such as "EEG"
    pub signal_type: String,
    /// Samples per second, if known
    pub sample_rate: Option<f64>,
    /// Channel count, if known
    pub channels: Option<i64>,
    /// Opaque payload
    pub data: Vec<u8>,
    /// Side-channel metadata, stored as JSON text
    pub metadata: Option<Value>,
}

impl Signal {
    /// Create a signal with no optional metadata
    pub fn new(id: impl Into<String>, signal_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            signal_type: signal_type.into(),
            sample_rate: None,
            channels: None,
            data,
            metadata: None,
        }
    }

    /// Set the sample rate
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Set the channel count
    pub fn with_channels(mut self, channels: i64) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A signal as read back from a table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalRecord {
    pub signal: Signal,
    /// When the row was first inserted; upserts leave it unchanged
    pub created_at: DateTime<Utc>,
}

/// Current time as stored in timestamp columns
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a stored timestamp column back to a `DateTime`
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
