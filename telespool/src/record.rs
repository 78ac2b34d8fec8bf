//! The payload unit moved through the buffer.
//!
//! A [`DataRecord`] belongs to one route and holds an ordered sequence of
//! timestamped sample groups. Field values are an explicit tagged union
//! rather than an open "any" type, so the size estimator and the spill
//! serializer each have a fixed, enumerable set of cases.
//!
//! The on-disk form is self-describing JSON with every field defaulted on
//! read; there is no schema-version marker, so forward compatibility rests
//! on readers tolerating absent fields.
//!
//! ```json
//! {
//!   "route": "http_listener_1",
//!   "samples": [
//!     {
//!       "time_format": "unix-s",
//!       "timestamp": "1630512000",
//!       "fields": [
//!         { "name": "data_1", "value": 2.1 },
//!         { "name": "data_2", "value": "probe offline" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::timefmt::TimeFormat;

/// A scalar telemetry value.
///
/// Serialized as a bare JSON scalar, so the wire form reads naturally:
/// `{"name": "temp", "value": 21.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A numeric value. Integers are widened to f64.
    Number(f64),
    /// A text value.
    Text(String),
    /// A boolean value.
    Bool(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// A named value recorded at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, unique within all samples sharing a timestamp.
    #[serde(default)]
    pub name: String,
    /// The recorded value.
    pub value: FieldValue,
}

/// A timestamp plus the named fields recorded at that instant.
///
/// The timestamp is held as a canonical UTC instant together with the
/// format tag it arrived with, so serialization reproduces the producer's
/// original representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimedSampleWire", into = "TimedSampleWire")]
pub struct TimedSample {
    format: TimeFormat,
    timestamp: DateTime<Utc>,
    fields: Vec<Field>,
}

impl TimedSample {
    /// The declared time format tag.
    pub fn format(&self) -> &TimeFormat {
        &self.format
    }

    /// The canonical UTC timestamp, truncated to the tag's precision.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The timestamp rendered in its declared format.
    pub fn rendered_timestamp(&self) -> String {
        self.format.render(self.timestamp)
    }

    /// The fields recorded at this instant, in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// Wire form of a sample. All fields default on read.
#[derive(Serialize, Deserialize)]
struct TimedSampleWire {
    #[serde(default)]
    time_format: TimeFormat,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    fields: Vec<Field>,
}

impl TryFrom<TimedSampleWire> for TimedSample {
    type Error = RecordError;

    fn try_from(wire: TimedSampleWire) -> Result<Self, Self::Error> {
        let timestamp = if wire.timestamp.is_empty() {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            wire.time_format.parse(&wire.timestamp)?
        };
        Ok(TimedSample {
            format: wire.time_format,
            timestamp,
            fields: wire.fields,
        })
    }
}

impl From<TimedSample> for TimedSampleWire {
    fn from(sample: TimedSample) -> Self {
        TimedSampleWire {
            timestamp: sample.rendered_timestamp(),
            time_format: sample.format,
            fields: sample.fields,
        }
    }
}

/// Container of timestamped sample groups belonging to one route.
///
/// Created by a producer, owned by whichever route buffer currently holds
/// it, destroyed on successful consumer dequeue or on eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Name of the route this record travels on.
    #[serde(default)]
    pub route: String,
    /// Ordered sample groups.
    #[serde(default)]
    pub samples: Vec<TimedSample>,
}

impl DataRecord {
    /// Creates an empty record for the given route.
    pub fn new(route: impl Into<String>) -> Self {
        DataRecord {
            route: route.into(),
            samples: Vec::new(),
        }
    }

    /// Appends one group of named values recorded at `timestamp`.
    ///
    /// The timestamp is truncated to the precision of `format` before
    /// insertion. If a sample group with the exact same timestamp already
    /// exists, the fields are merged into it.
    ///
    /// # Errors
    ///
    /// - [`RecordError::ArityMismatch`] if `names` and `values` differ in
    ///   length; nothing is added.
    /// - [`RecordError::DuplicateField`] if any incoming name collides with
    ///   a field already present under the same timestamp (or repeats
    ///   within this call); none of the incoming fields are added and the
    ///   rest of the record is unaffected.
    pub fn append_row(
        &mut self,
        names: &[&str],
        values: &[FieldValue],
        timestamp: DateTime<Utc>,
        format: TimeFormat,
    ) -> Result<(), RecordError> {
        if names.len() != values.len() {
            return Err(RecordError::ArityMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let timestamp = format.normalize(timestamp);

        // Reject the whole row before touching the record.
        for (i, name) in names.iter().enumerate() {
            let clashes_existing = self
                .samples
                .iter()
                .filter(|s| s.timestamp == timestamp)
                .flat_map(|s| s.fields.iter())
                .any(|f| f.name == *name);
            let clashes_incoming = names[..i].contains(name);
            if clashes_existing || clashes_incoming {
                return Err(RecordError::DuplicateField {
                    name: (*name).to_string(),
                    timestamp: format.render(timestamp),
                });
            }
        }

        let fields = names.iter().zip(values).map(|(name, value)| Field {
            name: (*name).to_string(),
            value: value.clone(),
        });

        match self.samples.iter_mut().find(|s| s.timestamp == timestamp) {
            Some(sample) => sample.fields.extend(fields),
            None => self.samples.push(TimedSample {
                format,
                timestamp,
                fields: fields.collect(),
            }),
        }
        Ok(())
    }

    /// True if the record holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
