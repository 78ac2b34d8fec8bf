//! Error types for the telespool buffering core.

use thiserror::Error;

/// The main error type for all telespool operations.
///
/// Covers every error condition the buffering core can raise, from
/// configuration parsing at startup through record construction and the
/// disk tier of the spill scheduler.
#[derive(Error, Debug)]
pub enum TelespoolError {
    /// Error parsing a configuration value.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error building or mutating a data record.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Error in the on-disk spill tier.
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
}

/// Errors raised while parsing configuration strings.
///
/// All of these are fatal at startup: a service with an unparseable
/// buffer size or execution interval must not come up half-configured.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The size string has no parseable numeric part.
    #[error("invalid size '{input}': {reason}")]
    InvalidSize {
        /// The offending input string.
        input: String,
        /// Description of what could not be parsed.
        reason: String,
    },

    /// The size string carries an unsupported unit suffix.
    #[error("unsupported size unit '{unit}' (expected B/KB/MB/GB/TB/PB)")]
    UnknownSizeUnit {
        /// The unrecognized unit suffix.
        unit: String,
    },

    /// The interval string has no parseable numeric part.
    #[error("invalid interval '{input}': {reason}")]
    InvalidInterval {
        /// The offending input string.
        input: String,
        /// Description of what could not be parsed.
        reason: String,
    },

    /// The interval string carries an unsupported unit suffix.
    #[error("unsupported interval unit '{unit}' (expected ms/s/m/h/d)")]
    UnknownIntervalUnit {
        /// The unrecognized unit suffix.
        unit: String,
    },

    /// The execution format is neither "parallel" nor "sequence".
    #[error("unsupported execution format '{input}' (expected 'parallel' or 'sequence')")]
    UnknownExecutionFormat {
        /// The offending input string.
        input: String,
    },
}

/// Errors raised while building or mutating a [`DataRecord`].
///
/// [`DataRecord`]: crate::record::DataRecord
#[derive(Error, Debug)]
pub enum RecordError {
    /// A field with this name already exists under the same timestamp
    /// within the record. The conflicting fields are not added; the rest
    /// of the record is unaffected.
    #[error("duplicate field '{name}' at timestamp {timestamp}")]
    DuplicateField {
        /// The conflicting field name.
        name: String,
        /// The shared timestamp, rendered in the sample's declared format.
        timestamp: String,
    },

    /// The field-name and value slices passed to an append differ in length.
    #[error("field name/value arity mismatch: {names} names, {values} values")]
    ArityMismatch {
        /// Number of field names supplied.
        names: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// A timestamp string could not be parsed under its declared format.
    #[error("cannot parse timestamp '{input}' with format '{format}'")]
    InvalidTimestamp {
        /// The raw timestamp text.
        input: String,
        /// The declared time format tag.
        format: String,
    },
}

/// Errors raised by the disk retention tier.
#[derive(Error, Debug)]
pub enum DiskError {
    /// The spill directory could not be created or scanned.
    #[error("failed to access spill directory '{path}': {source}")]
    DirectoryAccess {
        /// The directory path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A spill file could not be written.
    #[error("failed to write spill file '{path}': {source}")]
    WriteFailed {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A spill file could not be read.
    #[error("failed to read spill file '{path}': {source}")]
    ReadFailed {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A spill file could not be deleted.
    #[error("failed to delete spill file '{path}': {source}")]
    DeleteFailed {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A spill file with the target name already exists.
    ///
    /// Spill file names embed a millisecond timestamp; a collision means a
    /// file from a previous run already occupies the name. The write is
    /// refused rather than retried, and the record is accepted as lost.
    #[error("spill file '{path}' already exists, refusing to overwrite")]
    FileExists {
        /// The colliding file path.
        path: String,
    },

    /// Record serialization to or from JSON failed.
    #[error("spill serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Type alias for `Result<T, TelespoolError>`.
pub type Result<T> = std::result::Result<T, TelespoolError>;
