//! Per-route buffer configuration and the human-readable unit parsers.
//!
//! The configuration loader that produces these structs lives outside the
//! core; this module only defines the shape it fills in and the size /
//! interval string parsers. Malformed strings are fatal at startup
//! ([`ConfigError`]) — a buffer must never come up with a guessed budget.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How spill targets within one scheduler tick are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionFormat {
    /// Each target runs as an independent task; the tick ends with a
    /// wait-all barrier.
    #[default]
    Parallel,
    /// Targets run strictly one after another.
    Sequence,
}

impl FromStr for ExecutionFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" | "" => Ok(ExecutionFormat::Parallel),
            "sequence" => Ok(ExecutionFormat::Sequence),
            _ => Err(ConfigError::UnknownExecutionFormat {
                input: s.to_string(),
            }),
        }
    }
}

/// Buffer configuration for one route, as supplied by the external
/// configuration loader.
///
/// Size fields are human-readable strings (`"10MB"`, base-1024) and the
/// interval accepts `ms`/`s`/`m`/`h`/`d` suffixes; both are validated by
/// the accessor methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Memory tier budget, e.g. `"10MB"`.
    pub memory_buffer_size: String,
    /// Disk tier budget, e.g. `"10MB"`. Overflow beyond this is evicted.
    pub disk_buffer_size: String,
    /// Whether over-budget memory records spill to disk. When false,
    /// overflow is dropped (logged) instead.
    pub buffer_to_disk: bool,
    /// Directory holding this route's spill files.
    pub buffer_path: String,
    /// Spill file name prefix. Empty means `spool_{route}`.
    pub file_prefix: String,
    /// Maximum number of spill files on disk. 0 = unlimited.
    pub allowed_file_count: u64,
    /// Scheduler period, e.g. `"1s"`.
    pub execution_interval: String,
    /// Parallel or sequential handling of targets within a tick.
    pub execution_format: ExecutionFormat,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            memory_buffer_size: "10MB".to_string(),
            disk_buffer_size: "10MB".to_string(),
            buffer_to_disk: true,
            buffer_path: "/tmp/telespool.buffer".to_string(),
            file_prefix: String::new(),
            allowed_file_count: 0,
            execution_interval: "1s".to_string(),
            execution_format: ExecutionFormat::Parallel,
        }
    }
}

impl BufferConfig {
    /// The memory tier budget in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `memory_buffer_size` is malformed.
    pub fn memory_limit_bytes(&self) -> Result<u64, ConfigError> {
        parse_size(&self.memory_buffer_size)
    }

    /// The disk tier budget in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `disk_buffer_size` is malformed.
    pub fn disk_limit_bytes(&self) -> Result<u64, ConfigError> {
        parse_size(&self.disk_buffer_size)
    }

    /// The scheduler period.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `execution_interval` is malformed.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.execution_interval)
    }

    /// The spill file prefix for `route`, falling back to `spool_{route}`.
    pub fn file_prefix_for(&self, route: &str) -> String {
        if self.file_prefix.is_empty() {
            format!("spool_{route}")
        } else {
            self.file_prefix.clone()
        }
    }
}

/// Parses a human-readable size string into bytes.
///
/// Accepts an integer followed by `B`, `KB`, `MB`, `GB`, `TB` or `PB`
/// (base-1024, case-insensitive, surrounding whitespace ignored).
/// `"10MB"` is exactly `10 * 1024 * 1024`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSize`] for a missing or unparseable
/// numeric part and [`ConfigError::UnknownSizeUnit`] for any other suffix.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidSize {
            input: input.to_string(),
            reason: "empty string".to_string(),
        });
    }

    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    let number: u64 = digits.parse().map_err(|_| ConfigError::InvalidSize {
        input: input.to_string(),
        reason: "numeric part could not be parsed".to_string(),
    })?;

    let unit = trimmed[digits.len()..].trim().to_ascii_uppercase();
    let multiplier: u64 = match unit.as_str() {
        "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        "PB" => 1 << 50,
        _ => return Err(ConfigError::UnknownSizeUnit { unit }),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::InvalidSize {
            input: input.to_string(),
            reason: "size overflows u64".to_string(),
        })
}

/// Formats a byte count with the largest exact base-1024 unit.
///
/// The inverse of [`parse_size`] for values it produced; sizes that do
/// not divide evenly fall back to a plain byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(&str, u64); 5] = [
        ("PB", 1 << 50),
        ("TB", 1 << 40),
        ("GB", 1 << 30),
        ("MB", 1 << 20),
        ("KB", 1 << 10),
    ];
    for (unit, multiplier) in UNITS {
        if bytes >= multiplier && bytes % multiplier == 0 {
            return format!("{}{unit}", bytes / multiplier);
        }
    }
    format!("{bytes}B")
}

/// Parses a duration string into a [`Duration`], normalized internally to
/// milliseconds.
///
/// Accepts an integer followed by `ms`, `s`, `m`, `h` or `d`
/// (case-insensitive, surrounding whitespace ignored).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidInterval`] for a missing or unparseable
/// numeric part and [`ConfigError::UnknownIntervalUnit`] for any other
/// suffix.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidInterval {
            input: input.to_string(),
            reason: "empty string".to_string(),
        });
    }

    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    let number: u64 = digits.parse().map_err(|_| ConfigError::InvalidInterval {
        input: input.to_string(),
        reason: "numeric part could not be parsed".to_string(),
    })?;

    let unit = trimmed[digits.len()..].trim().to_ascii_lowercase();
    let per_unit_ms: u64 = match unit.as_str() {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(ConfigError::UnknownIntervalUnit { unit }),
    };

    number
        .checked_mul(per_unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| ConfigError::InvalidInterval {
            input: input.to_string(),
            reason: "interval overflows u64 milliseconds".to_string(),
        })
}
