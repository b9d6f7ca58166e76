use std::path::PathBuf;

use derive_more::Display;

/// Failure to build a policy snapshot from its configuration source.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[display("failed to read policy source {}", path.display())]
    Unreadable { path: PathBuf },

    /// The file extension does not map to a known document format.
    #[display("unsupported policy format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The document could not be deserialized.
    #[display("malformed policy document: {message}")]
    Malformed { message: String },

    #[display("duplicate rule for partition `{partition}`")]
    DuplicatePartition { partition: String },

    #[display("duplicate entry for GPU type `{name}`")]
    DuplicateGpuType { name: String },

    #[display("partition `{partition}` has invalid min_cpu_per_gpu {value}")]
    InvalidRatio { partition: String, value: f64 },

    #[display("GPU type `{name}` has invalid weight {value}")]
    InvalidWeight { name: String, value: f64 },

    #[display("GPU type `{name}` has invalid max {value}")]
    InvalidMax { name: String, value: u32 },

    #[display("invalid default_weight {value}")]
    InvalidDefaultWeight { value: f64 },

    /// `default_gpu_type` names a type missing from the GPU table.
    #[display("default GPU type `{name}` is not in the GPU type table")]
    UnknownDefaultGpuType { name: String },

    #[display("empty {field} in policy document")]
    EmptyName { field: &'static str },
}

impl core::error::Error for ConfigError {}

impl ConfigError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// A GRES string that does not follow `gpu:[type:]<count>`.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum GresError {
    #[display("malformed GRES `{spec}`: {reason}")]
    Malformed { spec: String, reason: &'static str },
}

impl core::error::Error for GresError {}

impl GresError {
    pub(crate) fn malformed(spec: &str, reason: &'static str) -> Self {
        Self::Malformed {
            spec: spec.to_string(),
            reason,
        }
    }
}
