//! Ratio policy table, its loader and the engine that serves it.

mod config;
mod engine;
mod snapshot;

pub use config::ConfigFormat;
pub use config::Document;
pub use config::GpuTypeConfig;
pub use config::PartitionRuleConfig;
pub use config::PolicyDocument;
pub use config::PolicySource;
pub use config::UnknownGpuTypePolicy;
pub use engine::RatioPolicyEngine;
pub use snapshot::GpuTypeEntry;
pub use snapshot::PartitionRule;
pub use snapshot::PolicySnapshot;
