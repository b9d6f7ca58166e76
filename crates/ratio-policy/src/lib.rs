//! CPU-to-GPU ratio admission policy for cluster job requests.
//!
//! This crate provides:
//! - [`gres`]: parsing of `gpu:[type:]<count>` resource strings
//! - [`RatioPolicyEngine`]: an atomically reloadable policy table that
//!   turns a [`ResourceRequest`] into a [`Decision`]
//! - [`hook`]: the submit/modify translation used by the scheduler plugin
//!
//! Evaluation never fails; only loading a policy does, with [`ConfigError`].

use error_stack::Report;

mod decision;
mod error;
pub mod gres;
pub mod hook;
mod policy;

/// Result type using error-stack for context-rich error reporting
pub type Result<T, C> = core::result::Result<T, Report<C>>;

pub use decision::Acceptance;
pub use decision::Decision;
pub use decision::Rejection;
pub use decision::ResourceRequest;
pub use error::ConfigError;
pub use error::GresError;
pub use gres::ParsedGres;
pub use policy::ConfigFormat;
pub use policy::Document;
pub use policy::GpuTypeConfig;
pub use policy::GpuTypeEntry;
pub use policy::PartitionRule;
pub use policy::PartitionRuleConfig;
pub use policy::PolicyDocument;
pub use policy::PolicySnapshot;
pub use policy::PolicySource;
pub use policy::RatioPolicyEngine;
pub use policy::UnknownGpuTypePolicy;
