//! Policy documents and the sources they are read from.
//!
//! A policy document looks like this in YAML:
//!
//! ```yaml
//! enabled: true
//! default_weight: 1
//! default_gpu_type: v100
//! unknown_gpu_type: default_weight
//! partitions:
//!   - partition: es1
//!     min_cpu_per_gpu: 2
//! gpu_types:
//!   - name: a40
//!     weight: 16
//!     max: 4
//! ```
//!
//! The GPU type table may also live in its own document, either as a bare
//! list of entries or under a `gpu_types` key.
//!
//! Scheduler plugin documents, with a `[gresratio]` section, are also
//! accepted and mapped onto a [`PolicyDocument`]:
//!
//! ```toml
//! [gresratio]
//! enable_gres_ratio_plugin = true
//! default_card = "V100"
//! partition = "es1"
//! card.v100 = 4
//! card.a40 = 16
//! ```
//!
//! Each `card.<name>` value is the CPU cores required per GPU of that card.
//! It becomes the card's weight under a `min_cpu_per_gpu` of 1 on the
//! configured partition. Cards may also be listed in a top-level `[card]` table.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::error::ConfigError;

/// What to do with a GPU type that is named in a request but has no table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownGpuTypePolicy {
    /// Treat it like an unspecified type.
    #[default]
    DefaultWeight,
    /// Refuse the request.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(
        default = "default_weight",
        deserialize_with = "deserialize_f64_from_string"
    )]
    pub default_weight: f64,
    #[serde(default)]
    pub default_gpu_type: Option<String>,
    #[serde(default)]
    pub unknown_gpu_type: UnknownGpuTypePolicy,
    #[serde(default)]
    pub partitions: Vec<PartitionRuleConfig>,
    #[serde(default)]
    pub gpu_types: Vec<GpuTypeConfig>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_weight: default_weight(),
            default_gpu_type: None,
            unknown_gpu_type: UnknownGpuTypePolicy::default(),
            partitions: Vec::new(),
            gpu_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionRuleConfig {
    pub partition: String,
    #[serde(deserialize_with = "deserialize_f64_from_string")]
    pub min_cpu_per_gpu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpuTypeConfig {
    pub name: String,
    #[serde(
        default = "default_weight",
        deserialize_with = "deserialize_f64_from_string"
    )]
    pub weight: f64,
    #[serde(default)]
    pub max: Option<u32>,
}

/// Standalone GPU type table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum GpuTypeDocument {
    List(Vec<GpuTypeConfig>),
    Table { gpu_types: Vec<GpuTypeConfig> },
}

impl GpuTypeDocument {
    fn into_entries(self) -> Vec<GpuTypeConfig> {
        match self {
            GpuTypeDocument::List(entries) => entries,
            GpuTypeDocument::Table { gpu_types } => gpu_types,
        }
    }
}

/// Only used to tell the two policy layouts apart.
#[derive(Deserialize)]
struct LayoutMarker {
    gresratio: Option<serde::de::IgnoredAny>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyDocument {
    gresratio: LegacySection,
    #[serde(default)]
    card: BTreeMap<String, CpuPerCard>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacySection {
    #[serde(default = "default_enabled")]
    enable_gres_ratio_plugin: bool,
    #[serde(default)]
    default_card: Option<String>,
    #[serde(default = "default_legacy_partition")]
    partition: String,
    #[serde(default)]
    card: BTreeMap<String, CpuPerCard>,
}

#[derive(Debug, Deserialize)]
struct CpuPerCard(#[serde(deserialize_with = "deserialize_f64_from_string")] f64);

impl From<LegacyDocument> for PolicyDocument {
    fn from(legacy: LegacyDocument) -> Self {
        let section = legacy.gresratio;
        let gpu_types: Vec<GpuTypeConfig> = section
            .card
            .into_iter()
            .chain(legacy.card)
            .map(|(name, CpuPerCard(cpus))| GpuTypeConfig {
                name,
                weight: cpus,
                max: None,
            })
            .collect();

        // a default card without an entry falls back to the default weight
        let default_gpu_type = section
            .default_card
            .filter(|card| gpu_types.iter().any(|g| g.name.eq_ignore_ascii_case(card)));

        PolicyDocument {
            enabled: section.enable_gres_ratio_plugin,
            default_weight: default_weight(),
            default_gpu_type,
            unknown_gpu_type: UnknownGpuTypePolicy::DefaultWeight,
            partitions: vec![PartitionRuleConfig {
                partition: section.partition,
                min_cpu_per_gpu: 1.0,
            }],
            gpu_types,
        }
    }
}

fn default_legacy_partition() -> String {
    "es1".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

/// Accepts numbers written either bare or quoted, e.g. `weight: "4"`.
fn deserialize_f64_from_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Float(f64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse::<f64>().map_err(|e| {
            serde::de::Error::custom(format!("failed to parse number from string '{s}': {e}"))
        }),
        StringOrNumber::Float(f) => Ok(f),
    }
}

/// Serialization format of a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    fn parse<T: DeserializeOwned>(self, content: &str) -> crate::Result<T, ConfigError> {
        let context = || ConfigError::malformed(format!("invalid {self} document"));
        match self {
            ConfigFormat::Yaml => serde_yaml::from_str(content).change_context_lazy(context),
            ConfigFormat::Json => serde_json::from_str(content).change_context_lazy(context),
            ConfigFormat::Toml => toml::from_str(content).change_context_lazy(context),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Yaml => f.write_str("YAML"),
            ConfigFormat::Json => f.write_str("JSON"),
            ConfigFormat::Toml => f.write_str("TOML"),
        }
    }
}

/// A single configuration document, on disk or in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    File(PathBuf),
    Inline {
        format: ConfigFormat,
        content: String,
    },
}

impl Document {
    fn contents(&self) -> crate::Result<(ConfigFormat, Cow<'_, str>), ConfigError> {
        match self {
            Document::File(path) => {
                let format = ConfigFormat::from_path(path).ok_or_else(|| {
                    Report::new(ConfigError::UnsupportedFormat { path: path.clone() })
                        .attach_printable("expected one of .yaml, .yml, .json, .toml")
                })?;
                let content = std::fs::read_to_string(path)
                    .change_context_lazy(|| ConfigError::Unreadable { path: path.clone() })?;
                Ok((format, Cow::Owned(content)))
            }
            Document::Inline { format, content } => Ok((*format, Cow::Borrowed(content.as_str()))),
        }
    }

    fn describe(&self) -> String {
        match self {
            Document::File(path) => format!("while reading {}", path.display()),
            Document::Inline { format, .. } => format!("while reading inline {format} document"),
        }
    }

    fn read<T: DeserializeOwned>(&self) -> crate::Result<T, ConfigError> {
        let (format, content) = self.contents()?;
        format
            .parse(&content)
            .attach_printable_lazy(|| self.describe())
    }

    /// Reads a policy in either the current or the `[gresratio]` layout.
    fn read_policy(&self) -> crate::Result<PolicyDocument, ConfigError> {
        let (format, content) = self.contents()?;
        let marker: LayoutMarker = format
            .parse(&content)
            .attach_printable_lazy(|| self.describe())?;
        let document = if marker.gresratio.is_some() {
            format
                .parse::<LegacyDocument>(&content)
                .map(PolicyDocument::from)
        } else {
            format.parse(&content)
        };
        document.attach_printable_lazy(|| self.describe())
    }
}

/// Where a policy snapshot is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySource {
    pub policy: Document,
    /// Separate GPU type table, merged with the policy's own `gpu_types`.
    pub gpu_types: Option<Document>,
}

impl PolicySource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            policy: Document::File(path.into()),
            gpu_types: None,
        }
    }

    pub fn inline(format: ConfigFormat, content: impl Into<String>) -> Self {
        Self {
            policy: Document::Inline {
                format,
                content: content.into(),
            },
            gpu_types: None,
        }
    }

    pub fn with_gpu_types(mut self, document: Document) -> Self {
        self.gpu_types = Some(document);
        self
    }

    /// Reads every document and returns the combined, not yet validated, policy.
    pub fn read(&self) -> crate::Result<PolicyDocument, ConfigError> {
        let mut document = self.policy.read_policy()?;
        if let Some(gpu_types) = &self.gpu_types {
            let extra: GpuTypeDocument = gpu_types.read()?;
            document.gpu_types.extend(extra.into_entries());
        }
        Ok(document)
    }
}
