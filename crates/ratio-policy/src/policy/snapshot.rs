use std::collections::BTreeMap;

use error_stack::bail;
use error_stack::Report;

use super::config::PolicyDocument;
use super::config::PolicySource;
use super::config::UnknownGpuTypePolicy;
use crate::decision::Acceptance;
use crate::decision::Decision;
use crate::decision::Rejection;
use crate::decision::ResourceRequest;
use crate::error::ConfigError;
use crate::gres;

/// Relative slack on the threshold, so that rounding in fractional weights
/// such as `0.1` does not reject a request sitting exactly on it. A ratio
/// below `min_cpu_per_gpu` by less than this fraction of it is accepted,
/// which relaxes the strict `<` comparison by that much and no more.
const RATIO_TOLERANCE: f64 = 1e-12;

/// Minimum CPU cores per effective GPU unit on one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRule {
    pub partition: String,
    pub min_cpu_per_gpu: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuTypeEntry {
    /// Name as written in the configuration.
    pub name: String,
    /// Relative computational power of one GPU of this type.
    pub weight: f64,
    /// Not consulted by the ratio check.
    pub max_per_node: Option<u32>,
}

/// An immutable, fully validated policy table.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySnapshot {
    enabled: bool,
    default_weight: f64,
    default_gpu_type: Option<String>,
    unknown_gpu_type: UnknownGpuTypePolicy,
    partition_rules: BTreeMap<String, PartitionRule>,
    // keyed by lower-cased name
    gpu_types: BTreeMap<String, GpuTypeEntry>,
}

impl PolicySnapshot {
    /// Reads and validates a policy source.
    pub fn load(source: &PolicySource) -> crate::Result<Self, ConfigError> {
        let document = source.read()?;
        Self::from_document(document)
    }

    pub fn from_document(document: PolicyDocument) -> crate::Result<Self, ConfigError> {
        if !is_positive(document.default_weight) {
            bail!(ConfigError::InvalidDefaultWeight {
                value: document.default_weight,
            });
        }

        let mut partition_rules = BTreeMap::new();
        for rule in document.partitions {
            if rule.partition.trim().is_empty() {
                bail!(ConfigError::EmptyName { field: "partition" });
            }
            if !is_positive(rule.min_cpu_per_gpu) {
                bail!(ConfigError::InvalidRatio {
                    partition: rule.partition,
                    value: rule.min_cpu_per_gpu,
                });
            }
            if partition_rules.contains_key(&rule.partition) {
                bail!(ConfigError::DuplicatePartition {
                    partition: rule.partition,
                });
            }
            partition_rules.insert(
                rule.partition.clone(),
                PartitionRule {
                    partition: rule.partition,
                    min_cpu_per_gpu: rule.min_cpu_per_gpu,
                },
            );
        }

        let mut gpu_types = BTreeMap::new();
        for entry in document.gpu_types {
            if entry.name.trim().is_empty() {
                bail!(ConfigError::EmptyName {
                    field: "GPU type name",
                });
            }
            if !is_positive(entry.weight) {
                bail!(ConfigError::InvalidWeight {
                    name: entry.name,
                    value: entry.weight,
                });
            }
            if entry.max == Some(0) {
                bail!(ConfigError::InvalidMax {
                    name: entry.name,
                    value: 0,
                });
            }
            let key = entry.name.to_lowercase();
            if gpu_types.contains_key(&key) {
                bail!(ConfigError::DuplicateGpuType { name: entry.name });
            }
            gpu_types.insert(
                key,
                GpuTypeEntry {
                    name: entry.name,
                    weight: entry.weight,
                    max_per_node: entry.max,
                },
            );
        }

        let default_gpu_type = match document.default_gpu_type {
            Some(name) => {
                let key = name.to_lowercase();
                if !gpu_types.contains_key(&key) {
                    return Err(Report::new(ConfigError::UnknownDefaultGpuType { name })
                        .attach_printable(format!("known GPU types: {}", gpu_types.len())));
                }
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            enabled: document.enabled,
            default_weight: document.default_weight,
            default_gpu_type,
            unknown_gpu_type: document.unknown_gpu_type,
            partition_rules,
            gpu_types,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    pub fn partition_rule(&self, partition: &str) -> Option<&PartitionRule> {
        self.partition_rules.get(partition)
    }

    /// Case-insensitive lookup.
    pub fn gpu_type(&self, name: &str) -> Option<&GpuTypeEntry> {
        self.gpu_types.get(&name.to_lowercase())
    }

    pub fn partition_rules(&self) -> impl Iterator<Item = &PartitionRule> {
        self.partition_rules.values()
    }

    pub fn gpu_types(&self) -> impl Iterator<Item = &GpuTypeEntry> {
        self.gpu_types.values()
    }

    /// Weight of one GPU of the given type, `None` if the type must be refused.
    pub fn resolve_weight(&self, gpu_type: Option<&str>) -> Option<f64> {
        match gpu_type {
            Some(name) => match self.gpu_type(name) {
                Some(entry) => Some(entry.weight),
                None => match self.unknown_gpu_type {
                    UnknownGpuTypePolicy::DefaultWeight => Some(self.default_weight),
                    UnknownGpuTypePolicy::Reject => None,
                },
            },
            None => Some(
                self.default_gpu_type
                    .as_ref()
                    .and_then(|key| self.gpu_types.get(key))
                    .map_or(self.default_weight, |entry| entry.weight),
            ),
        }
    }

    /// Checks one request against this table.
    pub fn evaluate(&self, request: &ResourceRequest) -> Decision {
        if !self.enabled {
            return Decision::Allowed(Acceptance::Disabled);
        }

        let Some(partition) = request.partition.as_deref() else {
            return Decision::Allowed(Acceptance::MissingPartition);
        };

        let Some(rule) = self.partition_rules.get(partition) else {
            return Decision::Allowed(Acceptance::Ungoverned);
        };

        let Some(gres) = request.gres.as_deref() else {
            return Decision::Rejected(Rejection::MissingGres {
                partition: partition.to_string(),
            });
        };

        let parsed = match gres::parse(gres) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Decision::Rejected(Rejection::InvalidGpuSpec {
                    partition: partition.to_string(),
                    gres: gres.to_string(),
                })
            }
        };

        let Some(weight) = self.resolve_weight(parsed.gpu_type.as_deref()) else {
            return Decision::Rejected(Rejection::UnknownGpuType {
                partition: partition.to_string(),
                gpu_type: parsed.gpu_type.unwrap_or_default(),
            });
        };

        // gpu_count >= 1 and weight > 0, so this is never zero
        let effective_gpu_units = f64::from(parsed.gpu_count) * weight;
        let ratio = f64::from(request.cpu_count) / effective_gpu_units;

        if ratio < rule.min_cpu_per_gpu * (1.0 - RATIO_TOLERANCE) {
            Decision::Rejected(Rejection::RatioBelowMinimum {
                partition: partition.to_string(),
                cpu_count: request.cpu_count,
                gpu_count: parsed.gpu_count,
                min_cpu_per_gpu: rule.min_cpu_per_gpu,
            })
        } else {
            Decision::Allowed(Acceptance::RatioSatisfied { ratio })
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::policy::config::GpuTypeConfig;
    use crate::policy::config::PartitionRuleConfig;

    fn document() -> PolicyDocument {
        PolicyDocument {
            partitions: vec![PartitionRuleConfig {
                partition: "es1".to_string(),
                min_cpu_per_gpu: 2.0,
            }],
            gpu_types: vec![
                GpuTypeConfig {
                    name: "A40".to_string(),
                    weight: 16.0,
                    max: Some(4),
                },
                GpuTypeConfig {
                    name: "v100".to_string(),
                    weight: 4.0,
                    max: None,
                },
            ],
            ..Default::default()
        }
    }

    fn request(partition: &str, gres: &str, cpu_count: u32) -> ResourceRequest {
        ResourceRequest::new(cpu_count)
            .with_partition(partition)
            .with_gres(gres)
    }

    fn context_of(document: PolicyDocument) -> ConfigError {
        PolicySnapshot::from_document(document)
            .expect_err("document should be rejected")
            .current_context()
            .clone()
    }

    #[test]
    fn builds_lookup_tables() {
        let snapshot = PolicySnapshot::from_document(document()).expect("valid document");
        assert_eq!(
            snapshot.partition_rule("es1").map(|r| r.min_cpu_per_gpu),
            Some(2.0)
        );
        assert!(snapshot.partition_rule("ES1").is_none());
        assert_eq!(snapshot.gpu_type("a40").map(|g| g.name.as_str()), Some("A40"));
        assert_eq!(snapshot.gpu_type("V100").map(|g| g.weight), Some(4.0));
        assert_eq!(snapshot.gpu_types().count(), 2);
    }

    #[test]
    fn rejects_duplicate_partitions() {
        let mut doc = document();
        doc.partitions.push(PartitionRuleConfig {
            partition: "es1".to_string(),
            min_cpu_per_gpu: 4.0,
        });
        assert_eq!(
            context_of(doc),
            ConfigError::DuplicatePartition {
                partition: "es1".to_string(),
            }
        );
    }

    #[test]
    fn rejects_duplicate_gpu_types_ignoring_case() {
        let mut doc = document();
        doc.gpu_types.push(GpuTypeConfig {
            name: "a40".to_string(),
            weight: 8.0,
            max: None,
        });
        assert_eq!(
            context_of(doc),
            ConfigError::DuplicateGpuType {
                name: "a40".to_string(),
            }
        );
    }

    #[test]
    fn rejects_non_positive_values() {
        let mut doc = document();
        doc.partitions[0].min_cpu_per_gpu = 0.0;
        assert!(matches!(context_of(doc), ConfigError::InvalidRatio { .. }));

        let mut doc = document();
        doc.partitions[0].min_cpu_per_gpu = f64::NAN;
        assert!(matches!(context_of(doc), ConfigError::InvalidRatio { .. }));

        let mut doc = document();
        doc.gpu_types[0].weight = -1.0;
        assert!(matches!(context_of(doc), ConfigError::InvalidWeight { .. }));

        let mut doc = document();
        doc.gpu_types[1].max = Some(0);
        assert!(matches!(context_of(doc), ConfigError::InvalidMax { .. }));

        let mut doc = document();
        doc.default_weight = 0.0;
        assert!(matches!(
            context_of(doc),
            ConfigError::InvalidDefaultWeight { .. }
        ));
    }

    #[test]
    fn rejects_empty_names() {
        let mut doc = document();
        doc.partitions[0].partition = " ".to_string();
        assert_eq!(
            context_of(doc),
            ConfigError::EmptyName { field: "partition" }
        );
    }

    #[test]
    fn rejects_unknown_default_gpu_type() {
        let mut doc = document();
        doc.default_gpu_type = Some("h100".to_string());
        assert!(matches!(
            context_of(doc),
            ConfigError::UnknownDefaultGpuType { .. }
        ));
    }

    #[test]
    fn empty_gpu_table_falls_back_to_default_weight() {
        let mut doc = document();
        doc.gpu_types.clear();
        let snapshot = PolicySnapshot::from_document(doc).expect("valid document");
        assert_eq!(snapshot.resolve_weight(Some("a40")), Some(1.0));
        assert_eq!(snapshot.resolve_weight(None), Some(1.0));
    }

    #[test]
    fn resolves_weights() {
        let mut doc = document();
        doc.default_gpu_type = Some("V100".to_string());
        let snapshot = PolicySnapshot::from_document(doc).expect("valid document");

        assert_eq!(snapshot.resolve_weight(Some("a40")), Some(16.0));
        assert_eq!(snapshot.resolve_weight(None), Some(4.0));
        assert_eq!(snapshot.resolve_weight(Some("h100")), Some(1.0));

        let mut doc = document();
        doc.unknown_gpu_type = UnknownGpuTypePolicy::Reject;
        let strict = PolicySnapshot::from_document(doc).expect("valid document");
        assert_eq!(strict.resolve_weight(Some("h100")), None);
        assert_eq!(strict.resolve_weight(None), Some(1.0));
    }

    #[test]
    fn weighted_ratio_check() {
        let snapshot = PolicySnapshot::from_document(document()).expect("valid document");

        // 2 x a40 at weight 16 = 32 units, 64 / 32 = 2
        assert_eq!(
            snapshot.evaluate(&request("es1", "gpu:a40:2", 64)),
            Decision::Allowed(Acceptance::RatioSatisfied { ratio: 2.0 })
        );
        assert_eq!(
            snapshot.evaluate(&request("es1", "gpu:a40:2", 63)),
            Decision::Rejected(Rejection::RatioBelowMinimum {
                partition: "es1".to_string(),
                cpu_count: 63,
                gpu_count: 2,
                min_cpu_per_gpu: 2.0,
            })
        );
    }

    #[test]
    fn strict_mode_refuses_unknown_types() {
        let mut doc = document();
        doc.unknown_gpu_type = UnknownGpuTypePolicy::Reject;
        let snapshot = PolicySnapshot::from_document(doc).expect("valid document");

        let decision = snapshot.evaluate(&request("es1", "gpu:H100:1", 64));
        assert_eq!(
            decision.reason().as_deref(),
            Some("unknown GPU type `h100` on partition `es1`")
        );
    }

    #[test]
    fn disabled_policy_accepts_everything() {
        let mut doc = document();
        doc.enabled = false;
        let snapshot = PolicySnapshot::from_document(doc).expect("valid document");

        assert_eq!(
            snapshot.evaluate(&ResourceRequest::new(0).with_partition("es1")),
            Decision::Allowed(Acceptance::Disabled)
        );
    }

    #[test]
    fn fractional_weights_on_threshold_pass() {
        let mut doc = document();
        doc.partitions[0].min_cpu_per_gpu = 10.0;
        doc.gpu_types.push(GpuTypeConfig {
            name: "mig".to_string(),
            weight: 0.1,
            max: None,
        });
        let snapshot = PolicySnapshot::from_document(doc).expect("valid document");

        assert!(snapshot.evaluate(&request("es1", "gpu:mig:3", 3)).is_allowed());
        assert!(!snapshot.evaluate(&request("es1", "gpu:mig:3", 2)).is_allowed());
    }

    #[test]
    fn ratio_just_below_threshold_is_refused() {
        let mut doc = document();
        doc.partitions[0].min_cpu_per_gpu = 2.000_000_000_5;
        let snapshot = PolicySnapshot::from_document(doc).expect("valid document");

        let decision = snapshot.evaluate(&request("es1", "gpu:1", 2));
        assert!(matches!(
            decision,
            Decision::Rejected(Rejection::RatioBelowMinimum { .. })
        ));
    }

    #[test]
    fn zero_cpus_never_pass_a_governed_partition() {
        let snapshot = PolicySnapshot::from_document(document()).expect("valid document");
        assert!(!snapshot.evaluate(&request("es1", "gpu:1", 0)).is_allowed());
    }
}
