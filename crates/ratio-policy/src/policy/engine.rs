use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::config::PolicySource;
use super::snapshot::PolicySnapshot;
use crate::decision::Acceptance;
use crate::decision::Decision;
use crate::decision::ResourceRequest;
use crate::error::ConfigError;

/// Process-wide holder of the active policy snapshot.
///
/// Evaluations clone the current `Arc` and work on it without holding the
/// lock; a reload builds the replacement completely before swapping it in.
#[derive(Debug)]
pub struct RatioPolicyEngine {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl RatioPolicyEngine {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Initial load. There is no previous snapshot to fall back to, so a
    /// failure here means the caller must refuse to start.
    pub fn load(source: &PolicySource) -> crate::Result<Self, ConfigError> {
        let snapshot = PolicySnapshot::load(source)?;
        log_loaded("loaded", &snapshot);
        Ok(Self::new(snapshot))
    }

    /// Rebuilds the policy from `source` and publishes it. On failure the
    /// previously active snapshot stays in effect.
    pub fn reload(&self, source: &PolicySource) -> crate::Result<Arc<PolicySnapshot>, ConfigError> {
        match PolicySnapshot::load(source) {
            Ok(snapshot) => {
                log_loaded("reloaded", &snapshot);
                let snapshot = Arc::new(snapshot);
                self.publish(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(report) => {
                error!(
                    "Policy reload failed, keeping last-good policy: {}",
                    report.current_context()
                );
                Err(report)
            }
        }
    }

    /// Swaps in an already built snapshot and returns the one it replaced.
    pub fn replace(&self, snapshot: PolicySnapshot) -> Arc<PolicySnapshot> {
        self.publish(Arc::new(snapshot))
    }

    /// The snapshot currently in effect.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn evaluate(&self, request: &ResourceRequest) -> Decision {
        let decision = self.snapshot().evaluate(request);
        match &decision {
            Decision::Allowed(Acceptance::MissingPartition) => {
                warn!(
                    cpu_count = request.cpu_count,
                    gres = request.gres.as_deref(),
                    "Missing partition info, ratio check skipped"
                );
            }
            Decision::Allowed(Acceptance::Ungoverned) => {
                debug!(
                    partition = request.partition.as_deref(),
                    "Partition has no ratio rule"
                );
            }
            Decision::Allowed(_) => {}
            Decision::Rejected(rejection) => {
                info!(
                    partition = request.partition.as_deref(),
                    gres = request.gres.as_deref(),
                    cpu_count = request.cpu_count,
                    "Request refused: {rejection}"
                );
            }
        }
        decision
    }

    fn publish(&self, snapshot: Arc<PolicySnapshot>) -> Arc<PolicySnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, snapshot)
    }
}

fn log_loaded(action: &str, snapshot: &PolicySnapshot) {
    info!(
        enabled = snapshot.is_enabled(),
        partitions = snapshot.partition_rules().count(),
        gpu_types = snapshot.gpu_types().count(),
        "Ratio policy {action}"
    );
}
