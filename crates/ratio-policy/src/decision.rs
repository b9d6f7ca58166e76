use derive_more::Display;

/// One admission request, built per evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    /// Target partition, `None` when the host did not resolve one.
    pub partition: Option<String>,
    /// Raw GRES string, e.g. `gpu:a40:2`.
    pub gres: Option<String>,
    /// Requested CPU cores.
    pub cpu_count: u32,
}

impl ResourceRequest {
    pub fn new(cpu_count: u32) -> Self {
        Self {
            cpu_count,
            ..Default::default()
        }
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_gres(mut self, gres: impl Into<String>) -> Self {
        self.gres = Some(gres.into());
        self
    }
}

/// Why a request was let through.
#[derive(Debug, Clone, PartialEq)]
pub enum Acceptance {
    /// The policy switch is off.
    Disabled,
    /// No partition was supplied, so the check could not run.
    MissingPartition,
    /// The partition has no ratio rule.
    Ungoverned,
    /// The observed CPU per effective GPU unit ratio met the threshold.
    RatioSatisfied { ratio: f64 },
}

/// Why a request was refused. `Display` renders the user-facing message.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum Rejection {
    #[display("missing GRES on governed partition `{partition}`")]
    MissingGres { partition: String },

    #[display("missing/invalid GPU specification on partition `{partition}` (gres `{gres}`)")]
    InvalidGpuSpec { partition: String, gres: String },

    #[display("unknown GPU type `{gpu_type}` on partition `{partition}`")]
    UnknownGpuType { partition: String, gpu_type: String },

    #[display(
        "CPU={cpu_count}, GPU={gpu_count}, ratio below required {min_cpu_per_gpu} on partition `{partition}`"
    )]
    RatioBelowMinimum {
        partition: String,
        cpu_count: u32,
        gpu_count: u32,
        min_cpu_per_gpu: f64,
    },
}

/// Outcome of evaluating a [`ResourceRequest`] against a policy snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed(Acceptance),
    Rejected(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// The rejection message, present iff the request was refused.
    pub fn reason(&self) -> Option<String> {
        match self {
            Decision::Allowed(_) => None,
            Decision::Rejected(rejection) => Some(rejection.to_string()),
        }
    }

    /// True when the request passed only because context was missing.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Decision::Allowed(Acceptance::MissingPartition))
    }
}
