//! Submit and modify entry points for the scheduler's job_submit plugin.
//!
//! The host fills a [`JobDescriptor`] (and, on modify, the [`JobRecord`] of
//! the existing job), and turns the returned [`HookResponse`] into its own
//! accept/reject protocol.

use crate::decision::ResourceRequest;
use crate::policy::RatioPolicyEngine;

pub const SLURM_SUCCESS: i32 = 0;
/// "Invalid generic resource (gres) specification"
pub const ESLURM_INVALID_GRES: i32 = 2072;
/// Marker the host uses for a numeric field left unset in a request.
pub const NO_VAL: u32 = 0xffff_fffe;

/// Fields of a submit or modify request. Absent fields were not given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDescriptor {
    pub partition: Option<String>,
    pub gres: Option<String>,
    pub min_cpus: Option<u32>,
}

impl JobDescriptor {
    /// Maps the host's `NO_VAL` marker to an absent CPU count.
    pub fn with_raw_min_cpus(mut self, min_cpus: u32) -> Self {
        self.min_cpus = (min_cpus != NO_VAL).then_some(min_cpus);
        self
    }
}

/// Current state of a job being modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRecord {
    pub partition: Option<String>,
    pub gres: Option<String>,
    pub total_cpus: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResponse {
    pub code: i32,
    /// User-facing message, set when the request is refused.
    pub message: Option<String>,
}

impl HookResponse {
    pub fn is_success(&self) -> bool {
        self.code == SLURM_SUCCESS
    }
}

pub fn job_submit(engine: &RatioPolicyEngine, desc: &JobDescriptor) -> HookResponse {
    let request = ResourceRequest {
        partition: desc.partition.clone(),
        gres: desc.gres.clone(),
        cpu_count: desc.min_cpus.unwrap_or(0),
    };
    respond(engine, &request)
}

/// Each field falls back to the job's current value when the modify
/// request leaves it out.
pub fn job_modify(engine: &RatioPolicyEngine, desc: &JobDescriptor, job: &JobRecord) -> HookResponse {
    let request = ResourceRequest {
        partition: desc.partition.clone().or_else(|| job.partition.clone()),
        gres: desc.gres.clone().or_else(|| job.gres.clone()),
        cpu_count: desc.min_cpus.unwrap_or(job.total_cpus),
    };
    respond(engine, &request)
}

fn respond(engine: &RatioPolicyEngine, request: &ResourceRequest) -> HookResponse {
    let decision = engine.evaluate(request);
    match decision.reason() {
        None => HookResponse {
            code: SLURM_SUCCESS,
            message: None,
        },
        Some(reason) => HookResponse {
            code: ESLURM_INVALID_GRES,
            message: Some(reason),
        },
    }
}
