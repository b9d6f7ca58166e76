//! GRES request parsing.
//!
//! Accepts the `gpu:<count>` and `gpu:<type>:<count>` forms. The type may
//! itself contain colons (`gpu:tesla:a40:2`), the count is always the last
//! colon-delimited token and must be a positive integer.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::GresError;

static GRES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^gpu:(?:(?P<kind>[_A-Za-z0-9]+(?::[_A-Za-z0-9]+)*):)?(?P<count>[^:]*)$")
        .expect("GRES pattern is valid")
});

/// A GPU request extracted from a GRES string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGres {
    /// Lower-cased GPU type, absent for the bare `gpu:<count>` form.
    pub gpu_type: Option<String>,
    /// Number of requested GPUs, always at least 1.
    pub gpu_count: u32,
}

/// Parses a GRES string such as `gpu:a40:2`.
pub fn parse(spec: &str) -> Result<ParsedGres, GresError> {
    let captures = GRES_PATTERN
        .captures(spec)
        .ok_or_else(|| GresError::malformed(spec, "expected gpu:[type:]<count>"))?;

    let count = &captures["count"];
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GresError::malformed(spec, "GPU count is not an integer"));
    }
    let gpu_count: u32 = count
        .parse()
        .map_err(|_| GresError::malformed(spec, "GPU count is out of range"))?;
    if gpu_count < 1 {
        return Err(GresError::malformed(spec, "GPU count must be at least 1"));
    }

    // a purely numeric middle segment is not a type name
    let gpu_type = captures
        .name("kind")
        .map(|m| m.as_str())
        .filter(|kind| !kind.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_lowercase);

    Ok(ParsedGres {
        gpu_type,
        gpu_count,
    })
}

impl FromStr for ParsedGres {
    type Err = GresError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for ParsedGres {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.gpu_type {
            Some(gpu_type) => write!(f, "gpu:{gpu_type}:{}", self.gpu_count),
            None => write!(f, "gpu:{}", self.gpu_count),
        }
    }
}
