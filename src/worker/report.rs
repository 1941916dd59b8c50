use serde::{Deserialize, Serialize};
use crate::detection::DetectionKind;
use crate::models::{Finding, Location};

/// How a payload's processing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadOutcome {
    Completed,
    /// First-order navigation timed out; the callback window still ran.
    Timeout,
    /// Backend kept crashing until the retry budget ran out.
    Skipped,
    Error,
}

impl PayloadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadOutcome::Completed => "completed",
            PayloadOutcome::Timeout => "timeout",
            PayloadOutcome::Skipped => "skipped",
            PayloadOutcome::Error => "error",
        }
    }
}

/// One detection pass result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub location: Location,
    pub kind: DetectionKind,
}

/// Everything one payload produced.
///
/// A failed payload still carries the results of a first-order pass that
/// completed before the second-order pass went wrong; `failed_pass` then says
/// which pass the outcome applies to.
#[derive(Debug, Clone)]
pub struct PayloadReport {
    pub position: u64,
    pub outcome: PayloadOutcome,
    pub verdicts: Vec<Verdict>,
    pub findings: Vec<Finding>,
    /// Text of prompts dismissed while the payload was live.
    pub prompts: Vec<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub failed_pass: Option<Location>,
}
