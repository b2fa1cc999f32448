//! Warning downgrade filter.
//!
//! Some failures reported by the transfer and verification steps are expected
//! noise: the destination refusing writes to protected or hidden references
//! during a mirror push, a push that had nothing to do, or lock contention on
//! the local mirror. These are recorded as warnings and the pipeline keeps
//! going.
//!
//! A missing file is never benign for transfer or verification: it means the
//! local mirror is gone. Only best-effort cleanup treats it as already done.

use crate::record::StepName;

/// Benign failure substrings, lowercase.
const BENIGN_PATTERNS: &[&str] = &[
    // Destination rejecting protected or hidden references
    "protected branch",
    "protected tag",
    "deny updating a hidden ref",
    "hidden ref",
    "refs/pull/",
    // Nothing to transfer
    "everything up-to-date",
    "everything up to date",
    // Filesystem contention
    "resource busy",
    "ebusy",
    "is locked",
    ".lock': file exists",
];

/// Missing-file substrings, lowercase. Cleanup only.
const MISSING_FILE_PATTERNS: &[&str] = &["enoent", "no such file or directory"];

/// Whether a failure message matches a known-benign pattern.
pub fn is_downgradable(raw_message: &str) -> bool {
    let message = raw_message.to_lowercase();
    BENIGN_PATTERNS.iter().any(|p| message.contains(p))
}

/// Whether a cleanup failure only says the target was already gone.
pub fn is_missing_file(raw_message: &str) -> bool {
    let message = raw_message.to_lowercase();
    MISSING_FILE_PATTERNS.iter().any(|p| message.contains(p))
}

/// Whether failures of `step` are eligible for downgrading at all.
pub fn step_allows_downgrade(step: StepName) -> bool {
    matches!(step, StepName::TransferContent | StepName::VerifyFinal)
}

/// Combined check used by the orchestrator.
pub fn should_downgrade(step: StepName, raw_message: &str) -> bool {
    step_allows_downgrade(step) && is_downgradable(raw_message)
}
