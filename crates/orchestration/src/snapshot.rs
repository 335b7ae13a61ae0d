//! Shared pieces of the saga data snapshot.

use serde::{Deserialize, Serialize};

/// Outcome of one compensating action, recorded in the saga's data
/// snapshot so failed compensations stay queryable for manual remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationOutcome {
    /// The forward step this action compensated.
    pub step: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl CompensationOutcome {
    /// Records a successful compensation.
    pub fn ok(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            succeeded: true,
            error: None,
        }
    }

    /// Records a failed compensation.
    pub fn failed(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        let ok = CompensationOutcome::ok("delete_profile");
        assert!(ok.succeeded);
        assert!(ok.error.is_none());

        let failed = CompensationOutcome::failed("delete_profile", "store down");
        assert!(!failed.succeeded);
        assert_eq!(failed.error.as_deref(), Some("store down"));
    }

    #[test]
    fn serialization_roundtrip() {
        let outcome = CompensationOutcome::failed("reactivate_work_slot", "timeout");
        let json = serde_json::to_string(&outcome).unwrap();
        let deserialized: CompensationOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, deserialized);
    }
}
