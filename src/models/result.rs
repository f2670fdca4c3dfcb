use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SUCCEEDED: &str = "Succeeded";

/// Terminal outcome of an apply-mode provisioning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub succeeded: bool,
    pub provisioning_state: String,
    pub outputs: BTreeMap<String, String>,
}

impl DeploymentResult {
    pub fn new(provisioning_state: impl Into<String>, outputs: BTreeMap<String, String>) -> Self {
        let provisioning_state = provisioning_state.into();
        Self {
            succeeded: provisioning_state.eq_ignore_ascii_case(SUCCEEDED),
            provisioning_state,
            outputs,
        }
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub change_type: String,
    pub resource_id: String,
}

/// Predicted diff returned by a what-if call. Nothing was mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub changes: Vec<PlannedChange>,
}

impl PlanSummary {
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for change in &self.changes {
            *counts.entry(change.change_type.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.change_type == "NoChange" || c.change_type == "Ignore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::succeeded("Succeeded", true)]
    #[case::lowercase("succeeded", true)]
    #[case::failed("Failed", false)]
    #[case::canceled("Canceled", false)]
    fn succeeded_follows_provisioning_state(#[case] state: &str, #[case] expected: bool) {
        let result = DeploymentResult::new(state, BTreeMap::new());
        assert_eq!(result.succeeded, expected);
    }

    #[test]
    fn plan_counts_group_by_change_type() {
        let plan = PlanSummary {
            changes: vec![
                PlannedChange {
                    change_type: "Create".to_string(),
                    resource_id: "a".to_string(),
                },
                PlannedChange {
                    change_type: "Create".to_string(),
                    resource_id: "b".to_string(),
                },
                PlannedChange {
                    change_type: "NoChange".to_string(),
                    resource_id: "c".to_string(),
                },
            ],
        };
        let counts = plan.counts();
        assert_eq!(counts.get("Create"), Some(&2));
        assert_eq!(counts.get("NoChange"), Some(&1));
        assert!(!plan.is_empty());
    }
}
