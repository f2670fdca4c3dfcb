use serde::{Deserialize, Serialize};

/// Line and branch coverage, both as percentages in `0.0..=100.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub line_rate: f64,
    pub branch_rate: f64,
}

impl CoverageSummary {
    pub fn new(line_rate: f64, branch_rate: f64) -> Self {
        Self {
            line_rate,
            branch_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub passed: bool,
}

/// Outcome of comparing a summary against a threshold. A failing verdict is
/// a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageVerdict {
    pub threshold: f64,
    pub line: Metric,
    pub branch: Metric,
}

impl CoverageVerdict {
    pub fn passed(&self) -> bool {
        self.line.passed && self.branch.passed
    }
}
