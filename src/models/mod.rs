mod coverage;
mod issue;
mod report;
mod request;
mod result;

pub use coverage::{CoverageSummary, CoverageVerdict, Metric};
pub use issue::{Severity, ValidationIssue};
pub use report::{DeploymentReport, ReportKind, ReportStatus, SECTIONS};
pub use request::{Credentials, DeploymentRequest};
pub use result::{DeploymentResult, PlanSummary, PlannedChange};
