use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Named sections every deployment report carries, even when empty.
pub const SECTIONS: [&str; 3] = ["security", "backup", "monitoring"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportStatus {
    Succeeded,
    Failed,
    Planned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportKind {
    Deployment,
    Validation,
}

/// Flat audit record written after a deployment or validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub run_id: String,
    pub kind: ReportKind,
    pub status: ReportStatus,
    pub timestamp: Timestamp,
    pub environment: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl DeploymentReport {
    pub fn new(
        run_id: String,
        kind: ReportKind,
        status: ReportStatus,
        timestamp: Timestamp,
        environment: impl Into<String>,
    ) -> Self {
        let sections = match kind {
            ReportKind::Deployment => SECTIONS
                .iter()
                .map(|s| ((*s).to_string(), BTreeMap::new()))
                .collect(),
            ReportKind::Validation => BTreeMap::new(),
        };
        Self {
            run_id,
            kind,
            status,
            timestamp,
            environment: environment.into(),
            resource_group: String::new(),
            location: String::new(),
            sections,
        }
    }

    pub fn with_resource(mut self, resource_group: &str, location: &str) -> Self {
        self.resource_group = resource_group.to_string();
        self.location = location.to_string();
        self
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }
}
