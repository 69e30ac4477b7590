//! Per-layer outcome of an export job.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::error::{FieldMappingError, LayerError};

/// Outcome of a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    /// Everything in the layer was exported.
    Success,
    /// The layer was exported, but some of its features or properties were skipped.
    Warning,
    /// The layer was not exported.
    Error,
}

/// Reason a feature was skipped or exported partially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The feature has no geometry.
    EmptyGeometry,
    /// The geometry of the feature is inconsistent.
    InvalidGeometry,
    /// A mapped property could not be resolved.
    FieldMapping,
}

/// Problem with one feature of a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureIssue {
    /// Id of the feature.
    pub feature_id: String,
    /// Kind of the problem.
    pub kind: IssueKind,
    /// Human readable description.
    pub message: String,
}

impl FeatureIssue {
    /// Issue for a feature without geometry.
    pub fn empty_geometry(feature_id: impl Into<String>) -> Self {
        let feature_id = feature_id.into();
        Self {
            message: format!("feature {feature_id} has no geometry"),
            feature_id,
            kind: IssueKind::EmptyGeometry,
        }
    }

    /// Issue for a feature whose geometry can not be written.
    pub fn invalid_geometry(feature_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            kind: IssueKind::InvalidGeometry,
            message: message.into(),
        }
    }

    /// Issue for a property that could not be resolved.
    pub fn field_mapping(feature_id: impl Into<String>, error: &FieldMappingError) -> Self {
        Self {
            feature_id: feature_id.into(),
            kind: IssueKind::FieldMapping,
            message: error.to_string(),
        }
    }
}

/// Outcome of a single layer of the job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    /// Name of the layer.
    pub layer_name: String,
    /// Status.
    pub status: LayerStatus,
    /// Summary of what happened.
    pub message: String,
    /// Features that were skipped or exported partially.
    pub issues: Vec<FeatureIssue>,
}

impl LayerReport {
    /// Report of a layer that was exported. The status depends on whether there are any issues.
    pub fn exported(layer_name: impl Into<String>, message: impl Into<String>, issues: Vec<FeatureIssue>) -> Self {
        Self {
            layer_name: layer_name.into(),
            status: if issues.is_empty() {
                LayerStatus::Success
            } else {
                LayerStatus::Warning
            },
            message: message.into(),
            issues,
        }
    }

    /// Report of a layer that failed.
    pub fn failed(layer_name: impl Into<String>, error: &LayerError, issues: Vec<FeatureIssue>) -> Self {
        Self {
            layer_name: layer_name.into(),
            status: LayerStatus::Error,
            message: error.to_string(),
            issues,
        }
    }
}

/// Outcome of all layers of an export job, in the job order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    layers: Vec<LayerReport>,
}

impl ExportReport {
    /// Adds a layer report.
    pub fn push(&mut self, report: LayerReport) {
        self.layers.push(report);
    }

    /// Layer reports in the job order.
    pub fn layers(&self) -> &[LayerReport] {
        &self.layers
    }

    /// Report of the layer with the given name.
    pub fn layer(&self, name: &str) -> Option<&LayerReport> {
        self.layers.iter().find(|l| l.layer_name == name)
    }

    /// Number of layers that ended up in the output.
    pub fn exported_count(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| l.status != LayerStatus::Error)
            .count()
    }

    /// Returns true if any of the layers failed.
    pub fn has_errors(&self) -> bool {
        self.layers.iter().any(|l| l.status == LayerStatus::Error)
    }

    /// Total number of feature issues over all layers.
    pub fn issue_count(&self) -> usize {
        self.layers.iter().map(|l| l.issues.len()).sum()
    }
}

impl Display for ExportReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for layer in &self.layers {
            let status = match layer.status {
                LayerStatus::Success => "ok",
                LayerStatus::Warning => "warning",
                LayerStatus::Error => "error",
            };
            writeln!(f, "[{status}] {}: {}", layer.layer_name, layer.message)?;
            for issue in &layer.issues {
                writeln!(f, "    {}", issue.message)?;
            }
        }

        Ok(())
    }
}
