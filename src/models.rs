use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cipher::EncryptedField;

/// One student's data for a batch. `E` is the email representation: plaintext
/// after validation, [`EncryptedField`] once sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord<E = String> {
    pub id: String,
    pub name: String,
    pub email: E,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_aspiration: Option<String>,
    #[serde(default)]
    pub extracurricular_activities: BTreeSet<String>,
}

pub type EncryptedRecord = StudentRecord<EncryptedField>;

impl<E> StudentRecord<E> {
    /// Replaces the email field, keeping every other field as is.
    pub fn try_map_email<F, Err>(
        self,
        f: impl FnOnce(E) -> Result<F, Err>,
    ) -> Result<StudentRecord<F>, Err> {
        Ok(StudentRecord {
            email: f(self.email)?,
            id: self.id,
            name: self.name,
            gender: self.gender,
            scores: self.scores,
            career_aspiration: self.career_aspiration,
            extracurricular_activities: self.extracurricular_activities,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetric {
    pub subject: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupSummary {
    pub record_count: usize,
    pub subject_means: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySplit {
    pub with: GroupSummary,
    pub without: GroupSummary,
}

/// Groups keyed by the field's value. Records without a value are kept apart
/// in `unspecified` so they never merge with a real label.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub groups: BTreeMap<String, GroupSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unspecified: Option<GroupSummary>,
}

impl CategoryBreakdown {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.unspecified.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Comparisons {
    pub by_gender: CategoryBreakdown,
    pub by_career_aspiration: CategoryBreakdown,
    pub by_extracurricular_activity: BTreeMap<String, ActivitySplit>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub subject_metrics: BTreeMap<String, SubjectMetric>,
    pub comparisons: Comparisons,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub record_id: String,
    pub subject: String,
    pub score: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    MissingField,
    InvalidEmail,
    ScoreOutOfRange,
    DuplicateId,
    EncryptFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub position: usize,
    pub record_id: Option<String>,
    pub kind: RejectionKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBundle {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub input_count: usize,
    pub dropped_count: usize,
    pub rejections: Vec<Rejection>,
    #[serde(skip)]
    pub records: Vec<EncryptedRecord>,
    pub metrics: SummaryMetrics,
    pub alerts: Vec<AlertEntry>,
}

impl ReportBundle {
    pub fn accepted_count(&self) -> usize {
        self.records.len()
    }
}
