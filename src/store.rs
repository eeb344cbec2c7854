use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cipher::EncryptedField;
use crate::clean::{self, SCORE_SUFFIX};
use crate::error::Result;
use crate::models::{
    CategoryBreakdown, EncryptedRecord, GroupSummary, ReportBundle, StudentRecord, SubjectMetric,
};
use crate::report;
use crate::source;

pub const RECORDS_JSON: &str = "student_data.json";
pub const RECORDS_CSV: &str = "student_data.csv";
pub const SUMMARY_JSON: &str = "summary_metrics.json";
pub const SUBJECT_CSV: &str = "subject_metrics.csv";
pub const GENDER_CSV: &str = "gender_metrics.csv";
pub const CAREER_CSV: &str = "career_metrics.csv";
pub const ACTIVITY_CSV: &str = "extracurricular_metrics.csv";
pub const REPORT_MD: &str = "report.md";

/// Writes every artifact for the bundle into `dir`, one file per writer.
pub fn write_all(dir: &Path, bundle: &ReportBundle) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let subjects: Vec<String> = bundle.metrics.subject_metrics.keys().cloned().collect();
    let comparisons = &bundle.metrics.comparisons;

    let records_json = dir.join(RECORDS_JSON);
    write_records_json(&records_json, &bundle.records)?;

    let records_csv = dir.join(RECORDS_CSV);
    write_records_csv(&records_csv, &bundle.records, &subjects)?;

    let summary = dir.join(SUMMARY_JSON);
    fs::write(&summary, serde_json::to_string_pretty(bundle)?)?;
    info!(path = %summary.display(), "Summary metrics saved");

    let subject_csv = dir.join(SUBJECT_CSV);
    write_subject_metrics(&subject_csv, &bundle.metrics.subject_metrics)?;

    let gender_csv = dir.join(GENDER_CSV);
    write_group_metrics(&gender_csv, "gender", &comparisons.by_gender, &subjects)?;

    let career_csv = dir.join(CAREER_CSV);
    write_group_metrics(
        &career_csv,
        "career_aspiration",
        &comparisons.by_career_aspiration,
        &subjects,
    )?;

    let activity_csv = dir.join(ACTIVITY_CSV);
    let mut activity_groups = CategoryBreakdown::default();
    for (activity, split) in &comparisons.by_extracurricular_activity {
        activity_groups
            .groups
            .insert(format!("{activity} (with)"), split.with.clone());
        activity_groups
            .groups
            .insert(format!("{activity} (without)"), split.without.clone());
    }
    write_group_metrics(&activity_csv, "activity", &activity_groups, &subjects)?;

    let report_md = dir.join(REPORT_MD);
    fs::write(&report_md, report::build_report(bundle))?;
    info!(path = %report_md.display(), "Report written");

    Ok(vec![
        records_json,
        records_csv,
        summary,
        subject_csv,
        gender_csv,
        career_csv,
        activity_csv,
        report_md,
    ])
}

pub fn write_records_json(path: &Path, records: &[EncryptedRecord]) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(records)?)?;
    info!(path = %path.display(), records = records.len(), "Processed student data saved in JSON format");
    Ok(())
}

/// Scores go into one `<subject>_score` column each and activities into a
/// single JSON array cell, so the file reads back through the CSV loader
/// unchanged whatever the activity names contain.
pub fn write_records_csv(path: &Path, records: &[EncryptedRecord], subjects: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![
        "id".to_string(),
        "name".to_string(),
        "email".to_string(),
        "gender".to_string(),
        "career_aspiration".to_string(),
        "extracurricular_activities".to_string(),
    ];
    header.extend(subjects.iter().map(|s| format!("{s}{SCORE_SUFFIX}")));
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.id.clone(),
            record.name.clone(),
            record.email.to_hex(),
            record.gender.clone().unwrap_or_default(),
            record.career_aspiration.clone().unwrap_or_default(),
            serde_json::to_string(&record.extracurricular_activities)?,
        ];
        row.extend(
            subjects
                .iter()
                .map(|s| record.scores.get(s).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!(path = %path.display(), records = records.len(), "Student data saved in CSV format");
    Ok(())
}

pub fn write_subject_metrics(path: &Path, metrics: &BTreeMap<String, SubjectMetric>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for metric in metrics.values() {
        writer.serialize(metric)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_group_metrics(
    path: &Path,
    label: &str,
    breakdown: &CategoryBreakdown,
    subjects: &[String],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![label.to_string(), "record_count".to_string()];
    header.extend(subjects.iter().map(|s| format!("{s}_mean")));
    writer.write_record(&header)?;

    let row = |group: &str, summary: &GroupSummary| {
        let mut row = vec![group.to_string(), summary.record_count.to_string()];
        row.extend(subjects.iter().map(|s| {
            summary
                .subject_means
                .get(s)
                .map(|v| format!("{v:.2}"))
                .unwrap_or_default()
        }));
        row
    };

    for (group, summary) in &breakdown.groups {
        writer.write_record(row(group, summary))?;
    }
    // Cleaning never keeps a blank label, so an empty cell marks the records
    // that had no value.
    if let Some(summary) = &breakdown.unspecified {
        writer.write_record(row("", summary))?;
    }

    writer.flush()?;
    Ok(())
}

/// Loads a previously written record set, JSON or CSV by extension.
pub fn read_records(path: &Path) -> Result<Vec<EncryptedRecord>> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if !is_csv {
        let content = fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&content)?);
    }

    // A damaged row only costs that row; its id, if readable, still resolves
    // to a field that refuses to decrypt.
    let mut records = Vec::new();
    for (position, row) in source::read_csv(path)?.into_iter().enumerate() {
        let candidate = match clean::clean_candidate(position, row) {
            Ok(candidate) => candidate,
            Err(err) => {
                warn!(position, error = %err, "skipping unreadable store row");
                continue;
            }
        };
        let Some(id) = candidate.id else {
            warn!(position, "skipping store row without an id");
            continue;
        };
        let email = EncryptedField::from_stored(candidate.email.as_deref().unwrap_or_default());
        records.push(StudentRecord {
            id,
            name: candidate.name.unwrap_or_default(),
            email,
            gender: candidate.gender,
            scores: candidate.scores,
            career_aspiration: candidate.career_aspiration,
            extracurricular_activities: candidate.extracurricular_activities,
        });
    }
    Ok(records)
}
