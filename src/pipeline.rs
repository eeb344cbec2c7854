use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::alerts;
use crate::cipher::{self, EncryptionKey};
use crate::clean;
use crate::error::ValidationError;
use crate::models::{EncryptedRecord, Rejection, RejectionKind, ReportBundle, StudentRecord};
use crate::validate;

#[derive(Debug, Clone)]
pub struct BatchOptions<'a> {
    pub threshold: f64,
    pub subjects: &'a [String],
}

/// Runs one batch from raw values to a finished bundle. Bad records are
/// excluded and listed; nothing here fails the run.
pub fn run_batch(raw: Vec<Value>, key: &EncryptionKey, options: &BatchOptions<'_>) -> ReportBundle {
    let input_count = raw.len();
    let cleaned = clean::clean_candidates(raw);

    let mut rejections = Vec::new();
    let mut seen = HashSet::new();
    let mut valid: Vec<(usize, StudentRecord)> = Vec::new();

    for candidate in &cleaned.candidates {
        let outcome = validate::validate(candidate).and_then(|record| {
            if seen.insert(record.id.clone()) {
                Ok(record)
            } else {
                Err(ValidationError::DuplicateId(record.id))
            }
        });
        match outcome {
            Ok(record) => valid.push((candidate.position, record)),
            Err(reason) => {
                warn!(
                    position = candidate.position,
                    record_id = ?candidate.id,
                    reason = %reason,
                    "Student record is invalid and will be excluded"
                );
                rejections.push(Rejection {
                    position: candidate.position,
                    record_id: candidate.id.clone(),
                    kind: reason.kind(),
                    reason: reason.to_string(),
                });
            }
        }
    }
    info!(valid = valid.len(), "Total valid student records");

    let mut records: Vec<EncryptedRecord> = Vec::with_capacity(valid.len());
    for (position, record) in valid {
        let id = record.id.clone();
        match record.try_map_email(|email| cipher::encrypt(&email, key)) {
            Ok(sealed) => records.push(sealed),
            Err(err) => {
                warn!(record_id = %id, error = %err, "Error encrypting email");
                rejections.push(Rejection {
                    position,
                    record_id: Some(id),
                    kind: RejectionKind::EncryptFailure,
                    reason: err.to_string(),
                });
            }
        }
    }
    rejections.sort_by_key(|r| r.position);

    let metrics = aggregate::summarize(&records, options.subjects);
    let alerts = alerts::find_low_scores(&records, options.threshold);

    ReportBundle {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        threshold: options.threshold,
        input_count,
        dropped_count: cleaned.dropped,
        rejections,
        records,
        metrics,
        alerts,
    }
}
