use once_cell::sync::Lazy;
use regex::Regex;

use crate::clean::Candidate;
use crate::error::ValidationError;
use crate::models::StudentRecord;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("email pattern compiles")
});

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// Turns a cleaned candidate into a record, or says why it cannot be one.
pub fn validate(candidate: &Candidate) -> Result<StudentRecord, ValidationError> {
    let id = candidate
        .id
        .clone()
        .ok_or(ValidationError::MissingField("id"))?;
    let name = candidate
        .name
        .clone()
        .ok_or(ValidationError::MissingField("name"))?;
    let email = candidate
        .email
        .clone()
        .ok_or(ValidationError::MissingField("email"))?;
    if candidate.scores.is_empty() {
        return Err(ValidationError::MissingField("scores"));
    }

    if !is_valid_email(&email) {
        return Err(ValidationError::InvalidEmail(email));
    }

    for (subject, &score) in &candidate.scores {
        if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(ValidationError::ScoreOutOfRange {
                subject: subject.clone(),
                score,
            });
        }
    }

    Ok(StudentRecord {
        id,
        name,
        email,
        gender: candidate.gender.clone(),
        scores: candidate.scores.clone(),
        career_aspiration: candidate.career_aspiration.clone(),
        extracurricular_activities: candidate.extracurricular_activities.clone(),
    })
}
