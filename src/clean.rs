use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::PipelineError;

pub const SCORE_SUFFIX: &str = "_score";
pub const BOOLEAN_ACTIVITY: &str = "extracurricular";

/// A record that is well-formed but not yet validated. Every field may still
/// be absent; the validator decides what is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub position: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub scores: BTreeMap<String, f64>,
    pub career_aspiration: Option<String>,
    pub extracurricular_activities: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct CleanOutcome {
    pub candidates: Vec<Candidate>,
    pub dropped: usize,
}

pub fn clean_candidates(raw: Vec<Value>) -> CleanOutcome {
    let mut outcome = CleanOutcome::default();

    for (position, value) in raw.into_iter().enumerate() {
        match clean_candidate(position, value) {
            Ok(candidate) => outcome.candidates.push(candidate),
            Err(err) => {
                warn!(position, error = %err, "dropping malformed record");
                outcome.dropped += 1;
            }
        }
    }

    info!(
        kept = outcome.candidates.len(),
        dropped = outcome.dropped,
        "Total cleaned student records"
    );
    outcome
}

pub fn clean_candidate(position: usize, value: Value) -> Result<Candidate, PipelineError> {
    let mut fields = match value {
        Value::Object(map) => map,
        Value::Null => return Err(PipelineError::MalformedInput("null record".to_string())),
        other => {
            return Err(PipelineError::MalformedInput(format!(
                "expected an object, got {}",
                kind(&other)
            )))
        }
    };
    fields.retain(|_, v| !v.is_null());

    let name = match text(&mut fields, "name")? {
        Some(name) => Some(name),
        None => join_names(
            text(&mut fields, "first_name")?,
            text(&mut fields, "last_name")?,
        ),
    };

    Ok(Candidate {
        position,
        id: identifier(&mut fields)?,
        name,
        email: text(&mut fields, "email")?,
        gender: text(&mut fields, "gender")?,
        career_aspiration: text(&mut fields, "career_aspiration")?,
        extracurricular_activities: activities(fields.remove("extracurricular_activities"))?,
        scores: scores(&mut fields)?,
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text(fields: &mut Map<String, Value>, key: &str) -> Result<Option<String>, PipelineError> {
    match fields.remove(key) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(other) => Err(PipelineError::MalformedInput(format!(
            "{key} must be a string, got {}",
            kind(&other)
        ))),
    }
}

fn identifier(fields: &mut Map<String, Value>) -> Result<Option<String>, PipelineError> {
    match fields.remove("id") {
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => {
            fields.insert("id".to_string(), other);
            text(fields, "id")
        }
        None => Ok(None),
    }
}

fn join_names(first: Option<String>, last: Option<String>) -> Option<String> {
    match (first, last) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn score_value(subject: &str, value: &Value) -> Result<Option<f64>, PipelineError> {
    let malformed =
        || PipelineError::MalformedInput(format!("score for {subject} is not numeric"));
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(malformed),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

fn scores(fields: &mut Map<String, Value>) -> Result<BTreeMap<String, f64>, PipelineError> {
    let mut scores = BTreeMap::new();

    match fields.remove("scores") {
        None => {}
        Some(Value::Object(nested)) => {
            for (subject, value) in nested {
                if let Some(score) = score_value(&subject, &value)? {
                    scores.insert(subject, score);
                }
            }
        }
        Some(other) => {
            return Err(PipelineError::MalformedInput(format!(
                "scores must be an object, got {}",
                kind(&other)
            )))
        }
    }

    for (key, value) in fields.iter() {
        if let Some(subject) = key.strip_suffix(SCORE_SUFFIX) {
            if subject.is_empty() {
                continue;
            }
            if let Some(score) = score_value(subject, value)? {
                scores.entry(subject.to_string()).or_insert(score);
            }
        }
    }

    Ok(scores)
}

fn activities(value: Option<Value>) -> Result<BTreeSet<String>, PipelineError> {
    let mut set = BTreeSet::new();
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {}
        Some(Value::Bool(true)) => {
            set.insert(BOOLEAN_ACTIVITY.to_string());
        }
        // A JSON array written into a CSV cell keeps names containing `;`.
        Some(Value::String(s)) if s.trim_start().starts_with('[') => {
            match serde_json::from_str::<Value>(&s) {
                Ok(array @ Value::Array(_)) => return activities(Some(array)),
                _ => {
                    return Err(PipelineError::MalformedInput(
                        "extracurricular_activities is not a valid list".to_string(),
                    ))
                }
            }
        }
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => {
                set.insert(BOOLEAN_ACTIVITY.to_string());
            }
            "false" => {}
            _ => set.extend(
                s.split(';')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
            ),
        },
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        set.insert(s.trim().to_string());
                    }
                    Value::String(_) | Value::Null => {}
                    other => {
                        return Err(PipelineError::MalformedInput(format!(
                            "activity must be a string, got {}",
                            kind(&other)
                        )))
                    }
                }
            }
        }
        Some(other) => {
            return Err(PipelineError::MalformedInput(format!(
                "extracurricular_activities has unsupported type {}",
                kind(&other)
            )))
        }
    }
    Ok(set)
}
