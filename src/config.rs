use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::alerts::DEFAULT_THRESHOLD;
use crate::error::{PipelineError, Result};

pub const KEY_ENV_VAR: &str = "STUDENT_PIPELINE_KEY";
pub const DEFAULT_SOURCE_URL: &str =
    "https://api.slingacademy.com/v1/sample-data/files/student-scores.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_path: Option<PathBuf>,
    pub source_url: Option<String>,
    pub output_dir: PathBuf,
    pub alert_threshold: f64,
    pub alert_endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub subjects: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: None,
            source_url: Some(DEFAULT_SOURCE_URL.to_string()),
            output_dir: PathBuf::from("."),
            alert_threshold: DEFAULT_THRESHOLD,
            alert_endpoint: None,
            request_timeout_secs: 10,
            subjects: [
                "math",
                "history",
                "physics",
                "chemistry",
                "biology",
                "english",
                "geography",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        if !self.alert_threshold.is_finite() {
            return Err(PipelineError::Config(
                "alert_threshold must be a finite number".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_source_system() {
        let config = Config::default();
        assert_eq!(config.alert_threshold, 65.0);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.subjects.len(), 7);
        assert!(config.alert_endpoint.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            alert_threshold = 70.0
            alert_endpoint = "https://httpbin.org/post"
            "#,
        )
        .unwrap();
        assert_eq!(config.alert_threshold, 70.0);
        assert_eq!(config.alert_endpoint.as_deref(), Some("https://httpbin.org/post"));
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "output_dir = \"out\"\nsubjects = [\"math\"]\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.subjects, vec!["math".to_string()]);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.check(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
