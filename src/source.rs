use std::path::Path;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Reads the batch from the local file when one is configured and readable,
/// falling back to the remote source. Only when both fail is the run lost.
pub async fn load_input(config: &Config) -> Result<Vec<Value>> {
    if let Some(path) = &config.input_path {
        match read_local(path) {
            Ok(records) => {
                info!(path = %path.display(), records = records.len(), "Loaded local input");
                return Ok(records);
            }
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "local input unavailable, trying remote source"
            ),
        }
    }

    if let Some(url) = &config.source_url {
        match fetch_remote(url, config.request_timeout()).await {
            Ok(records) => return Ok(records),
            Err(err) => error!(url = %url, error = %err, "Error fetching JSON data"),
        }
    }

    Err(PipelineError::NoInput)
}

pub fn read_local(path: &Path) -> Result<Vec<Value>> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        read_csv(path)
    } else {
        let content = std::fs::read_to_string(path)?;
        parse_json_batch(&content)
    }
}

pub async fn fetch_remote(url: &str, timeout: Duration) -> Result<Vec<Value>> {
    info!(url = %url, "Fetching JSON data");
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let records = parse_json_batch(&body)?;
    info!(records = records.len(), "Data fetched successfully");
    Ok(records)
}

pub fn parse_json_batch(content: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(content)? {
        Value::Array(items) => Ok(items),
        _ => Err(PipelineError::MalformedInput(
            "expected a list of student records".to_string(),
        )),
    }
}

/// Each row becomes a JSON object keyed by header; empty cells become null so
/// the cleaning stage treats them as absent.
pub fn read_csv(path: &Path) -> Result<Vec<Value>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in reader.records() {
        let row = result?;
        let object: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| {
                let value = if cell.trim().is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (header.to_string(), value)
            })
            .collect();
        rows.push(Value::Object(object));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn json_batch_must_be_a_list() {
        assert_eq!(parse_json_batch("[{\"id\": 1}, null]").unwrap().len(), 2);
        assert!(matches!(
            parse_json_batch("{\"id\": 1}"),
            Err(PipelineError::MalformedInput(_))
        ));
        assert!(matches!(parse_json_batch("[{"), Err(PipelineError::Json(_))));
    }

    #[test]
    fn reads_csv_rows_as_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.csv");
        fs::write(
            &path,
            "id,first_name,last_name,email,math_score,extracurricular_activities\n\
             1,Paul,Casey,paul@test.com,73,Chess;Band\n\
             2,Danielle,,danielle@test.com,90,\n",
        )
        .unwrap();

        let rows = read_local(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["math_score"], Value::String("73".to_string()));
        assert_eq!(rows[1]["last_name"], Value::Null);
    }

    #[tokio::test]
    async fn local_file_wins_over_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        fs::write(&path, "[{\"id\": 1}]").unwrap();
        let config = Config {
            input_path: Some(path),
            source_url: None,
            ..Config::default()
        };
        assert_eq!(load_input(&config).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_source_is_fatal() {
        let config = Config {
            input_path: Some(PathBuf::from("/nonexistent/students.json")),
            source_url: Some("http://127.0.0.1:9/students.json".to_string()),
            request_timeout_secs: 1,
            ..Config::default()
        };
        assert!(matches!(
            load_input(&config).await,
            Err(PipelineError::NoInput)
        ));
    }

    #[tokio::test]
    async fn fetches_remote_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}, null])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/students.json", server.uri());
        let records = fetch_remote(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1]["id"], 2);
    }

    #[tokio::test]
    async fn remote_object_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;

        let url = format!("{}/students.json", server.uri());
        assert!(matches!(
            fetch_remote(&url, Duration::from_secs(5)).await,
            Err(PipelineError::MalformedInput(_))
        ));
    }

    #[tokio::test]
    async fn missing_local_file_falls_back_to_remote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            input_path: Some(PathBuf::from("/nonexistent/students.json")),
            source_url: Some(format!("{}/students.json", server.uri())),
            request_timeout_secs: 5,
            ..Config::default()
        };
        assert_eq!(load_input(&config).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remote_error_status_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = Config {
            input_path: None,
            source_url: Some(format!("{}/students.json", server.uri())),
            request_timeout_secs: 5,
            ..Config::default()
        };
        assert!(matches!(
            load_input(&config).await,
            Err(PipelineError::NoInput)
        ));
    }
}
