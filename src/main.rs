use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

mod aggregate;
mod alerts;
mod cipher;
mod clean;
mod config;
mod error;
mod logging;
mod models;
mod pipeline;
mod report;
mod source;
mod store;
mod validate;

use crate::alerts::AlertDispatcher;
use crate::cipher::{EmailStore, EncryptionKey};
use crate::config::{Config, KEY_ENV_VAR};
use crate::pipeline::BatchOptions;

#[derive(Parser)]
#[command(name = "student-pipeline")]
#[command(about = "Clean, validate, encrypt and summarize a batch of student records", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Local JSON or CSV input, tried before the remote source
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    source_url: Option<String>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Scores strictly below this raise an alert
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    alert_endpoint: Option<String>,
    /// 64 hex characters; falls back to STUDENT_PIPELINE_KEY
    #[arg(long)]
    key: Option<String>,
    /// Decrypt one stored email instead of running a batch
    #[arg(long)]
    decrypt: bool,
    /// Record store to decrypt from (defaults to student_data.json in the output dir)
    #[arg(long, requires = "decrypt")]
    store: Option<PathBuf>,
    /// Record id to decrypt
    #[arg(long, requires = "decrypt")]
    id: Option<String>,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(input) = &self.input {
            config.input_path = Some(input.clone());
        }
        if let Some(url) = &self.source_url {
            config.source_url = Some(url.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.alert_threshold = threshold;
        }
        if let Some(endpoint) = &self.alert_endpoint {
            config.alert_endpoint = Some(endpoint.clone());
        }
        config.check()?;
        Ok(config)
    }

    fn supplied_key(&self) -> Option<String> {
        self.key
            .clone()
            .or_else(|| std::env::var(KEY_ENV_VAR).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

async fn run_batch(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let key = match cli.supplied_key() {
        Some(hex) => EncryptionKey::from_hex(&hex).context("invalid encryption key")?,
        None => {
            let key = EncryptionKey::generate();
            println!(
                "Encryption key not provided. Using random key: {}",
                key.to_hex()
            );
            key
        }
    };

    let raw = source::load_input(config)
        .await
        .context("no student data could be loaded")?;

    let bundle = pipeline::run_batch(
        raw,
        &key,
        &BatchOptions {
            threshold: config.alert_threshold,
            subjects: &config.subjects,
        },
    );

    let written = store::write_all(&config.output_dir, &bundle)
        .with_context(|| format!("failed to write output to {}", config.output_dir.display()))?;
    info!(files = written.len(), "Artifacts written");

    match &config.alert_endpoint {
        Some(endpoint) if !bundle.alerts.is_empty() => {
            let dispatcher = AlertDispatcher::new(endpoint.as_str(), config.request_timeout())?;
            let summary = dispatcher.dispatch_all(&bundle.alerts).await;
            if summary.failed > 0 {
                warn!(failed = summary.failed, "some alerts could not be delivered");
            }
        }
        Some(_) => {}
        None => info!(alerts = bundle.alerts.len(), "No alert endpoint configured"),
    }

    println!(
        "Processed {} records: {} accepted, {} rejected, {} dropped, {} alerts.",
        bundle.input_count,
        bundle.accepted_count(),
        bundle.rejections.len(),
        bundle.dropped_count,
        bundle.alerts.len()
    );
    println!("Output written to {}.", config.output_dir.display());
    Ok(())
}

fn run_decrypt(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let path = cli
        .store
        .clone()
        .unwrap_or_else(|| config.output_dir.join(store::RECORDS_JSON));
    let records = store::read_records(&path)
        .with_context(|| format!("failed to read record store {}", path.display()))?;
    let emails = EmailStore::from_records(&records);
    info!(path = %path.display(), records = emails.len(), "Loaded record store");

    let id = match &cli.id {
        Some(id) => id.clone(),
        None => prompt("Record id")?,
    };
    let key = match cli.supplied_key() {
        Some(hex) => hex,
        None => prompt("Encryption key (hex)")?,
    };
    let key = EncryptionKey::from_hex(&key)?;

    let email = cipher::decrypt_by_id(&emails, &id, &key)?;
    println!("{email}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    if cli.decrypt {
        run_decrypt(&cli, &config)
    } else {
        run_batch(&cli, &config).await
    }
}
