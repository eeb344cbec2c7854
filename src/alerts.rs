use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{AlertEntry, StudentRecord};

pub const DEFAULT_THRESHOLD: f64 = 65.0;

/// One entry per subject scored strictly below `threshold`.
pub fn find_low_scores<E>(records: &[StudentRecord<E>], threshold: f64) -> Vec<AlertEntry> {
    let mut alerts = Vec::new();
    for record in records {
        for (subject, &score) in &record.scores {
            if score < threshold {
                alerts.push(AlertEntry {
                    record_id: record.id.clone(),
                    subject: subject.clone(),
                    score,
                    threshold,
                });
            }
        }
    }
    debug!(alerts = alerts.len(), threshold, "low score scan finished");
    alerts
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Posts each alert as JSON to an external endpoint.
pub struct AlertDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl AlertDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub async fn send(&self, alert: &AlertEntry) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(alert)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Failures are counted and logged per alert; none of them stop the rest.
    pub async fn dispatch_all(&self, alerts: &[AlertEntry]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for alert in alerts {
            match self.send(alert).await {
                Ok(()) => summary.sent += 1,
                Err(err) => {
                    warn!(
                        record_id = %alert.record_id,
                        subject = %alert.subject,
                        error = %err,
                        "failed to post low score alert"
                    );
                    summary.failed += 1;
                }
            }
        }
        info!(
            sent = summary.sent,
            failed = summary.failed,
            endpoint = %self.endpoint,
            "Low score alerts dispatched"
        );
        summary
    }
}
