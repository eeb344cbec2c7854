use std::fmt::Write;

use crate::models::{ReportBundle, SubjectMetric};

const CHART_WIDTH: usize = 40;

/// Horizontal bar chart of per-subject means, scaled to 100.
pub fn render_chart<'a>(metrics: impl IntoIterator<Item = &'a SubjectMetric>) -> String {
    let metrics: Vec<&SubjectMetric> = metrics.into_iter().collect();
    let label_width = metrics.iter().map(|m| m.subject.len()).max().unwrap_or(0);

    let mut output = String::new();
    for metric in metrics {
        let filled = ((metric.mean / 100.0) * CHART_WIDTH as f64).round() as usize;
        let filled = filled.min(CHART_WIDTH);
        let _ = writeln!(
            output,
            "{:<width$} | {}{} {:>6.2}",
            metric.subject,
            "#".repeat(filled),
            " ".repeat(CHART_WIDTH - filled),
            metric.mean,
            width = label_width
        );
    }
    output
}

pub fn build_report(bundle: &ReportBundle) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Records Report");
    let _ = writeln!(
        output,
        "Run {} generated at {}",
        bundle.run_id,
        bundle.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Batch");
    let _ = writeln!(output, "- Input records: {}", bundle.input_count);
    let _ = writeln!(output, "- Dropped as malformed: {}", bundle.dropped_count);
    let _ = writeln!(output, "- Rejected: {}", bundle.rejections.len());
    let _ = writeln!(output, "- Accepted: {}", bundle.accepted_count());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Scores by Subject");

    if bundle.metrics.subject_metrics.is_empty() {
        let _ = writeln!(output, "No subjects recorded for this batch.");
    } else {
        let _ = writeln!(output, "```");
        let _ = write!(output, "{}", render_chart(bundle.metrics.subject_metrics.values()));
        let _ = writeln!(output, "```");
        let _ = writeln!(output);
        let _ = writeln!(output, "| Subject | Count | Mean | Median | Std Dev | Min | Max |");
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for m in bundle.metrics.subject_metrics.values() {
            let _ = writeln!(
                output,
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.0} | {:.0} |",
                m.subject, m.count, m.mean, m.median, m.std_dev, m.min, m.max
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Low Score Alerts (below {})", bundle.threshold);

    if bundle.alerts.is_empty() {
        let _ = writeln!(output, "No scores below the threshold.");
    } else {
        for alert in &bundle.alerts {
            let _ = writeln!(
                output,
                "- record {}: {} scored {:.0}",
                alert.record_id, alert.subject, alert.score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rejected Records");

    if bundle.rejections.is_empty() {
        let _ = writeln!(output, "No records were rejected.");
    } else {
        for rejection in bundle.rejections.iter().take(20) {
            let _ = writeln!(
                output,
                "- #{} ({}): {}",
                rejection.position,
                rejection.record_id.as_deref().unwrap_or("no id"),
                rejection.reason
            );
        }
        if bundle.rejections.len() > 20 {
            let _ = writeln!(output, "- ... and {} more", bundle.rejections.len() - 20);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::EncryptionKey;
    use crate::pipeline::{run_batch, BatchOptions};
    use serde_json::json;

    fn metric(subject: &str, mean: f64) -> SubjectMetric {
        SubjectMetric {
            subject: subject.to_string(),
            count: 1,
            mean,
            median: mean,
            std_dev: 0.0,
            min: mean,
            max: mean,
        }
    }

    #[test]
    fn chart_bars_scale_with_mean() {
        let metrics = [metric("math", 100.0), metric("art", 50.0)];
        let chart = render_chart(metrics.iter());
        let lines: Vec<_> = chart.lines().collect();
        assert_eq!(lines[0].matches('#').count(), CHART_WIDTH);
        assert_eq!(lines[1].matches('#').count(), CHART_WIDTH / 2);
        assert!(lines[1].starts_with("art  |"));
    }

    #[test]
    fn report_lists_alerts_and_rejections() {
        let subjects = vec!["math".to_string()];
        let bundle = run_batch(
            vec![
                json!({"id": 1, "name": "Paul Casey", "email": "paul@test.com", "math_score": 50}),
                json!({"id": 2, "name": "No Mail", "math_score": 90}),
            ],
            &EncryptionKey::generate(),
            &BatchOptions {
                threshold: 65.0,
                subjects: &subjects,
            },
        );
        let report = build_report(&bundle);
        assert!(report.contains("- Accepted: 1"));
        assert!(report.contains("- record 1: math scored 50"));
        assert!(report.contains("- #1 (2): missing required field: email"));
        assert!(report.contains("| math | 1 | 50.00 |"));
    }

    #[test]
    fn empty_report_is_well_formed() {
        let bundle = run_batch(
            Vec::new(),
            &EncryptionKey::generate(),
            &BatchOptions {
                threshold: 65.0,
                subjects: &[],
            },
        );
        let report = build_report(&bundle);
        assert!(report.contains("No subjects recorded for this batch."));
        assert!(report.contains("No scores below the threshold."));
    }
}
