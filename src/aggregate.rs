use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    ActivitySplit, CategoryBreakdown, Comparisons, GroupSummary, StudentRecord, SubjectMetric,
    SummaryMetrics,
};

/// Collects the scores for one subject. Values are sorted before any statistic
/// is taken, so the result never depends on the order records arrived in.
#[derive(Debug, Clone, Default)]
pub struct SubjectAccumulator {
    values: Vec<f64>,
}

impl SubjectAccumulator {
    pub fn push(&mut self, score: f64) {
        self.values.push(score);
    }

    pub fn finish(mut self, subject: &str) -> SubjectMetric {
        if self.values.is_empty() {
            return SubjectMetric {
                subject: subject.to_string(),
                count: 0,
                mean: 0.0,
                median: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        self.values.sort_by(f64::total_cmp);
        let count = self.values.len();
        let n = count as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / n;
        let median = if count % 2 == 0 {
            (self.values[count / 2 - 1] + self.values[count / 2]) / 2.0
        } else {
            self.values[count / 2]
        };

        SubjectMetric {
            subject: subject.to_string(),
            count,
            mean,
            median,
            std_dev: variance.sqrt(),
            min: self.values[0],
            max: self.values[count - 1],
        }
    }
}

/// Running sums for one comparison group.
#[derive(Debug, Clone, Default)]
struct GroupAccumulator {
    records: usize,
    subjects: BTreeMap<String, SubjectAccumulator>,
}

impl GroupAccumulator {
    fn add<E>(&mut self, record: &StudentRecord<E>) {
        self.records += 1;
        for (subject, &score) in &record.scores {
            self.subjects.entry(subject.clone()).or_default().push(score);
        }
    }

    fn finish(self) -> GroupSummary {
        GroupSummary {
            record_count: self.records,
            subject_means: self
                .subjects
                .into_iter()
                .map(|(subject, acc)| {
                    let mean = acc.finish(&subject).mean;
                    (subject, mean)
                })
                .collect(),
        }
    }
}

pub fn subject_metrics<E>(
    records: &[StudentRecord<E>],
    known_subjects: &[String],
) -> BTreeMap<String, SubjectMetric> {
    let mut subjects: BTreeMap<String, SubjectAccumulator> = known_subjects
        .iter()
        .map(|s| (s.clone(), SubjectAccumulator::default()))
        .collect();

    for record in records {
        for (subject, &score) in &record.scores {
            subjects.entry(subject.clone()).or_default().push(score);
        }
    }

    subjects
        .into_iter()
        .map(|(subject, acc)| {
            let metric = acc.finish(&subject);
            (subject, metric)
        })
        .collect()
}

fn group_by<E>(
    records: &[StudentRecord<E>],
    key: impl Fn(&StudentRecord<E>) -> Option<&String>,
) -> CategoryBreakdown {
    let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    let mut unspecified: Option<GroupAccumulator> = None;
    for record in records {
        match key(record) {
            Some(label) => groups.entry(label.clone()).or_default().add(record),
            None => unspecified.get_or_insert_with(Default::default).add(record),
        }
    }
    CategoryBreakdown {
        groups: groups
            .into_iter()
            .map(|(label, acc)| (label, acc.finish()))
            .collect(),
        unspecified: unspecified.map(GroupAccumulator::finish),
    }
}

fn by_activity<E>(records: &[StudentRecord<E>]) -> BTreeMap<String, ActivitySplit> {
    let activities: BTreeSet<&String> = records
        .iter()
        .flat_map(|r| r.extracurricular_activities.iter())
        .collect();

    activities
        .into_iter()
        .map(|activity| {
            let mut with = GroupAccumulator::default();
            let mut without = GroupAccumulator::default();
            for record in records {
                if record.extracurricular_activities.contains(activity) {
                    with.add(record);
                } else {
                    without.add(record);
                }
            }
            (
                activity.clone(),
                ActivitySplit {
                    with: with.finish(),
                    without: without.finish(),
                },
            )
        })
        .collect()
}

pub fn comparisons<E>(records: &[StudentRecord<E>]) -> Comparisons {
    Comparisons {
        by_gender: group_by(records, |r| r.gender.as_ref()),
        by_career_aspiration: group_by(records, |r| r.career_aspiration.as_ref()),
        by_extracurricular_activity: by_activity(records),
    }
}

pub fn summarize<E>(records: &[StudentRecord<E>], known_subjects: &[String]) -> SummaryMetrics {
    SummaryMetrics {
        subject_metrics: subject_metrics(records, known_subjects),
        comparisons: comparisons(records),
    }
}
