use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::detection::DetectionKind;
use crate::models::Location;
use crate::worker::{PayloadOutcome, PayloadReport};

/// Verdict counts for one location. `error` verdicts are folded into
/// `not_detected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub html_reflected: usize,
    pub dom_executed: usize,
    pub html_escaped: usize,
    pub url_injection: usize,
    pub not_detected: usize,
}

impl KindCounts {
    pub fn record(&mut self, kind: DetectionKind) {
        match kind {
            DetectionKind::HtmlReflected => self.html_reflected += 1,
            DetectionKind::DomExecuted => self.dom_executed += 1,
            DetectionKind::HtmlEscaped => self.html_escaped += 1,
            DetectionKind::UrlInjection => self.url_injection += 1,
            DetectionKind::NotDetected | DetectionKind::Error => self.not_detected += 1,
        }
    }

    pub fn confirmed(&self) -> usize {
        self.html_reflected + self.dom_executed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub completed: usize,
    pub timeout: usize,
    pub skipped: usize,
    pub error: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: PayloadOutcome) {
        match outcome {
            PayloadOutcome::Completed => self.completed += 1,
            PayloadOutcome::Timeout => self.timeout += 1,
            PayloadOutcome::Skipped => self.skipped += 1,
            PayloadOutcome::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.timeout + self.skipped + self.error
    }
}

/// Running totals kept by the aggregator.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub outcomes: OutcomeCounts,
    pub first_order: KindCounts,
    pub second_order: KindCounts,
    pub findings_written: usize,
    pub findings_failed: usize,
    pub prompts_seen: usize,
    pub retried: usize,
}

impl Tally {
    pub fn record(&mut self, report: &PayloadReport) {
        self.outcomes.record(report.outcome);
        for verdict in &report.verdicts {
            match verdict.location {
                Location::FirstOrder => self.first_order.record(verdict.kind),
                Location::SecondOrder => self.second_order.record(verdict.kind),
            }
        }
        self.prompts_seen += report.prompts.len();
        if report.attempts > 1 {
            self.retried += 1;
        }
    }

    pub fn processed(&self) -> usize {
        self.outcomes.total()
    }

    pub fn confirmed(&self) -> usize {
        self.first_order.confirmed() + self.second_order.confirmed()
    }
}

/// End-of-run record, printed and written next to the findings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub workers: usize,
    pub total_payloads: usize,
    pub processed: usize,
    pub cancelled: bool,
    pub outcomes: OutcomeCounts,
    pub first_order: KindCounts,
    pub second_order: KindCounts,
    pub findings_written: usize,
    pub prompts_seen: usize,
    pub retried_payloads: usize,
    pub attacker_server: String,
    pub output: PathBuf,
}

impl RunSummary {
    /// `<output>.summary.json`
    pub fn path_for(output: &std::path::Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".summary.json");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Verdict;

    fn report(outcome: PayloadOutcome, verdicts: Vec<Verdict>, attempts: u32) -> PayloadReport {
        PayloadReport {
            position: 1,
            outcome,
            verdicts,
            findings: Vec::new(),
            prompts: vec!["1".to_string()],
            attempts,
            error: None,
            failed_pass: None,
        }
    }

    #[test]
    fn test_tally_splits_locations_and_folds_errors() {
        let mut tally = Tally::default();
        tally.record(&report(
            PayloadOutcome::Completed,
            vec![
                Verdict { location: Location::FirstOrder, kind: DetectionKind::HtmlReflected },
                Verdict { location: Location::SecondOrder, kind: DetectionKind::Error },
            ],
            1,
        ));
        tally.record(&report(PayloadOutcome::Skipped, Vec::new(), 2));

        assert_eq!(tally.processed(), 2);
        assert_eq!(tally.first_order.html_reflected, 1);
        assert_eq!(tally.second_order.not_detected, 1);
        assert_eq!(tally.outcomes.skipped, 1);
        assert_eq!(tally.retried, 1);
        assert_eq!(tally.prompts_seen, 2);
        assert_eq!(tally.confirmed(), 1);
    }

    #[test]
    fn test_summary_path() {
        let path = RunSummary::path_for(std::path::Path::new("result/findings.txt"));
        assert_eq!(path, PathBuf::from("result/findings.txt.summary.json"));
    }
}
