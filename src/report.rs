//! Report types and sinks for suite results.
//!
//! Each case produces exactly one [`CaseReport`] regardless of how it ended;
//! the suite aggregates them into a [`SuiteReport`] with verdict counts.
//! Sinks receive cases as they terminalize and the suite once at the end,
//! so an interrupted run still leaves the cases it finished on disk.

use std::collections::BTreeSet;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dataset::CategoryId;
use crate::error::Result;
use crate::verdict::Verdict;

/// The phase of the case lifecycle that decided the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStage {
    /// Ground-truth lookup: image missing from the testset or unlabeled.
    GroundTruth,
    /// Payload loading or the outbound send.
    Transmit,
    /// The bounded wait for a reply.
    AwaitReply,
    /// Category comparison against a received reply.
    Evaluate,
    /// The suite was cancelled before this case ran.
    Cancelled,
}

impl CaseStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStage::GroundTruth => "ground_truth",
            CaseStage::Transmit => "transmit",
            CaseStage::AwaitReply => "await_reply",
            CaseStage::Evaluate => "evaluate",
            CaseStage::Cancelled => "cancelled",
        }
    }
}

/// Result of a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Position of the case in suite order, zero-based.
    pub index: usize,

    /// Case identity: the image file name.
    pub name: String,

    /// Path to the source image on disk.
    pub image_path: PathBuf,

    /// Final verdict.
    pub verdict: Verdict,

    /// Phase that decided the verdict.
    pub stage: CaseStage,

    /// Ground-truth category ids. Empty when the lookup never succeeded.
    pub expected: BTreeSet<CategoryId>,

    /// Category ids from the reply. Empty when no reply arrived.
    pub received: BTreeSet<CategoryId>,

    /// Wall-clock duration of the case.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,

    /// Image attached as a report artifact, for pass and fail verdicts.
    pub artifact: Option<PathBuf>,
}

/// Verdict tally for a suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub aborted: usize,
}

impl VerdictCounts {
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Pass => self.pass += 1,
            Verdict::Fail(_) => self.fail += 1,
            Verdict::ErrorInTestSystem(_) => self.error += 1,
            Verdict::Aborted(_) => self.aborted += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error + self.aborted
    }

    /// True when no case failed, errored, or was aborted.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.fail == 0 && self.error == 0 && self.aborted == 0
    }
}

/// Aggregated result of one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Suite name, by convention the test directory name.
    pub name: String,

    /// Individual case reports in suite order.
    pub cases: Vec<CaseReport>,

    /// Verdict tally, kept consistent with `cases` by [`SuiteReport::push_case`].
    pub counts: VerdictCounts,

    /// When the run started.
    #[serde(with = "chrono_serde")]
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// When the run finished.
    #[serde(with = "chrono_serde")]
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl SuiteReport {
    /// Create an empty report stamped with the current time.
    #[must_use]
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            name,
            cases: Vec::new(),
            counts: VerdictCounts::default(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Append a case and update the tally.
    pub fn push_case(&mut self, case: CaseReport) {
        self.counts.record(&case.verdict);
        self.cases.push(case);
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = chrono::Utc::now();
    }

    /// Cases with a non-pass verdict, in suite order.
    #[must_use]
    pub fn problem_cases(&self) -> Vec<&CaseReport> {
        self.cases.iter().filter(|c| !c.verdict.is_pass()).collect()
    }

    /// Load a previously written suite report from JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Consumer of structured verdicts.
///
/// `report_case` runs once per case immediately after its verdict is final;
/// `report_suite` runs once after the last case.
pub trait ReportSink {
    fn report_case(&mut self, case: &CaseReport) -> Result<()>;
    fn report_suite(&mut self, suite: &SuiteReport) -> Result<()>;
}

/// File sink: `cases.csv` row per case, `suite.json` at the end.
///
/// The CSV is flushed after every row so a crashed or cancelled run keeps
/// everything it reported up to that point.
pub struct JsonReportWriter {
    dir: PathBuf,
    csv: csv::Writer<File>,
}

impl JsonReportWriter {
    pub const SUITE_FILE: &'static str = "suite.json";
    pub const CASES_FILE: &'static str = "cases.csv";

    /// Create the report directory and open the case CSV with its header.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut csv = csv::Writer::from_path(dir.join(Self::CASES_FILE))?;
        csv.write_record([
            "index", "image", "verdict", "reason", "stage", "expected", "received", "elapsed_ms",
        ])?;
        csv.flush()?;
        Ok(Self { dir, csv })
    }
}

fn join_ids(ids: &BTreeSet<CategoryId>) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

impl ReportSink for JsonReportWriter {
    fn report_case(&mut self, case: &CaseReport) -> Result<()> {
        self.csv.write_record([
            case.index.to_string(),
            case.name.clone(),
            case.verdict.code().to_string(),
            case.verdict.reason().unwrap_or("").to_string(),
            case.stage.as_str().to_string(),
            join_ids(&case.expected),
            join_ids(&case.received),
            case.elapsed.as_millis().to_string(),
        ])?;
        self.csv.flush()?;
        Ok(())
    }

    fn report_suite(&mut self, suite: &SuiteReport) -> Result<()> {
        let json = serde_json::to_string_pretty(suite)?;
        fs::write(self.dir.join(Self::SUITE_FILE), json)?;
        self.csv.flush()?;
        Ok(())
    }
}

// Custom serialization for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(index: usize, verdict: Verdict) -> CaseReport {
        CaseReport {
            index,
            name: format!("img{index}.png"),
            image_path: PathBuf::from(format!("/testdir/img{index}.png")),
            verdict,
            stage: CaseStage::Evaluate,
            expected: BTreeSet::from([7]),
            received: BTreeSet::from([3, 7]),
            elapsed: Duration::from_millis(120),
            artifact: None,
        }
    }

    #[test]
    fn counts_record_every_verdict_kind() {
        let mut counts = VerdictCounts::default();
        counts.record(&Verdict::Pass);
        counts.record(&Verdict::Fail("f".to_string()));
        counts.record(&Verdict::ErrorInTestSystem("e".to_string()));
        counts.record(&Verdict::Aborted("a".to_string()));
        counts.record(&Verdict::Pass);

        assert_eq!(counts.pass, 2);
        assert_eq!(counts.fail, 1);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.aborted, 1);
        assert_eq!(counts.total(), 5);
        assert!(!counts.all_passed());
    }

    #[test]
    fn push_case_keeps_counts_consistent() {
        let mut suite = SuiteReport::new("testdir".to_string());
        suite.push_case(case(0, Verdict::Pass));
        suite.push_case(case(1, Verdict::Fail("mismatch".to_string())));

        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.counts.pass, 1);
        assert_eq!(suite.counts.fail, 1);
        assert_eq!(suite.problem_cases().len(), 1);
        assert_eq!(suite.problem_cases()[0].index, 1);
    }

    #[test]
    fn suite_report_round_trips_through_json() {
        let mut suite = SuiteReport::new("testdir".to_string());
        suite.push_case(case(0, Verdict::ErrorInTestSystem("SUT did not reply".to_string())));
        suite.finish();

        let json = serde_json::to_string_pretty(&suite).unwrap();
        let back: SuiteReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, suite);

        // Durations serialize as integer milliseconds, timestamps as RFC3339.
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cases"][0]["elapsed"], 120);
        assert!(value["started_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn writer_produces_csv_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JsonReportWriter::create(dir.path().join("reports")).unwrap();

        let mut suite = SuiteReport::new("testdir".to_string());
        for (i, verdict) in [
            Verdict::Pass,
            Verdict::Fail("received categories do not match any ground-truth category".to_string()),
        ]
        .into_iter()
        .enumerate()
        {
            let c = case(i, verdict);
            writer.report_case(&c).unwrap();
            suite.push_case(c);
        }
        suite.finish();
        writer.report_suite(&suite).unwrap();

        let loaded = SuiteReport::load(dir.path().join("reports").join("suite.json")).unwrap();
        assert_eq!(loaded.counts.pass, 1);
        assert_eq!(loaded.counts.fail, 1);

        let csv = fs::read_to_string(dir.path().join("reports").join("cases.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 cases
        assert!(lines[1].contains("PASS"));
        assert!(lines[2].contains("FAIL"));
        assert!(lines[2].contains("7"));
    }

    #[test]
    fn loading_a_missing_report_is_an_error() {
        assert!(SuiteReport::load("/nonexistent/suite.json").is_err());
    }

    #[test]
    fn stage_codes_are_stable() {
        assert_eq!(CaseStage::GroundTruth.as_str(), "ground_truth");
        assert_eq!(CaseStage::AwaitReply.as_str(), "await_reply");
        let json = serde_json::to_string(&CaseStage::AwaitReply).unwrap();
        assert_eq!(json, r#""await_reply""#);
    }
}
