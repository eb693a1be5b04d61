//! Suite orchestration: the per-case lifecycle and the sequential loop.
//!
//! Every case follows the same sequence: look up ground truth, clear the
//! reply slot, transmit, wait with a bounded budget, evaluate, report.
//! Whichever step decides the verdict, the case emits exactly one report.
//! Cases run strictly one at a time; replies carry no case identifier, so
//! sequencing plus clear-before-send is what keeps correlation sound.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::correlate::{ReplyCorrelator, WaitOutcome};
use crate::dataset::{CategoryId, Dataset};
use crate::error::{Error, Result};
use crate::link::SutLink;
use crate::report::{CaseReport, CaseStage, ReportSink, SuiteReport};
use crate::transmit::{image_name, ImageTransmitter};
use crate::verdict::{evaluate_categories, Verdict};

/// Default reply budget per case.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Configuration for a suite run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Suite name used in reports, by convention the test directory name.
    pub suite_name: String,

    /// Budget for the bounded reply wait of each case.
    pub reply_timeout: Duration,

    /// Attach the source image as a report artifact on evaluated verdicts.
    pub attach_artifacts: bool,
}

impl RunConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    suite_name: Option<String>,
    reply_timeout: Option<Duration>,
    attach_artifacts: Option<bool>,
}

impl RunConfigBuilder {
    /// Set the suite name.
    #[must_use]
    pub fn suite_name(mut self, name: impl Into<String>) -> Self {
        self.suite_name = Some(name.into());
        self
    }

    /// Set the per-case reply budget.
    #[must_use]
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Enable or disable image artifacts on evaluated verdicts.
    #[must_use]
    pub fn attach_artifacts(mut self, attach: bool) -> Self {
        self.attach_artifacts = Some(attach);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RunConfig {
        RunConfig {
            suite_name: self.suite_name.unwrap_or_else(|| "suite".to_string()),
            reply_timeout: self.reply_timeout.unwrap_or(DEFAULT_REPLY_TIMEOUT),
            attach_artifacts: self.attach_artifacts.unwrap_or(true),
        }
    }
}

/// What one case concluded, before it is wrapped into a [`CaseReport`].
struct CaseOutcome {
    verdict: Verdict,
    stage: CaseStage,
    expected: BTreeSet<CategoryId>,
    received: BTreeSet<CategoryId>,
    artifact: Option<PathBuf>,
}

/// Drives a suite of image cases against the system under test.
///
/// # Example
///
/// ```rust,ignore
/// use perception_eval::{
///     Dataset, ImageTransmitter, ReplayLink, ReplyCorrelator, ReplyRouter,
///     RunConfig, SuiteRunner, scan_image_files,
/// };
///
/// let dataset = Dataset::load("testdir/testset.json")?;
/// let files = scan_image_files("testdir")?;
///
/// let correlator = ReplyCorrelator::new();
/// let router = ReplyRouter::for_annotations(correlator.handle());
/// let link = ReplayLink::new(script, router.into());
///
/// let mut runner = SuiteRunner::new(
///     dataset,
///     ImageTransmitter::new(link),
///     correlator,
///     RunConfig::default(),
/// );
/// let suite = runner.run(&files)?;
/// ```
pub struct SuiteRunner<L> {
    dataset: Dataset,
    transmitter: ImageTransmitter<L>,
    correlator: ReplyCorrelator,
    config: RunConfig,
    sinks: Vec<Box<dyn ReportSink>>,
    cancel: Arc<AtomicBool>,
}

impl<L: SutLink> SuiteRunner<L> {
    /// Assemble a runner from its collaborators.
    ///
    /// The correlator is passed in rather than created here so the caller
    /// can wire its producer handle into the link's reply router first.
    #[must_use]
    pub fn new(
        dataset: Dataset,
        transmitter: ImageTransmitter<L>,
        correlator: ReplyCorrelator,
        config: RunConfig,
    ) -> Self {
        Self {
            dataset,
            transmitter,
            correlator,
            config,
            sinks: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a report sink.
    pub fn add_sink(&mut self, sink: Box<dyn ReportSink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }

    /// Cooperative cancellation flag.
    ///
    /// Once set, the case in flight finishes normally and every remaining
    /// case is reported as aborted without contacting the test system.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run one case per file, in order, and aggregate the suite report.
    ///
    /// Per-case failures never abort the suite; only sink I/O errors do.
    pub fn run(&mut self, files: &[PathBuf]) -> Result<SuiteReport> {
        let mut suite = SuiteReport::new(self.config.suite_name.clone());
        info!(
            suite = %suite.name,
            cases = files.len(),
            timeout_ms = self.config.reply_timeout.as_millis() as u64,
            "starting suite"
        );

        for (index, path) in files.iter().enumerate() {
            let case = if self.cancel.load(Ordering::SeqCst) {
                self.aborted_case(index, path)
            } else {
                self.run_case(index, path)
            };
            self.log_case(&case);
            for sink in &mut self.sinks {
                sink.report_case(&case)?;
            }
            suite.push_case(case);
        }

        suite.finish();
        for sink in &mut self.sinks {
            sink.report_suite(&suite)?;
        }
        info!(
            pass = suite.counts.pass,
            fail = suite.counts.fail,
            error = suite.counts.error,
            aborted = suite.counts.aborted,
            "suite finished"
        );
        Ok(suite)
    }

    fn run_case(&self, index: usize, path: &Path) -> CaseReport {
        let start = Instant::now();
        let name = image_name(path);
        let outcome = self.execute(path, &name);
        CaseReport {
            index,
            name,
            image_path: path.to_path_buf(),
            verdict: outcome.verdict,
            stage: outcome.stage,
            expected: outcome.expected,
            received: outcome.received,
            elapsed: start.elapsed(),
            artifact: outcome.artifact,
        }
    }

    fn execute(&self, path: &Path, name: &str) -> CaseOutcome {
        // Ground-truth lookup. A file the testset does not know is a failed
        // case, not a skipped one; nothing is transmitted for it.
        let Some(image) = self.dataset.find_image_by_filename(name) else {
            return CaseOutcome {
                verdict: Verdict::Fail("image not found in dataset".to_string()),
                stage: CaseStage::GroundTruth,
                expected: BTreeSet::new(),
                received: BTreeSet::new(),
                artifact: None,
            };
        };
        let expected = self.dataset.category_ids_for_image(image.id);
        if expected.is_empty() {
            return CaseOutcome {
                verdict: evaluate_categories(&expected, &BTreeSet::new()),
                stage: CaseStage::GroundTruth,
                expected,
                received: BTreeSet::new(),
                artifact: None,
            };
        }

        // The slot must be empty before the image leaves, so that a late
        // reply to an earlier case can never satisfy this one.
        self.correlator.clear();

        if let Err(e) = self.transmitter.send(path) {
            let verdict = match &e {
                Error::ImageDecode { .. } => Verdict::Fail(e.to_string()),
                _ => Verdict::ErrorInTestSystem(e.to_string()),
            };
            return CaseOutcome {
                verdict,
                stage: CaseStage::Transmit,
                expected,
                received: BTreeSet::new(),
                artifact: None,
            };
        }

        match self.correlator.wait(self.config.reply_timeout) {
            WaitOutcome::TimedOut => CaseOutcome {
                verdict: Verdict::ErrorInTestSystem("SUT did not reply".to_string()),
                stage: CaseStage::AwaitReply,
                expected,
                received: BTreeSet::new(),
                artifact: None,
            },
            WaitOutcome::Reply(reply) => {
                let received = reply.categories;
                let verdict = evaluate_categories(&expected, &received);
                let artifact = self.config.attach_artifacts.then(|| path.to_path_buf());
                CaseOutcome {
                    verdict,
                    stage: CaseStage::Evaluate,
                    expected,
                    received,
                    artifact,
                }
            }
        }
    }

    fn aborted_case(&self, index: usize, path: &Path) -> CaseReport {
        CaseReport {
            index,
            name: image_name(path),
            image_path: path.to_path_buf(),
            verdict: Verdict::Aborted("run cancelled".to_string()),
            stage: CaseStage::Cancelled,
            expected: BTreeSet::new(),
            received: BTreeSet::new(),
            elapsed: Duration::ZERO,
            artifact: None,
        }
    }

    fn log_case(&self, case: &CaseReport) {
        match &case.verdict {
            Verdict::Pass => info!(
                case = case.index,
                image = %case.name,
                elapsed_ms = case.elapsed.as_millis() as u64,
                "case passed"
            ),
            Verdict::Fail(reason) => warn!(
                case = case.index,
                image = %case.name,
                reason = %reason,
                "case failed"
            ),
            Verdict::ErrorInTestSystem(reason) => error!(
                case = case.index,
                image = %case.name,
                reason = %reason,
                "test system error"
            ),
            Verdict::Aborted(reason) => warn!(
                case = case.index,
                image = %case.name,
                reason = %reason,
                "case aborted"
            ),
        }
    }
}
