//! # perception-eval
//!
//! Asynchronous image-test harness that validates perception systems
//! against COCO-style ground truth.
//!
//! The library drives one test case per image file: look up the expected
//! categories in the testset, clear the reply slot, transmit the image to
//! the system under test, wait a bounded time for its annotation reply, and
//! judge the result by category intersection. The transport to the system
//! under test is a trait seam; the built-in [`ReplayLink`] answers from a
//! script for dry-runs and CI.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use perception_eval::{
//!     Dataset, ImageTransmitter, ReplayLink, ReplyCorrelator, ReplyRouter,
//!     RunConfig, SuiteRunner, scan_image_files,
//! };
//!
//! let dataset = Dataset::load("testdir/testset.json")?;
//! let files = scan_image_files("testdir")?;
//!
//! let correlator = ReplyCorrelator::new();
//! let router = ReplyRouter::for_annotations(correlator.handle());
//! let link = ReplayLink::new(script, router.into());
//!
//! let mut runner = SuiteRunner::new(
//!     dataset,
//!     ImageTransmitter::new(link),
//!     correlator,
//!     RunConfig::default(),
//! );
//! let suite = runner.run(&files)?;
//! assert!(suite.counts.all_passed());
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`dataset`]: COCO-style testset model and ground-truth lookups
//! - [`scan`]: Image discovery in the test directory
//! - [`link`]: Transport seam to the system under test and reply routing
//! - [`correlate`]: Bounded correlation of asynchronous replies
//! - [`transmit`]: Payload loading and transmission
//! - [`verdict`]: Verdicts and the category-match rule
//! - [`runner`]: The per-case lifecycle and the sequential suite loop
//! - [`report`]: Case and suite reports plus file sinks

pub mod correlate;
pub mod dataset;
pub mod error;
pub mod link;
pub mod report;
pub mod runner;
pub mod scan;
pub mod transmit;
pub mod verdict;

// Re-export commonly used types
pub use correlate::{ReplyCorrelator, ReplyHandle, WaitOutcome};
pub use dataset::{Annotation, Category, CategoryId, Dataset, DatasetImage, ImageId};
pub use error::{Error, Result};
pub use link::{
    AnnotationReply, PredictedBox, ReplayLink, ReplyRouter, ReplyScript, SutLink,
    TransmittedImage, ANNOTATION_SOURCE,
};
pub use report::{CaseReport, CaseStage, JsonReportWriter, ReportSink, SuiteReport, VerdictCounts};
pub use runner::{RunConfig, RunConfigBuilder, SuiteRunner, DEFAULT_REPLY_TIMEOUT};
pub use scan::scan_image_files;
pub use transmit::{ImageLoadFn, ImageTransmitter, LoadedImage};
pub use verdict::{evaluate_categories, Verdict};
