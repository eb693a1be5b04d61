//! Test verdicts and the category-match rule.
//!
//! A case passes when at least one category reported by the system under
//! test matches the ground truth. This is deliberately permissive: the
//! harness checks that the system saw *something it was supposed to see*,
//! not that it saw everything or localized it correctly.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::CategoryId;

/// Final outcome of a single test case.
///
/// `Fail` means the content check failed or the dataset could not support
/// the case. `ErrorInTestSystem` means the harness or environment broke and
/// the verdict says nothing about the system under test. `Aborted` means the
/// case never ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail(String),
    ErrorInTestSystem(String),
    Aborted(String),
}

impl Verdict {
    /// True only for [`Verdict::Pass`].
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Short uppercase code for log lines and CSV cells.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail(_) => "FAIL",
            Verdict::ErrorInTestSystem(_) => "ERROR",
            Verdict::Aborted(_) => "ABORTED",
        }
    }

    /// The reason attached to a non-pass verdict.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(r) | Verdict::ErrorInTestSystem(r) | Verdict::Aborted(r) => Some(r),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.code(), reason),
            None => write!(f, "{}", self.code()),
        }
    }
}

/// Decide a verdict from ground-truth and received category sets.
///
/// Empty ground truth is checked first and fails regardless of what was
/// received; an image nobody labeled cannot pass. Otherwise any non-empty
/// intersection passes.
#[must_use]
pub fn evaluate_categories(
    expected: &BTreeSet<CategoryId>,
    received: &BTreeSet<CategoryId>,
) -> Verdict {
    if expected.is_empty() {
        return Verdict::Fail("no ground-truth categories for image".to_string());
    }
    if expected.intersection(received).next().is_some() {
        Verdict::Pass
    } else {
        Verdict::Fail("received categories do not match any ground-truth category".to_string())
    }
}
