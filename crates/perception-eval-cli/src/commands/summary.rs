//! Suite report summary command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use perception_eval::SuiteReport;

pub fn run(input: PathBuf, verbose: bool) -> Result<()> {
    let path = if input.is_dir() {
        input.join("suite.json")
    } else {
        input
    };
    if verbose {
        eprintln!("Loading report from: {}", path.display());
    }
    let suite = SuiteReport::load(&path)
        .with_context(|| format!("Failed to load suite report from {}", path.display()))?;

    println!("Suite: {}", suite.name);
    println!("  Started:  {}", suite.started_at.to_rfc3339());
    println!("  Finished: {}", suite.finished_at.to_rfc3339());
    println!("  Cases:    {}", suite.counts.total());
    println!(
        "  Pass {}, fail {}, error {}, aborted {}",
        suite.counts.pass, suite.counts.fail, suite.counts.error, suite.counts.aborted
    );

    let problems = suite.problem_cases();
    if !problems.is_empty() {
        println!("{:-<72}", "");
        println!("{:<6} {:<28} {:<12} VERDICT", "INDEX", "IMAGE", "STAGE");
        for case in problems {
            println!(
                "{:<6} {:<28} {:<12} {}",
                case.index,
                case.name,
                case.stage.as_str(),
                case.verdict
            );
        }
    }

    Ok(())
}
