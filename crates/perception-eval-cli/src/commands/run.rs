//! Suite run command.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use perception_eval::{
    Dataset, ImageTransmitter, JsonReportWriter, ReplayLink, ReplyCorrelator, ReplyRouter,
    ReplyScript, RunConfig, SuiteReport, SuiteRunner, scan_image_files,
};

use crate::RunArgs;

pub fn run(args: RunArgs, verbose: bool) -> Result<()> {
    let testset = args
        .testset
        .clone()
        .unwrap_or_else(|| args.dir.join("testset.json"));
    if verbose {
        eprintln!("Loading testset from: {}", testset.display());
    }
    let dataset = Dataset::load(&testset)
        .with_context(|| format!("Failed to load testset from {}", testset.display()))?;

    let files = scan_image_files(&args.dir)
        .with_context(|| format!("Failed to scan {}", args.dir.display()))?;
    if verbose {
        eprintln!("Found {} image files", files.len());
    }

    let script = if args.silent_sut {
        ReplyScript::new()
    } else if let Some(path) = &args.replay {
        ReplayLink::load_script(path)
            .with_context(|| format!("Failed to load reply script from {}", path.display()))?
    } else {
        anyhow::bail!("no reply source configured: pass --replay <file> or --silent-sut");
    };

    let suite_name = args
        .dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("suite")
        .to_string();

    let correlator = ReplyCorrelator::new();
    let router = Arc::new(ReplyRouter::for_annotations(correlator.handle()));
    let link = ReplayLink::new(script, router)
        .with_delay(Duration::from_millis(args.reply_delay_ms));

    let config = RunConfig::builder()
        .suite_name(suite_name)
        .reply_timeout(Duration::from_millis(args.timeout_ms))
        .attach_artifacts(!args.no_artifacts)
        .build();
    let mut runner = SuiteRunner::new(dataset, ImageTransmitter::new(link), correlator, config);

    if let Some(report_dir) = &args.report_dir {
        let writer = JsonReportWriter::create(report_dir).with_context(|| {
            format!("Failed to create report directory {}", report_dir.display())
        })?;
        runner.add_sink(Box::new(writer));
    }

    let cancel = runner.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("cancel requested; finishing current case");
        cancel.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let suite = runner.run(&files).context("Suite run failed")?;

    print_summary(&suite);
    if let Some(report_dir) = &args.report_dir {
        println!("Reports written to: {}", report_dir.display());
    }

    if !suite.counts.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(suite: &SuiteReport) {
    println!("{:-<60}", "");
    println!("Suite: {}", suite.name);
    println!("  Cases:   {}", suite.counts.total());
    println!("  Pass:    {}", suite.counts.pass);
    println!("  Fail:    {}", suite.counts.fail);
    println!("  Error:   {}", suite.counts.error);
    println!("  Aborted: {}", suite.counts.aborted);

    let problems = suite.problem_cases();
    if !problems.is_empty() {
        println!("{:-<60}", "");
        for case in problems {
            println!("  [{}] {}: {}", case.index, case.name, case.verdict);
        }
    }
    println!("{:-<60}", "");
}
