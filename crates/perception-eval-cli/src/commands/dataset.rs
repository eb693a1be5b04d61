//! Testset inspection commands.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use perception_eval::transmit::image_name;
use perception_eval::{Dataset, scan_image_files};

use crate::DatasetAction;

pub fn run(action: DatasetAction, verbose: bool) -> Result<()> {
    match action {
        DatasetAction::Info { path } => info(&path, verbose),
        DatasetAction::Validate { path, images } => validate(&path, images.as_deref(), verbose),
    }
}

fn info(path: &Path, _verbose: bool) -> Result<()> {
    let dataset = Dataset::load(path)
        .with_context(|| format!("Failed to load testset from {}", path.display()))?;

    println!("Testset: {}", path.display());
    if let Some(header) = &dataset.info {
        if let Some(description) = &header.description {
            println!("  Description: {description}");
        }
        if let Some(version) = &header.version {
            println!("  Version: {version}");
        }
    }
    println!("  Images:      {}", dataset.images.len());
    println!("  Annotations: {}", dataset.annotations.len());
    println!("  Categories:  {}", dataset.categories.len());

    let counts = dataset.annotation_counts();
    if !counts.is_empty() {
        println!("  Annotations per category:");
        for (id, count) in &counts {
            let name = dataset.category_name(*id).unwrap_or("?");
            println!("    {id:>4} {name}: {count}");
        }
    }

    Ok(())
}

fn validate(path: &Path, images: Option<&Path>, verbose: bool) -> Result<()> {
    let dataset = Dataset::load(path)
        .with_context(|| format!("Failed to load testset from {}", path.display()))?;

    let mut problems = 0usize;

    let orphans = dataset.orphaned_annotations();
    if !orphans.is_empty() {
        problems += orphans.len();
        println!("Annotations referencing unknown images: {}", orphans.len());
        if verbose {
            for ann in &orphans {
                println!("  annotation {} -> image {}", ann.id, ann.image_id);
            }
        }
    }

    let duplicates = dataset.duplicate_file_names();
    if !duplicates.is_empty() {
        problems += duplicates.len();
        println!("Duplicate file names: {}", duplicates.len());
        if verbose {
            for name in &duplicates {
                println!("  {name}");
            }
        }
    }

    let unannotated = dataset.unannotated_images();
    if !unannotated.is_empty() {
        problems += unannotated.len();
        println!(
            "Images without annotations (cases will fail): {}",
            unannotated.len()
        );
        if verbose {
            for img in &unannotated {
                println!("  {}", img.file_name);
            }
        }
    }

    if let Some(dir) = images {
        let files = scan_image_files(dir)
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        let on_disk: BTreeSet<String> = files.iter().map(|p| image_name(p)).collect();
        let in_set: BTreeSet<&str> = dataset
            .images
            .iter()
            .map(|img| img.file_name.as_str())
            .collect();

        let strays: Vec<&String> = on_disk
            .iter()
            .filter(|name| !in_set.contains(name.as_str()))
            .collect();
        if !strays.is_empty() {
            problems += strays.len();
            println!("Files with no testset record (cases will fail): {}", strays.len());
            if verbose {
                for name in &strays {
                    println!("  {name}");
                }
            }
        }

        let missing: Vec<&&str> = in_set
            .iter()
            .filter(|name| !on_disk.contains(**name))
            .collect();
        if !missing.is_empty() {
            problems += missing.len();
            println!("Testset records with no file on disk: {}", missing.len());
            if verbose {
                for name in &missing {
                    println!("  {name}");
                }
            }
        }
    }

    if problems == 0 {
        println!("OK: no problems found");
        Ok(())
    } else {
        println!("{problems} problem(s) found");
        std::process::exit(1);
    }
}
