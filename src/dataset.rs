//! COCO-style dataset model and ground-truth lookups.
//!
//! The testset description is a single JSON document in the COCO annotation
//! layout: `images`, `annotations`, and `categories` arrays plus optional
//! `info` and `licenses` header sections. Loading is strict about the three
//! required sections and lenient about everything else. Referential problems
//! (annotations pointing at unknown images, duplicate file names) are logged
//! as warnings and kept, so a partially broken testset still runs the cases
//! it can; `dataset validate` in the CLI surfaces them explicitly.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Identifier for an image record in the dataset.
pub type ImageId = u64;

/// Identifier for a category label, shared between ground truth and replies
/// from the system under test.
pub type CategoryId = u32;

/// Dataset header metadata (COCO `info` section). All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub contributor: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

/// License entry (COCO `licenses` section). Carried for provenance only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLicense {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One image record. `file_name` is the join key against files discovered in
/// the test directory; `id` is the join key against annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetImage {
    pub id: ImageId,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Segmentation geometry attached to an annotation. Parsed for completeness;
/// verdict evaluation only consumes category ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// One or more polygons, each a flat `[x0, y0, x1, y1, ..]` ring.
    Polygons(Vec<Vec<f64>>),
    /// COCO run-length encoding over a `[height, width]` grid.
    Rle {
        counts: RleCounts,
        size: Vec<u32>,
    },
}

/// RLE counts come as either raw run lengths or a compressed byte string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Raw(Vec<u32>),
    Encoded(String),
}

/// One ground-truth annotation linking an image to a category. Geometry
/// fields default when absent so label-only testsets load cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: ImageId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default)]
    pub area: f64,
    #[serde(default, alias = "is_crowd")]
    pub iscrowd: u8,
}

/// Category label definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default, alias = "super_category")]
    pub supercategory: Option<String>,
}

/// An immutable in-memory testset: images, their ground-truth annotations,
/// and the category vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub info: Option<DatasetInfo>,
    #[serde(default)]
    pub licenses: Vec<DatasetLicense>,
    pub images: Vec<DatasetImage>,
    pub annotations: Vec<Annotation>,
    pub categories: Vec<Category>,
}

impl Dataset {
    /// Load a testset description from a JSON file.
    ///
    /// Any failure here (missing file, malformed JSON, missing required
    /// sections) is a [`Error::DatasetLoad`] and should abort the suite
    /// before any case runs.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::DatasetLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let dataset: Self = serde_json::from_str(&content).map_err(|e| Error::DatasetLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!(
            images = dataset.images.len(),
            annotations = dataset.annotations.len(),
            categories = dataset.categories.len(),
            path = %path.display(),
            "loaded testset"
        );
        let orphans = dataset.orphaned_annotations().len();
        if orphans > 0 {
            warn!(count = orphans, "annotations reference images not in the testset");
        }
        let duplicates = dataset.duplicate_file_names();
        if !duplicates.is_empty() {
            warn!(names = ?duplicates, "duplicate file names; first record wins for lookups");
        }
        Ok(dataset)
    }

    /// Parse a testset description from a JSON string, without the
    /// load-time diagnostics.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a testset description from a reader.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Look up an image record by its `file_name`.
    ///
    /// The first matching record wins when the testset holds duplicates.
    #[must_use]
    pub fn find_image_by_filename(&self, file_name: &str) -> Option<&DatasetImage> {
        self.images.iter().find(|img| img.file_name == file_name)
    }

    /// Union of ground-truth category ids over all annotations of an image.
    ///
    /// An image with no annotations yields the empty set, which downstream
    /// evaluation treats as a dataset integrity failure rather than a pass.
    #[must_use]
    pub fn category_ids_for_image(&self, image_id: ImageId) -> BTreeSet<CategoryId> {
        self.annotations
            .iter()
            .filter(|ann| ann.image_id == image_id)
            .map(|ann| ann.category_id)
            .collect()
    }

    /// Human-readable name for a category id, if the vocabulary defines it.
    #[must_use]
    pub fn category_name(&self, category_id: CategoryId) -> Option<&str> {
        self.categories
            .iter()
            .find(|cat| cat.id == category_id)
            .map(|cat| cat.name.as_str())
    }

    /// Annotations whose `image_id` matches no image record.
    #[must_use]
    pub fn orphaned_annotations(&self) -> Vec<&Annotation> {
        let known: HashSet<ImageId> = self.images.iter().map(|img| img.id).collect();
        self.annotations
            .iter()
            .filter(|ann| !known.contains(&ann.image_id))
            .collect()
    }

    /// File names that appear on more than one image record, sorted.
    #[must_use]
    pub fn duplicate_file_names(&self) -> Vec<&str> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for img in &self.images {
            *counts.entry(img.file_name.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|&(_, n)| n > 1)
            .map(|(name, _)| name)
            .collect()
    }

    /// Images with zero annotations. Cases for these images fail on the
    /// empty-ground-truth rule without ever contacting the test system.
    #[must_use]
    pub fn unannotated_images(&self) -> Vec<&DatasetImage> {
        let annotated: HashSet<ImageId> = self.annotations.iter().map(|ann| ann.image_id).collect();
        self.images
            .iter()
            .filter(|img| !annotated.contains(&img.id))
            .collect()
    }

    /// Annotation count per category id, for reporting.
    #[must_use]
    pub fn annotation_counts(&self) -> BTreeMap<CategoryId, usize> {
        let mut counts = BTreeMap::new();
        for ann in &self.annotations {
            *counts.entry(ann.category_id).or_default() += 1;
        }
        counts
    }
}
