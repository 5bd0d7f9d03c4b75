//! Project directories: the image manifest, the class legend, per-image
//! summaries and data files.
//!
//! ```text
//! project.qpproj
//! classifiers/classes.json
//! data/<entryID>/summary.json
//! data/<entryID>/data.qpdata
//! ```
//!
//! Images are independent, so they are decoded in parallel. A failing image
//! gets an `error` string on its report; the rest of the project still runs.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use qpdata_object_stream::graph_to_json;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::container::{read_container, ContainerOptions};
use crate::error::ProjectError;
use crate::record::{AnnotationRecord, HierarchySummary, ObjectKind, UnknownClassWarning};

pub const MANIFEST_FILE: &str = "project.qpproj";
pub const LEGEND_FILE: &str = "classifiers/classes.json";
pub const DATA_DIR: &str = "data";
pub const SUMMARY_FILE: &str = "summary.json";
pub const DATA_FILE: &str = "data.qpdata";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    images: Vec<ManifestImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestImage {
    #[serde(rename = "entryID")]
    entry_id: Option<Value>,
    image_name: Option<String>,
    server_builder: Option<ServerBuilder>,
}

#[derive(Debug, Deserialize)]
struct ServerBuilder {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Legend {
    #[serde(default)]
    path_classes: Vec<LegendClass>,
}

#[derive(Debug, Deserialize)]
struct LegendClass {
    name: String,
    #[serde(default)]
    color: Value,
}

/// One image listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// `None` for entries without an ID; they have no data directory.
    pub entry_id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
}

impl ImageEntry {
    /// Name for display: the manifest name, else the last URI segment.
    pub fn display_name(&self) -> Option<String> {
        self.name.clone().or_else(|| {
            let uri = self.uri.as_deref()?;
            let last = uri.trim_end_matches('/').rsplit('/').next()?;
            (!last.is_empty()).then(|| last.replace("%20", " "))
        })
    }
}

/// Options for [`Project::analyze`].
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub container: ContainerOptions,
    /// Worker threads; `None` uses one per core.
    pub jobs: Option<usize>,
    /// Keep a JSON rendering of each decoded graph on its report.
    pub dump_graph: bool,
}

/// A project directory with its manifest and legend loaded.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    images: Vec<ImageEntry>,
    classes: IndexMap<String, Value>,
}

impl Project {
    /// Loads the manifest and, when present, the class legend.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let root = root.into();
        let manifest: Manifest = read_json(&root.join(MANIFEST_FILE))?;
        let images: Vec<ImageEntry> = manifest
            .images
            .into_iter()
            .map(|image| ImageEntry {
                entry_id: image.entry_id.as_ref().and_then(entry_id_text),
                name: image.image_name,
                uri: image.server_builder.and_then(|b| b.uri),
            })
            .collect();

        let legend_path = root.join(LEGEND_FILE);
        let classes = if legend_path.is_file() {
            let legend: Legend = read_json(&legend_path)?;
            legend
                .path_classes
                .into_iter()
                .map(|c| (c.name, c.color))
                .collect()
        } else {
            IndexMap::new()
        };

        info!(images = images.len(), classes = classes.len(), root = %root.display(), "opened project");
        Ok(Self {
            root,
            images,
            classes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images(&self) -> &[ImageEntry] {
        &self.images
    }

    /// Class name to color, from the legend.
    pub fn classes(&self) -> &IndexMap<String, Value> {
        &self.classes
    }

    pub fn data_dir(&self, entry_id: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(entry_id)
    }

    /// Decodes every image. Reports come back in manifest order.
    pub fn analyze(&self, options: &ProjectOptions) -> ProjectReport {
        let total = self.images.len();
        let run = || {
            self.images
                .par_iter()
                .enumerate()
                .map(|(idx, image)| {
                    info!(image = idx + 1, total, "processing image");
                    self.analyze_image(image, options)
                })
                .collect::<Vec<_>>()
        };
        // Workers get a stack sized for the configured nesting depth.
        let stack_size = options.container.limits.stack_size();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs.unwrap_or(0))
            .stack_size(stack_size)
            .build();
        let images = match pool {
            Ok(pool) => pool.install(run),
            Err(err) => {
                warn!(%err, jobs = ?options.jobs, "could not build worker pool, using the global one");
                run()
            }
        };
        ProjectReport {
            root: self.root.clone(),
            classes: self.classes.clone(),
            images,
        }
    }

    fn analyze_image(&self, image: &ImageEntry, options: &ProjectOptions) -> ImageReport {
        let mut report = ImageReport {
            entry_id: image.entry_id.clone(),
            image_name: image.display_name(),
            uri: image.uri.clone(),
            ..ImageReport::default()
        };
        let Some(entry_id) = image.entry_id.as_deref() else {
            debug!(uri = ?image.uri, "image has no entry ID");
            return report;
        };
        let dir = self.data_dir(entry_id);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "image has no data directory");
            return report;
        }

        let summary_path = dir.join(SUMMARY_FILE);
        if summary_path.is_file() {
            match read_json::<Value>(&summary_path) {
                Ok(summary) => report.summary = Some(summary),
                Err(err) => warn!(%err, "skipping image summary"),
            }
        }

        let data_path = dir.join(DATA_FILE);
        report.data_path = Some(data_path.clone());
        let decoded = match read_container(&data_path, &options.container) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(%err, entry = entry_id, "failed to read image data");
                report.error = Some(err.to_string());
                return report;
            }
        };

        report.parsed_data = Some(ParsedData {
            has_metadata: decoded.metadata.is_some(),
            has_hierarchy: decoded.graph.is_some(),
            version: decoded.segments.version_text.clone(),
        });
        report.metadata = decoded.metadata;
        report.diagnostics = decoded.diagnostics.iter().map(ToString::to_string).collect();
        if let Some(walk) = decoded.walk {
            if walk.truncated {
                warn!(entry = entry_id, "hierarchy walk truncated");
            }
            report.hierarchy = Some(walk.summary);
            report.annotations = walk.records;
            report.warnings = walk.warnings;
        }
        if options.dump_graph {
            report.graph = decoded.graph.as_ref().map(graph_to_json);
        }
        if let Some(err) = decoded.error {
            warn!(%err, entry = entry_id, "failed to decode image hierarchy");
            report.error = Some(err.to_string());
        }
        report
    }
}

/// Flags describing what was recovered from one data file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedData {
    pub has_metadata: bool,
    pub has_hierarchy: bool,
    pub version: Option<String>,
}

/// Per-image result, serialized into the export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageReport {
    #[serde(rename = "entryID")]
    pub entry_id: Option<String>,
    #[serde(rename = "imageName")]
    pub image_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// The producer's own `summary.json`, as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ParsedData>,
    /// Counts computed from the decoded hierarchy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchySummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<UnknownClassWarning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub graph: Option<Value>,
}

impl ImageReport {
    /// Annotation count from the producer's summary, else from the decoded
    /// hierarchy.
    pub fn annotation_count(&self) -> usize {
        let from_summary = self
            .summary
            .as_ref()
            .and_then(|s| s.pointer("/hierarchy/annotationClassificationCounts"))
            .and_then(Value::as_object)
            .map(|counts| {
                counts
                    .values()
                    .filter_map(Value::as_u64)
                    .map(|n| n as usize)
                    .sum::<usize>()
            });
        from_summary.unwrap_or_else(|| {
            self.annotations
                .iter()
                .filter(|r| r.kind == ObjectKind::Annotation)
                .count()
        })
    }
}

/// Result of analyzing a whole project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    #[serde(skip)]
    pub root: PathBuf,
    pub classes: IndexMap<String, Value>,
    pub images: Vec<ImageReport>,
}

impl ProjectReport {
    pub fn total_annotations(&self) -> usize {
        self.images.iter().map(ImageReport::annotation_count).sum()
    }

    pub fn failed_images(&self) -> usize {
        self.images.iter().filter(|i| i.error.is_some()).count()
    }
}

fn entry_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ProjectError> {
    let text = fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ProjectError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_ids_accept_numbers_and_strings() {
        assert_eq!(entry_id_text(&json!(7)), Some("7".to_owned()));
        assert_eq!(entry_id_text(&json!("12")), Some("12".to_owned()));
        assert_eq!(entry_id_text(&json!(null)), None);
    }

    #[test]
    fn display_name_falls_back_to_uri() {
        let entry = ImageEntry {
            entry_id: Some("1".into()),
            name: None,
            uri: Some("file:/slides/case%201.svs".into()),
        };
        assert_eq!(entry.display_name().as_deref(), Some("case 1.svs"));
    }

    #[test]
    fn annotation_count_prefers_summary() {
        let report = ImageReport {
            summary: Some(json!({
                "hierarchy": {"annotationClassificationCounts": {"Tumor": 3, "Stroma": 2}}
            })),
            annotations: vec![AnnotationRecord::new("qupath.lib.objects.PathAnnotationObject")],
            ..ImageReport::default()
        };
        assert_eq!(report.annotation_count(), 5);
    }
}
