//! Records extracted from a decoded hierarchy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Kind of hierarchy object, derived from the suffix of its class's simple
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Annotation,
    Detection,
    Cell,
    Tile,
    TmaCore,
    /// A bare ROI or measurement list not owned by a hierarchy object.
    Other,
}

impl ObjectKind {
    pub fn from_class_name(name: &str) -> Self {
        const KINDS: [(&str, ObjectKind); 5] = [
            ("annotationobject", ObjectKind::Annotation),
            ("cellobject", ObjectKind::Cell),
            ("tileobject", ObjectKind::Tile),
            ("tmacoreobject", ObjectKind::TmaCore),
            ("detectionobject", ObjectKind::Detection),
        ];
        let simple = name.rsplit(['.', '$']).next().unwrap_or(name).to_ascii_lowercase();
        KINDS
            .iter()
            .find(|(suffix, _)| simple.ends_with(suffix))
            .map_or(ObjectKind::Other, |&(_, kind)| kind)
    }

    /// Label used in summary counts.
    pub fn label(self) -> &'static str {
        match self {
            ObjectKind::Annotation => "Annotation",
            ObjectKind::Detection => "Detection",
            ObjectKind::Cell => "Cell",
            ObjectKind::Tile => "Tile",
            ObjectKind::TmaCore => "TMA core",
            ObjectKind::Other => "Other",
        }
    }

    /// Cells and tiles are detections too.
    pub fn is_detection(self) -> bool {
        matches!(self, ObjectKind::Detection | ObjectKind::Cell | ObjectKind::Tile)
    }
}

/// One annotation-like object found in the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub class_name: String,
    pub kind: ObjectKind,
    pub display_name: Option<String>,
    /// Classification from root to leaf, e.g. `["Tumor", "Positive"]`.
    pub classification_path: Vec<String>,
    pub roi_kind: Option<String>,
    pub roi_points: Vec<Point>,
    pub measurements: IndexMap<String, f64>,
}

impl AnnotationRecord {
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            kind: ObjectKind::from_class_name(&class_name),
            class_name,
            display_name: None,
            classification_path: Vec::new(),
            roi_kind: None,
            roi_points: Vec::new(),
            measurements: IndexMap::new(),
        }
    }

    /// Classification joined the way the producer prints it, e.g. `Tumor: Positive`.
    pub fn classification(&self) -> Option<String> {
        (!self.classification_path.is_empty()).then(|| self.classification_path.join(": "))
    }
}

/// Aggregate counts over every record of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchySummary {
    pub n_objects: usize,
    pub object_type_counts: IndexMap<String, usize>,
    pub annotation_classification_counts: IndexMap<String, usize>,
    pub detection_classification_counts: IndexMap<String, usize>,
    pub classification_counts: IndexMap<String, usize>,
}

/// Label used for records without a classification.
pub const UNCLASSIFIED: &str = "Unclassified";

impl HierarchySummary {
    pub fn from_records(records: &[AnnotationRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.n_objects += 1;
            *summary
                .object_type_counts
                .entry(record.kind.label().to_owned())
                .or_default() += 1;
            let class = record
                .classification()
                .unwrap_or_else(|| UNCLASSIFIED.to_owned());
            if record.kind == ObjectKind::Annotation {
                *summary
                    .annotation_classification_counts
                    .entry(class.clone())
                    .or_default() += 1;
            } else if record.kind.is_detection() {
                *summary
                    .detection_classification_counts
                    .entry(class.clone())
                    .or_default() += 1;
            }
            *summary.classification_counts.entry(class).or_default() += 1;
        }
        summary
    }
}

/// A record matched on field names only; its class was not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownClassWarning {
    pub class_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_class_names() {
        let cases = [
            ("qupath.lib.objects.PathAnnotationObject", ObjectKind::Annotation),
            ("qupath.lib.objects.PathDetectionObject", ObjectKind::Detection),
            ("qupath.lib.objects.PathCellObject", ObjectKind::Cell),
            ("qupath.lib.objects.PathTileObject", ObjectKind::Tile),
            ("qupath.lib.objects.TMACoreObject", ObjectKind::TmaCore),
            ("qupath.lib.roi.PolygonROI", ObjectKind::Other),
            ("demo.ParcellationRegion", ObjectKind::Other),
            ("demo.TileCache", ObjectKind::Other),
            ("demo.AnnotationSet", ObjectKind::Other),
        ];
        for (name, kind) in cases {
            assert_eq!(ObjectKind::from_class_name(name), kind, "{name}");
        }
    }

    #[test]
    fn summary_counts_by_kind_and_class() {
        let mut tumor = AnnotationRecord::new("qupath.lib.objects.PathAnnotationObject");
        tumor.classification_path = vec!["Tumor".into()];
        let plain = AnnotationRecord::new("qupath.lib.objects.PathAnnotationObject");
        let mut cell = AnnotationRecord::new("qupath.lib.objects.PathCellObject");
        cell.classification_path = vec!["Tumor".into(), "Positive".into()];

        let summary = HierarchySummary::from_records(&[tumor, plain, cell]);
        assert_eq!(summary.n_objects, 3);
        assert_eq!(summary.object_type_counts["Annotation"], 2);
        assert_eq!(summary.object_type_counts["Cell"], 1);
        assert_eq!(summary.annotation_classification_counts["Tumor"], 1);
        assert_eq!(summary.annotation_classification_counts[UNCLASSIFIED], 1);
        assert_eq!(summary.detection_classification_counts["Tumor: Positive"], 1);
        assert_eq!(summary.classification_counts.len(), 3);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["nObjects"], 3);
        assert!(json["annotationClassificationCounts"].is_object());
    }
}
