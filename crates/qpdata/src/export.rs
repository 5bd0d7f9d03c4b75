//! Writing project reports: the JSON export, an optional GeoJSON feature
//! collection of annotation shapes, and optional graph dumps.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ProjectError;
use crate::project::ProjectReport;
use crate::record::{AnnotationRecord, ObjectKind, Point};

pub const EXPORT_FILE: &str = "annotations_export.json";
pub const GEOJSON_FILE: &str = "annotations.geojson";
pub const GRAPH_DIR: &str = "graphs";
/// GeoJSON `classification` of features without one, as QuPath's annotation
/// export script writes it.
pub const GEOJSON_UNCLASSIFIED: &str = "(aucune)";

/// What to write besides the main export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub geojson: bool,
    pub dump_graph: bool,
    /// Overrides [`GEOJSON_UNCLASSIFIED`].
    pub unclassified_label: Option<String>,
}

impl ExportOptions {
    pub fn unclassified_label(&self) -> &str {
        self.unclassified_label.as_deref().unwrap_or(GEOJSON_UNCLASSIFIED)
    }
}

/// Paths written by [`write_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPaths {
    pub export: PathBuf,
    pub geojson: Option<PathBuf>,
    pub graphs: Vec<PathBuf>,
}

/// Writes the export files into `dir`, creating it if needed.
pub fn write_report(
    report: &ProjectReport,
    dir: &Path,
    options: &ExportOptions,
) -> Result<ExportPaths, ProjectError> {
    fs::create_dir_all(dir).map_err(|source| ProjectError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = ExportPaths {
        export: dir.join(EXPORT_FILE),
        ..ExportPaths::default()
    };
    write_json(&paths.export, report)?;
    info!(path = %paths.export.display(), images = report.images.len(), "wrote export");

    if options.geojson {
        let collection = feature_collection(report, options.unclassified_label());
        let path = dir.join(GEOJSON_FILE);
        write_json(&path, &collection)?;
        info!(path = %path.display(), "wrote GeoJSON");
        paths.geojson = Some(path);
    }

    if options.dump_graph {
        let graph_dir = dir.join(GRAPH_DIR);
        for image in &report.images {
            let (Some(graph), Some(id)) = (&image.graph, &image.entry_id) else {
                continue;
            };
            fs::create_dir_all(&graph_dir).map_err(|source| ProjectError::Io {
                path: graph_dir.clone(),
                source,
            })?;
            let path = graph_dir.join(format!("{id}.json"));
            write_json(&path, graph)?;
            debug!(path = %path.display(), "wrote graph dump");
            paths.graphs.push(path);
        }
    }
    Ok(paths)
}

/// One Feature per annotation with a usable shape, across all images.
pub fn feature_collection(report: &ProjectReport, unclassified: &str) -> Value {
    let features: Vec<Value> = report
        .images
        .iter()
        .flat_map(|image| {
            image
                .annotations
                .iter()
                .filter(|r| r.kind == ObjectKind::Annotation)
                .filter_map(move |record| feature(record, image.image_name.as_deref(), unclassified))
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// A GeoJSON Feature, or `None` when the record has no points.
pub fn feature(
    record: &AnnotationRecord,
    image_name: Option<&str>,
    unclassified: &str,
) -> Option<Value> {
    let geometry = geometry(&record.roi_points)?;
    Some(json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": {
            "classification": record.classification().unwrap_or_else(|| unclassified.to_owned()),
            "image_name": image_name,
            "name": record.display_name,
            "roi": record.roi_kind,
        },
    }))
}

/// Polygon for three or more points (ring closed), LineString for two,
/// Point for one.
pub fn geometry(points: &[Point]) -> Option<Value> {
    let pair = |p: &Point| json!([p.x, p.y]);
    match points {
        [] => None,
        [p] => Some(json!({"type": "Point", "coordinates": pair(p)})),
        [a, b] => Some(json!({"type": "LineString", "coordinates": [pair(a), pair(b)]})),
        [first, .., last] => {
            let mut ring: Vec<Value> = points.iter().map(pair).collect();
            if first != last {
                ring.push(pair(first));
            }
            Some(json!({"type": "Polygon", "coordinates": [ring]}))
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| ProjectError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_by_point_count() {
        assert_eq!(geometry(&[]), None);
        let point = geometry(&[Point::new(1.0, 2.0)]).unwrap();
        assert_eq!(point["type"], "Point");
        assert_eq!(point["coordinates"], json!([1.0, 2.0]));

        let line = geometry(&[Point::new(0.0, 0.0), Point::new(3.0, 4.0)]).unwrap();
        assert_eq!(line["type"], "LineString");

        let square = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let polygon = geometry(&square).unwrap();
        assert_eq!(polygon["type"], "Polygon");
        let ring = polygon["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn closed_rings_are_not_closed_twice() {
        let triangle = [
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 0.0),
        ];
        let polygon = geometry(&triangle).unwrap();
        assert_eq!(polygon["coordinates"][0].as_array().unwrap().len(), 4);
    }

    #[test]
    fn unclassified_features_are_labelled() {
        let mut record = AnnotationRecord::new("qupath.lib.objects.PathAnnotationObject");
        record.roi_points = vec![Point::new(5.0, 5.0)];
        let options = ExportOptions::default();
        let f = feature(&record, Some("slide.svs"), options.unclassified_label()).unwrap();
        assert_eq!(f["properties"]["classification"], "(aucune)");
        assert_eq!(f["properties"]["image_name"], "slide.svs");

        let options = ExportOptions {
            unclassified_label: Some("Unclassified".into()),
            ..ExportOptions::default()
        };
        let f = feature(&record, None, options.unclassified_label()).unwrap();
        assert_eq!(f["properties"]["classification"], "Unclassified");
    }
}
