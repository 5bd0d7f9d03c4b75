//! Class-name and field-name matching.

use qpdata_object_stream::{simple_name, ObjectVal};

use super::WalkerConfig;

/// What a decoded object is to the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// A known hierarchy object class (annotation, detection, ...).
    Record,
    /// Matched only by its field names.
    Keyword,
    /// A bare ROI or measurement list; a record only when no other record owns it.
    Standalone,
    /// Traversed for children, never recorded.
    Structural,
}

/// Lowercase simple name with any serialization proxy suffix removed,
/// e.g. `polygonroi` for `qupath.lib.roi.PolygonROI$SerializationProxy`.
pub(crate) fn normalized(name: &str) -> String {
    let simple = simple_name(name).to_ascii_lowercase();
    match simple.strip_suffix("$serializationproxy") {
        Some(s) => s.to_owned(),
        None => simple,
    }
}

/// ROI kind reported on records, e.g. `PolygonROI`.
pub(crate) fn roi_kind(name: &str) -> String {
    let simple = simple_name(name);
    simple
        .strip_suffix("$SerializationProxy")
        .unwrap_or(simple)
        .to_owned()
}

pub(crate) fn is_jdk_class(name: &str) -> bool {
    name.starts_with("java.") || name.starts_with("javax.")
}

pub(crate) fn is_classification_class(name: &str) -> bool {
    normalized(name).ends_with("pathclass")
}

pub(crate) fn is_roi_class(name: &str) -> bool {
    normalized(name).ends_with("roi")
}

pub(crate) fn is_measurement_class(name: &str) -> bool {
    normalized(name).contains("measurementlist")
}

impl WalkerConfig {
    pub(crate) fn role(&self, obj: &ObjectVal) -> Role {
        let class_name = obj.class_name();
        let ends_with_any =
            |name: &str, suffixes: &[String]| suffixes.iter().any(|s| name.ends_with(s.as_str()));

        if obj
            .class_chain()
            .any(|d| ends_with_any(&normalized(&d.name), &self.record_suffixes))
        {
            return Role::Record;
        }
        let simple = normalized(class_name);
        if self.structural_names.iter().any(|s| simple == *s) || is_classification_class(class_name)
        {
            return Role::Structural;
        }
        if ends_with_any(&simple, &self.standalone_suffixes) || is_measurement_class(class_name) {
            return Role::Standalone;
        }
        if !is_jdk_class(class_name) && obj.fields().any(|(name, _)| self.is_keyword(name)) {
            return Role::Keyword;
        }
        Role::Structural
    }

    pub(crate) fn is_keyword(&self, field: &str) -> bool {
        let field = field.to_ascii_lowercase();
        self.name_fields.iter().any(|k| field == *k)
            || self
                .attribute_keywords
                .iter()
                .any(|k| field.contains(k.as_str()))
    }

    pub(crate) fn is_name_field(&self, field: &str) -> bool {
        let field = field.to_ascii_lowercase();
        self.name_fields.iter().any(|k| field == *k)
    }
}

/// Version tags some producers write ahead of custom data, e.g. `PathObject v1.0`.
pub(crate) fn looks_like_version_tag(s: &str) -> bool {
    s.split_whitespace().last().is_some_and(|word| {
        word.len() > 1
            && word.starts_with('v')
            && word[1..].chars().all(|c| c.is_ascii_digit() || c == '.')
    })
}
