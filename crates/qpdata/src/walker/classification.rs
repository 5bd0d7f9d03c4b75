//! Classification paths.
//!
//! A classification is read into a path of names, root first: `Tumor: Positive`
//! becomes `["Tumor", "Positive"]`. Class objects link to their parent, so
//! the chain is followed upwards and reversed.

use qpdata_object_stream::{GenericValue, ObjectVal};

use super::patterns::is_classification_class;
use super::values::field_ci;
use super::Extract;

const PARENT_FIELDS: [&str; 3] = ["parentClass", "parent", "parentPathClass"];

fn split_path(s: &str) -> Vec<String> {
    s.split(':')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Extract<'_> {
    pub(crate) fn classification(&mut self, value: &GenericValue) -> Vec<String> {
        match value {
            GenericValue::String(s) => split_path(s),
            GenericValue::Enum { constant, .. } => vec![constant.to_string()],
            _ => {
                let graph = self.graph;
                let Some(obj) = graph.as_object(value) else {
                    return Vec::new();
                };
                if let Some(id) = value.node_id() {
                    self.touch(id);
                }
                if is_classification_class(obj.class_name()) {
                    let chain = self.class_chain(obj);
                    if !chain.is_empty() {
                        return chain;
                    }
                }
                self.wrapped_classification(obj)
            }
        }
    }

    /// `name` of each class object, following parent links upwards.
    fn class_chain(&mut self, obj: &ObjectVal) -> Vec<String> {
        let graph = self.graph;
        let mut names: Vec<String> = Vec::new();
        let mut current = Some(obj);
        let mut depth = 0;
        while let Some(class) = current {
            if depth > self.config.max_attribute_depth {
                break;
            }
            depth += 1;
            let name = field_ci(class, "name")
                .and_then(GenericValue::as_str)
                .or_else(|| class.extra_values().find_map(GenericValue::as_str));
            if let Some(name) = name {
                // Derived classes may already carry the full path.
                let mut parts = split_path(name);
                parts.reverse();
                names.extend(parts);
            }
            let parent = PARENT_FIELDS.iter().find_map(|n| field_ci(class, n));
            current = parent.and_then(|p| {
                let next = graph.as_object(p)?;
                self.touch(p.node_id()?);
                Some(next)
            });
        }
        names.reverse();
        names.dedup();
        names
    }

    /// Classification held one level down: a string in custom data, or a
    /// field naming a class object.
    fn wrapped_classification(&mut self, obj: &ObjectVal) -> Vec<String> {
        if let Some(s) = obj.extra_values().find_map(GenericValue::as_str) {
            return split_path(s);
        }
        let nested: Vec<&GenericValue> = obj
            .fields()
            .filter(|(name, _)| {
                let name = name.to_ascii_lowercase();
                name.contains("pathclass") || name.contains("classification")
            })
            .map(|(_, v)| v)
            .collect();
        for value in nested {
            let path = match value {
                GenericValue::String(s) => split_path(s),
                _ if value.node_id().is_some_and(|id| !self.touched.contains(&id)) => {
                    self.classification(value)
                }
                _ => Vec::new(),
            };
            if !path.is_empty() {
                return path;
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::split_path;

    #[test]
    fn splits_derived_names() {
        assert_eq!(split_path("Tumor: Positive"), vec!["Tumor", "Positive"]);
        assert_eq!(split_path("Stroma"), vec!["Stroma"]);
        assert!(split_path("  ").is_empty());
        assert_eq!(split_path("Tumor::Positive "), vec!["Tumor", "Positive"]);
    }
}
