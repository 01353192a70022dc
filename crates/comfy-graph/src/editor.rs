//! Recursive search and in-place editing of nested job graph trees
//!
//! Both operations work on raw JSON maps so they apply equally to a whole
//! [`JobGraph`](crate::JobGraph), a single node, or any fragment in between.

use crate::node::{ClassType, CLASS_TYPE_KEY};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Find the id of the node whose `class_type` is `SaveImage`
///
/// Walks the map depth-first in document order and descends into every value
/// that is itself an object. Arrays are not entered: their elements are node
/// parameters, never nodes. With several candidates the first one reached
/// wins.
#[must_use]
pub fn find_output_node(tree: &Map<String, Value>) -> Option<String> {
    let output = ClassType::SaveImage;
    for (key, value) in tree {
        if let Value::Object(child) = value {
            if child.get(CLASS_TYPE_KEY).and_then(Value::as_str) == Some(output.as_str()) {
                return Some(key.clone());
            }
            if let Some(found) = find_output_node(child) {
                return Some(found);
            }
        }
    }
    None
}

/// Which nodes an edit may touch, judged by their `class_type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    class_types: Option<BTreeSet<String>>,
    exclude: bool,
}

impl ClassFilter {
    /// Create a filter from an optional class list and a mode flag
    ///
    /// With `exclude` set, every mapping is editable except those whose class
    /// is listed. Without it, only mappings whose class is listed are
    /// editable, and a missing list makes nothing editable.
    #[must_use]
    pub fn new<I, S>(class_types: Option<I>, exclude: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_types: class_types.map(|types| types.into_iter().map(Into::into).collect()),
            exclude,
        }
    }

    /// Every mapping is editable
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self {
            class_types: None,
            exclude: true,
        }
    }

    /// Every mapping except the listed classes is editable
    #[must_use]
    pub fn except<I, S>(class_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(class_types), true)
    }

    /// Only the listed classes are editable
    #[must_use]
    pub fn only<I, S>(class_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(class_types), false)
    }

    /// Whether a mapping with this `class_type` (or none) may be edited
    #[must_use]
    pub fn permits(&self, class_type: Option<&str>) -> bool {
        let listed = match (&self.class_types, class_type) {
            (Some(types), Some(class_type)) => types.contains(class_type),
            _ => false,
        };
        if self.exclude {
            !listed
        } else {
            self.class_types.is_some() && listed
        }
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Overwrite `target_key` wherever the filter allows it
///
/// Visits every mapping reachable from `tree` through object values and
/// through objects held in arrays. A visited mapping is edited when the filter
/// permits its `class_type` and it directly holds `target_key`. Traversal
/// carries on below edited mappings, except into the value that was just
/// written. `tree` itself is the node container and is never a candidate.
pub fn replace_key_value(
    tree: &mut Map<String, Value>,
    target_key: &str,
    new_value: &Value,
    filter: &ClassFilter,
) {
    walk_children(tree, None, target_key, new_value, filter);
}

fn walk_children(
    tree: &mut Map<String, Value>,
    skip: Option<&str>,
    target_key: &str,
    new_value: &Value,
    filter: &ClassFilter,
) {
    for (key, value) in tree.iter_mut() {
        if skip == Some(key.as_str()) {
            continue;
        }
        match value {
            Value::Object(child) => visit_mapping(child, target_key, new_value, filter),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::Object(child) = item {
                        visit_mapping(child, target_key, new_value, filter);
                    }
                }
            }
            _ => {}
        }
    }
}

fn visit_mapping(
    mapping: &mut Map<String, Value>,
    target_key: &str,
    new_value: &Value,
    filter: &ClassFilter,
) {
    let editable = filter.permits(mapping.get(CLASS_TYPE_KEY).and_then(Value::as_str));

    let mut replaced = false;
    if editable {
        if let Some(slot) = mapping.get_mut(target_key) {
            *slot = new_value.clone();
            replaced = true;
        }
    }

    walk_children(
        mapping,
        replaced.then_some(target_key),
        target_key,
        new_value,
        filter,
    );
}
