//! Ids of the placemarks and overlays of a document.
//!
//! Every layer of a job gets its own prefix, derived from the layer name and made unique among the layers of
//! the job. Placemark ids are `<prefix>.<feature id>`, overlay ids are the prefix alone. Since prefixes never
//! contain a dot, ids of different layers can not collide.

use std::collections::HashSet;

/// Hands out unique ids derived from user provided names.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    /// Creates an allocator with no ids in use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `base`, or `base` with the first free `_N` suffix if it is already taken.
    pub fn allocate(&mut self, base: &str) -> String {
        let mut id = base.to_string();
        let mut counter = 1;
        while self.used.contains(&id) {
            counter += 1;
            id = format!("{base}_{counter}");
        }
        self.used.insert(id.clone());
        id
    }

    /// Reserves a prefix for the records of a layer.
    pub fn layer_prefix(&mut self, layer_name: &str) -> String {
        self.allocate(&layer_prefix(layer_name))
    }
}

/// Prefix of the record ids of a layer, before it is made unique. Only characters valid in XML ids are kept.
pub(crate) fn layer_prefix(layer_name: &str) -> String {
    let prefix: String = layer_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    match prefix.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => prefix,
        _ => format!("_{prefix}"),
    }
}

/// Feature id with everything that is not valid in the local part of an XML id replaced by `_`.
pub(crate) fn feature_part(feature_id: &str) -> String {
    let part: String = feature_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if part.is_empty() {
        "_".to_string()
    } else {
        part
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(layer_prefix("Roads"), "roads");
        assert_eq!(layer_prefix("Land use 2020"), "land_use_2020");
        assert_eq!(layer_prefix("2020"), "_2020");
    }

    #[test]
    fn prefixes_are_unique_per_allocator() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.layer_prefix("Roads"), "roads");
        assert_eq!(ids.layer_prefix("roads"), "roads_2");
        assert_eq!(ids.layer_prefix("a b"), "a_b");
        assert_eq!(ids.layer_prefix("a_b"), "a_b_2");
        assert_eq!(ids.layer_prefix("Roads_2"), "roads_2_2");
    }

    #[test]
    fn feature_parts() {
        assert_eq!(feature_part("my id"), "my_id");
        assert_eq!(feature_part("a.b-c_7"), "a.b-c_7");
        assert_eq!(feature_part("x<y>&\"z\""), "x_y___z_");
        assert_eq!(feature_part(""), "_");
    }
}
