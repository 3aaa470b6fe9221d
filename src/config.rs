use serde::Deserialize;

use crate::data::Tags;

/// How two differing values for the same tag key are combined when
/// features are joined or merged. The "first" side is the surviving feature.
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagConflict {
    #[default]
    KeepFirst,
    KeepLast,
    /// `a;b`, the OSM multi-value convention.
    Concatenate,
}

impl TagConflict {
    /// Value the surviving feature should carry for a key, or `None` when it
    /// already carries the right one.
    pub fn resolve(&self, current: Option<&str>, incoming: &str) -> Option<String> {
        match current {
            None => Some(incoming.to_string()),
            Some(value) if value == incoming => None,
            Some(value) => match self {
                TagConflict::KeepFirst => None,
                TagConflict::KeepLast => Some(incoming.to_string()),
                TagConflict::Concatenate => {
                    if value.split(';').any(|part| part == incoming) {
                        None
                    } else {
                        Some(format!("{};{}", value, incoming))
                    }
                }
            },
        }
    }

    /// Every tag change needed to fold `incoming` into `survivor`.
    pub fn merge(&self, survivor: &Tags, incoming: &Tags) -> Vec<(String, String)> {
        incoming
            .iter()
            .filter_map(|(key, value)| {
                self.resolve(survivor.get(key), value)
                    .map(|resolved| (key.to_string(), resolved))
            })
            .collect()
    }
}

/// Settings handed to a [`Document`](crate::document::Document) and read by
/// the manipulations planned against it.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub dirty_layer_name: String,
    pub history_limit: Option<usize>,
    pub tag_conflict: TagConflict,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            dirty_layer_name: "Dirty layer".to_string(),
            history_limit: None,
            tag_conflict: TagConflict::default(),
        }
    }
}
