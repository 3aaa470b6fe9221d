use std::fmt;

use super::FeatureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {}", self.0)
    }
}

/// Named, ordered partition of a document's features. The dirty layer holds
/// what was created or edited locally; the others hold downloaded or
/// imported data.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub dirty: bool,
    pub visible: bool,
    pub(crate) features: Vec<FeatureId>,
}

impl Layer {
    pub(crate) fn new(id: LayerId, name: &str, dirty: bool) -> Self {
        Layer {
            id,
            name: name.to_string(),
            dirty,
            visible: true,
            features: Vec::new(),
        }
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn position(&self, id: FeatureId) -> Option<usize> {
        self.features.iter().position(|f| *f == id)
    }
}
