use crate::command::CommandList;
use crate::data::FeatureId;
use crate::document::Document;
use crate::errors::{Error, Result};

use super::{selected_all, Draft, Manipulation};

/// Moves the selection, along with the nodes of selected roads, into the
/// dirty layer so it is part of the next upload.
pub struct CommitFeatures;

/// Deletes the selection. References to deleted features are dropped from
/// roads and relations first; road nodes left unused and untagged go too.
pub struct DeleteFeatures;

impl Manipulation for CommitFeatures {
    fn name(&self) -> &str {
        "commit_features"
    }

    fn label(&self) -> String {
        "Commit Features".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let selected = selected_all(doc, selection);
        if selected.is_empty() {
            return Err(Error::precondition("nothing selected"));
        }
        let mut targets: Vec<FeatureId> = Vec::new();
        for id in selected {
            if !targets.contains(&id) {
                targets.push(id);
            }
            if let Some(road) = doc.graph().road(id) {
                for node in &road.nodes {
                    if !targets.contains(node) {
                        targets.push(*node);
                    }
                }
            }
        }

        let mut draft = Draft::new(doc, self.label());
        for id in targets {
            draft.set_parent(id, doc.dirty_layer())?;
        }
        if draft.is_empty() {
            return Err(Error::precondition("the selection is already in the dirty layer"));
        }
        Ok(draft.finish())
    }
}

impl Manipulation for DeleteFeatures {
    fn name(&self) -> &str {
        "delete_features"
    }

    fn label(&self) -> String {
        "Delete Features".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let selected = selected_all(doc, selection);
        if selected.is_empty() {
            return Err(Error::precondition("nothing selected"));
        }
        let mut draft = Draft::new(doc, self.label());
        if let [only] = selected.as_slice() {
            if let Some(feature) = doc.get(*only) {
                draft.set_description(format!("Delete {}", feature.description()));
            }
        }

        for id in &selected {
            if !draft.exists(*id) {
                continue;
            }
            let mut nodes = if id.is_road() { draft.road_nodes(*id)? } else { Vec::new() };
            nodes.dedup();
            draft.replace_everywhere(*id, None)?;
            draft.remove_feature(*id)?;

            for node in nodes {
                if selected.contains(&node) || !draft.exists(node) || draft.is_referenced(node) {
                    continue;
                }
                if draft.tags(node)?.is_empty() {
                    draft.remove_feature(node)?;
                }
            }
        }
        Ok(draft.finish())
    }
}
