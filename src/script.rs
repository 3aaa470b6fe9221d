//! Replays a JSON list of edits against a document, e.g.
//!
//! ```json
//! [
//!   {"op": "join_roads", "selection": ["w1", "w2"]},
//!   {"op": "paste_tags", "selection": ["w1"], "tags": {"surface": "asphalt"}},
//!   {"op": "undo"}
//! ]
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::data::{FeatureId, Tags};
use crate::document::Document;
use crate::errors::{Error, Result};
use crate::manipulations::{
    AddRelationMember, AlignNodes, BreakRoads, CommitFeatures, CreateRelation, DeleteFeatures, DetachNode, JoinRoads,
    Manipulation, MergeNodes, PasteTags, RemoveRelationMember, ReverseRoads, SplitRoads,
};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditStep {
    JoinRoads { selection: Vec<FeatureId> },
    SplitRoads { selection: Vec<FeatureId> },
    BreakRoads { selection: Vec<FeatureId> },
    ReverseRoads { selection: Vec<FeatureId> },
    AlignNodes { selection: Vec<FeatureId> },
    MergeNodes { selection: Vec<FeatureId> },
    DetachNode { selection: Vec<FeatureId> },
    AddRelationMember {
        selection: Vec<FeatureId>,
        #[serde(default)]
        role: String,
    },
    RemoveRelationMember { selection: Vec<FeatureId> },
    CreateRelation { selection: Vec<FeatureId> },
    PasteTags {
        selection: Vec<FeatureId>,
        tags: Tags,
        #[serde(default)]
        overwrite: bool,
    },
    CommitFeatures { selection: Vec<FeatureId> },
    DeleteFeatures { selection: Vec<FeatureId> },
    Undo,
    Redo,
    MarkSaved,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    /// Steps that changed the document.
    pub applied: usize,
    /// Steps with nothing to do.
    pub skipped: usize,
}

impl EditStep {
    pub fn name(&self) -> &'static str {
        match self {
            EditStep::JoinRoads { .. } => "join_roads",
            EditStep::SplitRoads { .. } => "split_roads",
            EditStep::BreakRoads { .. } => "break_roads",
            EditStep::ReverseRoads { .. } => "reverse_roads",
            EditStep::AlignNodes { .. } => "align_nodes",
            EditStep::MergeNodes { .. } => "merge_nodes",
            EditStep::DetachNode { .. } => "detach_node",
            EditStep::AddRelationMember { .. } => "add_relation_member",
            EditStep::RemoveRelationMember { .. } => "remove_relation_member",
            EditStep::CreateRelation { .. } => "create_relation",
            EditStep::PasteTags { .. } => "paste_tags",
            EditStep::CommitFeatures { .. } => "commit_features",
            EditStep::DeleteFeatures { .. } => "delete_features",
            EditStep::Undo => "undo",
            EditStep::Redo => "redo",
            EditStep::MarkSaved => "mark_saved",
        }
    }

    /// The manipulation this step performs and its selection, if it is one.
    fn manipulation(&self) -> Option<(Box<dyn Manipulation>, &[FeatureId])> {
        let (manipulation, selection): (Box<dyn Manipulation>, &Vec<FeatureId>) = match self {
            EditStep::JoinRoads { selection } => (Box::new(JoinRoads), selection),
            EditStep::SplitRoads { selection } => (Box::new(SplitRoads), selection),
            EditStep::BreakRoads { selection } => (Box::new(BreakRoads), selection),
            EditStep::ReverseRoads { selection } => (Box::new(ReverseRoads), selection),
            EditStep::AlignNodes { selection } => (Box::new(AlignNodes), selection),
            EditStep::MergeNodes { selection } => (Box::new(MergeNodes), selection),
            EditStep::DetachNode { selection } => (Box::new(DetachNode), selection),
            EditStep::AddRelationMember { selection, role } => (Box::new(AddRelationMember::new(role.as_str())), selection),
            EditStep::RemoveRelationMember { selection } => (Box::new(RemoveRelationMember), selection),
            EditStep::CreateRelation { selection } => (Box::new(CreateRelation), selection),
            EditStep::PasteTags { selection, tags, overwrite } => {
                (Box::new(PasteTags { tags: tags.clone(), overwrite: *overwrite }), selection)
            }
            EditStep::CommitFeatures { selection } => (Box::new(CommitFeatures), selection),
            EditStep::DeleteFeatures { selection } => (Box::new(DeleteFeatures), selection),
            EditStep::Undo | EditStep::Redo | EditStep::MarkSaved => return None,
        };
        Some((manipulation, selection.as_slice()))
    }
}

pub fn load_script(path: &Path) -> Result<Vec<EditStep>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Runs the steps in order. A step that finds nothing to do (including undo
/// or redo at the ends of history) is skipped; any other failure stops the
/// script with the document left as the previous step left it.
pub fn run_script(doc: &mut Document, steps: &[EditStep]) -> Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();
    for (index, step) in steps.iter().enumerate() {
        let outcome = match step {
            EditStep::Undo => doc.undo().map(Some),
            EditStep::Redo => doc.redo().map(Some),
            EditStep::MarkSaved => {
                doc.mark_saved();
                Ok(None)
            }
            _ => match step.manipulation() {
                Some((manipulation, selection)) => doc.perform(manipulation.as_ref(), selection),
                None => Ok(None),
            },
        };
        match outcome {
            Ok(Some(state)) => {
                summary.applied += 1;
                info!(step = index, op = step.name(), position = state.position, modified = state.modified; "Step applied");
            }
            Ok(None) => {
                summary.skipped += 1;
                info!(step = index, op = step.name(); "Step left the document unchanged");
            }
            Err(err @ (Error::NothingToUndo | Error::NothingToRedo)) => {
                summary.skipped += 1;
                let message = err.to_string();
                warn!(step = index, op = step.name(), err = message.as_str(); "Step skipped");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manipulations::fixtures::*;

    #[test]
    fn test_parse_script() {
        let steps: Vec<EditStep> = serde_json::from_str(
            r#"[
                {"op": "join_roads", "selection": ["w1", "w2"]},
                {"op": "add_relation_member", "selection": ["r1", "n3"]},
                {"op": "paste_tags", "selection": ["n-1"], "tags": {"name": "A"}, "overwrite": true},
                {"op": "undo"}
            ]"#,
        )
        .unwrap();
        assert_eq!(steps[0], EditStep::JoinRoads { selection: vec![w(1), w(2)] });
        assert_eq!(steps[1], EditStep::AddRelationMember { selection: vec![r(1), n(3)], role: String::new() });
        assert_eq!(
            steps[2],
            EditStep::PasteTags { selection: vec![n(-1)], tags: Tags::from_pairs([("name", "A")]), overwrite: true }
        );
        assert_eq!(steps[3], EditStep::Undo);
    }

    #[test]
    fn test_bad_feature_id_is_rejected() {
        let parsed = serde_json::from_str::<Vec<EditStep>>(r#"[{"op": "merge_nodes", "selection": ["x1"]}]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_script_counts_steps() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2], &[("highway", "primary")]);
        add_road(&mut doc, data, 2, &[2, 3], &[]);
        let steps = vec![
            EditStep::Redo,
            EditStep::JoinRoads { selection: vec![w(1), w(2)] },
            EditStep::JoinRoads { selection: vec![w(1), w(2)] },
            EditStep::Undo,
            EditStep::Redo,
            EditStep::MarkSaved,
        ];
        let summary = run_script(&mut doc, &steps).unwrap();
        assert_eq!(summary, ScriptSummary { applied: 3, skipped: 3 });
        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2), n(3)]);
        assert!(!doc.history().is_modified());
    }
}
