//! Editing operations on a selection.
//!
//! Every manipulation only reads the document and returns the
//! [`CommandList`] that would carry out the edit; nothing changes until the
//! caller pushes that list. A selection that does not fit the manipulation
//! gives an empty list.

pub mod draft;
pub mod features;
pub mod nodes;
pub mod relations;
pub mod roads;
pub mod tags;

pub use self::draft::Draft;
pub use self::features::{CommitFeatures, DeleteFeatures};
pub use self::nodes::{AlignNodes, DetachNode, MergeNodes};
pub use self::relations::{AddRelationMember, CreateRelation, RemoveRelationMember};
pub use self::roads::{BreakRoads, JoinRoads, ReverseRoads, SplitRoads};
pub use self::tags::PasteTags;

use log::{debug, error, info};

use crate::command::CommandList;
use crate::data::{FeatureId, FeatureType};
use crate::document::Document;
use crate::errors::{Error, Result};

pub trait Manipulation {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Label of the undo step this produces.
    fn label(&self) -> String;

    /// The edit for `selection`, or `PreconditionUnmet` explaining why there
    /// is nothing to do.
    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList>;

    /// Like [`Manipulation::plan`], but an unmet precondition yields an empty
    /// list instead of an error.
    fn run(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        debug!(manipulation = self.name(), selected = selection.len(); "Planning");
        match self.plan(doc, selection) {
            Ok(list) => {
                info!(manipulation = self.name(), commands = list.len(); "Planned");
                Ok(list)
            }
            Err(Error::PreconditionUnmet(reason)) => {
                debug!(manipulation = self.name(), reason = reason.as_str(); "Nothing to do");
                Ok(CommandList::new(self.label()))
            }
            Err(err) => {
                let message = err.to_string();
                error!(manipulation = self.name(), err = message.as_str(); "Planning failed");
                Err(err)
            }
        }
    }
}

/// Existing selected features of one kind, first occurrence order, no repeats.
pub(crate) fn selected_of(doc: &Document, selection: &[FeatureId], kind: FeatureType) -> Vec<FeatureId> {
    let mut found: Vec<FeatureId> = Vec::new();
    for id in selection {
        if id.kind == kind && doc.graph().contains(*id) && !found.contains(id) {
            found.push(*id);
        }
    }
    found
}

/// Existing selected features of any kind, first occurrence order, no repeats.
pub(crate) fn selected_all(doc: &Document, selection: &[FeatureId]) -> Vec<FeatureId> {
    let mut found: Vec<FeatureId> = Vec::new();
    for id in selection {
        if doc.graph().contains(*id) && !found.contains(id) {
            found.push(*id);
        }
    }
    found
}
