use crate::command::CommandList;
use crate::data::{Feature, FeatureId, Member};
use crate::document::Document;
use crate::errors::{Error, Result};

use super::{selected_all, Draft, Manipulation};

/// Adds the selected features to the first selected relation with `role`.
/// They go right after the last selected feature that is already a member,
/// or at the end.
pub struct AddRelationMember {
    pub role: String,
}

/// Removes the selected features from the first selected relation, or from
/// every relation holding them when no relation is selected.
pub struct RemoveRelationMember;

/// Creates a relation in the dirty layer holding the selection.
pub struct CreateRelation;

/// First selected relation plus the rest of the selection.
fn split_target(doc: &Document, selection: &[FeatureId]) -> (Option<FeatureId>, Vec<FeatureId>) {
    let mut selected = selected_all(doc, selection);
    let target = selected.iter().position(FeatureId::is_relation).map(|i| selected.remove(i));
    (target, selected)
}

impl AddRelationMember {
    pub fn new(role: impl Into<String>) -> Self {
        AddRelationMember { role: role.into() }
    }
}

impl Manipulation for AddRelationMember {
    fn name(&self) -> &str {
        "add_relation_member"
    }

    fn label(&self) -> String {
        "Add to Relation".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let (target, features) = split_target(doc, selection);
        let relation = target.ok_or_else(|| Error::precondition("select a relation"))?;
        if features.is_empty() {
            return Err(Error::precondition("select features to add"));
        }

        let mut draft = Draft::new(doc, format!("Add to {}", relation));
        draft.set_subject(relation);
        let members = draft.members(relation)?;
        let mut position = members
            .iter()
            .rposition(|m| features.contains(&m.feature))
            .map_or(members.len(), |p| p + 1);
        for feature in features {
            if draft.relation(relation)?.has_member(&self.role, feature) {
                continue;
            }
            draft.insert_member(relation, position, Member::new(self.role.as_str(), feature))?;
            position += 1;
        }
        if draft.is_empty() {
            return Err(Error::precondition("the selection is already in the relation"));
        }
        Ok(draft.finish())
    }
}

impl Manipulation for RemoveRelationMember {
    fn name(&self) -> &str {
        "remove_relation_member"
    }

    fn label(&self) -> String {
        "Remove from Relation".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let (target, mut features) = split_target(doc, selection);
        let relations = match target {
            Some(relation) if !features.is_empty() => vec![relation],
            // A lone relation is taken out of its own parents.
            Some(relation) => {
                features.push(relation);
                doc.graph().relations_with(relation)
            }
            None => {
                let mut relations = Vec::new();
                for feature in &features {
                    for relation in doc.graph().relations_with(*feature) {
                        if !relations.contains(&relation) {
                            relations.push(relation);
                        }
                    }
                }
                relations
            }
        };

        let mut draft = Draft::new(doc, self.label());
        for relation in relations {
            let members = draft.members(relation)?;
            for position in (0..members.len()).rev() {
                if features.contains(&members[position].feature) {
                    draft.remove_member(relation, position)?;
                }
            }
        }
        if draft.is_empty() {
            return Err(Error::precondition("no selected feature is a relation member"));
        }
        Ok(draft.finish())
    }
}

impl Manipulation for CreateRelation {
    fn name(&self) -> &str {
        "create_relation"
    }

    fn label(&self) -> String {
        "Create Relation".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let members: Vec<Member> = selected_all(doc, selection)
            .into_iter()
            .map(|feature| Member::new("", feature))
            .collect();
        if members.is_empty() {
            return Err(Error::precondition("select the features of the new relation"));
        }
        let mut draft = Draft::new(doc, self.label());
        let relation = Feature::relation(draft.new_number(), members);
        draft.set_subject(relation.id);
        draft.add_feature(doc.dirty_layer(), relation)?;
        Ok(draft.finish())
    }
}
