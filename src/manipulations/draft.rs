use std::collections::{hash_map::Entry, HashMap, HashSet};

use crate::command::{Command, CommandList};
use crate::data::{Coord, Feature, FeatureId, FeatureKind, FeatureType, IdAllocator, LayerId, Member, Relation, Road, Tags};
use crate::document::Document;
use crate::errors::{Error, Result};

/// Builds a [`CommandList`] while keeping a private view of what the graph
/// will look like once the list is applied.
///
/// Road node lists, relation member lists, tags and layers touched by the
/// plan are shadowed here, so later steps of the same plan see the effect of
/// earlier ones and compute correct positions. The document itself is only
/// read.
pub struct Draft<'a> {
    doc: &'a Document,
    list: CommandList,
    ids: IdAllocator,
    roads: HashMap<FeatureId, Vec<FeatureId>>,
    members: HashMap<FeatureId, Vec<Member>>,
    tags: HashMap<FeatureId, Tags>,
    layers: HashMap<FeatureId, LayerId>,
    added: Vec<FeatureId>,
    removed: HashSet<FeatureId>,
}

impl<'a> Draft<'a> {
    pub fn new(doc: &'a Document, description: impl Into<String>) -> Self {
        Draft {
            doc,
            list: CommandList::new(description),
            ids: IdAllocator::new(doc.graph()),
            roads: HashMap::new(),
            members: HashMap::new(),
            tags: HashMap::new(),
            layers: HashMap::new(),
            added: Vec::new(),
            removed: HashSet::new(),
        }
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn set_subject(&mut self, subject: FeatureId) {
        self.list.set_subject(Some(subject));
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.list.set_description(description);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn finish(self) -> CommandList {
        self.list
    }

    /// Fresh local number for a feature this plan creates.
    pub fn new_number(&mut self) -> i64 {
        self.ids.allocate()
    }

    pub fn exists(&self, id: FeatureId) -> bool {
        !self.removed.contains(&id) && (self.added.contains(&id) || self.doc.graph().contains(id))
    }

    pub fn layer_of(&self, id: FeatureId) -> Option<LayerId> {
        self.layers.get(&id).copied().or_else(|| self.doc.graph().layer_of(id))
    }

    /// Features referencing `id` once the plan so far is applied, ignoring
    /// references this plan itself added to pre-existing features.
    pub fn parents_of(&self, id: FeatureId) -> Vec<FeatureId> {
        let mut parents: Vec<FeatureId> = self
            .doc
            .graph()
            .parents_of(id)
            .into_iter()
            .filter(|p| !self.removed.contains(p))
            .collect();
        for added in &self.added {
            if self.removed.contains(added) || parents.contains(added) {
                continue;
            }
            let references = match added.kind {
                FeatureType::Road => self.roads.get(added).map_or(false, |nodes| nodes.contains(&id)),
                FeatureType::Relation => {
                    self.members.get(added).map_or(false, |members| members.iter().any(|m| m.feature == id))
                }
                FeatureType::Node => false,
            };
            if references {
                parents.push(*added);
            }
        }
        parents
    }

    /// Whether anything still references `id` once the plan so far is
    /// applied.
    pub fn is_referenced(&self, id: FeatureId) -> bool {
        self.parents_of(id).into_iter().any(|parent| match parent.kind {
            FeatureType::Road => self.road_nodes(parent).map_or(false, |nodes| nodes.contains(&id)),
            FeatureType::Relation => self.members(parent).map_or(false, |members| members.iter().any(|m| m.feature == id)),
            FeatureType::Node => false,
        })
    }

    pub fn road_nodes(&self, road: FeatureId) -> Result<Vec<FeatureId>> {
        if let Some(nodes) = self.roads.get(&road) {
            return Ok(nodes.clone());
        }
        self.doc
            .graph()
            .road(road)
            .map(|r| r.nodes.clone())
            .ok_or_else(|| Error::precondition(format!("{} is not a road", road)))
    }

    pub fn road(&self, id: FeatureId) -> Result<Road> {
        Ok(Road { nodes: self.road_nodes(id)? })
    }

    pub fn relation(&self, id: FeatureId) -> Result<Relation> {
        Ok(Relation { members: self.members(id)? })
    }

    pub fn members(&self, relation: FeatureId) -> Result<Vec<Member>> {
        if let Some(members) = self.members.get(&relation) {
            return Ok(members.clone());
        }
        self.doc
            .graph()
            .relation(relation)
            .map(|r| r.members.clone())
            .ok_or_else(|| Error::precondition(format!("{} is not a relation", relation)))
    }

    pub fn tags(&self, id: FeatureId) -> Result<Tags> {
        if let Some(tags) = self.tags.get(&id) {
            return Ok(tags.clone());
        }
        self.doc
            .get(id)
            .map(|f| f.tags.clone())
            .ok_or_else(|| Error::precondition(format!("{} does not exist", id)))
    }

    pub fn coord(&self, node: FeatureId) -> Result<Coord> {
        self.doc
            .graph()
            .coord(node)
            .ok_or_else(|| Error::precondition(format!("{} is not a node", node)))
    }

    pub fn add_feature(&mut self, layer: LayerId, feature: Feature) -> Result<()> {
        let id = feature.id;
        if self.exists(id) {
            return Err(Error::invalid_state(format!("{} already exists", id)));
        }
        match &feature.kind {
            FeatureKind::Node(_) => (),
            FeatureKind::Road(road) => {
                self.roads.insert(id, road.nodes.clone());
            }
            FeatureKind::Relation(relation) => {
                self.members.insert(id, relation.members.clone());
            }
        }
        self.tags.insert(id, feature.tags.clone());
        self.layers.insert(id, layer);
        self.removed.remove(&id);
        self.added.push(id);
        self.list.push(Command::add_feature(layer, feature));
        Ok(())
    }

    pub fn remove_feature(&mut self, id: FeatureId) -> Result<()> {
        if !self.exists(id) {
            return Err(Error::invalid_state(format!("{} does not exist", id)));
        }
        self.removed.insert(id);
        self.list.push(Command::remove_feature(id));
        Ok(())
    }

    pub fn insert_road_node(&mut self, road: FeatureId, position: usize, node: FeatureId) -> Result<()> {
        let nodes = self.road_entry(road)?;
        if position > nodes.len() {
            return Err(Error::invalid_state(format!("position {} is past the end of {}", position, road)));
        }
        nodes.insert(position, node);
        self.list.push(Command::add_road_node(road, position, node));
        self.touch(road);
        Ok(())
    }

    pub fn remove_road_node(&mut self, road: FeatureId, position: usize) -> Result<FeatureId> {
        let nodes = self.road_entry(road)?;
        if position >= nodes.len() {
            return Err(Error::invalid_state(format!("{} has no node at position {}", road, position)));
        }
        let node = nodes.remove(position);
        self.list.push(Command::remove_road_node(road, position, node));
        self.touch(road);
        Ok(node)
    }

    pub fn insert_member(&mut self, relation: FeatureId, position: usize, member: Member) -> Result<()> {
        let members = self.member_entry(relation)?;
        if position > members.len() {
            return Err(Error::invalid_state(format!("position {} is past the end of {}", position, relation)));
        }
        members.insert(position, member.clone());
        self.list.push(Command::add_relation_member(relation, position, member));
        self.touch(relation);
        Ok(())
    }

    pub fn remove_member(&mut self, relation: FeatureId, position: usize) -> Result<Member> {
        let members = self.member_entry(relation)?;
        if position >= members.len() {
            return Err(Error::invalid_state(format!("{} has no member at position {}", relation, position)));
        }
        let member = members.remove(position);
        self.list.push(Command::remove_relation_member(relation, position, member.clone()));
        self.touch(relation);
        Ok(member)
    }

    /// Sets one tag unless it already has that value.
    pub fn set_tag(&mut self, id: FeatureId, key: &str, value: &str) -> Result<()> {
        let tags = self.tags_entry(id)?;
        if tags.get(key) == Some(value) {
            return Ok(());
        }
        tags.insert(key, value);
        self.list.push(Command::set_tag(id, key, value));
        self.touch(id);
        Ok(())
    }

    pub fn clear_tags(&mut self, id: FeatureId) -> Result<()> {
        let tags = self.tags_entry(id)?;
        if tags.is_empty() {
            return Ok(());
        }
        *tags = Tags::new();
        self.list.push(Command::clear_tags(id));
        self.touch(id);
        Ok(())
    }

    /// Folds `incoming` into the tags of `id` with the configured conflict
    /// policy, `id` being the surviving side.
    pub fn merge_tags(&mut self, id: FeatureId, incoming: &Tags) -> Result<()> {
        let current = self.tags(id)?;
        for (key, value) in self.doc.config().tag_conflict.merge(&current, incoming) {
            self.set_tag(id, &key, &value)?;
        }
        Ok(())
    }

    pub fn set_coord(&mut self, node: FeatureId, coord: Coord) -> Result<()> {
        if self.coord(node)? != coord {
            self.list.push(Command::set_coordinate(node, coord));
            self.touch(node);
        }
        Ok(())
    }

    pub fn set_parent(&mut self, id: FeatureId, layer: LayerId) -> Result<()> {
        if !self.exists(id) {
            return Err(Error::invalid_state(format!("{} does not exist", id)));
        }
        if self.layer_of(id) != Some(layer) {
            self.layers.insert(id, layer);
            self.list.push(Command::set_parent(id, layer));
        }
        Ok(())
    }

    /// Points every road and relation reference to `old` at `new` instead,
    /// or drops the reference when `new` is `None`. Road node lists never end
    /// up with the same node twice in a row.
    pub fn replace_everywhere(&mut self, old: FeatureId, new: Option<FeatureId>) -> Result<()> {
        for parent in self.parents_of(old) {
            if parent.is_road() {
                self.replace_in_road(parent, old, new)?;
            } else if parent.is_relation() {
                self.replace_in_relation(parent, old, new)?;
            }
        }
        Ok(())
    }

    pub fn replace_in_road(&mut self, road: FeatureId, old: FeatureId, new: Option<FeatureId>) -> Result<()> {
        for position in self.road(road)?.positions_of(old).into_iter().rev() {
            self.remove_road_node(road, position)?;
            let nodes = self.road_nodes(road)?;
            let previous = position.checked_sub(1).map(|p| nodes[p]);
            let next = nodes.get(position).copied();
            match new {
                Some(new) if previous != Some(new) && next != Some(new) => {
                    self.insert_road_node(road, position, new)?;
                }
                _ => {
                    if previous.is_some() && previous == next {
                        self.remove_road_node(road, position)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn replace_in_relation(&mut self, relation: FeatureId, old: FeatureId, new: Option<FeatureId>) -> Result<()> {
        for position in self.relation(relation)?.positions_of(old).into_iter().rev() {
            let removed = self.remove_member(relation, position)?;
            if let Some(new) = new {
                let duplicate = self.relation(relation)?.has_member(&removed.role, new);
                if new != relation && !duplicate {
                    self.insert_member(relation, position, Member::new(removed.role, new))?;
                }
            }
        }
        Ok(())
    }

    /// Edited features end up in the dirty layer.
    fn touch(&mut self, id: FeatureId) {
        let layer = self.doc.dirty_or_origin_layer(self.layer_of(id));
        self.layers.insert(id, layer);
    }

    fn road_entry(&mut self, road: FeatureId) -> Result<&mut Vec<FeatureId>> {
        let doc = self.doc;
        match self.roads.entry(road) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let nodes = doc
                    .graph()
                    .road(road)
                    .ok_or_else(|| Error::precondition(format!("{} is not a road", road)))?
                    .nodes
                    .clone();
                Ok(entry.insert(nodes))
            }
        }
    }

    fn member_entry(&mut self, relation: FeatureId) -> Result<&mut Vec<Member>> {
        let doc = self.doc;
        match self.members.entry(relation) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let members = doc
                    .graph()
                    .relation(relation)
                    .ok_or_else(|| Error::precondition(format!("{} is not a relation", relation)))?
                    .members
                    .clone();
                Ok(entry.insert(members))
            }
        }
    }

    fn tags_entry(&mut self, id: FeatureId) -> Result<&mut Tags> {
        let doc = self.doc;
        match self.tags.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let tags = doc
                    .get(id)
                    .ok_or_else(|| Error::precondition(format!("{} does not exist", id)))?
                    .tags
                    .clone();
                Ok(entry.insert(tags))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manipulations::fixtures::*;

    #[test]
    fn test_draft_never_touches_document() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        let before = doc.graph().clone();
        let mut draft = Draft::new(&doc, "Edit");
        draft.remove_road_node(w(1), 1).unwrap();
        draft.set_tag(n(1), "name", "A").unwrap();
        assert_eq!(draft.road_nodes(w(1)).unwrap(), vec![n(1), n(3)]);
        assert_eq!(draft.len(), 2);
        assert_eq!(doc.graph(), &before);
    }

    #[test]
    fn test_replace_in_road_collapses_neighbours() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2, 3, 2, 4], &[]);
        let mut draft = Draft::new(&doc, "Replace");
        draft.replace_in_road(w(1), n(2), Some(n(3))).unwrap();
        assert_eq!(draft.road_nodes(w(1)).unwrap(), vec![n(1), n(3), n(4)]);

        let mut list = draft.finish();
        let mut graph = doc.graph().clone();
        list.apply(&mut graph).unwrap();
        assert_eq!(graph.road(w(1)).unwrap().nodes, vec![n(1), n(3), n(4)]);
        assert!(graph.check_index());
    }

    #[test]
    fn test_replace_with_none_drops_reference() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2, 1], &[]);
        add_relation(&mut doc, data, 1, &[("stop", n(2)), ("", w(1))]);
        let mut draft = Draft::new(&doc, "Drop");
        draft.replace_everywhere(n(2), None).unwrap();
        assert_eq!(draft.road_nodes(w(1)).unwrap(), vec![n(1)]);
        assert_eq!(draft.members(r(1)).unwrap(), vec![Member::new("", w(1))]);
    }

    #[test]
    fn test_new_numbers_below_existing() {
        let (mut doc, data) = document();
        add_node(&mut doc, data, -3, 0.0, 0.0);
        let mut draft = Draft::new(&doc, "Ids");
        assert_eq!(draft.new_number(), -4);
        assert_eq!(draft.new_number(), -5);
    }

    #[test]
    fn test_edits_shadow_dirty_layer() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 2);
        let mut draft = Draft::new(&doc, "Move");
        draft.set_coord(n(1), Coord::new(5.0, 5.0)).unwrap();
        assert_eq!(draft.layer_of(n(1)), Some(doc.dirty_layer()));
        assert_eq!(draft.layer_of(n(2)), Some(data));
        // Already there once the list is applied.
        draft.set_parent(n(1), doc.dirty_layer()).unwrap();
        assert_eq!(draft.len(), 1);
    }

    #[test]
    fn test_set_tag_skips_unchanged_values() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 1);
        let mut draft = Draft::new(&doc, "Tags");
        draft.set_tag(n(1), "name", "A").unwrap();
        draft.set_tag(n(1), "name", "A").unwrap();
        draft.clear_tags(n(1)).unwrap();
        draft.clear_tags(n(1)).unwrap();
        assert_eq!(draft.len(), 2);
    }
}
