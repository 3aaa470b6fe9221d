use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::errors::{Error, Result};

use super::{BoundingBox, Coord, Feature, FeatureId, FeatureKind, FeatureType, Layer, LayerId, Member, Relation, Road, Tags};

/// Every feature of a document, its layer partition, and the reverse index
/// of who references whom.
///
/// The reverse index maps a feature to the features pointing at it, with a
/// reference count (a closed road lists its first node twice). It is kept
/// up to date by every mutation below; [`FeatureGraph::check_index`] compares
/// it against a full rebuild.
///
/// Server features (positive ids) that an edit removes leave a tombstone
/// behind, so that an upload or export can report the deletion.
#[derive(Debug, Clone, Default)]
pub struct FeatureGraph {
    features: HashMap<FeatureId, Feature>,
    layers: Vec<Layer>,
    homes: HashMap<FeatureId, LayerId>,
    parents: HashMap<FeatureId, BTreeMap<FeatureId, usize>>,
    deleted: BTreeMap<FeatureId, (LayerId, Feature)>,
    next_layer: u32,
    // Layers changed since the last `take_touched`. Not part of equality.
    touched: BTreeSet<LayerId>,
}

impl PartialEq for FeatureGraph {
    fn eq(&self, other: &Self) -> bool {
        self.features == other.features
            && self.layers == other.layers
            && self.homes == other.homes
            && self.parents == other.parents
            && self.deleted == other.deleted
    }
}

// Layers
impl FeatureGraph {
    pub fn new() -> Self {
        FeatureGraph::default()
    }

    /// A graph holding only its dirty layer.
    pub(crate) fn with_dirty_layer(name: &str) -> (Self, LayerId) {
        let id = LayerId(0);
        let graph = FeatureGraph {
            layers: vec![Layer::new(id, name, true)],
            next_layer: 1,
            ..FeatureGraph::default()
        };
        (graph, id)
    }

    pub fn add_layer(&mut self, name: &str, dirty: bool) -> Result<LayerId> {
        if dirty {
            if let Some(existing) = self.dirty_layer() {
                return Err(Error::invalid_state(format!("{} is already the dirty layer", existing)));
            }
        }
        let id = LayerId(self.next_layer);
        self.next_layer += 1;
        self.layers.push(Layer::new(id, name, dirty));
        self.touched.insert(id);
        Ok(id)
    }

    /// Drops a layer together with its features. Refused while anything
    /// outside the layer still references one of them.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer> {
        let index = self.layer_index(id)?;
        for feature in &self.layers[index].features {
            if let Some(parents) = self.parents.get(feature) {
                if let Some(outside) = parents.keys().find(|p| self.homes.get(p) != Some(&id)) {
                    return Err(Error::invalid_state(format!(
                        "{} is referenced by {} outside {}",
                        feature, outside, id
                    )));
                }
            }
        }

        let layer = self.layers.remove(index);
        for feature_id in &layer.features {
            if let Some(feature) = self.features.remove(feature_id) {
                for child in feature.children() {
                    self.unlink(child, *feature_id);
                }
            }
            self.homes.remove(feature_id);
        }
        for feature_id in &layer.features {
            self.parents.remove(feature_id);
        }
        self.deleted.retain(|_, (home, _)| *home != id);
        self.touched.insert(id);
        Ok(layer)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn dirty_layer(&self) -> Option<LayerId> {
        self.layers.iter().find(|l| l.dirty).map(|l| l.id)
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<()> {
        let index = self.layer_index(id)?;
        self.layers[index].visible = visible;
        self.touched.insert(id);
        Ok(())
    }

    fn layer_index(&self, id: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(Error::UnknownLayer(id))
    }
}

// Lookups
impl FeatureGraph {
    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(&id)
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.features.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn road(&self, id: FeatureId) -> Option<&Road> {
        self.get(id).and_then(Feature::as_road)
    }

    pub fn relation(&self, id: FeatureId) -> Option<&Relation> {
        self.get(id).and_then(Feature::as_relation)
    }

    pub fn coord(&self, id: FeatureId) -> Option<Coord> {
        self.get(id).and_then(Feature::as_node).map(|n| n.coord)
    }

    pub fn layer_of(&self, id: FeatureId) -> Option<LayerId> {
        self.homes.get(&id).copied()
    }

    /// Features referencing `id`, in id order.
    pub fn parents_of(&self, id: FeatureId) -> Vec<FeatureId> {
        self.parents
            .get(&id)
            .map(|parents| parents.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_referenced(&self, id: FeatureId) -> bool {
        self.parents.get(&id).map_or(false, |p| !p.is_empty())
    }

    pub fn roads_with(&self, node: FeatureId) -> Vec<FeatureId> {
        self.parents_of(node).into_iter().filter(FeatureId::is_road).collect()
    }

    pub fn relations_with(&self, id: FeatureId) -> Vec<FeatureId> {
        self.parents_of(id).into_iter().filter(FeatureId::is_relation).collect()
    }

    /// All features, layer by layer, each layer in its own order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.layers
            .iter()
            .flat_map(|layer| layer.features.iter())
            .filter_map(|id| self.features.get(id))
    }

    /// Server features removed by an edit, as they were when removed.
    pub fn deleted(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.deleted.values().map(|(_, feature)| feature)
    }

    pub fn bounding_box(&self, id: FeatureId) -> Option<BoundingBox> {
        let mut visited = HashSet::new();
        self.bounding_box_guarded(id, &mut visited)
    }

    fn bounding_box_guarded(&self, id: FeatureId, visited: &mut HashSet<FeatureId>) -> Option<BoundingBox> {
        if !visited.insert(id) {
            return None;
        }
        let feature = self.get(id)?;
        match &feature.kind {
            FeatureKind::Node(node) => Some(BoundingBox::around(node.coord)),
            _ => feature
                .children()
                .into_iter()
                .filter_map(|child| self.bounding_box_guarded(child, visited))
                .reduce(|mut acc, bbox| {
                    acc.union(&bbox);
                    acc
                }),
        }
    }

    /// Smallest local number a new feature can take without colliding.
    pub fn next_local_number(&self) -> i64 {
        self.features.keys().map(|id| id.number).min().unwrap_or(0).min(0) - 1
    }

    /// True when the reverse index matches the one rebuilt from scratch and
    /// every feature sits in exactly the layer its home entry names.
    pub fn check_index(&self) -> bool {
        let mut rebuilt: HashMap<FeatureId, BTreeMap<FeatureId, usize>> = HashMap::new();
        for feature in self.features.values() {
            for child in feature.children() {
                *rebuilt.entry(child).or_default().entry(feature.id).or_insert(0) += 1;
            }
        }
        if rebuilt != self.parents {
            return false;
        }

        let mut seen = 0;
        for layer in &self.layers {
            for id in &layer.features {
                if self.homes.get(id) != Some(&layer.id) || !self.features.contains_key(id) {
                    return false;
                }
                seen += 1;
            }
        }
        seen == self.features.len()
            && self.homes.len() == self.features.len()
            && self.deleted.keys().all(|id| !self.features.contains_key(id))
    }
}

// Mutations
impl FeatureGraph {
    /// Adds a feature to a layer, at the end unless a position is given.
    /// Everything it references must already exist.
    pub(crate) fn insert(&mut self, layer: LayerId, position: Option<usize>, feature: Feature) -> Result<usize> {
        let id = feature.id;
        if self.contains(id) {
            return Err(Error::invalid_state(format!("{} already exists", id)));
        }
        let expected = match &feature.kind {
            FeatureKind::Node(_) => FeatureType::Node,
            FeatureKind::Road(_) => FeatureType::Road,
            FeatureKind::Relation(_) => FeatureType::Relation,
        };
        if id.kind != expected {
            return Err(Error::invalid_state(format!("{} does not hold a {}", id, expected.osm_name())));
        }
        match &feature.kind {
            FeatureKind::Node(_) => (),
            FeatureKind::Road(road) => {
                for node in &road.nodes {
                    self.require_node(*node)?;
                }
            }
            FeatureKind::Relation(relation) => {
                for member in &relation.members {
                    self.require_member(id, member.feature)?;
                }
            }
        }
        let index = self.layer_index(layer)?;
        let len = self.layers[index].features.len();
        let position = position.unwrap_or(len);
        if position > len {
            return Err(Error::invalid_state(format!("position {} is past the end of {}", position, layer)));
        }

        for child in feature.children() {
            self.link(child, id);
        }
        self.layers[index].features.insert(position, id);
        self.homes.insert(id, layer);
        self.features.insert(id, feature);
        self.touched.insert(layer);
        Ok(position)
    }

    /// Removes an unreferenced feature, returning where it lived.
    pub(crate) fn take(&mut self, id: FeatureId) -> Result<(LayerId, usize, Feature)> {
        if let Some(parents) = self.parents.get(&id) {
            if let Some(parent) = parents.keys().next() {
                return Err(Error::invalid_state(format!("{} is still referenced by {}", id, parent)));
            }
        }
        let layer = self
            .homes
            .get(&id)
            .copied()
            .ok_or_else(|| Error::invalid_state(format!("{} does not exist", id)))?;
        let index = self.layer_index(layer)?;
        let position = self.layers[index]
            .position(id)
            .ok_or_else(|| Error::invalid_state(format!("{} is missing from {}", id, layer)))?;

        let feature = self
            .features
            .remove(&id)
            .ok_or_else(|| Error::invalid_state(format!("{} does not exist", id)))?;
        for child in feature.children() {
            self.unlink(child, id);
        }
        self.layers[index].features.remove(position);
        self.homes.remove(&id);
        self.parents.remove(&id);
        self.touched.insert(layer);
        Ok((layer, position, feature))
    }

    /// Removes an unreferenced feature as an edit. A server feature is
    /// remembered as deleted.
    pub(crate) fn delete(&mut self, id: FeatureId) -> Result<(LayerId, usize, Feature)> {
        let (layer, position, feature) = self.take(id)?;
        if !id.is_local() {
            self.deleted.insert(id, (layer, feature.clone()));
        }
        Ok((layer, position, feature))
    }

    /// Puts back a feature removed by [`FeatureGraph::delete`].
    pub(crate) fn restore(&mut self, layer: LayerId, position: usize, feature: Feature) -> Result<usize> {
        let id = feature.id;
        let position = self.insert(layer, Some(position), feature)?;
        self.deleted.remove(&id);
        Ok(position)
    }

    /// Moves an edited feature into the dirty layer and returns where it
    /// lived before. `None` when it already is there, or when the graph has
    /// no dirty layer or no such feature.
    pub(crate) fn mark_dirty(&mut self, id: FeatureId) -> Result<Option<(LayerId, usize)>> {
        let (Some(dirty), Some(home)) = (self.dirty_layer(), self.layer_of(id)) else {
            return Ok(None);
        };
        if home == dirty {
            return Ok(None);
        }
        self.move_to_layer(id, dirty, None).map(Some)
    }

    /// Sets (`Some`) or removes (`None`) one tag, returning the old value.
    pub(crate) fn set_tag(&mut self, id: FeatureId, key: &str, value: Option<&str>) -> Result<Option<String>> {
        let feature = self.feature_mut(id)?;
        Ok(match value {
            Some(value) => feature.tags.insert(key, value),
            None => feature.tags.remove(key),
        })
    }

    pub(crate) fn replace_tags(&mut self, id: FeatureId, tags: Tags) -> Result<Tags> {
        let feature = self.feature_mut(id)?;
        Ok(std::mem::replace(&mut feature.tags, tags))
    }

    pub(crate) fn set_coord(&mut self, id: FeatureId, coord: Coord) -> Result<Coord> {
        let node = self
            .feature_mut(id)?
            .as_node_mut()
            .ok_or_else(|| Error::invalid_state(format!("{} is not a node", id)))?;
        Ok(std::mem::replace(&mut node.coord, coord))
    }

    pub(crate) fn insert_road_node(&mut self, road: FeatureId, position: usize, node: FeatureId) -> Result<()> {
        self.require_node(node)?;
        let target = self.road_mut(road)?;
        if position > target.nodes.len() {
            return Err(Error::invalid_state(format!("position {} is past the end of {}", position, road)));
        }
        target.nodes.insert(position, node);
        self.link(node, road);
        Ok(())
    }

    pub(crate) fn remove_road_node(&mut self, road: FeatureId, position: usize) -> Result<FeatureId> {
        let target = self.road_mut(road)?;
        if position >= target.nodes.len() {
            return Err(Error::invalid_state(format!("{} has no node at position {}", road, position)));
        }
        let node = target.nodes.remove(position);
        self.unlink(node, road);
        Ok(node)
    }

    pub(crate) fn insert_member(&mut self, relation: FeatureId, position: usize, member: Member) -> Result<()> {
        self.require_member(relation, member.feature)?;
        let target = self.relation_mut(relation)?;
        if position > target.members.len() {
            return Err(Error::invalid_state(format!("position {} is past the end of {}", position, relation)));
        }
        let child = member.feature;
        target.members.insert(position, member);
        self.link(child, relation);
        Ok(())
    }

    pub(crate) fn remove_member(&mut self, relation: FeatureId, position: usize) -> Result<Member> {
        let target = self.relation_mut(relation)?;
        if position >= target.members.len() {
            return Err(Error::invalid_state(format!("{} has no member at position {}", relation, position)));
        }
        let member = target.members.remove(position);
        self.unlink(member.feature, relation);
        Ok(member)
    }

    /// Moves a feature into another layer, returning where it was.
    pub(crate) fn move_to_layer(&mut self, id: FeatureId, layer: LayerId, position: Option<usize>) -> Result<(LayerId, usize)> {
        let from = self
            .layer_of(id)
            .ok_or_else(|| Error::invalid_state(format!("{} does not exist", id)))?;
        let to_index = self.layer_index(layer)?;
        let from_index = self.layer_index(from)?;
        let from_position = self.layers[from_index]
            .position(id)
            .ok_or_else(|| Error::invalid_state(format!("{} is missing from {}", id, from)))?;

        let target_len = self.layers[to_index].features.len() - usize::from(from == layer);
        let position = position.unwrap_or(target_len);
        if position > target_len {
            return Err(Error::invalid_state(format!("position {} is past the end of {}", position, layer)));
        }
        self.layers[from_index].features.remove(from_position);
        self.layers[to_index].features.insert(position, id);
        self.homes.insert(id, layer);
        self.touched.insert(from);
        self.touched.insert(layer);
        Ok((from, from_position))
    }

    /// Layers changed since the previous call.
    pub(crate) fn take_touched(&mut self) -> BTreeSet<LayerId> {
        std::mem::take(&mut self.touched)
    }

    fn feature_mut(&mut self, id: FeatureId) -> Result<&mut Feature> {
        if let Some(layer) = self.homes.get(&id) {
            self.touched.insert(*layer);
        }
        self.features
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_state(format!("{} does not exist", id)))
    }

    fn road_mut(&mut self, id: FeatureId) -> Result<&mut Road> {
        self.feature_mut(id)?
            .as_road_mut()
            .ok_or_else(|| Error::invalid_state(format!("{} is not a road", id)))
    }

    fn relation_mut(&mut self, id: FeatureId) -> Result<&mut Relation> {
        self.feature_mut(id)?
            .as_relation_mut()
            .ok_or_else(|| Error::invalid_state(format!("{} is not a relation", id)))
    }

    fn require_node(&self, id: FeatureId) -> Result<()> {
        match self.get(id) {
            Some(feature) if feature.as_node().is_some() => Ok(()),
            Some(_) => Err(Error::invalid_state(format!("{} is not a node", id))),
            None => Err(Error::invalid_state(format!("{} does not exist", id))),
        }
    }

    fn require_member(&self, relation: FeatureId, member: FeatureId) -> Result<()> {
        if relation == member {
            return Err(Error::invalid_state(format!("{} cannot be a member of itself", relation)));
        }
        if !self.contains(member) {
            return Err(Error::invalid_state(format!("{} does not exist", member)));
        }
        Ok(())
    }

    fn link(&mut self, child: FeatureId, parent: FeatureId) {
        *self.parents.entry(child).or_default().entry(parent).or_insert(0) += 1;
    }

    fn unlink(&mut self, child: FeatureId, parent: FeatureId) {
        if let Some(parents) = self.parents.get_mut(&child) {
            if let Some(count) = parents.get_mut(&parent) {
                *count -= 1;
                if *count == 0 {
                    parents.remove(&parent);
                }
            }
            if parents.is_empty() {
                self.parents.remove(&child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(number: i64) -> FeatureId {
        FeatureId::node(number)
    }

    fn sample() -> (FeatureGraph, LayerId) {
        let mut graph = FeatureGraph::new();
        let layer = graph.add_layer("data", false).unwrap();
        for (i, lon) in [0.0, 1.0, 2.0].iter().enumerate() {
            graph.insert(layer, None, Feature::node(i as i64 + 1, Coord::new(0.0, *lon))).unwrap();
        }
        graph.insert(layer, None, Feature::road(1, vec![n(1), n(2), n(3)])).unwrap();
        (graph, layer)
    }

    #[test]
    fn test_insert_links_children() {
        let (graph, _) = sample();
        assert_eq!(graph.parents_of(n(2)), vec![FeatureId::road(1)]);
        assert_eq!(graph.roads_with(n(1)), vec![FeatureId::road(1)]);
        assert!(graph.check_index());
    }

    #[test]
    fn test_insert_rejects_missing_node() {
        let (mut graph, layer) = sample();
        let err = graph.insert(layer, None, Feature::road(2, vec![n(1), n(9)])).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(!graph.contains(FeatureId::road(2)));
        assert!(graph.check_index());
    }

    #[test]
    fn test_take_refuses_referenced_feature() {
        let (mut graph, _) = sample();
        assert!(matches!(graph.take(n(1)), Err(Error::InvalidState(_))));
        graph.take(FeatureId::road(1)).unwrap();
        let (_, position, feature) = graph.take(n(1)).unwrap();
        assert_eq!(position, 0);
        assert_eq!(feature.id, n(1));
        assert!(graph.check_index());
    }

    #[test]
    fn test_closed_road_counts_references() {
        let (mut graph, layer) = sample();
        let ring = FeatureId::road(2);
        graph.insert(layer, None, Feature::road(2, vec![n(1), n(2), n(3), n(1)])).unwrap();
        graph.remove_road_node(ring, 3).unwrap();
        // The ring still holds n1 once.
        assert_eq!(graph.parents_of(n(1)), vec![FeatureId::road(1), ring]);
        graph.remove_road_node(ring, 0).unwrap();
        assert_eq!(graph.parents_of(n(1)), vec![FeatureId::road(1)]);
        assert!(graph.check_index());
    }

    #[test]
    fn test_delete_keeps_server_tombstone() {
        let (mut graph, layer) = sample();
        graph.insert(layer, None, Feature::node(-1, Coord::default())).unwrap();
        let before = graph.clone();

        let (_, position, feature) = graph.delete(n(-1)).unwrap();
        assert!(graph.deleted().all(|f| f.id != n(-1)));
        graph.restore(layer, position, feature).unwrap();

        graph.delete(FeatureId::road(1)).unwrap();
        assert_eq!(graph.deleted().map(|f| f.id).collect::<Vec<_>>(), vec![FeatureId::road(1)]);
        assert!(graph.check_index());

        graph.restore(layer, 3, Feature::road(1, vec![n(1), n(2), n(3)])).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_mark_dirty_moves_once() {
        let (mut graph, data) = sample();
        assert_eq!(graph.mark_dirty(n(1)).unwrap(), None);
        let dirty = graph.add_layer("dirty", true).unwrap();
        assert_eq!(graph.mark_dirty(n(2)).unwrap(), Some((data, 1)));
        assert_eq!(graph.layer_of(n(2)), Some(dirty));
        assert_eq!(graph.mark_dirty(n(2)).unwrap(), None);
        assert_eq!(graph.mark_dirty(n(9)).unwrap(), None);
    }

    #[test]
    fn test_with_dirty_layer() {
        let (mut graph, dirty) = FeatureGraph::with_dirty_layer("edits");
        assert_eq!(graph.dirty_layer(), Some(dirty));
        assert!(graph.take_touched().is_empty());
        let data = graph.add_layer("data", false).unwrap();
        assert_ne!(data, dirty);
    }

    #[test]
    fn test_members_are_indexed() {
        let (mut graph, layer) = sample();
        let rel = FeatureId::relation(1);
        graph.insert(layer, None, Feature::relation(1, vec![])).unwrap();
        graph.insert_member(rel, 0, Member::new("outer", FeatureId::road(1))).unwrap();
        assert_eq!(graph.relations_with(FeatureId::road(1)), vec![rel]);
        assert!(graph.insert_member(rel, 0, Member::new("", rel)).is_err());
        graph.remove_member(rel, 0).unwrap();
        assert!(graph.relations_with(FeatureId::road(1)).is_empty());
        assert!(graph.check_index());
    }

    #[test]
    fn test_move_to_layer_and_back() {
        let (mut graph, data) = sample();
        let dirty = graph.add_layer("dirty", true).unwrap();
        let before = graph.clone();
        let (from, position) = graph.move_to_layer(n(2), dirty, None).unwrap();
        assert_eq!((from, position), (data, 1));
        assert_eq!(graph.layer_of(n(2)), Some(dirty));
        graph.move_to_layer(n(2), from, Some(position)).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_single_dirty_layer() {
        let mut graph = FeatureGraph::new();
        graph.add_layer("dirty", true).unwrap();
        assert!(graph.add_layer("second", true).is_err());
    }

    #[test]
    fn test_remove_layer_refuses_outside_references() {
        let (mut graph, data) = sample();
        let other = graph.add_layer("other", false).unwrap();
        graph.insert(other, None, Feature::road(2, vec![n(1), n(2)])).unwrap();
        assert!(graph.remove_layer(data).is_err());
        graph.remove_layer(other).unwrap();
        graph.remove_layer(data).unwrap();
        assert!(graph.is_empty());
        assert!(graph.check_index());
    }

    #[test]
    fn test_bounding_box_of_relation_with_cycle() {
        let (mut graph, layer) = sample();
        graph.insert(layer, None, Feature::relation(1, vec![Member::new("", FeatureId::road(1))])).unwrap();
        graph.insert(layer, None, Feature::relation(2, vec![Member::new("", FeatureId::relation(1))])).unwrap();
        graph.insert_member(FeatureId::relation(1), 1, Member::new("", FeatureId::relation(2))).unwrap();
        let bbox = graph.bounding_box(FeatureId::relation(2)).unwrap();
        assert_eq!(bbox.min, Coord::new(0.0, 0.0));
        assert_eq!(bbox.max, Coord::new(0.0, 2.0));
    }

    #[test]
    fn test_next_local_number() {
        let (mut graph, layer) = sample();
        assert_eq!(graph.next_local_number(), -1);
        graph.insert(layer, None, Feature::node(-4, Coord::default())).unwrap();
        assert_eq!(graph.next_local_number(), -5);
    }

    #[test]
    fn test_touched_layers_drain() {
        let (mut graph, layer) = sample();
        assert!(graph.take_touched().contains(&layer));
        assert!(graph.take_touched().is_empty());
        graph.set_tag(n(1), "name", Some("A")).unwrap();
        assert_eq!(graph.take_touched().into_iter().collect::<Vec<_>>(), vec![layer]);
    }
}
