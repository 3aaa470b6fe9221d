//! Reversible mutations of the feature graph.
//!
//! A [`Command`] remembers whatever it overwrote when it is applied, so
//! `undo` restores exactly the previous state. Commands are grouped into a
//! [`CommandList`], which is the unit the history stores.
//!
//! Editing a feature that lives outside the dirty layer moves it there
//! first, and `undo` moves it back. Removing a server feature leaves a
//! tombstone in the graph. Together these are what marks a feature as
//! modified or deleted.

pub use self::list::CommandList;

pub mod list;

use crate::data::{Coord, Feature, FeatureGraph, FeatureId, LayerId, Member, Tags};

/// Layer and position an edited feature was moved out of.
type Home = Option<(LayerId, usize)>;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddFeature {
        layer: LayerId,
        id: FeatureId,
        /// Held while the feature is not in the graph.
        feature: Option<Feature>,
    },
    RemoveFeature {
        id: FeatureId,
        removed: Option<(LayerId, usize, Feature)>,
    },
    /// `value: None` removes the key.
    SetTag {
        id: FeatureId,
        key: String,
        value: Option<String>,
        previous: Option<Option<String>>,
        home: Home,
    },
    ClearTags {
        id: FeatureId,
        previous: Option<Tags>,
        home: Home,
    },
    AddRoadNode {
        road: FeatureId,
        position: usize,
        node: FeatureId,
        applied: bool,
        home: Home,
    },
    RemoveRoadNode {
        road: FeatureId,
        position: usize,
        node: FeatureId,
        applied: bool,
        home: Home,
    },
    AddRelationMember {
        relation: FeatureId,
        position: usize,
        member: Member,
        applied: bool,
        home: Home,
    },
    RemoveRelationMember {
        relation: FeatureId,
        position: usize,
        member: Member,
        applied: bool,
        home: Home,
    },
    SetCoordinate {
        node: FeatureId,
        coord: Coord,
        previous: Option<Coord>,
        home: Home,
    },
    /// Moves a feature to another layer.
    SetParent {
        id: FeatureId,
        layer: LayerId,
        previous: Option<(LayerId, usize)>,
    },
}

impl Command {
    pub fn add_feature(layer: LayerId, feature: Feature) -> Self {
        Command::AddFeature { layer, id: feature.id, feature: Some(feature) }
    }

    pub fn remove_feature(id: FeatureId) -> Self {
        Command::RemoveFeature { id, removed: None }
    }

    pub fn set_tag(id: FeatureId, key: &str, value: &str) -> Self {
        Command::SetTag { id, key: key.to_string(), value: Some(value.to_string()), previous: None, home: None }
    }

    pub fn remove_tag(id: FeatureId, key: &str) -> Self {
        Command::SetTag { id, key: key.to_string(), value: None, previous: None, home: None }
    }

    pub fn clear_tags(id: FeatureId) -> Self {
        Command::ClearTags { id, previous: None, home: None }
    }

    pub fn add_road_node(road: FeatureId, position: usize, node: FeatureId) -> Self {
        Command::AddRoadNode { road, position, node, applied: false, home: None }
    }

    /// `node` is the node expected at `position`; anything else there makes
    /// the command fail.
    pub fn remove_road_node(road: FeatureId, position: usize, node: FeatureId) -> Self {
        Command::RemoveRoadNode { road, position, node, applied: false, home: None }
    }

    pub fn add_relation_member(relation: FeatureId, position: usize, member: Member) -> Self {
        Command::AddRelationMember { relation, position, member, applied: false, home: None }
    }

    pub fn remove_relation_member(relation: FeatureId, position: usize, member: Member) -> Self {
        Command::RemoveRelationMember { relation, position, member, applied: false, home: None }
    }

    pub fn set_coordinate(node: FeatureId, coord: Coord) -> Self {
        Command::SetCoordinate { node, coord, previous: None, home: None }
    }

    pub fn set_parent(id: FeatureId, layer: LayerId) -> Self {
        Command::SetParent { id, layer, previous: None }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::AddFeature { .. } => "add_feature",
            Command::RemoveFeature { .. } => "remove_feature",
            Command::SetTag { .. } => "set_tag",
            Command::ClearTags { .. } => "clear_tags",
            Command::AddRoadNode { .. } => "add_road_node",
            Command::RemoveRoadNode { .. } => "remove_road_node",
            Command::AddRelationMember { .. } => "add_relation_member",
            Command::RemoveRelationMember { .. } => "remove_relation_member",
            Command::SetCoordinate { .. } => "set_coordinate",
            Command::SetParent { .. } => "set_parent",
        }
    }

    /// The feature this command changes.
    pub fn target(&self) -> FeatureId {
        match self {
            Command::AddFeature { id, .. }
            | Command::RemoveFeature { id, .. }
            | Command::SetTag { id, .. }
            | Command::ClearTags { id, .. }
            | Command::SetParent { id, .. } => *id,
            Command::AddRoadNode { road, .. } | Command::RemoveRoadNode { road, .. } => *road,
            Command::AddRelationMember { relation, .. } | Command::RemoveRelationMember { relation, .. } => *relation,
            Command::SetCoordinate { node, .. } => *node,
        }
    }

    pub fn is_applied(&self) -> bool {
        match self {
            Command::AddFeature { feature, .. } => feature.is_none(),
            Command::RemoveFeature { removed, .. } => removed.is_some(),
            Command::SetTag { previous, .. } => previous.is_some(),
            Command::ClearTags { previous, .. } => previous.is_some(),
            Command::AddRoadNode { applied, .. }
            | Command::RemoveRoadNode { applied, .. }
            | Command::AddRelationMember { applied, .. }
            | Command::RemoveRelationMember { applied, .. } => *applied,
            Command::SetCoordinate { previous, .. } => previous.is_some(),
            Command::SetParent { previous, .. } => previous.is_some(),
        }
    }

    pub fn apply(&mut self, graph: &mut FeatureGraph) -> Result<()> {
        if self.is_applied() {
            return Err(Error::invalid_state(format!("{} on {} is already applied", self.name(), self.target())));
        }
        let target = self.target();
        let moved = match self.home_mut() {
            Some(_) => graph.mark_dirty(target)?,
            None => None,
        };
        if let Err(err) = self.apply_change(graph) {
            if let Some((layer, position)) = moved {
                graph.move_to_layer(target, layer, Some(position))?;
            }
            return Err(err);
        }
        if let Some(home) = self.home_mut() {
            *home = moved;
        }
        Ok(())
    }

    pub fn undo(&mut self, graph: &mut FeatureGraph) -> Result<()> {
        if !self.is_applied() {
            return Err(Error::invalid_state(format!("{} on {} was never applied", self.name(), self.target())));
        }
        self.undo_change(graph)?;
        let target = self.target();
        if let Some(home) = self.home_mut() {
            if let Some((layer, position)) = home.take() {
                graph.move_to_layer(target, layer, Some(position))?;
            }
        }
        Ok(())
    }

    /// Where an editing command keeps its target's previous layer. `None`
    /// for commands that place features themselves.
    fn home_mut(&mut self) -> Option<&mut Home> {
        match self {
            Command::SetTag { home, .. }
            | Command::ClearTags { home, .. }
            | Command::AddRoadNode { home, .. }
            | Command::RemoveRoadNode { home, .. }
            | Command::AddRelationMember { home, .. }
            | Command::RemoveRelationMember { home, .. }
            | Command::SetCoordinate { home, .. } => Some(home),
            Command::AddFeature { .. } | Command::RemoveFeature { .. } | Command::SetParent { .. } => None,
        }
    }

    fn apply_change(&mut self, graph: &mut FeatureGraph) -> Result<()> {
        match self {
            Command::AddFeature { layer, feature, .. } => {
                if let Some(new_feature) = feature.take() {
                    if let Err(err) = graph.insert(*layer, None, new_feature.clone()) {
                        *feature = Some(new_feature);
                        return Err(err);
                    }
                }
            }
            Command::RemoveFeature { id, removed } => {
                *removed = Some(graph.delete(*id)?);
            }
            Command::SetTag { id, key, value, previous, .. } => {
                *previous = Some(graph.set_tag(*id, key, value.as_deref())?);
            }
            Command::ClearTags { id, previous, .. } => {
                *previous = Some(graph.replace_tags(*id, Tags::new())?);
            }
            Command::AddRoadNode { road, position, node, applied, .. } => {
                graph.insert_road_node(*road, *position, *node)?;
                *applied = true;
            }
            Command::RemoveRoadNode { road, position, node, applied, .. } => {
                let found = graph.road(*road).and_then(|r| r.nodes.get(*position).copied());
                if found != Some(*node) {
                    return Err(Error::invalid_state(format!("{} no longer has {} at position {}", road, node, position)));
                }
                graph.remove_road_node(*road, *position)?;
                *applied = true;
            }
            Command::AddRelationMember { relation, position, member, applied, .. } => {
                graph.insert_member(*relation, *position, member.clone())?;
                *applied = true;
            }
            Command::RemoveRelationMember { relation, position, member, applied, .. } => {
                let found = graph.relation(*relation).and_then(|r| r.members.get(*position));
                if found != Some(&*member) {
                    return Err(Error::invalid_state(format!(
                        "{} no longer has {} at position {}",
                        relation, member.feature, position
                    )));
                }
                graph.remove_member(*relation, *position)?;
                *applied = true;
            }
            Command::SetCoordinate { node, coord, previous, .. } => {
                *previous = Some(graph.set_coord(*node, *coord)?);
            }
            Command::SetParent { id, layer, previous } => {
                *previous = Some(graph.move_to_layer(*id, *layer, None)?);
            }
        }
        Ok(())
    }

    fn undo_change(&mut self, graph: &mut FeatureGraph) -> Result<()> {
        match self {
            Command::AddFeature { id, feature, .. } => {
                let (_, _, taken) = graph.take(*id)?;
                *feature = Some(taken);
            }
            Command::RemoveFeature { removed, .. } => {
                if let Some((layer, position, feature)) = removed.take() {
                    if let Err(err) = graph.restore(layer, position, feature.clone()) {
                        *removed = Some((layer, position, feature));
                        return Err(err);
                    }
                }
            }
            Command::SetTag { id, key, previous, .. } => {
                if let Some(old) = previous {
                    graph.set_tag(*id, key, old.as_deref())?;
                }
                *previous = None;
            }
            Command::ClearTags { id, previous, .. } => {
                if let Some(old) = previous.take() {
                    graph.replace_tags(*id, old)?;
                }
            }
            Command::AddRoadNode { road, position, node, applied, .. } => {
                let found = graph.road(*road).and_then(|r| r.nodes.get(*position).copied());
                if found != Some(*node) {
                    return Err(Error::invalid_state(format!("{} no longer has {} at position {}", road, node, position)));
                }
                graph.remove_road_node(*road, *position)?;
                *applied = false;
            }
            Command::RemoveRoadNode { road, position, node, applied, .. } => {
                graph.insert_road_node(*road, *position, *node)?;
                *applied = false;
            }
            Command::AddRelationMember { relation, position, applied, .. } => {
                graph.remove_member(*relation, *position)?;
                *applied = false;
            }
            Command::RemoveRelationMember { relation, position, member, applied, .. } => {
                graph.insert_member(*relation, *position, member.clone())?;
                *applied = false;
            }
            Command::SetCoordinate { node, previous, .. } => {
                if let Some(old) = *previous {
                    graph.set_coord(*node, old)?;
                }
                *previous = None;
            }
            Command::SetParent { id, previous, .. } => {
                if let Some((layer, position)) = *previous {
                    graph.move_to_layer(*id, layer, Some(position))?;
                }
                *previous = None;
            }
        }
        Ok(())
    }
}
