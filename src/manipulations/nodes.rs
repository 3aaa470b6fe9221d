use crate::command::CommandList;
use crate::data::{Coord, Feature, FeatureId, FeatureType};
use crate::document::Document;
use crate::errors::{Error, Result};

use super::{selected_of, Draft, Manipulation};

/// Moves shorter than this, in degrees, are left out.
const TOLERANCE: f64 = 1e-9;

/// Below this share of the total spread, the spread along an axis is noise
/// and cannot carry a regression.
const NOISE_SHARE: f64 = 1e-12;

/// Moves the selected nodes onto the least-squares line through them. Of
/// the two regression lines (latitude on longitude and the reverse) it
/// takes the one that keeps distinct nodes apart, preferring the first.
pub struct AlignNodes;

/// Unit `(x, y)` direction of the least-squares line, regressing `y` on `x`
/// or, when `swapped`, `x` on `y`. `None` when the regressor barely varies.
fn fitted_direction(sxx: f64, sxy: f64, syy: f64, swapped: bool) -> Option<(f64, f64)> {
    let (along, across) = if swapped { (syy, sxx) } else { (sxx, syy) };
    if along <= NOISE_SHARE * (along + across) {
        return None;
    }
    let slope = sxy / along;
    let norm = (1.0 + slope * slope).sqrt();
    Some(if swapped { (slope / norm, 1.0 / norm) } else { (1.0 / norm, slope / norm) })
}

/// Pairs of nodes at different positions that would land on the same spot.
fn collisions(coords: &[Coord], offsets: &[f64]) -> usize {
    let mut count = 0;
    for i in 0..coords.len() {
        for j in i + 1..coords.len() {
            if coords[i] != coords[j] && (offsets[i] - offsets[j]).abs() <= TOLERANCE {
                count += 1;
            }
        }
    }
    count
}

/// Folds the selected nodes into the first one: its tags absorb theirs and
/// every road and relation referencing them uses the first node instead.
pub struct MergeNodes;

/// Disconnects the selected roads from a node they share with other roads,
/// giving each its own copy of the node.
pub struct DetachNode;

impl Manipulation for AlignNodes {
    fn name(&self) -> &str {
        "align_nodes"
    }

    fn label(&self) -> String {
        "Align Nodes".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let nodes = selected_of(doc, selection, FeatureType::Node);
        if nodes.len() < 3 {
            return Err(Error::precondition("select at least three nodes"));
        }
        let mut draft = Draft::new(doc, self.label());
        let coords = nodes.iter().map(|node| draft.coord(*node)).collect::<Result<Vec<Coord>>>()?;

        if coords.iter().all(|c| *c == coords[0]) {
            return Err(Error::precondition("the selected nodes share one position"));
        }

        let count = coords.len() as f64;
        let mean_x = coords.iter().map(|c| c.lon).sum::<f64>() / count;
        let mean_y = coords.iter().map(|c| c.lat).sum::<f64>() / count;
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for c in &coords {
            let (dx, dy) = (c.lon - mean_x, c.lat - mean_y);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        let offsets = |(dir_x, dir_y): (f64, f64)| -> Vec<f64> {
            coords.iter().map(|c| (c.lon - mean_x) * dir_x + (c.lat - mean_y) * dir_y).collect()
        };
        let (dir_x, dir_y) = [false, true]
            .into_iter()
            .filter_map(|swapped| fitted_direction(sxx, sxy, syy, swapped))
            .min_by_key(|direction| collisions(&coords, &offsets(*direction)))
            .ok_or_else(|| Error::precondition("the selected nodes share one position"))?;

        for ((node, c), t) in nodes.iter().zip(&coords).zip(offsets((dir_x, dir_y))) {
            let target = Coord::new(mean_y + t * dir_y, mean_x + t * dir_x);
            if (target.lat - c.lat).abs() > TOLERANCE || (target.lon - c.lon).abs() > TOLERANCE {
                draft.set_coord(*node, target)?;
            }
        }
        if draft.is_empty() {
            return Err(Error::precondition("the selected nodes are already aligned"));
        }
        Ok(draft.finish())
    }
}

impl Manipulation for MergeNodes {
    fn name(&self) -> &str {
        "merge_nodes"
    }

    fn label(&self) -> String {
        "Merge Nodes".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let nodes = selected_of(doc, selection, FeatureType::Node);
        if nodes.len() < 2 {
            return Err(Error::precondition("select at least two nodes"));
        }
        let survivor = nodes[0];
        let mut draft = Draft::new(doc, format!("Merge Nodes into {}", survivor));
        draft.set_subject(survivor);
        for other in &nodes[1..] {
            let tags = draft.tags(*other)?;
            draft.merge_tags(survivor, &tags)?;
            draft.replace_everywhere(*other, Some(survivor))?;
            draft.remove_feature(*other)?;
        }
        Ok(draft.finish())
    }
}

impl Manipulation for DetachNode {
    fn name(&self) -> &str {
        "detach_node"
    }

    fn label(&self) -> String {
        "Detach Node".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let nodes = selected_of(doc, selection, FeatureType::Node);
        if nodes.len() != 1 {
            return Err(Error::precondition("select exactly one node"));
        }
        let node = nodes[0];
        let users = doc.graph().roads_with(node);
        if users.len() < 2 {
            return Err(Error::precondition(format!("{} is not shared between roads", node)));
        }
        let roads: Vec<FeatureId> = selected_of(doc, selection, FeatureType::Road)
            .into_iter()
            .filter(|road| users.contains(road))
            .collect();
        if roads.is_empty() {
            return Err(Error::precondition(format!("select a road through {}", node)));
        }
        // Someone has to keep the original.
        let targets = if roads.len() == users.len() { &roads[1..] } else { &roads[..] };

        let mut draft = Draft::new(doc, format!("Detach Node {}", node));
        draft.set_subject(node);
        let coord = draft.coord(node)?;
        let tags = draft.tags(node)?;
        for road in targets {
            let copy = Feature::node(draft.new_number(), coord).with_tags(tags.clone());
            let copy_id = copy.id;
            let layer = doc.dirty_or_origin_layer(draft.layer_of(*road));
            draft.add_feature(layer, copy)?;
            draft.replace_in_road(*road, node, Some(copy_id))?;
        }
        Ok(draft.finish())
    }
}
