use crate::command::CommandList;
use crate::data::{Feature, FeatureId, FeatureType, Member, Road};
use crate::document::Document;
use crate::errors::{Error, Result};

use super::{selected_of, Draft, Manipulation};

/// Merges the selected roads into the first one. Roads must chain up
/// through shared endpoints; the others are reversed as needed, appended or
/// prepended, and deleted. Tags are merged with the configured policy.
pub struct JoinRoads;

/// Cuts roads at the selected interior nodes. Each cut node ends one piece
/// and starts the next; new pieces copy the tags and follow the original in
/// every relation it belongs to.
pub struct SplitRoads;

/// Gives every road but the first its own copy of a shared node, so the
/// roads no longer connect there.
pub struct BreakRoads;

pub struct ReverseRoads;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Joint {
    /// Other road continues after the chain's last node.
    Append { reversed: bool },
    /// Other road leads into the chain's first node.
    Prepend { reversed: bool },
}

/// How `other` connects to `chain`, if they share exactly one endpoint.
fn joint(chain: &[FeatureId], other: &[FeatureId]) -> Option<Joint> {
    let (first, last) = (chain.first()?, chain.last()?);
    let (other_first, other_last) = (other.first()?, other.last()?);
    let mut found = Vec::new();
    if last == other_first {
        found.push(Joint::Append { reversed: false });
    }
    if last == other_last {
        found.push(Joint::Append { reversed: true });
    }
    if first == other_last {
        found.push(Joint::Prepend { reversed: false });
    }
    if first == other_first {
        found.push(Joint::Prepend { reversed: true });
    }
    if found.len() == 1 {
        found.pop()
    } else {
        None
    }
}

impl Manipulation for JoinRoads {
    fn name(&self) -> &str {
        "join_roads"
    }

    fn label(&self) -> String {
        "Join Roads".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let roads = selected_of(doc, selection, FeatureType::Road);
        if roads.len() < 2 {
            return Err(Error::precondition("select at least two roads"));
        }
        for road in &roads {
            let nodes = doc.graph().road(*road).map_or(0, |r| r.nodes.len());
            if nodes < 2 {
                return Err(Error::precondition(format!("{} has fewer than two nodes", road)));
            }
            if doc.graph().road(*road).map_or(false, Road::is_closed) {
                return Err(Error::precondition(format!("{} is a closed road", road)));
            }
        }

        let survivor = roads[0];
        let mut draft = Draft::new(doc, self.label());
        draft.set_subject(survivor);
        let mut pending = roads[1..].to_vec();

        while !pending.is_empty() {
            let chain = draft.road_nodes(survivor)?;
            let mut found = None;
            for (index, road) in pending.iter().enumerate() {
                let other = draft.road_nodes(*road)?;
                if let Some(joint) = joint(&chain, &other) {
                    found = Some((index, joint, other));
                    break;
                }
            }
            let (index, joint, mut sequence) =
                found.ok_or_else(|| Error::precondition("the selected roads do not form a single chain"))?;
            let road = pending.remove(index);

            match joint {
                Joint::Append { reversed } => {
                    if reversed {
                        sequence.reverse();
                    }
                    let mut end = chain.len();
                    for node in sequence.into_iter().skip(1) {
                        draft.insert_road_node(survivor, end, node)?;
                        end += 1;
                    }
                }
                Joint::Prepend { reversed } => {
                    if reversed {
                        sequence.reverse();
                    }
                    sequence.pop();
                    for (position, node) in sequence.into_iter().enumerate() {
                        draft.insert_road_node(survivor, position, node)?;
                    }
                }
            }

            let tags = draft.tags(road)?;
            draft.merge_tags(survivor, &tags)?;
            draft.replace_everywhere(road, Some(survivor))?;
            draft.remove_feature(road)?;
        }
        Ok(draft.finish())
    }
}

impl Manipulation for SplitRoads {
    fn name(&self) -> &str {
        "split_roads"
    }

    fn label(&self) -> String {
        "Split Roads".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let nodes = selected_of(doc, selection, FeatureType::Node);
        if nodes.is_empty() {
            return Err(Error::precondition("select the nodes to split at"));
        }
        let mut roads = selected_of(doc, selection, FeatureType::Road);
        if roads.is_empty() {
            for node in &nodes {
                for road in doc.graph().roads_with(*node) {
                    let inside = doc.graph().road(road).map_or(false, |r| r.is_interior(*node));
                    if inside && !roads.contains(&road) {
                        roads.push(road);
                    }
                }
            }
        }

        let mut draft = Draft::new(doc, self.label());
        let mut subject = None;
        for road in roads {
            let sequence = draft.road_nodes(road)?;
            let cuts: Vec<usize> = (1..sequence.len().saturating_sub(1))
                .filter(|position| nodes.contains(&sequence[*position]))
                .collect();
            let Some(&first_cut) = cuts.first() else {
                continue;
            };

            let tags = draft.tags(road)?;
            let layer = doc.dirty_or_origin_layer(draft.layer_of(road));
            let mut bounds = cuts.clone();
            bounds.push(sequence.len() - 1);
            let mut pieces = Vec::new();
            for window in bounds.windows(2) {
                let piece = Feature::road(draft.new_number(), sequence[window[0]..=window[1]].to_vec())
                    .with_tags(tags.clone());
                pieces.push(piece.id);
                draft.add_feature(layer, piece)?;
            }
            for position in (first_cut + 1..sequence.len()).rev() {
                draft.remove_road_node(road, position)?;
            }

            for relation in draft.parents_of(road).into_iter().filter(FeatureId::is_relation) {
                let members = draft.members(relation)?;
                for position in (0..members.len()).rev() {
                    if members[position].feature != road {
                        continue;
                    }
                    for (offset, piece) in pieces.iter().enumerate() {
                        let member = Member::new(members[position].role.clone(), *piece);
                        draft.insert_member(relation, position + 1 + offset, member)?;
                    }
                }
            }
            if subject.is_none() {
                subject = Some(road);
                draft.set_subject(road);
            }
        }

        if draft.is_empty() {
            return Err(Error::precondition("no selected node lies inside a road"));
        }
        Ok(draft.finish())
    }
}

impl Manipulation for BreakRoads {
    fn name(&self) -> &str {
        "break_roads"
    }

    fn label(&self) -> String {
        "Break Roads".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let selected_nodes = selected_of(doc, selection, FeatureType::Node);
        let selected_roads = selected_of(doc, selection, FeatureType::Road);

        let targets = if !selected_nodes.is_empty() {
            selected_nodes
        } else if selected_roads.len() >= 2 {
            let mut shared = Vec::new();
            for road in &selected_roads {
                for node in doc.graph().road(*road).map(|r| r.nodes.clone()).unwrap_or_default() {
                    let users = selected_roads
                        .iter()
                        .filter(|r| doc.graph().road(**r).map_or(false, |r| r.contains(node)))
                        .count();
                    if users >= 2 && !shared.contains(&node) {
                        shared.push(node);
                    }
                }
            }
            shared
        } else {
            return Err(Error::precondition("select a shared node or at least two roads"));
        };

        let mut draft = Draft::new(doc, self.label());
        for node in targets {
            let users: Vec<FeatureId> = if selected_roads.is_empty() {
                doc.graph().roads_with(node)
            } else {
                selected_roads
                    .iter()
                    .filter(|road| draft.road_nodes(**road).map_or(false, |nodes| nodes.contains(&node)))
                    .copied()
                    .collect()
            };
            if users.len() < 2 {
                continue;
            }
            let coord = draft.coord(node)?;
            for road in &users[1..] {
                let copy = Feature::node(draft.new_number(), coord);
                let copy_id = copy.id;
                let layer = doc.dirty_or_origin_layer(draft.layer_of(*road));
                draft.add_feature(layer, copy)?;
                draft.replace_in_road(*road, node, Some(copy_id))?;
            }
        }

        if draft.is_empty() {
            return Err(Error::precondition("no selected node is shared between roads"));
        }
        Ok(draft.finish())
    }
}

impl Manipulation for ReverseRoads {
    fn name(&self) -> &str {
        "reverse_roads"
    }

    fn label(&self) -> String {
        "Reverse Roads".to_string()
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let roads = selected_of(doc, selection, FeatureType::Road);
        let mut draft = Draft::new(doc, self.label());
        for road in roads {
            let len = draft.road_nodes(road)?.len();
            if len < 2 {
                continue;
            }
            let last = len - 1;
            for position in 0..last {
                let node = draft.remove_road_node(road, last)?;
                draft.insert_road_node(road, position, node)?;
            }
        }
        if draft.is_empty() {
            return Err(Error::precondition("select a road with at least two nodes"));
        }
        Ok(draft.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EditorConfig, TagConflict};
    use crate::manipulations::fixtures::*;

    fn push(doc: &mut Document, manipulation: &dyn Manipulation, selection: &[FeatureId]) {
        let before = doc.graph().clone();
        let list = manipulation.run(doc, selection).unwrap();
        assert!(!list.is_empty(), "{} planned nothing", manipulation.name());
        assert_eq!(doc.graph(), &before, "planning changed the document");
        doc.push(list).unwrap();
        assert!(doc.graph().check_index());

        let after = doc.graph().clone();
        doc.undo().unwrap();
        assert_eq!(doc.graph(), &before);
        doc.redo().unwrap();
        assert_eq!(doc.graph(), &after);
    }

    #[test]
    fn test_join_first_wins_and_dedups_shared_node() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 5);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[("highway", "primary")]);
        add_road(&mut doc, data, 2, &[3, 4, 5], &[("highway", "secondary"), ("name", "Mill Lane")]);
        push(&mut doc, &JoinRoads, &[w(1), w(2)]);

        assert!(!doc.graph().contains(w(2)));
        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2), n(3), n(4), n(5)]);
        let tags = &doc.get(w(1)).unwrap().tags;
        assert_eq!(tags.get("highway"), Some("primary"));
        assert_eq!(tags.get("name"), Some("Mill Lane"));
        assert_eq!(doc.history().state().subject, Some(w(1)));
    }

    #[test]
    fn test_join_reverses_and_prepends() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 6);
        add_road(&mut doc, data, 1, &[3, 4], &[]);
        // Shares node 3 at its end: prepended as is.
        add_road(&mut doc, data, 2, &[1, 2, 3], &[]);
        // Shares node 4 at its end: reversed, then appended.
        add_road(&mut doc, data, 3, &[6, 5, 4], &[]);
        push(&mut doc, &JoinRoads, &[w(1), w(3), w(2)]);
        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2), n(3), n(4), n(5), n(6)]);
    }

    #[test]
    fn test_join_replaces_consumed_road_in_relations() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2], &[]);
        add_road(&mut doc, data, 2, &[2, 3], &[]);
        add_relation(&mut doc, data, 1, &[("", w(2))]);
        add_relation(&mut doc, data, 2, &[("", w(1)), ("", w(2))]);
        push(&mut doc, &JoinRoads, &[w(1), w(2)]);
        assert_eq!(doc.graph().relation(r(1)).unwrap().members, vec![Member::new("", w(1))]);
        assert_eq!(doc.graph().relation(r(2)).unwrap().members, vec![Member::new("", w(1))]);
    }

    #[test]
    fn test_join_unconnected_roads_is_noop() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2], &[]);
        add_road(&mut doc, data, 2, &[3, 4], &[]);
        let before = doc.graph().clone();
        let list = JoinRoads.run(&doc, &[w(1), w(2)]).unwrap();
        assert!(list.is_empty());
        assert_eq!(doc.push(list).unwrap(), None);
        assert_eq!(doc.graph(), &before);
        assert!(doc.history().is_empty());
    }

    #[test]
    fn test_join_refuses_ring_closure() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        add_road(&mut doc, data, 2, &[3, 1], &[]);
        assert!(JoinRoads.plan(&doc, &[w(1), w(2)]).unwrap_err().is_precondition());
    }

    #[test]
    fn test_join_refuses_closed_road() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2, 3, 1], &[]);
        add_road(&mut doc, data, 2, &[1, 4], &[]);
        let err = JoinRoads.plan(&doc, &[w(1), w(2)]).unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_join_with_concatenate_policy() {
        let config = EditorConfig { tag_conflict: TagConflict::Concatenate, ..EditorConfig::default() };
        let (mut doc, data) = document_with(config);
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2], &[("highway", "primary")]);
        add_road(&mut doc, data, 2, &[2, 3], &[("highway", "secondary")]);
        push(&mut doc, &JoinRoads, &[w(1), w(2)]);
        assert_eq!(doc.get(w(1)).unwrap().tags.get("highway"), Some("primary;secondary"));
    }

    #[test]
    fn test_split_at_interior_node() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2, 3, 4], &[("highway", "tertiary")]);
        push(&mut doc, &SplitRoads, &[w(1), n(2)]);

        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2)]);
        let piece = FeatureId::road(-1);
        assert_eq!(road_nodes(&doc, piece), vec![n(2), n(3), n(4)]);
        assert_eq!(doc.get(piece).unwrap().tags.get("highway"), Some("tertiary"));
        assert_eq!(doc.graph().layer_of(piece), Some(doc.dirty_layer()));
    }

    #[test]
    fn test_split_twice_and_follow_in_relation() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 5);
        add_road(&mut doc, data, 1, &[1, 2, 3, 4, 5], &[]);
        add_relation(&mut doc, data, 1, &[("outer", w(1)), ("inner", n(5))]);
        // Road found from the nodes alone.
        push(&mut doc, &SplitRoads, &[n(2), n(4)]);

        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2)]);
        assert_eq!(road_nodes(&doc, w(-1)), vec![n(2), n(3), n(4)]);
        assert_eq!(road_nodes(&doc, w(-2)), vec![n(4), n(5)]);
        assert_eq!(
            doc.graph().relation(r(1)).unwrap().members,
            vec![
                Member::new("outer", w(1)),
                Member::new("outer", w(-1)),
                Member::new("outer", w(-2)),
                Member::new("inner", n(5)),
            ]
        );
    }

    #[test]
    fn test_split_at_endpoint_is_noop() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        assert!(SplitRoads.run(&doc, &[w(1), n(3)]).unwrap().is_empty());
        assert!(SplitRoads.run(&doc, &[w(1)]).unwrap().is_empty());
    }

    #[test]
    fn test_split_skips_roads_ending_at_node() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        add_road(&mut doc, data, 2, &[2, 4], &[]);
        let before = doc.get(w(2)).unwrap().clone();
        push(&mut doc, &SplitRoads, &[n(2)]);

        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2)]);
        assert_eq!(road_nodes(&doc, w(-1)), vec![n(2), n(3)]);
        assert_eq!(doc.get(w(2)).unwrap(), &before);
        assert_eq!(doc.graph().layer_of(w(2)), Some(data));
    }

    #[test]
    fn test_break_shared_node() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 5);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        add_road(&mut doc, data, 2, &[4, 2, 5], &[]);
        push(&mut doc, &BreakRoads, &[n(2)]);

        assert_eq!(road_nodes(&doc, w(1)), vec![n(1), n(2), n(3)]);
        assert_eq!(road_nodes(&doc, w(2)), vec![n(4), n(-1), n(5)]);
        assert_eq!(doc.graph().coord(n(-1)), doc.graph().coord(n(2)));
        assert_eq!(doc.graph().roads_with(n(2)), vec![w(1)]);
    }

    #[test]
    fn test_break_between_selected_roads() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        add_road(&mut doc, data, 2, &[3, 4, 1], &[]);
        push(&mut doc, &BreakRoads, &[w(2), w(1)]);
        // The first selected road keeps the original nodes.
        assert_eq!(road_nodes(&doc, w(2)), vec![n(3), n(4), n(1)]);
        assert_eq!(road_nodes(&doc, w(1)), vec![n(-2), n(2), n(-1)]);
    }

    #[test]
    fn test_break_unshared_node_is_noop() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 3);
        add_road(&mut doc, data, 1, &[1, 2, 3], &[]);
        assert!(BreakRoads.run(&doc, &[n(2)]).unwrap().is_empty());
    }

    #[test]
    fn test_reverse_road() {
        let (mut doc, data) = document();
        add_nodes(&mut doc, data, 4);
        add_road(&mut doc, data, 1, &[1, 2, 3, 4], &[]);
        push(&mut doc, &ReverseRoads, &[w(1)]);
        assert_eq!(road_nodes(&doc, w(1)), vec![n(4), n(3), n(2), n(1)]);
    }

    #[test]
    fn test_joint_detection() {
        let ids = |xs: &[i64]| xs.iter().map(|x| n(*x)).collect::<Vec<_>>();
        assert_eq!(joint(&ids(&[1, 2]), &ids(&[2, 3])), Some(Joint::Append { reversed: false }));
        assert_eq!(joint(&ids(&[1, 2]), &ids(&[3, 2])), Some(Joint::Append { reversed: true }));
        assert_eq!(joint(&ids(&[1, 2]), &ids(&[3, 1])), Some(Joint::Prepend { reversed: false }));
        assert_eq!(joint(&ids(&[1, 2]), &ids(&[1, 3])), Some(Joint::Prepend { reversed: true }));
        assert_eq!(joint(&ids(&[1, 2]), &ids(&[2, 1])), None);
        assert_eq!(joint(&ids(&[1, 2]), &ids(&[3, 4])), None);
    }
}
