use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Deserialize;

use crate::errors::Error;

/// The three kinds of map element. Ids are unique per kind, as in OSM, so
/// the kind is part of every [`FeatureId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureType {
    Node,
    Road,
    Relation,
}

impl FeatureType {
    fn prefix(&self) -> char {
        match self {
            FeatureType::Node => 'n',
            FeatureType::Road => 'w',
            FeatureType::Relation => 'r',
        }
    }

    /// Element name used in OSM XML.
    pub fn osm_name(&self) -> &'static str {
        match self {
            FeatureType::Node => "node",
            FeatureType::Road => "way",
            FeatureType::Relation => "relation",
        }
    }

    pub fn from_osm_name(name: &str) -> Option<FeatureType> {
        match name {
            "node" => Some(FeatureType::Node),
            "way" => Some(FeatureType::Road),
            "relation" => Some(FeatureType::Relation),
            _ => None,
        }
    }
}

/// Negative numbers are local (never uploaded), positive ones come from the
/// server. Written as `n12`, `w-3`, `r7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct FeatureId {
    pub kind: FeatureType,
    pub number: i64,
}

impl FeatureId {
    pub fn new(kind: FeatureType, number: i64) -> Self {
        FeatureId { kind, number }
    }

    pub fn node(number: i64) -> Self {
        FeatureId::new(FeatureType::Node, number)
    }

    pub fn road(number: i64) -> Self {
        FeatureId::new(FeatureType::Road, number)
    }

    pub fn relation(number: i64) -> Self {
        FeatureId::new(FeatureType::Relation, number)
    }

    pub fn is_local(&self) -> bool {
        self.number < 0
    }

    pub fn is_node(&self) -> bool {
        self.kind == FeatureType::Node
    }

    pub fn is_road(&self) -> bool {
        self.kind == FeatureType::Road
    }

    pub fn is_relation(&self) -> bool {
        self.kind == FeatureType::Relation
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.number)
    }
}

impl FromStr for FeatureId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = match chars.next() {
            Some('n') => FeatureType::Node,
            Some('w') => FeatureType::Road,
            Some('r') => FeatureType::Relation,
            _ => return Err(format!("Feature id '{}' must start with n, w or r", s).into()),
        };
        Ok(FeatureId::new(kind, chars.as_str().parse()?))
    }
}

impl TryFrom<String> for FeatureId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coord { lat, lon }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Coord,
    pub max: Coord,
}

impl BoundingBox {
    pub fn around(coord: Coord) -> Self {
        BoundingBox { min: coord, max: coord }
    }

    pub fn extend(&mut self, coord: Coord) {
        self.min.lat = self.min.lat.min(coord.lat);
        self.min.lon = self.min.lon.min(coord.lon);
        self.max.lat = self.max.lat.max(coord.lat);
        self.max.lon = self.max.lon.max(coord.lon);
    }

    pub fn union(&mut self, other: &BoundingBox) {
        self.extend(other.min);
        self.extend(other.max);
    }
}

/// Tag dictionary. Keys are unique and their order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Tags::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Tags(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub coord: Coord,
}

/// Ordered node references; the order gives both geometry and direction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Road {
    pub nodes: Vec<FeatureId>,
}

impl Road {
    pub fn first(&self) -> Option<FeatureId> {
        self.nodes.first().copied()
    }

    pub fn last(&self) -> Option<FeatureId> {
        self.nodes.last().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.nodes.len() > 2 && self.first() == self.last()
    }

    pub fn contains(&self, node: FeatureId) -> bool {
        self.nodes.contains(&node)
    }

    /// Positions other than the two ends.
    pub fn is_interior(&self, node: FeatureId) -> bool {
        self.nodes.len() > 2 && self.nodes[1..self.nodes.len() - 1].contains(&node)
    }

    pub fn positions_of(&self, node: FeatureId) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == node)
            .map(|(pos, _)| pos)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub role: String,
    pub feature: FeatureId,
}

impl Member {
    pub fn new(role: impl Into<String>, feature: FeatureId) -> Self {
        Member { role: role.into(), feature }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relation {
    pub members: Vec<Member>,
}

impl Relation {
    pub fn positions_of(&self, feature: FeatureId) -> Vec<usize> {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.feature == feature)
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn has_member(&self, role: &str, feature: FeatureId) -> bool {
        self.members.iter().any(|m| m.feature == feature && m.role == role)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureKind {
    Node(Node),
    Road(Road),
    Relation(Relation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub tags: Tags,
    pub kind: FeatureKind,
}

impl Feature {
    pub fn node(number: i64, coord: Coord) -> Self {
        Feature {
            id: FeatureId::node(number),
            tags: Tags::new(),
            kind: FeatureKind::Node(Node { coord }),
        }
    }

    pub fn road(number: i64, nodes: Vec<FeatureId>) -> Self {
        Feature {
            id: FeatureId::road(number),
            tags: Tags::new(),
            kind: FeatureKind::Road(Road { nodes }),
        }
    }

    pub fn relation(number: i64, members: Vec<Member>) -> Self {
        Feature {
            id: FeatureId::relation(number),
            tags: Tags::new(),
            kind: FeatureKind::Relation(Relation { members }),
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn as_node(&self) -> Option<&Node> {
        match &self.kind {
            FeatureKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_road(&self) -> Option<&Road> {
        match &self.kind {
            FeatureKind::Road(road) => Some(road),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match &self.kind {
            FeatureKind::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match &mut self.kind {
            FeatureKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_road_mut(&mut self) -> Option<&mut Road> {
        match &mut self.kind {
            FeatureKind::Road(road) => Some(road),
            _ => None,
        }
    }

    pub fn as_relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.kind {
            FeatureKind::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// Features this one points at, once per reference.
    pub fn children(&self) -> Vec<FeatureId> {
        match &self.kind {
            FeatureKind::Node(_) => Vec::new(),
            FeatureKind::Road(road) => road.nodes.clone(),
            FeatureKind::Relation(relation) => relation.members.iter().map(|m| m.feature).collect(),
        }
    }

    /// `name` tag if present, otherwise the id.
    pub fn description(&self) -> String {
        match self.tags.get("name") {
            Some(name) => name.to_string(),
            None => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_id_parse_and_display() {
        let id: FeatureId = "w-12".parse().unwrap();
        assert_eq!(id, FeatureId::road(-12));
        assert!(id.is_local());
        assert_eq!(id.to_string(), "w-12");
        assert_eq!(FeatureId::node(7).to_string(), "n7");
    }

    #[test]
    fn test_feature_id_rejects_unknown_prefix() {
        assert!("x5".parse::<FeatureId>().is_err());
        assert!("n".parse::<FeatureId>().is_err());
    }

    #[test]
    fn test_feature_id_deserializes_from_string() {
        let ids: Vec<FeatureId> = serde_json::from_str(r#"["n1", "r-2"]"#).unwrap();
        assert_eq!(ids, vec![FeatureId::node(1), FeatureId::relation(-2)]);
    }

    #[test]
    fn test_downcasts() {
        let road = Feature::road(1, vec![FeatureId::node(1), FeatureId::node(2)]);
        assert!(road.as_road().is_some());
        assert!(road.as_node().is_none());
        assert!(road.as_relation().is_none());
        assert_eq!(road.children().len(), 2);
    }

    #[test]
    fn test_road_interior_and_closed() {
        let n = FeatureId::node;
        let road = Road { nodes: vec![n(1), n(2), n(3), n(1)] };
        assert!(road.is_closed());
        assert!(road.is_interior(n(2)));
        assert!(!road.is_interior(n(1)));
        assert_eq!(road.positions_of(n(1)), vec![0, 3]);
    }

    #[test]
    fn test_bounding_box_extend() {
        let mut bbox = BoundingBox::around(Coord::new(1.0, 1.0));
        bbox.extend(Coord::new(-1.0, 3.0));
        assert_eq!(bbox.min, Coord::new(-1.0, 1.0));
        assert_eq!(bbox.max, Coord::new(1.0, 3.0));
    }
}
