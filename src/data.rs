pub use self::feature::{BoundingBox, Coord, Feature, FeatureId, FeatureKind, FeatureType, Member, Node, Relation, Road, Tags};
pub use self::graph::FeatureGraph;
pub use self::layer::{Layer, LayerId};

pub mod feature;
pub mod graph;
pub mod layer;

/// Hands out fresh local ids for features a plan creates, below every id
/// already present in the graph.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    pub fn new(graph: &FeatureGraph) -> Self {
        IdAllocator { next: graph.next_local_number() }
    }

    pub fn allocate(&mut self) -> i64 {
        let number = self.next;
        self.next -= 1;
        number
    }
}
