use crate::{AssetPlacement, FeatureId, Rectangle};
use rstar::{primitives::GeomWithData, RTree, AABB};

type IndexEntry = GeomWithData<[f64; 2], FeatureId>;

/// R-tree over placement positions in radians. Built once from the full
/// data set; membership never changes afterwards, only scene residency does.
#[derive(Debug, Default)]
pub struct PlacementIndex {
    tree: RTree<IndexEntry>,
}

impl PlacementIndex {
    pub fn build(placements: &[AssetPlacement]) -> Self {
        let entries = placements
            .iter()
            .map(|p| IndexEntry::new([p.longitude, p.latitude], p.fid))
            .collect();
        PlacementIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Every feature whose position falls inside `bounds`. An empty result
    /// is an ordinary answer, not a failure.
    pub fn query(&self, bounds: &Rectangle) -> Vec<FeatureId> {
        let envelope = AABB::from_corners([bounds.west, bounds.south], [bounds.east, bounds.north]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect()
    }
}
