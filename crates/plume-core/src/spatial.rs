use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

/// A stationary CO2 source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub position_x: f64,
    pub position_y: f64,
    /// Emission rate, deposited onto the grid every unit of time.
    pub source_strength: f64,
}

impl Host {
    pub fn new(position_x: f64, position_y: f64, source_strength: f64) -> Self {
        Self {
            position_x,
            position_y,
            source_strength,
        }
    }

    pub fn position(&self) -> [f64; 2] {
        [self.position_x, self.position_y]
    }
}

/// Position-only record for spatial indexing.
#[derive(Clone, Debug)]
pub struct HostLocation {
    pub id: u32,
    pub position: [f64; 2],
}

impl RTreeObject for HostLocation {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Build an R*-tree from host positions via bulk_load (O(n log n)).
pub fn build_index(hosts: &[Host]) -> RTree<HostLocation> {
    let locations: Vec<HostLocation> = hosts
        .iter()
        .enumerate()
        .map(|(id, h)| HostLocation {
            id: id as u32,
            position: h.position(),
        })
        .collect();
    RTree::bulk_load(locations)
}

/// Closest host within `radius` of `center`, as an index into the host list.
/// Uses AABB envelope query then filters by Euclidean distance.
pub fn host_within(tree: &RTree<HostLocation>, center: [f64; 2], radius: f64) -> Option<u32> {
    let envelope = AABB::from_corners(
        [center[0] - radius, center[1] - radius],
        [center[0] + radius, center[1] + radius],
    );
    let r_sq = radius * radius;

    tree.locate_in_envelope(&envelope)
        .map(|loc| {
            let dx = loc.position[0] - center[0];
            let dy = loc.position[1] - center[1];
            (loc.id, dx * dx + dy * dy)
        })
        .filter(|&(_, d_sq)| d_sq <= r_sq)
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(id, _)| id)
}
