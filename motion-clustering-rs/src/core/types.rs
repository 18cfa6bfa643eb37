//! Shared index, per-point metadata and cluster types.

use std::fmt;

/// Integer 3D index used both for block coordinates and for voxel
/// coordinates local to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GridIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridIndex {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Shifted index, `None` if any component leaves the `i32` range.
    #[inline]
    pub fn checked_offset(self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }
}

impl fmt::Display for GridIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Coordinate of a block in the sparse grid.
pub type BlockIndex = GridIndex;

/// Coordinate of a voxel inside its block, each component in `0..voxels_per_side`.
pub type VoxelIndex = GridIndex;

/// Global address of a voxel: the block it lives in plus its local index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelKey {
    pub block: BlockIndex,
    pub voxel: VoxelIndex,
}

impl VoxelKey {
    #[inline]
    pub const fn new(block: BlockIndex, voxel: VoxelIndex) -> Self {
        Self { block, voxel }
    }
}

impl fmt::Display for VoxelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.voxel)
    }
}

/// Per-point metadata, parallel to the scan's point cloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointInfo {
    /// Point belongs to a surviving dynamic cluster.
    pub dynamic: bool,
    /// Voxel the point fell into, if it was bucketed.
    pub voxel: Option<VoxelKey>,
}

/// Metadata for every point of a scan, index-aligned with the cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudInfo {
    pub points: Vec<PointInfo>,
}

impl CloudInfo {
    /// Metadata for `len` points, none dynamic and none bucketed.
    pub fn with_len(len: usize) -> Self {
        Self {
            points: vec![PointInfo::default(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indices of all points currently flagged dynamic.
    pub fn dynamic_indices(&self) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, info)| info.dynamic)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Box that contains nothing; extending it with a point yields that point.
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn extend(&mut self, point: [f32; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    /// Edge lengths, zero for an empty box.
    pub fn extent(&self) -> [f32; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// A group of scan points induced from one voxel cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Index of the voxel cluster this cluster was induced from.
    pub id: usize,
    /// Indices into the scan's point cloud, unique within the cluster.
    pub points: Vec<usize>,
    /// Voxels the cluster was grown over.
    pub voxels: Vec<VoxelKey>,
    /// Bounds of `points`.
    pub aabb: BoundingBox,
}

impl Cluster {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            points: Vec::new(),
            voxels: Vec::new(),
            aabb: BoundingBox::empty(),
        }
    }

    /// Number of points; this is the size the cluster filter checks.
    #[inline]
    pub fn size(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub type Clusters = Vec<Cluster>;

/// Per-point cluster labels (`-1` for points in no cluster).
pub fn cluster_labels(num_points: usize, clusters: &[Cluster]) -> Vec<i32> {
    let mut labels = vec![-1i32; num_points];
    for cluster in clusters {
        for &idx in &cluster.points {
            if let Some(label) = labels.get_mut(idx) {
                *label = cluster.id as i32;
            }
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_voxel_key_equality_needs_both_parts() {
        let a = VoxelKey::new(GridIndex::new(0, 0, 0), GridIndex::new(1, 2, 3));
        let b = VoxelKey::new(GridIndex::new(0, 0, 1), GridIndex::new(1, 2, 3));
        let c = VoxelKey::new(GridIndex::new(0, 0, 0), GridIndex::new(1, 2, 3));

        assert_ne!(a, b);
        assert_eq!(a, c);

        let set: HashSet<VoxelKey> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_checked_offset() {
        let idx = GridIndex::new(1, -2, 3);
        assert_eq!(idx.checked_offset(-1, 1, 0), Some(GridIndex::new(0, -1, 3)));
        assert_eq!(GridIndex::new(i32::MAX, 0, 0).checked_offset(1, 0, 0), None);
        assert_eq!(GridIndex::new(0, 0, i32::MIN).checked_offset(0, 0, -1), None);
    }

    #[test]
    fn test_bounding_box() {
        let mut aabb = BoundingBox::empty();
        assert!(aabb.is_empty());
        assert_eq!(aabb.extent(), [0.0; 3]);

        aabb.extend([1.0, 2.0, 3.0]);
        aabb.extend([-1.0, 4.0, 3.0]);
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, [-1.0, 2.0, 3.0]);
        assert_eq!(aabb.max, [1.0, 4.0, 3.0]);
        assert_eq!(aabb.extent(), [2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_cloud_info_dynamic_indices() {
        let mut info = CloudInfo::with_len(4);
        info.points[1].dynamic = true;
        info.points[3].dynamic = true;
        assert_eq!(info.dynamic_indices(), vec![1, 3]);
    }

    #[test]
    fn test_cluster_labels() {
        let mut a = Cluster::new(0);
        a.points = vec![0, 2];
        let mut b = Cluster::new(3);
        b.points = vec![1, 9];

        let labels = cluster_labels(4, &[a, b]);
        assert_eq!(labels, vec![0, 3, 0, -1]);
    }
}
