//! Sparse block-hashed voxel grid.
//!
//! The grid is a hash map from block coordinate to a dense block of
//! `voxels_per_side³` voxels. Each voxel carries the persistent flags the
//! motion clustering reads (`occupied`, `ever_free`, `last_occupied`) and the
//! per-scan flags it writes (`dynamic`, `clustering_processed`).
//!
//! Occupancy and ever-free bookkeeping normally belongs to the mapping
//! front end; [`VoxelLayer::mark_occupied`] and [`VoxelLayer::mark_ever_free`]
//! are the hooks it uses.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::config::GridConfig;
use super::types::{BlockIndex, GridIndex, VoxelIndex, VoxelKey};

/// Offsets of the 26-connected neighbourhood.
const NEIGHBOR_OFFSETS: [[i32; 3]; 26] = {
    let mut offsets = [[0i32; 3]; 26];
    let mut n = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dx = -1;
            while dx <= 1 {
                if dx != 0 || dy != 0 || dz != 0 {
                    offsets[n] = [dx, dy, dz];
                    n += 1;
                }
                dx += 1;
            }
            dy += 1;
        }
        dz += 1;
    }
    offsets
};

/// State of a single voxel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Voxel {
    /// Received a return in the scan that last touched it.
    pub occupied: bool,
    /// Observed free at some point in the grid's history.
    pub ever_free: bool,
    /// Assigned to a motion cluster in the current scan.
    pub dynamic: bool,
    /// Visited by the current scan's clustering pass.
    pub clustering_processed: bool,
    /// Frame of the most recent occupancy update.
    pub last_occupied: Option<u64>,
}

impl Voxel {
    /// True when the voxel holds points of scan `frame`.
    #[inline]
    pub fn is_occupied_in(&self, frame: u64) -> bool {
        self.occupied && self.last_occupied == Some(frame)
    }

    /// True when the voxel may seed or propagate a cluster in scan `frame`.
    #[inline]
    pub fn can_grow_in(&self, frame: u64) -> bool {
        self.ever_free && self.is_occupied_in(frame)
    }
}

/// Dense cube of voxels.
#[derive(Debug, Clone)]
pub struct Block {
    voxels_per_side: usize,
    voxels: Vec<Voxel>,
}

impl Block {
    /// `voxels_per_side` is bounded by
    /// [`MAX_VOXELS_PER_SIDE`](crate::config::MAX_VOXELS_PER_SIDE) through
    /// [`GridConfig::validate`].
    pub fn new(voxels_per_side: usize) -> Self {
        Self {
            voxels_per_side,
            voxels: vec![Voxel::default(); voxels_per_side.pow(3)],
        }
    }

    /// Linear offset of a local voxel index, x fastest.
    #[inline]
    fn linear(&self, voxel: VoxelIndex) -> Option<usize> {
        let n = self.voxels_per_side as i32;
        let in_range = |c: i32| (0..n).contains(&c);
        if in_range(voxel.x) && in_range(voxel.y) && in_range(voxel.z) {
            let n = self.voxels_per_side;
            Some(voxel.x as usize + n * (voxel.y as usize + n * voxel.z as usize))
        } else {
            None
        }
    }

    #[inline]
    pub fn voxel(&self, voxel: VoxelIndex) -> Option<&Voxel> {
        self.linear(voxel).map(|i| &self.voxels[i])
    }

    #[inline]
    pub fn voxel_mut(&mut self, voxel: VoxelIndex) -> Option<&mut Voxel> {
        self.linear(voxel).map(move |i| &mut self.voxels[i])
    }

    fn reset_clustering_flags(&mut self) {
        for voxel in &mut self.voxels {
            voxel.clustering_processed = false;
            voxel.dynamic = false;
        }
    }
}

/// Sparse voxel grid addressed by [`VoxelKey`].
#[derive(Debug, Clone)]
pub struct VoxelLayer {
    inv_voxel_size: f32,
    voxels_per_side: usize,
    blocks: HashMap<BlockIndex, Block>,
}

impl VoxelLayer {
    /// Empty layer. `voxel_size` must be positive and `voxels_per_side` in
    /// `1..=MAX_VOXELS_PER_SIDE`, see [`GridConfig::validate`].
    pub fn new(voxel_size: f32, voxels_per_side: usize) -> Self {
        Self {
            inv_voxel_size: 1.0 / voxel_size,
            voxels_per_side,
            blocks: HashMap::new(),
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.voxel_size, config.voxels_per_side)
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Block at `index`, allocated on first access.
    pub fn allocate_block(&mut self, index: BlockIndex) -> &mut Block {
        let voxels_per_side = self.voxels_per_side;
        self.blocks
            .entry(index)
            .or_insert_with(|| Block::new(voxels_per_side))
    }

    /// Voxel at `key`, `None` if its block is not allocated.
    #[inline]
    pub fn voxel(&self, key: &VoxelKey) -> Option<&Voxel> {
        self.blocks.get(&key.block)?.voxel(key.voxel)
    }

    #[inline]
    pub fn voxel_mut(&mut self, key: &VoxelKey) -> Option<&mut Voxel> {
        self.blocks.get_mut(&key.block)?.voxel_mut(key.voxel)
    }

    /// Global voxel coordinate to key.
    fn key_from_global(&self, global: GridIndex) -> VoxelKey {
        let n = self.voxels_per_side as i32;
        VoxelKey::new(
            GridIndex::new(
                global.x.div_euclid(n),
                global.y.div_euclid(n),
                global.z.div_euclid(n),
            ),
            GridIndex::new(
                global.x.rem_euclid(n),
                global.y.rem_euclid(n),
                global.z.rem_euclid(n),
            ),
        )
    }

    /// Key to global voxel coordinate, `None` outside the `i32` range.
    fn global_from_key(&self, key: &VoxelKey) -> Option<GridIndex> {
        let n = self.voxels_per_side as i32;
        let axis = |block: i32, voxel: i32| block.checked_mul(n)?.checked_add(voxel);
        Some(GridIndex::new(
            axis(key.block.x, key.voxel.x)?,
            axis(key.block.y, key.voxel.y)?,
            axis(key.block.z, key.voxel.z)?,
        ))
    }

    /// Key of the voxel containing a world point.
    ///
    /// `None` when the point is not finite or its voxel coordinate does not
    /// fit in an `i32`.
    pub fn key_for_point(&self, point: [f32; 3]) -> Option<VoxelKey> {
        let axis = |c: f32| {
            let scaled = (f64::from(c) * f64::from(self.inv_voxel_size)).floor();
            (scaled >= f64::from(i32::MIN) && scaled <= f64::from(i32::MAX))
                .then_some(scaled as i32)
        };
        let global = GridIndex::new(axis(point[0])?, axis(point[1])?, axis(point[2])?);
        Some(self.key_from_global(global))
    }

    /// The 26 neighbours of `key`, wrapping into adjacent blocks at block
    /// faces. Neighbours are returned whether or not their block exists;
    /// those outside the addressable range are left out.
    pub fn neighbors(&self, key: &VoxelKey) -> Vec<VoxelKey> {
        let Some(center) = self.global_from_key(key) else {
            return Vec::new();
        };
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(|&[dx, dy, dz]| center.checked_offset(dx, dy, dz))
            .map(|global| self.key_from_global(global))
            .collect()
    }

    /// Record that `key` holds points of scan `frame`.
    pub fn mark_occupied(&mut self, key: &VoxelKey, frame: u64) {
        if let Some(voxel) = self.allocate_block(key.block).voxel_mut(key.voxel) {
            voxel.occupied = true;
            voxel.last_occupied = Some(frame);
        }
    }

    /// Record that `key` has been observed free.
    pub fn mark_ever_free(&mut self, key: &VoxelKey) {
        if let Some(voxel) = self.allocate_block(key.block).voxel_mut(key.voxel) {
            voxel.ever_free = true;
        }
    }

    /// Clear `dynamic` and `clustering_processed` on every voxel.
    pub fn reset_clustering_flags(&mut self) {
        self.blocks
            .par_iter_mut()
            .for_each(|(_, block)| block.reset_clustering_flags());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(b: [i32; 3], v: [i32; 3]) -> VoxelKey {
        VoxelKey::new(GridIndex::new(b[0], b[1], b[2]), GridIndex::new(v[0], v[1], v[2]))
    }

    #[test]
    fn test_neighbor_offsets_are_unique() {
        let set: HashSet<[i32; 3]> = NEIGHBOR_OFFSETS.iter().copied().collect();
        assert_eq!(set.len(), 26);
        assert!(!set.contains(&[0, 0, 0]));
    }

    #[test]
    fn test_key_for_point_handles_negative_coordinates() {
        let layer = VoxelLayer::new(0.5, 4);

        assert_eq!(layer.key_for_point([0.1, 0.1, 0.1]), Some(key([0, 0, 0], [0, 0, 0])));
        assert_eq!(layer.key_for_point([1.9, 0.0, 0.0]), Some(key([0, 0, 0], [3, 0, 0])));
        assert_eq!(layer.key_for_point([2.0, 0.0, 0.0]), Some(key([1, 0, 0], [0, 0, 0])));
        assert_eq!(layer.key_for_point([-0.1, 0.0, 0.0]), Some(key([-1, 0, 0], [3, 0, 0])));
    }

    #[test]
    fn test_key_for_point_rejects_unrepresentable_coordinates() {
        let layer = VoxelLayer::new(0.2, 16);
        assert_eq!(layer.key_for_point([1e30, 0.1, 0.1]), None);
        assert_eq!(layer.key_for_point([0.1, -5e29, 0.1]), None);
        assert_eq!(layer.key_for_point([0.1, 0.1, f32::NAN]), None);
        assert_eq!(layer.key_for_point([f32::INFINITY, 0.0, 0.0]), None);
        assert!(layer.key_for_point([1e5, -1e5, 0.0]).is_some());
    }

    #[test]
    fn test_neighbors_cross_block_boundaries() {
        let layer = VoxelLayer::new(1.0, 4);
        let corner = key([0, 0, 0], [0, 0, 0]);
        let neighbors = layer.neighbors(&corner);

        assert!(neighbors.contains(&key([-1, 0, 0], [3, 0, 0])));
        assert!(neighbors.contains(&key([-1, -1, -1], [3, 3, 3])));
        assert!(neighbors.contains(&key([0, 0, 0], [1, 1, 1])));
        assert!(!neighbors.contains(&corner));
    }

    #[test]
    fn test_neighbor_relation_is_symmetric() {
        let layer = VoxelLayer::new(1.0, 2);
        let a = key([0, 0, 0], [1, 1, 1]);
        for b in layer.neighbors(&a) {
            assert!(layer.neighbors(&b).contains(&a));
        }
    }

    #[test]
    fn test_neighbors_at_addressable_edge() {
        let layer = VoxelLayer::new(1.0, 4);
        let edge = layer.key_from_global(GridIndex::new(i32::MAX, 0, 0));
        let neighbors = layer.neighbors(&edge);

        // The nine neighbours at x + 1 do not exist.
        assert_eq!(neighbors.len(), 17);
        assert!(neighbors.contains(&layer.key_from_global(GridIndex::new(i32::MAX - 1, 0, 0))));

        let corner = layer.key_from_global(GridIndex::new(i32::MIN, i32::MIN, i32::MIN));
        assert_eq!(layer.neighbors(&corner).len(), 7);

        let unaddressable = key([i32::MAX, 0, 0], [0, 0, 0]);
        assert!(layer.neighbors(&unaddressable).is_empty());
    }

    #[test]
    fn test_voxel_access_requires_allocated_block() {
        let mut layer = VoxelLayer::new(1.0, 4);
        let k = key([0, 0, 0], [1, 2, 3]);
        assert!(layer.voxel(&k).is_none());

        layer.mark_occupied(&k, 3);
        let voxel = layer.voxel(&k).unwrap();
        assert!(voxel.is_occupied_in(3));
        assert!(!voxel.is_occupied_in(4));
        assert!(!voxel.can_grow_in(3));

        layer.mark_ever_free(&k);
        assert!(layer.voxel(&k).unwrap().can_grow_in(3));
        assert_eq!(layer.num_blocks(), 1);
    }

    #[test]
    fn test_out_of_range_local_index() {
        let mut layer = VoxelLayer::new(1.0, 4);
        layer.allocate_block(GridIndex::new(0, 0, 0));
        assert!(layer.voxel(&key([0, 0, 0], [4, 0, 0])).is_none());
        assert!(layer.voxel(&key([0, 0, 0], [-1, 0, 0])).is_none());
    }

    #[test]
    fn test_reset_clustering_flags() {
        let mut layer = VoxelLayer::new(1.0, 4);
        let a = key([0, 0, 0], [0, 0, 0]);
        let b = key([5, 0, 0], [1, 1, 1]);
        layer.mark_occupied(&a, 1);
        layer.mark_occupied(&b, 1);
        for k in [a, b] {
            let voxel = layer.voxel_mut(&k).unwrap();
            voxel.dynamic = true;
            voxel.clustering_processed = true;
        }

        layer.reset_clustering_flags();

        for k in [a, b] {
            let voxel = layer.voxel(&k).unwrap();
            assert!(!voxel.dynamic);
            assert!(!voxel.clustering_processed);
            assert!(voxel.is_occupied_in(1));
        }
    }
}
