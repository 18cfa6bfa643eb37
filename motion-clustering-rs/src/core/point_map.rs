//! Two-level index from voxels to the scan points they contain.
//!
//! Points are first bucketed by block ([`Block2PointMap`]) and then, per
//! block, by local voxel index ([`BlockwiseVoxelPointMap`]). Resolving a
//! [`VoxelKey`] walks both levels.

use std::collections::HashMap;

use log::warn;

use super::grid::VoxelLayer;
use super::loaders::PointCloud;
use super::types::{BlockIndex, CloudInfo, VoxelIndex, VoxelKey};

/// Point indices per block for the current scan.
pub type Block2PointMap = HashMap<BlockIndex, Vec<usize>>;

/// Point indices per local voxel index, for one block.
pub type VoxelPointMap = HashMap<VoxelIndex, Vec<usize>>;

/// One [`VoxelPointMap`] per block that received points.
pub type BlockwiseVoxelPointMap = HashMap<BlockIndex, VoxelPointMap>;

/// Both levels of the point index for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPointMap {
    pub block2points: Block2PointMap,
    pub blockwise_voxel_points: BlockwiseVoxelPointMap,
}

impl ScanPointMap {
    /// Bucket every point of `cloud` into the grid geometry of `layer`.
    ///
    /// Returns the map together with fresh per-point metadata: every entry
    /// records its voxel and starts out non-dynamic. Keys are listed in order
    /// of first appearance in the cloud. Points with no representable voxel
    /// are left out of the map and keep `voxel: None`.
    pub fn build(cloud: &PointCloud, layer: &VoxelLayer) -> (Self, CloudInfo, Vec<VoxelKey>) {
        let mut map = Self::default();
        let mut info = CloudInfo::with_len(cloud.len());
        let mut keys = Vec::new();
        let mut skipped = 0usize;

        for (idx, point) in cloud.iter().enumerate() {
            let Some(key) = layer.key_for_point(point) else {
                skipped += 1;
                continue;
            };
            info.points[idx].voxel = Some(key);

            map.block2points.entry(key.block).or_default().push(idx);
            let voxel_points = map
                .blockwise_voxel_points
                .entry(key.block)
                .or_default()
                .entry(key.voxel)
                .or_default();
            if voxel_points.is_empty() {
                keys.push(key);
            }
            voxel_points.push(idx);
        }

        if skipped > 0 {
            warn!("Skipped {} points outside the addressable grid", skipped);
        }

        (map, info, keys)
    }

    /// Points inside `key`, empty if either level has no entry.
    pub fn points_in(&self, key: &VoxelKey) -> &[usize] {
        if !self.block2points.contains_key(&key.block) {
            return &[];
        }
        self.blockwise_voxel_points
            .get(&key.block)
            .and_then(|voxels| voxels.get(&key.voxel))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.block2points.len()
    }

    pub fn num_voxels(&self) -> usize {
        self.blockwise_voxel_points.values().map(HashMap::len).sum()
    }
}
