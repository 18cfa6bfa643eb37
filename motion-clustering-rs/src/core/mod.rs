//! Core data types, the voxel grid and I/O.

pub mod grid;
pub mod loaders;
pub mod point_map;
pub mod types;
pub mod writers;

pub use grid::{Block, Voxel, VoxelLayer};
pub use loaders::{PointCloud, PreparedScan};
pub use point_map::{Block2PointMap, BlockwiseVoxelPointMap, ScanPointMap, VoxelPointMap};
pub use types::{
    BlockIndex, BoundingBox, CloudInfo, Cluster, Clusters, GridIndex, PointInfo, VoxelIndex,
    VoxelKey,
};
pub use writers::{write_cluster_summary_csv, write_labels_csv, WriteError};
