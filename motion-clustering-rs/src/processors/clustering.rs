//! Clustering of dynamic voxels into moving objects.
//!
//! A voxel that is occupied in the current scan but was observed free at some
//! point before is evidence of motion. Starting from such seed voxels, the
//! clustering:
//!
//! 1. grows voxel clusters with a worklist flood fill over the 26-neighbourhood.
//!    Any unvisited neighbour occupied this scan joins the cluster, but only
//!    ever-free neighbours keep the fill going;
//! 2. induces point clusters by resolving every voxel to the scan points it
//!    contains (parallelized with `rayon`, the voxel clusters are disjoint);
//! 3. drops clusters whose point count is outside the configured bounds;
//! 4. flags every point of a surviving cluster as dynamic.
//!
//! # Example
//!
//! ```no_run
//! use motion_clustering::config::ClusteringConfig;
//! use motion_clustering::core::grid::VoxelLayer;
//! use motion_clustering::core::loaders::PointCloud;
//! use motion_clustering::processors::clustering::Clustering;
//! use motion_clustering::processors::scan::prepare_scan;
//!
//! let cloud = PointCloud::from_points(&[[0.1, 0.1, 0.1], [0.3, 0.1, 0.1]]);
//! let mut layer = VoxelLayer::new(0.2, 16);
//! let mut scan = prepare_scan(&mut layer, &cloud, &[true, true], 1);
//!
//! let clustering = Clustering::new(ClusteringConfig::default()).unwrap();
//! let clusters = clustering.perform_clustering(
//!     &mut layer,
//!     &scan.point_map,
//!     &scan.seeds,
//!     &cloud,
//!     &mut scan.cloud_info,
//!     1,
//! );
//! ```

use std::collections::VecDeque;

use log::{debug, trace};
use rayon::prelude::*;

use crate::config::{ClusteringConfig, ConfigError};
use crate::core::grid::VoxelLayer;
use crate::core::loaders::PointCloud;
use crate::core::point_map::ScanPointMap;
use crate::core::types::{Cluster, Clusters, CloudInfo, VoxelKey};

/// Voxel keys of one voxel-level cluster, in visiting order.
pub type ClusterIndices = Vec<VoxelKey>;

/// Voxel and point clustering of dynamic voxels.
///
/// The engine holds only its configuration. The voxel grid is passed in
/// mutably for each pass, so one pass at a time writes the per-voxel
/// `clustering_processed` and `dynamic` flags.
#[derive(Debug, Clone)]
pub struct Clustering {
    config: ClusteringConfig,
}

impl Clustering {
    /// Create the engine, rejecting invalid size bounds.
    pub fn new(config: ClusteringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run every clustering step for one scan.
    ///
    /// Clears the grid's per-scan flags, grows voxel clusters from
    /// `seeds`, induces point clusters, filters them by size and flags their
    /// points dynamic in `cloud_info`. Returns the surviving clusters.
    ///
    /// Seeds or voxels that cannot be resolved in the grid or the point maps
    /// contribute nothing; this never fails.
    pub fn perform_clustering(
        &self,
        layer: &mut VoxelLayer,
        point_map: &ScanPointMap,
        seeds: &[VoxelKey],
        cloud: &PointCloud,
        cloud_info: &mut CloudInfo,
        frame_counter: u64,
    ) -> Clusters {
        layer.reset_clustering_flags();

        let voxel_clusters = self.voxel_clustering(layer, seeds, frame_counter);
        let mut clusters = self.induce_point_clusters(point_map, cloud, &voxel_clusters);
        let num_candidates = clusters.len();

        self.apply_cluster_level_filters(&mut clusters);
        self.set_cluster_level_dynamic_flag_of_all_points(&clusters, cloud_info);

        debug!(
            "frame {}: {} seeds, {} voxel clusters, {} candidates, {} kept",
            frame_counter,
            seeds.len(),
            voxel_clusters.len(),
            num_candidates,
            clusters.len()
        );

        clusters
    }

    /// Group seed voxels, and whatever they reach, into voxel clusters.
    ///
    /// Seeds are visited in order. A seed already absorbed by an earlier
    /// cluster, or one that is not occupied and ever-free in
    /// `frame_counter`, starts no cluster.
    pub fn voxel_clustering(
        &self,
        layer: &mut VoxelLayer,
        seeds: &[VoxelKey],
        frame_counter: u64,
    ) -> Vec<ClusterIndices> {
        let mut clusters = Vec::new();

        for seed in seeds {
            match layer.voxel(seed) {
                Some(voxel) if voxel.clustering_processed => continue,
                Some(voxel) if voxel.can_grow_in(frame_counter) => {}
                _ => {
                    trace!("skipping invalid seed {}", seed);
                    continue;
                }
            }
            clusters.push(self.grow_cluster(layer, seed, frame_counter));
        }

        clusters
    }

    /// Flood fill one cluster from `seed`.
    ///
    /// Every unprocessed neighbour occupied in `frame_counter` is added to
    /// the cluster and marked processed and dynamic. Only neighbours that are
    /// also ever-free are expanded further. The seed itself is always part of
    /// the result, even if nothing around it qualifies.
    pub fn grow_cluster(
        &self,
        layer: &mut VoxelLayer,
        seed: &VoxelKey,
        frame_counter: u64,
    ) -> ClusterIndices {
        let mut cluster = ClusterIndices::new();
        let Some(voxel) = layer.voxel_mut(seed) else {
            return cluster;
        };
        voxel.clustering_processed = true;
        voxel.dynamic = true;
        cluster.push(*seed);

        let mut frontier = VecDeque::from([*seed]);
        while let Some(key) = frontier.pop_front() {
            for neighbor in layer.neighbors(&key) {
                let Some(voxel) = layer.voxel_mut(&neighbor) else {
                    continue;
                };
                if voxel.clustering_processed || !voxel.is_occupied_in(frame_counter) {
                    continue;
                }

                voxel.clustering_processed = true;
                voxel.dynamic = true;
                cluster.push(neighbor);

                if voxel.ever_free {
                    frontier.push_back(neighbor);
                }
            }
        }

        cluster
    }

    /// Resolve voxel clusters into point clusters.
    ///
    /// The cluster id is the index of its voxel cluster. Voxels without points
    /// in this scan contribute nothing, so a cluster may come out empty.
    pub fn induce_point_clusters(
        &self,
        point_map: &ScanPointMap,
        cloud: &PointCloud,
        voxel_clusters: &[ClusterIndices],
    ) -> Clusters {
        voxel_clusters
            .par_iter()
            .enumerate()
            .map(|(id, voxels)| {
                let mut cluster = Cluster::new(id);
                cluster.voxels = voxels.clone();

                for key in voxels {
                    for &idx in point_map.points_in(key) {
                        match cloud.point(idx) {
                            Some(point) => {
                                cluster.aabb.extend(point);
                                cluster.points.push(idx);
                            }
                            None => trace!("voxel {} lists unknown point {}", key, idx),
                        }
                    }
                }

                cluster
            })
            .collect()
    }

    /// Remove clusters with fewer than `min_cluster_size` or more than
    /// `max_cluster_size` points. Both bounds are inclusive.
    pub fn apply_cluster_level_filters(&self, candidates: &mut Clusters) {
        let ClusteringConfig {
            min_cluster_size,
            max_cluster_size,
        } = self.config;
        candidates.retain(|cluster| (min_cluster_size..=max_cluster_size).contains(&cluster.size()));
    }

    /// Flag every point of every cluster as dynamic. Other points keep their flag.
    pub fn set_cluster_level_dynamic_flag_of_all_points(
        &self,
        clusters: &[Cluster],
        cloud_info: &mut CloudInfo,
    ) {
        for cluster in clusters {
            for &idx in &cluster.points {
                if let Some(info) = cloud_info.points.get_mut(idx) {
                    info.dynamic = true;
                }
            }
        }
    }
}
