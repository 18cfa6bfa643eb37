//! Scan preparation and end-to-end processing of scan files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::config::PipelineConfig;
use crate::core::grid::VoxelLayer;
use crate::core::loaders::{load_scan_csv, PointCloud};
use crate::core::point_map::ScanPointMap;
use crate::core::types::{cluster_labels, CloudInfo, Clusters, VoxelKey};
use crate::core::writers::{write_cluster_summary_csv, write_labels_csv};
use super::clustering::Clustering;

/// Everything the clustering needs to know about one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanInput {
    pub point_map: ScanPointMap,
    pub cloud_info: CloudInfo,
    /// Occupied ever-free voxels of this scan, in order of first point.
    pub seeds: Vec<VoxelKey>,
}

/// Integrate a scan into `layer` and collect clustering seeds.
///
/// Every voxel holding a point is marked occupied in `frame`; a voxel is
/// marked ever-free when any of its points carries the ever-free hint.
/// `ever_free` shorter than the cloud counts missing entries as `false`.
/// Points too far out to be addressed by the grid are skipped.
pub fn prepare_scan(
    layer: &mut VoxelLayer,
    cloud: &PointCloud,
    ever_free: &[bool],
    frame: u64,
) -> ScanInput {
    let (point_map, cloud_info, keys) = ScanPointMap::build(cloud, layer);

    for key in &keys {
        layer.mark_occupied(key, frame);
    }
    for (info, _) in cloud_info
        .points
        .iter()
        .zip(ever_free)
        .filter(|(_, free)| **free)
    {
        if let Some(key) = info.voxel {
            layer.mark_ever_free(&key);
        }
    }

    let seeds: Vec<VoxelKey> = keys
        .into_iter()
        .filter(|key| layer.voxel(key).is_some_and(|v| v.can_grow_in(frame)))
        .collect();

    debug!(
        "frame {}: {} points in {} voxels / {} blocks, {} seeds, {} blocks allocated",
        frame,
        cloud.len(),
        point_map.num_voxels(),
        point_map.num_blocks(),
        seeds.len(),
        layer.num_blocks()
    );

    ScanInput {
        point_map,
        cloud_info,
        seeds,
    }
}

/// Result of clustering one scan file.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub labels_path: PathBuf,
    pub summary_path: PathBuf,
    pub num_points: usize,
    pub num_seeds: usize,
    pub clusters: Clusters,
    pub cloud_info: CloudInfo,
}

impl ScanReport {
    /// Points flagged dynamic.
    pub fn num_dynamic_points(&self) -> usize {
        self.cloud_info.points.iter().filter(|p| p.dynamic).count()
    }
}

/// Load a prepared scan CSV, cluster it as frame 1 of a fresh grid and write
/// `<stem>_labels.csv` and `<stem>_clusters.csv`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, or if loading or
/// writing fails.
pub fn process_scan_file(
    scan_path: &Path,
    output_dir: Option<&Path>,
    config: &PipelineConfig,
) -> Result<ScanReport> {
    const FRAME: u64 = 1;

    config.validate().context("invalid configuration")?;
    let clustering = Clustering::new(config.clustering.clone())?;

    let scan = load_scan_csv(scan_path)
        .with_context(|| format!("failed to load scan {}", scan_path.display()))?;
    let file_name = scan_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    info!("{}: {} points", file_name, scan.cloud.len());

    let mut layer = VoxelLayer::from_config(&config.grid);
    let mut input = prepare_scan(&mut layer, &scan.cloud, &scan.ever_free, FRAME);

    let clusters = clustering.perform_clustering(
        &mut layer,
        &input.point_map,
        &input.seeds,
        &scan.cloud,
        &mut input.cloud_info,
        FRAME,
    );
    info!("{}: {} dynamic clusters", file_name, clusters.len());

    let out_dir = output_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| scan_path.parent().unwrap_or(Path::new(".")).to_path_buf());
    let stem = scan_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scan");
    let labels_path = out_dir.join(format!("{}_labels.csv", stem));
    let summary_path = out_dir.join(format!("{}_clusters.csv", stem));

    let labels = cluster_labels(scan.cloud.len(), &clusters);
    write_labels_csv(&labels_path, &scan.cloud, &labels)?;
    write_cluster_summary_csv(&summary_path, &clusters)?;
    info!("Labels CSV -> {}", labels_path.display());

    Ok(ScanReport {
        labels_path,
        summary_path,
        num_points: scan.cloud.len(),
        num_seeds: input.seeds.len(),
        clusters,
        cloud_info: input.cloud_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusteringConfig;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_prepare_scan_collects_seeds() {
        let mut layer = VoxelLayer::new(1.0, 4);
        let cloud = PointCloud::from_points(&[
            [0.5, 0.5, 0.5],
            [0.7, 0.5, 0.5],
            [1.5, 0.5, 0.5],
            [3.5, 3.5, 3.5],
        ]);

        let input = prepare_scan(&mut layer, &cloud, &[false, true, false, true], 9);

        let first = layer.key_for_point([0.5, 0.5, 0.5]).unwrap();
        let last = layer.key_for_point([3.5, 3.5, 3.5]).unwrap();
        assert_eq!(input.seeds, vec![first, last]);
        assert_eq!(input.cloud_info.len(), 4);

        let plain = layer.key_for_point([1.5, 0.5, 0.5]).unwrap();
        let voxel = layer.voxel(&plain).unwrap();
        assert!(voxel.is_occupied_in(9));
        assert!(!voxel.ever_free);
    }

    #[test]
    fn test_prepare_scan_short_hint_slice() {
        let mut layer = VoxelLayer::new(1.0, 4);
        let cloud = PointCloud::from_points(&[[0.5, 0.5, 0.5], [2.5, 2.5, 2.5]]);

        let input = prepare_scan(&mut layer, &cloud, &[true], 1);

        assert_eq!(input.seeds.len(), 1);
    }

    #[test]
    fn test_prepare_then_cluster_across_frames() {
        let mut layer = VoxelLayer::new(1.0, 4);
        let engine = Clustering::new(ClusteringConfig {
            min_cluster_size: 1,
            max_cluster_size: 10,
        })
        .unwrap();

        let first = PointCloud::from_points(&[[0.5, 0.5, 0.5], [1.5, 0.5, 0.5]]);
        let mut input = prepare_scan(&mut layer, &first, &[true, true], 1);
        let clusters = engine.perform_clustering(
            &mut layer,
            &input.point_map,
            &input.seeds,
            &first,
            &mut input.cloud_info,
            1,
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size(), 2);

        // Second scan only revisits the first voxel; the neighbour is stale.
        let second = PointCloud::from_points(&[[0.5, 0.5, 0.5]]);
        let mut input = prepare_scan(&mut layer, &second, &[false], 2);
        let clusters = engine.perform_clustering(
            &mut layer,
            &input.point_map,
            &input.seeds,
            &second,
            &mut input.cloud_info,
            2,
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].voxels.len(), 1);
        assert_eq!(clusters[0].points, vec![0]);
    }

    #[test]
    fn test_process_scan_file() {
        let dir = tempdir().unwrap();
        let scan_path = dir.path().join("scan.csv");
        let mut file = fs::File::create(&scan_path).unwrap();
        writeln!(file, "x,y,z,ever_free").unwrap();
        for x in ["0.1", "0.3", "0.5", "0.7", "0.9"] {
            writeln!(file, "{},0.1,0.1,1", x).unwrap();
        }
        writeln!(file, "10.0,10.0,10.0,1").unwrap();
        writeln!(file, "-5.0,0.0,0.0,0").unwrap();
        drop(file);

        let mut config = PipelineConfig::default();
        config.clustering.min_cluster_size = 3;
        let out_dir = dir.path().join("out");

        let report = process_scan_file(&scan_path, Some(&out_dir), &config).unwrap();

        assert_eq!(report.num_points, 7);
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].size(), 5);
        assert_eq!(report.num_dynamic_points(), 5);
        assert_eq!(report.labels_path, out_dir.join("scan_labels.csv"));

        let labels = fs::read_to_string(&report.labels_path).unwrap();
        let lines: Vec<&str> = labels.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[6].ends_with(",-1"));
        assert!(lines[7].ends_with(",-1"));

        let summary = fs::read_to_string(&report.summary_path).unwrap();
        assert_eq!(summary.lines().count(), 2);
    }

    #[test]
    fn test_process_scan_file_skips_far_points() {
        let dir = tempdir().unwrap();
        let scan_path = dir.path().join("far.csv");
        let mut file = fs::File::create(&scan_path).unwrap();
        writeln!(file, "x,y,z,ever_free").unwrap();
        writeln!(file, "1e30,0.1,0.1,1").unwrap();
        for x in ["0.1", "0.3", "0.5"] {
            writeln!(file, "{},0.1,0.1,1", x).unwrap();
        }
        writeln!(file, "5e29,0.1,0.1,1").unwrap();
        writeln!(file, "0.1,-1e30,0.1,1").unwrap();
        drop(file);

        let mut config = PipelineConfig::default();
        config.clustering.min_cluster_size = 1;

        let report = process_scan_file(&scan_path, None, &config).unwrap();

        assert_eq!(report.num_points, 6);
        assert_eq!(report.num_seeds, 3);
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].points, vec![1, 2, 3]);
        for idx in [0, 4, 5] {
            let info = report.cloud_info.points[idx];
            assert!(info.voxel.is_none());
            assert!(!info.dynamic);
        }

        let labels = fs::read_to_string(&report.labels_path).unwrap();
        let lines: Vec<&str> = labels.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[1].ends_with(",-1"));
        assert!(lines[2].ends_with(",0"));
        assert!(lines[5].ends_with(",-1"));
    }

    #[test]
    fn test_process_scan_file_rejects_bad_config() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.clustering.max_cluster_size = 1;

        let result = process_scan_file(&dir.path().join("missing.csv"), None, &config);
        assert!(result.is_err());
    }
}
