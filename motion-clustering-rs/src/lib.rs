//! Clustering of moving objects in lidar scans over a sparse voxel grid.
//!
//! Voxels that were once observed free but hold points now are evidence of
//! motion. This crate provides:
//! - A block-hashed voxel grid with persistent ever-free bookkeeping
//! - Two-level voxel → point indexing of a scan
//! - Flood-fill voxel clustering seeded at occupied ever-free voxels
//! - Point cluster induction, size filtering and per-point dynamic flags
//!
//! # Example
//!
//! ```no_run
//! use motion_clustering::{processors::scan::process_scan_file, PipelineConfig};
//! use std::path::Path;
//!
//! let report = process_scan_file(Path::new("scan.csv"), None, &PipelineConfig::default()).unwrap();
//! println!("{} dynamic clusters", report.clusters.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{ClusteringConfig, ConfigError, GridConfig, PipelineConfig};
pub use crate::core::{CloudInfo, Cluster, Clusters, PointCloud, VoxelKey, VoxelLayer};
pub use processors::Clustering;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
