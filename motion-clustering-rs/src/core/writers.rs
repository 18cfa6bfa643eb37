//! CSV writers for clustering results.
//!
//! - Per-point labels: `x,y,z,label` with the cluster id or `-1`
//! - Per-cluster summary: id, point and voxel counts, bounding box and its size

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::loaders::PointCloud;
use super::types::Cluster;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("length mismatch: cloud has {points} points, labels has {labels} entries")]
    LengthMismatch { points: usize, labels: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Opens a CSV writer on `path`, creating parent directories.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn write_rows<I, R>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })
}

/// Write per-point cluster labels to CSV.
///
/// # Errors
///
/// Returns an error if `cloud` and `labels` differ in length, or if the
/// file cannot be created or written.
///
/// # Example
///
/// ```no_run
/// use motion_clustering::core::loaders::PointCloud;
/// use motion_clustering::core::writers::write_labels_csv;
/// use std::path::Path;
///
/// let cloud = PointCloud::from_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
/// write_labels_csv(Path::new("labels.csv"), &cloud, &[0, -1]).unwrap();
/// ```
pub fn write_labels_csv(path: &Path, cloud: &PointCloud, labels: &[i32]) -> Result<()> {
    if cloud.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            points: cloud.len(),
            labels: labels.len(),
        });
    }

    let rows = cloud.iter().zip(labels).map(|(p, label)| {
        [
            format!("{:.6}", p[0]),
            format!("{:.6}", p[1]),
            format!("{:.6}", p[2]),
            label.to_string(),
        ]
    });
    write_rows(path, &["x", "y", "z", "label"], rows)
}

/// Write one summary row per cluster.
pub fn write_cluster_summary_csv(path: &Path, clusters: &[Cluster]) -> Result<()> {
    let rows = clusters.iter().map(|c| {
        let size = c.aabb.extent();
        [
            c.id.to_string(),
            c.size().to_string(),
            c.voxels.len().to_string(),
            format!("{:.6}", c.aabb.min[0]),
            format!("{:.6}", c.aabb.min[1]),
            format!("{:.6}", c.aabb.min[2]),
            format!("{:.6}", c.aabb.max[0]),
            format!("{:.6}", c.aabb.max[1]),
            format!("{:.6}", c.aabb.max[2]),
            format!("{:.6}", size[0]),
            format!("{:.6}", size[1]),
            format!("{:.6}", size[2]),
        ]
    });
    write_rows(
        path,
        &[
            "id", "points", "voxels", "min_x", "min_y", "min_z", "max_x", "max_y", "max_z",
            "size_x", "size_y", "size_z",
        ],
        rows,
    )
}
