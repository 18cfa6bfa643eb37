//! Scan point clouds and the CSV loader for prepared scans.
//!
//! A prepared scan is a CSV file with a header row containing `x`, `y`, `z`
//! and, optionally, `ever_free`. The `ever_free` column carries the mapper's
//! verdict for the voxel the point falls into (`1`/`0` or `true`/`false`).

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use log::warn;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Ordered, index-stable 3D point cloud of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Creates a point cloud from `[x, y, z]` triples.
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut cloud = Self::with_capacity(points.len());
        for p in points {
            cloud.push(p[0], p[1], p[2]);
        }
        cloud
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Point at `idx`, if in range.
    #[inline]
    pub fn point(&self, idx: usize) -> Option<[f32; 3]> {
        if idx < self.len() {
            Some([self.x[idx], self.y[idx], self.z[idx]])
        } else {
            None
        }
    }

    /// Iterates over points in cloud order.
    pub fn iter(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        (0..self.len()).map(move |i| [self.x[i], self.y[i], self.z[i]])
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }
}

/// A loaded scan: the cloud plus the per-point ever-free hint.
#[derive(Debug, Clone, Default)]
pub struct PreparedScan {
    pub cloud: PointCloud,
    /// Index-aligned with `cloud`; all `false` when the column is absent.
    pub ever_free: Vec<bool>,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Load a prepared scan from CSV.
///
/// Columns are matched by name (case-insensitive). Rows whose coordinates or
/// flag cannot be parsed are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks `x`/`y`/`z` columns,
/// or contains no valid rows.
pub fn load_scan_csv<P: AsRef<Path>>(path: P) -> Result<PreparedScan> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let column = |name: &str| col_map.get(name).copied();
    let (x_idx, y_idx, z_idx) = match (column("x"), column("y"), column("z")) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        _ => {
            return Err(LoaderError::MissingColumns(format!(
                "expected x, y, z in '{}'",
                path.display()
            )))
        }
    };
    let ever_free_idx = column("ever_free");

    let mut scan = PreparedScan {
        cloud: PointCloud::with_capacity(10_000),
        ever_free: Vec::with_capacity(10_000),
    };

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let coord = |idx: usize| record.get(idx).and_then(|s| s.parse::<f32>().ok());

        let (Some(x), Some(y), Some(z)) = (coord(x_idx), coord(y_idx), coord(z_idx)) else {
            warn!("{}: skipping row {} with bad coordinates", path.display(), row + 1);
            continue;
        };
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            warn!("{}: skipping row {} with non-finite coordinates", path.display(), row + 1);
            continue;
        }
        let ever_free = match ever_free_idx {
            Some(idx) => match record.get(idx).map_or(Some(false), parse_flag) {
                Some(flag) => flag,
                None => {
                    warn!("{}: skipping row {} with bad ever_free flag", path.display(), row + 1);
                    continue;
                }
            },
            None => false,
        };

        scan.cloud.push(x, y, z);
        scan.ever_free.push(ever_free);
    }

    if scan.cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(scan)
}
