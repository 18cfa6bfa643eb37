//! Configuration types for the motion clustering pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{name} must be positive")]
    NonPositive { name: &'static str },

    #[error("max_cluster_size ({max}) must be >= min_cluster_size ({min})")]
    InvalidClusterBounds { min: usize, max: usize },

    #[error("invalid grid geometry: {0}")]
    InvalidGrid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the cluster size filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Clusters with fewer points are discarded
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Clusters with more points are discarded
    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,
}

fn default_min_cluster_size() -> usize {
    20
}

fn default_max_cluster_size() -> usize {
    20_000
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            max_cluster_size: default_max_cluster_size(),
        }
    }
}

impl ClusteringConfig {
    /// Check that both bounds are positive and ordered.
    pub fn validate(&self) -> Result<()> {
        if self.min_cluster_size == 0 {
            return Err(ConfigError::NonPositive {
                name: "min_cluster_size",
            });
        }
        if self.max_cluster_size < self.min_cluster_size {
            return Err(ConfigError::InvalidClusterBounds {
                min: self.min_cluster_size,
                max: self.max_cluster_size,
            });
        }
        Ok(())
    }
}

/// Largest accepted `voxels_per_side`; a block holds its cube in voxels.
pub const MAX_VOXELS_PER_SIDE: usize = 1024;

/// Geometry of the sparse voxel grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Edge length of a voxel in meters
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f32,

    /// Voxels along each edge of a block
    #[serde(default = "default_voxels_per_side")]
    pub voxels_per_side: usize,
}

fn default_voxel_size() -> f32 {
    0.2
}

fn default_voxels_per_side() -> usize {
    16
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            voxel_size: default_voxel_size(),
            voxels_per_side: default_voxels_per_side(),
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.voxel_size.is_finite() || self.voxel_size <= 0.0 {
            return Err(ConfigError::InvalidGrid(format!(
                "voxel_size must be a positive number, got {}",
                self.voxel_size
            )));
        }
        if self.voxels_per_side == 0 || self.voxels_per_side > MAX_VOXELS_PER_SIDE {
            return Err(ConfigError::InvalidGrid(format!(
                "voxels_per_side must be in 1..={}, got {}",
                MAX_VOXELS_PER_SIDE, self.voxels_per_side
            )));
        }
        Ok(())
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,
}

impl PipelineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.clustering.validate()
    }

    /// Load and validate configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
