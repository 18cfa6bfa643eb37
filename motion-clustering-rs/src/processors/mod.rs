//! Data processing modules.

pub mod clustering;
pub mod scan;

// Re-export key types for convenience
pub use clustering::{ClusterIndices, Clustering};
pub use scan::{prepare_scan, process_scan_file, ScanInput, ScanReport};
