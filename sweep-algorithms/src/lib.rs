#![warn(clippy::all)]
//! Algorithms for pairwise scan registration.
//!
//! The pipeline for aligning two scans is: [passthrough] range filtering, [voxel_grid] downsampling,
//! [normal_estimation], and nonlinear ICP in [registration] using a feature space from [point_representation].
//! The [alignment] driver chains these steps over a live sequence of scans.

// Error taxonomy shared by all stages.
pub mod error;
pub use self::error::{Error, Result};
// Bounding box of a point cloud.
pub mod bounds;
// Axis-range filtering (pass-through filter).
pub mod passthrough;
// Voxel-grid downsampling.
pub mod voxel_grid;
// Surface normals and curvature from k-nearest neighbourhoods. Inspired by the PCL library (https://pointclouds.org/)
pub mod normal_estimation;
// Feature vectors that drive the correspondence search.
pub mod point_representation;
// Nonlinear iterative closest point.
pub mod registration;
// Session configuration for the sequential driver.
pub mod config;
// Sequential alignment of a stream of scans.
pub mod alignment;
