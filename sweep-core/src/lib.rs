#![warn(clippy::all)]

//! Core data structures for pairwise scan registration
//!
//! Sweep works on plain, owned point clouds: an ordered sequence of [Point](crate::containers::Point)s with a
//! [CloudHeader](crate::containers::CloudHeader) describing where and when the scan was captured. Rigid motion
//! between scans is expressed as a [RigidTransform](crate::math::RigidTransform), a 4x4 homogeneous matrix.

pub extern crate nalgebra;

pub mod containers;
/// Useful mathematical tools when working with point cloud data
pub mod math;
