#![warn(clippy::all)]
//! Reading and writing point clouds for sweep.
//!
//! The registration pipeline itself is format agnostic. This crate decodes point files into the
//! [PointCloud](sweep_core::containers::PointCloud) value and writes aligned clouds back.

pub mod ascii;
