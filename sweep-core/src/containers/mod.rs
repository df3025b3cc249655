//! Containers for point data
//!
//! A [PointCloud] owns its points. All operations that change the set of points (filtering, transforming)
//! build a new cloud instead of mutating the existing one, so a cloud that was handed to a processing stage
//! is never observed in a half-updated state.

mod point;
pub use self::point::*;

mod point_cloud;
pub use self::point_cloud::*;
