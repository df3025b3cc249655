use std::collections::HashMap;

use sweep_core::{
    containers::{Point, PointCloud},
    nalgebra::Vector3,
};

use crate::bounds::calculate_bounds;
use crate::error::{Error, Result};

/// Largest voxel index per axis that is accepted before the grid is considered too fine for the cloud
const MAX_VOXEL_INDEX: f64 = (i64::MAX / 2) as f64;

/// Accumulates the points that fall into one voxel
#[derive(Debug, Default)]
struct Voxel {
    position_sum: Vector3<f64>,
    count: usize,
    intensity_sum: f64,
    intensity_count: usize,
    ring: Option<u16>,
}

impl Voxel {
    fn add(&mut self, point: &Point) {
        self.position_sum += point.position;
        self.count += 1;
        if let Some(intensity) = point.intensity {
            self.intensity_sum += intensity as f64;
            self.intensity_count += 1;
        }
        if let Some(ring) = point.ring {
            // integer attributes are max-pooled
            self.ring = Some(self.ring.map_or(ring, |r| r.max(ring)));
        }
    }

    fn centroid(&self) -> Point {
        let mut centroid = Point::from_position(self.position_sum / self.count as f64);
        if self.intensity_count > 0 {
            centroid.intensity = Some((self.intensity_sum / self.intensity_count as f64) as f32);
        }
        centroid.ring = self.ring;
        centroid
    }
}

/// Downsamples `cloud` by applying a voxel-grid filter with cubic voxels of edge `leaf_size`.
///
/// The grid is anchored at the minimum corner of the cloud's bounding box. Every non-empty voxel is replaced
/// by the centroid of its points: positions and intensities are averaged, ring ids are max-pooled and surface
/// attributes are dropped since they no longer describe the centroid. Voxels appear in the output in the order
/// in which the input first touches them. Non-finite points are dropped.
///
/// Fails with [Error::InvalidParameter] if `leaf_size` is not positive, or so small compared to the extent
/// of the cloud that voxel indices would overflow.
///
/// # Examples
/// ```
/// # use sweep_algorithms::voxel_grid::voxelgrid_filter;
/// # use sweep_core::containers::{Point, PointCloud};
/// let mut points = vec![];
/// // generate some points
/// for i in 0..100 {
///     for j in 0..100 {
///         points.push(Point::new(0.0, f64::from(i), f64::from(j)));
///     }
/// }
/// let cloud: PointCloud = points.into_iter().collect();
/// let filtered = voxelgrid_filter(&cloud, 1.5).unwrap();
/// // filtered now has fewer points than cloud
/// assert!(filtered.len() < cloud.len() / 2);
/// ```
pub fn voxelgrid_filter(cloud: &PointCloud, leaf_size: f64) -> Result<PointCloud> {
    if !(leaf_size.is_finite() && leaf_size > 0.0) {
        return Err(Error::invalid(format!(
            "Voxel leaf size must be a positive number, got {}",
            leaf_size
        )));
    }

    let aabb = match calculate_bounds(cloud) {
        Some(aabb) => aabb,
        None => return Ok(PointCloud::new(cloud.header().clone(), vec![])),
    };
    let extent = aabb.extent();
    if extent.iter().any(|e| e / leaf_size > MAX_VOXEL_INDEX) {
        return Err(Error::invalid(format!(
            "Leaf size {} is too small for a cloud of extent ({}, {}, {})",
            leaf_size, extent.x, extent.y, extent.z
        )));
    }
    let origin = aabb.min().coords;

    let mut voxel_lookup: HashMap<(i64, i64, i64), usize> = HashMap::with_capacity(cloud.len());
    let mut voxels: Vec<Voxel> = Vec::new();

    for point in cloud.iter().filter(|p| p.is_finite()) {
        let cell = (point.position - origin) / leaf_size;
        let key = (
            cell.x.floor() as i64,
            cell.y.floor() as i64,
            cell.z.floor() as i64,
        );
        let index = *voxel_lookup.entry(key).or_insert_with(|| {
            voxels.push(Voxel::default());
            voxels.len() - 1
        });
        voxels[index].add(point);
    }

    log::trace!(
        "Voxel grid with leaf size {} reduced {} points to {}",
        leaf_size,
        cloud.len(),
        voxels.len()
    );

    Ok(PointCloud::new(
        cloud.header().clone(),
        voxels.iter().map(Voxel::centroid).collect(),
    ))
}
