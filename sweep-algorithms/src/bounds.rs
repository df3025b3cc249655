use sweep_core::{containers::PointCloud, math::AABB, nalgebra::Point3};

/// Calculate the bounding box of the points in the given `cloud`. Non-finite points are ignored. Returns `None`
/// if the cloud contains no finite point
pub fn calculate_bounds(cloud: &PointCloud) -> Option<AABB> {
    let mut finite = cloud
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| Point3::from(p.position));
    let first = finite.next()?;
    Some(finite.fold(AABB::from_point(&first), |bounds, p| bounds.extended(&p)))
}
