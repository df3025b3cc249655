// The normal estimation algorithm is inspired by the PCL library (https://pointclouds.org/)
use float_ord::FloatOrd;
use kd_tree::KdTree;
use rayon::prelude::*;
use sweep_core::{
    containers::{Point, PointCloud, Surface},
    nalgebra::{Matrix3, Vector3},
};

use crate::error::{Error, Result};

/// Neighbourhoods need at least this many distinct positions to span a plane
pub const MIN_NEIGHBORS: usize = 3;

/// Output of [NormalEstimation::compute]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEstimate {
    /// All points for which a normal could be estimated, in input order, each carrying its [Surface]
    pub cloud: PointCloud,
    /// Indices (into the input cloud) of the points that were excluded because their neighbourhood was too sparse
    pub rejected: Vec<usize>,
}

/// Estimates a surface normal and curvature for every point from the covariance of its `k` nearest
/// neighbours. Normals are oriented towards `viewpoint`.
///
/// The spatial index is rebuilt on every call, since curvature depends on the density of the supplied cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalEstimation {
    k_neighbors: usize,
    viewpoint: Vector3<f64>,
}

impl NormalEstimation {
    pub fn new(k_neighbors: usize) -> Self {
        Self {
            k_neighbors,
            viewpoint: Vector3::zeros(),
        }
    }

    pub fn with_viewpoint(mut self, viewpoint: Vector3<f64>) -> Self {
        self.viewpoint = viewpoint;
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Computes normals for all points of `cloud`.
    ///
    /// Points whose neighbourhood has fewer than [MIN_NEIGHBORS] distinct finite positions are left out of the
    /// result and reported in [NormalEstimate::rejected]. If no point at all survives, the error of the first
    /// point is returned. Fails with [Error::InvalidParameter] if `k` is less than 3.
    pub fn compute(&self, cloud: &PointCloud) -> Result<NormalEstimate> {
        if self.k_neighbors < MIN_NEIGHBORS {
            return Err(Error::invalid(format!(
                "The k nearest neighbors parameter is too small ({}), at least {} are needed",
                self.k_neighbors, MIN_NEIGHBORS
            )));
        }
        if cloud.is_empty() {
            return Ok(NormalEstimate {
                cloud: cloud.clone(),
                rejected: vec![],
            });
        }

        // only finite positions go into the kd tree
        let positions: Vec<[f64; 3]> = cloud
            .iter()
            .filter(|p| p.is_finite())
            .map(|p| [p.position.x, p.position.y, p.position.z])
            .collect();
        let tree = KdTree::build_by_ordered_float(positions);

        let results: Vec<Result<Surface>> = cloud
            .points()
            .par_iter()
            .enumerate()
            .map(|(index, point)| self.estimate_at(&tree, index, point))
            .collect();

        let mut points = Vec::with_capacity(cloud.len());
        let mut rejected = vec![];
        let mut first_error = None;
        for ((index, point), result) in cloud.iter().enumerate().zip(results) {
            match result {
                Ok(surface) => points.push(point.with_surface(surface.normal, surface.curvature)),
                Err(why) => {
                    rejected.push(index);
                    first_error.get_or_insert(why);
                }
            }
        }

        if points.is_empty() {
            if let Some(why) = first_error {
                return Err(why);
            }
        }
        if !rejected.is_empty() {
            log::warn!(
                "Normal estimation skipped {} of {} points with fewer than {} valid neighbors",
                rejected.len(),
                cloud.len(),
                MIN_NEIGHBORS
            );
        }

        Ok(NormalEstimate {
            cloud: PointCloud::new(cloud.header().clone(), points),
            rejected,
        })
    }

    fn estimate_at(
        &self,
        tree: &KdTree<[f64; 3]>,
        index: usize,
        point: &Point,
    ) -> Result<Surface> {
        if !point.is_finite() {
            return Err(Error::InsufficientNeighbors { index, found: 0 });
        }
        let query = [point.position.x, point.position.y, point.position.z];
        let neighbors: Vec<Vector3<f64>> = tree
            .nearests(&query, self.k_neighbors)
            .iter()
            .map(|n| Vector3::new(n.item[0], n.item[1], n.item[2]))
            .collect();

        let found = count_distinct(&neighbors);
        if found < MIN_NEIGHBORS {
            return Err(Error::InsufficientNeighbors { index, found });
        }

        let covariance = compute_covariance_matrix(&neighbors)
            .ok_or(Error::InsufficientNeighbors { index, found })?;
        let (mut normal, curvature) = solve_plane_parameters(&covariance);

        // flip towards the sensor
        if normal.dot(&(self.viewpoint - point.position)) < 0.0 {
            normal = -normal;
        }
        Ok(Surface { normal, curvature })
    }
}

/// Estimates normals and curvature for `cloud` from its `k` nearest neighbourhoods, with normals oriented
/// towards the origin. See [NormalEstimation::compute].
///
/// # Examples
///
/// ```
/// # use sweep_algorithms::normal_estimation::estimate_normals;
/// # use sweep_core::containers::{Point, PointCloud};
/// let mut points = vec![];
/// for i in 0..10 {
///     for j in 0..10 {
///         points.push(Point::new(f64::from(i), f64::from(j), -1.0));
///     }
/// }
/// let cloud: PointCloud = points.into_iter().collect();
/// let estimate = estimate_normals(&cloud, 8).unwrap();
/// for point in estimate.cloud.iter() {
///     let normal = point.normal().unwrap();
///     assert!((normal.z - 1.0).abs() < 1e-9);
///     assert!(point.curvature().unwrap() < 1e-9);
/// }
/// ```
pub fn estimate_normals(cloud: &PointCloud, k: usize) -> Result<NormalEstimate> {
    NormalEstimation::new(k).compute(cloud)
}

/// Number of distinct positions among `positions`
fn count_distinct(positions: &[Vector3<f64>]) -> usize {
    let mut keys: Vec<[FloatOrd<f64>; 3]> = positions
        .iter()
        .map(|p| [FloatOrd(p.x), FloatOrd(p.y), FloatOrd(p.z)])
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Computes the centroid of the given positions. Returns `None` if `positions` is empty
pub fn compute_centroid(positions: &[Vector3<f64>]) -> Option<Vector3<f64>> {
    if positions.is_empty() {
        return None;
    }
    let sum = positions
        .iter()
        .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + p);
    Some(sum / positions.len() as f64)
}

/// Covariance matrix of the given positions, normalized by their count
fn compute_covariance_matrix(positions: &[Vector3<f64>]) -> Option<Matrix3<f64>> {
    let centroid = compute_centroid(positions)?;
    let covariance = positions.iter().fold(Matrix3::<f64>::zeros(), |acc, p| {
        let diff = p - centroid;
        acc + diff * diff.transpose()
    });
    Some(covariance / positions.len() as f64)
}

/// Normal as the eigenvector of the smallest eigenvalue, curvature as the surface variation
/// `λ0 / (λ0 + λ1 + λ2)`
fn solve_plane_parameters(covariance: &Matrix3<f64>) -> (Vector3<f64>, f64) {
    let eigen = covariance.symmetric_eigen();
    let (smallest, eigen_value) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| FloatOrd(**v))
        .map(|(i, v)| (i, *v))
        .unwrap_or((0, 0.0));

    let normal = eigen.eigenvectors.column(smallest).normalize();
    let eigen_sum = covariance.trace();
    let curvature = if eigen_sum != 0.0 {
        (eigen_value / eigen_sum).abs()
    } else {
        0.0
    };
    (normal, curvature)
}
