use kd_tree::{KdPoint, KdTree};
use rayon::prelude::*;
use sweep_core::{
    containers::{Point, PointCloud},
    nalgebra::Vector3,
};

use crate::point_representation::{
    feature_distance_squared, PointRepresentation, FEATURE_DIMENSIONS,
};

/// Two nearest target features closer than this (relative difference of their squared distances) make a
/// correspondence ambiguous
pub(crate) const AMBIGUITY_TOLERANCE: f64 = 1e-6;

/// Number of nearest target features inspected for ties
const TIE_CANDIDATES: usize = 8;

/// Feature vector of a target point in the kd tree
#[derive(Debug, Clone, Copy)]
struct FeaturePoint {
    features: [f64; FEATURE_DIMENSIONS],
    index: usize,
}

impl KdPoint for FeaturePoint {
    type Scalar = f64;
    type Dim = typenum::U4;
    fn at(&self, k: usize) -> f64 {
        self.features[k]
    }
}

/// A source position paired with the target point it is assumed to coincide with
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Correspondence {
    pub source: Vector3<f64>,
    pub target: Vector3<f64>,
    pub target_normal: Option<Vector3<f64>>,
}

impl Correspondence {
    pub fn distance_squared(&self) -> f64 {
        (self.source - self.target).norm_squared()
    }
}

/// Best target for one source point. Among equally near targets the one with the lowest index is picked
struct Match {
    correspondence: Correspondence,
    ambiguous: bool,
}

/// Nearest-neighbour index over the features of a target cloud. Built once per registration, since the
/// target never moves
pub(crate) struct TargetIndex<'a> {
    target: &'a PointCloud,
    tree: KdTree<FeaturePoint>,
}

impl<'a> TargetIndex<'a> {
    pub fn new<R: PointRepresentation>(target: &'a PointCloud, representation: &R) -> Self {
        let features = target
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .map(|(index, p)| FeaturePoint {
                features: representation.features(p),
                index,
            })
            .collect();
        Self {
            target,
            tree: KdTree::build_by_ordered_float(features),
        }
    }

    /// Finds the correspondences of all points of `source` (already moved by the current estimate), in source
    /// order. A source point has no correspondence if its nearest target feature is farther than `max_distance`
    /// in position.
    ///
    /// A match is ambiguous if two different target features are equally near. Ambiguous matches are left out
    /// as long as at least one unambiguous match exists. Otherwise all matches are kept, each resolved to the
    /// tied target with the lowest index.
    pub fn find_correspondences<R: PointRepresentation>(
        &self,
        source: &PointCloud,
        representation: &R,
        max_distance: f64,
    ) -> Vec<Correspondence> {
        let max_distance_squared = max_distance * max_distance;
        let matches: Vec<Match> = source
            .points()
            .par_iter()
            .filter_map(|point| self.best_match(point, representation, max_distance_squared))
            .collect();

        let keep_ambiguous = matches.iter().all(|m| m.ambiguous);
        matches
            .into_iter()
            .filter(|m| keep_ambiguous || !m.ambiguous)
            .map(|m| m.correspondence)
            .collect()
    }

    fn best_match<R: PointRepresentation>(
        &self,
        point: &Point,
        representation: &R,
        max_distance_squared: f64,
    ) -> Option<Match> {
        if !point.is_finite() {
            return None;
        }
        let query = FeaturePoint {
            features: representation.features(point),
            index: usize::MAX,
        };
        let nearests = self.tree.nearests(&query, TIE_CANDIDATES);
        let best = nearests.first()?;
        let tolerance = AMBIGUITY_TOLERANCE * best.squared_distance;
        let tied: Vec<&FeaturePoint> = nearests
            .iter()
            .take_while(|n| n.squared_distance - best.squared_distance <= tolerance)
            .map(|n| n.item)
            .collect();
        let ambiguous = best.squared_distance > 0.0
            && tied
                .iter()
                .any(|c| feature_distance_squared(&c.features, &best.item.features) > 0.0);
        let chosen = tied.iter().min_by_key(|c| c.index)?;

        let target = &self.target.points()[chosen.index];
        let correspondence = Correspondence {
            source: point.position,
            target: target.position,
            target_normal: target.normal(),
        };
        if correspondence.distance_squared() > max_distance_squared {
            return None;
        }
        Some(Match {
            correspondence,
            ambiguous,
        })
    }
}
