use rand::{rngs::StdRng, Rng, SeedableRng};
use sweep_algorithms::{
    alignment::{PushOutcome, SequentialAligner},
    config::AlignmentConfig,
    normal_estimation::estimate_normals,
    passthrough::{filter_range, Axis, RangeFilter},
    point_representation::CurvatureWeighted,
    registration::{register, ErrorMetric, IterativeClosestPoint, RegistrationConfig},
    voxel_grid::voxelgrid_filter,
    Error,
};
use sweep_core::{
    containers::{Point, PointCloud},
    math::RigidTransform,
    nalgebra::Vector3,
};

mod common;

use crate::common::{registration_cloud, scene_scan, small_motion, unit_cube};

const EPS: f64 = 1e-8;
const TOLERANCE: f64 = 1e-6;

fn register_default(source: &PointCloud, target: &PointCloud) -> RigidTransform {
    register(source, target, &CurvatureWeighted::default(), 100, EPS, 5.0)
        .unwrap()
        .transform
}

#[test]
fn aligning_a_cloud_to_itself_is_identity() {
    let cloud = registration_cloud(1);
    let result = register(&cloud, &cloud, &CurvatureWeighted::default(), 100, EPS, 5.0).unwrap();
    assert!(result.converged);
    assert!(result.transform.magnitude() < EPS);
    assert_eq!(result.aligned_source.len(), cloud.len());
}

#[test]
fn swapping_source_and_target_inverts_the_transform() {
    let a = registration_cloud(2);
    let b = a.transformed(&small_motion(1.0));
    let a_from_b = register_default(&a, &b);
    let b_from_a = register_default(&b, &a);
    assert!((a_from_b * b_from_a).approx_eq(&RigidTransform::identity(), TOLERANCE));
    assert!(a_from_b.approx_eq(&b_from_a.inverse(), TOLERANCE));
}

#[test]
fn pairwise_transforms_compose() {
    let a = registration_cloud(3);
    let b = a.transformed(&small_motion(1.0));
    let c = b.transformed(&small_motion(-0.5));

    let a_from_b = register_default(&a, &b);
    let b_from_c = register_default(&b, &c);
    let a_from_c = register_default(&a, &c);
    assert!((a_from_b * b_from_c).approx_eq(&a_from_c, TOLERANCE));
}

#[test]
fn reported_transform_maps_target_into_source() {
    let source = registration_cloud(4);
    let motion = small_motion(1.5);
    let target = source.transformed(&motion);
    let result = register(&source, &target, &CurvatureWeighted::default(), 100, EPS, 5.0).unwrap();

    assert!(result.transform.approx_eq(&motion.inverse(), TOLERANCE));
    assert!(result.forward().approx_eq(&motion, TOLERANCE));
    for (back, original) in target.transformed(&result.transform).iter().zip(source.iter()) {
        assert!((back.position - original.position).norm() < TOLERANCE);
    }
    for (aligned, moved) in result.aligned_source.iter().zip(target.iter()) {
        assert!((aligned.position - moved.position).norm() < TOLERANCE);
    }
}

#[test]
fn range_filter_keeps_exactly_the_points_in_range() {
    let mut rng = StdRng::seed_from_u64(9);
    let cloud: PointCloud = (0..1000)
        .map(|_| {
            Point::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-2.0..4.0),
            )
        })
        .collect();

    let kept = filter_range(&cloud, Axis::Z, -0.8, 3.0).unwrap();
    let removed = RangeFilter::new(Axis::Z, -0.8, 3.0)
        .negative(true)
        .apply(&cloud)
        .unwrap();
    assert!(kept.iter().all(|p| -0.8 <= p.position.z && p.position.z <= 3.0));
    assert!(removed.iter().all(|p| p.position.z < -0.8 || p.position.z > 3.0));
    assert_eq!(kept.len() + removed.len(), cloud.len());

    assert_eq!(
        filter_range(&cloud, Axis::Z, 3.0, -0.8),
        Err(Error::InvalidRange { min: 3.0, max: -0.8 })
    );
}

#[test]
fn downsampling_never_grows_and_converges_to_the_input() {
    let cloud = common::jittered_lattice(5, (10, 10, 10), 0.3, 0.1);
    for leaf in &[0.05, 0.2, 0.5, 1.2, 3.0] {
        let downsampled = voxelgrid_filter(&cloud, *leaf).unwrap();
        assert!(downsampled.len() <= cloud.len());
    }
    assert_eq!(voxelgrid_filter(&cloud, 100.0).unwrap().len(), 1);
    assert_eq!(voxelgrid_filter(&cloud, 1e-6).unwrap(), cloud);
}

#[test]
fn clouds_beyond_the_correspondence_distance_diverge() {
    let source = registration_cloud(6);
    let target = source.transformed(&RigidTransform::from_translation(Vector3::new(10.0, 0.0, 0.0)));
    let result = register(&source, &target, &CurvatureWeighted::default(), 100, EPS, 5.0);
    assert!(matches!(result, Err(Error::RegistrationDiverged { .. })));
}

#[test]
fn half_cell_shifted_lattice_still_registers() {
    // every source point sits exactly halfway between two target points
    let target = common::jittered_lattice(0, (4, 3, 3), 1.0, 0.0);
    let source = common::jittered_lattice(0, (3, 3, 3), 1.0, 0.0);
    let result = register(&source, &target, &CurvatureWeighted::default(), 100, EPS, 5.0).unwrap();
    assert!(result.converged);
    assert_eq!(result.correspondences, source.len());
    assert!(result
        .forward()
        .approx_eq(&RigidTransform::from_translation(Vector3::new(-0.5, 0.0, 0.0)), TOLERANCE));
}

#[test]
fn translated_unit_cube() {
    let source = unit_cube();
    let target = source.transformed(&RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0)));
    let result = register(&source, &target, &CurvatureWeighted::default(), 100, EPS, 5.0).unwrap();
    assert!(result.converged);
    assert!(result
        .transform
        .approx_eq(&RigidTransform::from_translation(Vector3::new(-1.0, 0.0, 0.0)), 1e-3));
}

#[test]
fn point_to_plane_with_estimated_normals() {
    let source = estimate_normals(&registration_cloud(8), 10).unwrap().cloud;
    let motion = small_motion(0.5);
    let target = source.transformed(&motion);
    let representation = CurvatureWeighted::default();
    let config = RegistrationConfig {
        metric: ErrorMetric::PointToPlane,
        ..RegistrationConfig::default()
    };
    let result = IterativeClosestPoint::new(config, &representation)
        .align(&source, &target)
        .unwrap();
    assert!(result.forward().approx_eq(&motion, 1e-5));
}

#[test]
fn three_identical_scans_keep_the_global_transform_at_identity() {
    let mut aligner = SequentialAligner::new(AlignmentConfig::default()).unwrap();
    assert_eq!(aligner.push(&scene_scan("0")).unwrap(), PushOutcome::Initialized);
    for (index, frame) in ["1", "2"].iter().enumerate() {
        match aligner.push(&scene_scan(frame)).unwrap() {
            PushOutcome::Aligned(step) => {
                assert_eq!(step.sequence, index + 1);
                assert!(step.converged);
                assert!(step.pairwise.magnitude() < EPS);
            }
            other => panic!("Expected an aligned step, got {:?}", other),
        }
        assert!(aligner.global_transform().magnitude() < EPS);
    }
}

#[test]
fn global_transform_maps_the_latest_scan_into_the_first() {
    let first = scene_scan("0");
    let m1 = small_motion(1.0);
    let m2 = small_motion(-0.8);
    let second = first.transformed(&m1).with_header(first.header().clone());
    let third = second.transformed(&m2).with_header(first.header().clone());

    let mut aligner = SequentialAligner::new(AlignmentConfig::default()).unwrap();
    aligner.push(&first).unwrap();
    let step = match aligner.push(&second).unwrap() {
        PushOutcome::Aligned(step) => step,
        other => panic!("Expected an aligned step, got {:?}", other),
    };
    assert!(step.pairwise.approx_eq(&m1.inverse(), TOLERANCE));
    for (mapped, original) in step.current_in_previous.iter().zip(first.iter()) {
        assert!((mapped.position - original.position).norm() < TOLERANCE);
    }

    aligner.push(&third).unwrap();
    let expected = (m2 * m1).inverse();
    assert!(aligner.global_transform().approx_eq(&expected, TOLERANCE));
    for (mapped, original) in third.transformed(aligner.global_transform()).iter().zip(first.iter()) {
        assert!((mapped.position - original.position).norm() < TOLERANCE);
    }
}

#[test]
fn sequence_continues_after_a_failed_scan() {
    let mut aligner = SequentialAligner::new(AlignmentConfig::default()).unwrap();
    let first = scene_scan("0");
    aligner.push(&first).unwrap();

    let lost = first.transformed(&RigidTransform::from_translation(Vector3::new(0.0, 30.0, 0.0)));
    assert!(aligner.push(&lost).is_err());
    assert_eq!(aligner.global_transform(), &RigidTransform::identity());

    let motion = small_motion(1.0);
    aligner.push(&first.transformed(&motion)).unwrap();
    assert!(aligner.global_transform().approx_eq(&motion.inverse(), TOLERANCE));
}
