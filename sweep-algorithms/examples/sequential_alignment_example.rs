use sweep_algorithms::{
    alignment::{LoggingObserver, PushOutcome, SequentialAligner},
    config::AlignmentConfig,
};
use sweep_core::{
    containers::{CloudHeader, Point, PointCloud},
    math::RigidTransform,
    nalgebra::Vector3,
};

/// A box-shaped room seen from its center
fn room() -> PointCloud {
    let mut points = vec![];
    for i in -10..=10 {
        for j in 0..=6 {
            let (a, z) = (f64::from(i) * 0.5, f64::from(j) * 0.4 - 0.6);
            points.push(Point::new(a, -4.0, z));
            points.push(Point::new(a, 4.0, z));
            points.push(Point::new(-5.0, a * 0.8, z));
            points.push(Point::new(5.0, a * 0.8, z));
        }
    }
    points.into_iter().collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let config = AlignmentConfig::default().with_leaf_size(Some(0.3));
    let mut aligner = SequentialAligner::new(config)?.with_observer(LoggingObserver);

    // the sensor drives forward and turns slightly between scans
    let motion = RigidTransform::from_translation(Vector3::new(0.1, 0.0, 0.0))
        * RigidTransform::from_euler_angles(0.0, 0.0, 0.01);
    let mut pose = RigidTransform::identity();
    for sequence in 0..4 {
        let scan = room()
            .transformed(&pose.inverse())
            .with_header(CloudHeader::new(format!("scan_{}", sequence), Some(sequence as f64 * 0.1)));
        match aligner.push(&scan)? {
            PushOutcome::Aligned(step) => println!(
                "{}: {} iterations, fitness {:.3}\n{}",
                step.header.frame_id, step.iterations, step.fitness, step.pairwise
            ),
            PushOutcome::Initialized => println!("{}: initialized", scan.header().frame_id),
            PushOutcome::Ignored => {}
        }
        pose = pose * motion;
    }
    println!("Global transform:\n{}", aligner.global_transform());
    Ok(())
}
