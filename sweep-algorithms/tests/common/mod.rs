use rand::{rngs::StdRng, Rng, SeedableRng};
use sweep_core::{
    containers::{CloudHeader, Point, PointCloud},
    math::RigidTransform,
    nalgebra::Vector3,
};

/// Regular `nx * ny * nz` lattice with the given spacing, centered at the origin. Every point is displaced by a
/// uniform jitter of at most `jitter` per axis
pub fn jittered_lattice(
    seed: u64,
    (nx, ny, nz): (u32, u32, u32),
    spacing: f64,
    jitter: f64,
) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let center = Vector3::new(
        f64::from(nx - 1) * spacing / 2.0,
        f64::from(ny - 1) * spacing / 2.0,
        f64::from(nz - 1) * spacing / 2.0,
    );
    let mut points = vec![];
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let mut position =
                    Vector3::new(f64::from(i), f64::from(j), f64::from(k)) * spacing - center;
                if jitter > 0.0 {
                    position += Vector3::new(
                        rng.gen_range(-jitter..jitter),
                        rng.gen_range(-jitter..jitter),
                        rng.gen_range(-jitter..jitter),
                    );
                }
                points.push(Point::from_position(position).with_intensity(rng.gen_range(0.0..255.0)));
            }
        }
    }
    points.into_iter().collect()
}

/// Small lattice with irregular spacing for registration tests
pub fn registration_cloud(seed: u64) -> PointCloud {
    jittered_lattice(seed, (5, 4, 3), 1.0, 0.2)
}

/// Scan of a synthetic scene that fits the default range filter and is not reduced by the default voxel grid
pub fn scene_scan(frame_id: &str) -> PointCloud {
    jittered_lattice(0, (6, 5, 3), 1.5, 0.0)
        .transformed(&RigidTransform::from_translation(Vector3::new(0.0, 0.0, 1.0)))
        .with_header(CloudHeader::new(frame_id, None))
}

pub fn small_motion(scale: f64) -> RigidTransform {
    RigidTransform::from_translation(Vector3::new(0.04, -0.03, 0.02) * scale)
        * RigidTransform::from_euler_angles(0.008 * scale, -0.006 * scale, 0.015 * scale)
}

pub fn unit_cube() -> PointCloud {
    (0..8)
        .map(|i| Point::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
        .collect()
}
