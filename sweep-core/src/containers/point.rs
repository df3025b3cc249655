use nalgebra::Vector3;

/// Local surface attributes of a point, as computed from its neighbourhood
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Surface {
    /// Unit surface normal
    pub normal: Vector3<f64>,
    /// Surface variation `λ0 / (λ0 + λ1 + λ2)` of the neighbourhood covariance, in `[0, 1/3]`
    pub curvature: f64,
}

/// A single 3D point with optional sensor attributes.
///
/// The surface attributes (normal and curvature) are append-only: sensor data never carries them, they are
/// attached afterwards through [Point::with_surface]. With the `serde` feature, surfaces are serialized but
/// never deserialized
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub position: Vector3<f64>,
    pub intensity: Option<f32>,
    pub ring: Option<u16>,
    #[cfg_attr(feature = "serde", serde(skip_deserializing))]
    surface: Option<Surface>,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self::from_position(Vector3::new(x, y, z))
    }

    pub fn from_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            intensity: None,
            ring: None,
            surface: None,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_ring(mut self, ring: u16) -> Self {
        self.ring = Some(ring);
        self
    }

    /// Returns a copy of this point carrying the given surface attributes
    pub fn with_surface(mut self, normal: Vector3<f64>, curvature: f64) -> Self {
        self.surface = Some(Surface { normal, curvature });
        self
    }

    /// Returns a copy of this point without surface attributes
    pub fn without_surface(mut self) -> Self {
        self.surface = None;
        self
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn normal(&self) -> Option<Vector3<f64>> {
        self.surface.map(|s| s.normal)
    }

    pub fn curvature(&self) -> Option<f64> {
        self.surface.map(|s| s.curvature)
    }

    /// Returns true if all coordinates are finite (neither NaN nor infinite)
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
    }
}
