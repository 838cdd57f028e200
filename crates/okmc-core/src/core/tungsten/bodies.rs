use nalgebra::Vector3;

/// A dislocation loop or crowdion seen as a flat disk normal to its Burgers direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskBody {
    /// Unit Burgers direction, which is also the disk normal.
    pub normal: Vector3<f64>,
    /// Length of the Burgers vector in nm.
    pub burgers: f64,
    /// Loop radius in nm.
    pub rho: f64,
    pub delta_rho: f64,
}

impl DiskBody {
    #[inline]
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.rho * self.rho
    }
}

/// A vacancy or void seen as a sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereBody {
    /// Capture radius `rho + delta_rho` in nm.
    pub radius: f64,
    /// Relaxation volume in nm³ (negative for vacancies).
    pub relax_volume: f64,
}

/// The elastic and capture description of one defect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Body {
    Disk(DiskBody),
    Sphere(SphereBody),
    /// An oriented species whose orientation is not yet known. It neither interacts nor captures
    /// as a disk.
    Unoriented { radius: f64 },
}

impl Body {
    pub fn capture_radius(&self) -> f64 {
        match self {
            Body::Disk(disk) => disk.rho + disk.delta_rho,
            Body::Sphere(sphere) => sphere.radius,
            Body::Unoriented { radius } => *radius,
        }
    }
}
