use nalgebra::{Point3, Vector3};

/// How the separation between two in-box positions picks its periodic image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageConvention {
    /// Minimum image on periodic axes, raw separation on non-periodic axes.
    Periodic,
    /// Nearest image on every axis, regardless of periodicity. Used for hypothetical states
    /// that may sit just across a non-periodic boundary.
    Nearest,
}

/// An orthorhombic simulation box with per-axis periodicity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationBox {
    lengths: Vector3<f64>,
    periodic: [bool; 3],
}

impl SimulationBox {
    pub fn new(lengths: [f64; 3], periodic: [bool; 3]) -> Self {
        Self {
            lengths: Vector3::from(lengths),
            periodic,
        }
    }

    #[inline]
    pub fn lengths(&self) -> &Vector3<f64> {
        &self.lengths
    }

    #[inline]
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn volume(&self) -> f64 {
        self.lengths.x * self.lengths.y * self.lengths.z
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.lengths * 0.5)
    }

    /// Splits an unbounded position into its fractional coordinate inside the primary box and
    /// the integer image offset, so that `position = (fractional + image) * lengths`.
    pub fn wrap(&self, position: &Point3<f64>) -> (Vector3<f64>, Vector3<i64>) {
        let mut fractional = Vector3::zeros();
        let mut image = Vector3::zeros();
        for k in 0..3 {
            let scaled = position[k] / self.lengths[k];
            let offset = scaled.floor();
            fractional[k] = scaled - offset;
            image[k] = offset as i64;
        }
        (fractional, image)
    }

    /// Maps a fractional coordinate back to a Cartesian position inside the primary box.
    #[inline]
    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Point3<f64> {
        Point3::from(fractional.component_mul(&self.lengths))
    }

    /// Separation vector pointing from `from` to `to`. Both positions must lie in the primary box.
    pub fn separation(
        &self,
        from: &Point3<f64>,
        to: &Point3<f64>,
        convention: ImageConvention,
    ) -> Vector3<f64> {
        let mut delta = to - from;
        for k in 0..3 {
            let wraps = match convention {
                ImageConvention::Periodic => self.periodic[k],
                ImageConvention::Nearest => true,
            };
            if wraps {
                let length = self.lengths[k];
                delta[k] -= length * (delta[k] / length).round();
            }
        }
        delta
    }
}
