//! Crystallographic directions of the bcc lattice and the random draws built on them.

use nalgebra::Vector3;
use rand::Rng;
use std::f64::consts::PI;

#[rustfmt::skip]
const DIRECTIONS_111: [[f64; 3]; 4] = [
    [ 1.0,  1.0,  1.0],
    [-1.0,  1.0,  1.0],
    [ 1.0, -1.0,  1.0],
    [ 1.0,  1.0, -1.0],
];

/// Number of distinct ⟨111⟩ axes.
pub const AXES_111: usize = DIRECTIONS_111.len();

/// Unit vector along the `index`-th ⟨111⟩ axis (taken modulo four).
pub fn unit_111(index: usize) -> Vector3<f64> {
    Vector3::from(DIRECTIONS_111[index % AXES_111]) / 3.0_f64.sqrt()
}

pub fn random_unit_111<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    unit_111(rng.gen_range(0..AXES_111))
}

/// A unit vector from polar and azimuthal angles drawn uniformly.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    let theta = rng.gen_range(0.0..PI);
    let phi = rng.gen_range(0.0..2.0 * PI);
    Vector3::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}

/// A random unit vector perpendicular to `axis`.
pub fn random_perpendicular<R: Rng + ?Sized>(axis: &Vector3<f64>, rng: &mut R) -> Vector3<f64> {
    loop {
        if let Some(normal) = random_unit_vector(rng).cross(axis).try_normalize(1.0e-6) {
            return normal;
        }
    }
}

/// A fixed unit vector perpendicular to `axis`.
pub fn reference_perpendicular(axis: &Vector3<f64>) -> Vector3<f64> {
    axis.cross(&Vector3::x())
        .try_normalize(1.0e-6)
        .or_else(|| axis.cross(&Vector3::y()).try_normalize(1.0e-6))
        .unwrap_or_else(Vector3::z)
}

/// Reverses one coordinate of `direction`, turning one ⟨111⟩ axis into another.
pub fn flip_component(direction: &Vector3<f64>, component: usize) -> Vector3<f64> {
    let mut flipped = *direction;
    flipped[component % 3] = -flipped[component % 3];
    flipped
}
