//! Far-field elastic interaction energies between loops and voids, after Dudarev and Sutton,
//! Acta Mater. 125 (2017) 425.

use super::bodies::{DiskBody, SphereBody};
use nalgebra::Vector3;

/// Interaction energy in eV between two disks separated by `separation` (from `a` to `b`).
///
/// The `1/R³` decay is regularized with the summed loop radii so that overlapping loops stay
/// finite.
pub fn disk_disk(
    prefactor: f64,
    poisson_ratio: f64,
    a: &DiskBody,
    b: &DiskBody,
    separation: &Vector3<f64>,
) -> f64 {
    let distance = separation.norm();
    let reach = a.rho + b.rho;
    let decay = 1.0 / (distance.powi(3) + reach.powi(3));
    let direction = separation / (distance + 1.0e-6);

    let na_r = a.normal.dot(&direction);
    let nb_r = b.normal.dot(&direction);
    let na_nb = a.normal.dot(&b.normal);
    let nu = poisson_ratio;

    let angular = 15.0 * na_r * na_r * nb_r * nb_r
        - (4.0 * nu - 1.0)
        - 12.0 * nu * na_r * nb_r * na_nb
        - (1.0 - 2.0 * nu) * (3.0 * na_r * na_r + 3.0 * nb_r * nb_r + 2.0 * na_nb * na_nb);

    prefactor * a.burgers * b.burgers * a.area() * b.area() * decay * angular
}

/// Interaction energy in eV between a sphere and a disk separated by `separation`.
///
/// Only the second Legendre polynomial of the angle between the separation and the disk normal
/// enters, so the direction of `separation` does not matter. Coincident centres give zero.
pub fn sphere_disk(
    prefactor: f64,
    sphere: &SphereBody,
    disk: &DiskBody,
    separation: &Vector3<f64>,
) -> f64 {
    let distance = separation.norm();
    if distance <= f64::EPSILON {
        return 0.0;
    }
    let cosine = separation.dot(&disk.normal) / distance;
    let p2 = 0.5 * (3.0 * cosine * cosine - 1.0);
    prefactor * disk.area() * disk.burgers * sphere.relax_volume * p2 / distance.powi(3)
}
