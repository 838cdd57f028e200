//! Geometric capture tests deciding whether two defects react.

use super::bodies::{Body, DiskBody, SphereBody};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Which part of a loop captures a sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureCriterion {
    /// The whole loop plane, thickened by the loop's capture shell.
    #[default]
    AllPart,
    /// Only the dislocation line around the loop's rim.
    Ring,
}

pub fn sphere_sphere(a: &SphereBody, b: &SphereBody, separation: &Vector3<f64>) -> bool {
    let reach = a.radius + b.radius;
    separation.norm_squared() < reach * reach
}

/// Whether `sphere` is captured by `disk`. Only the magnitude of `separation` along and across
/// the disk normal matters.
pub fn sphere_disk(
    sphere_radius: f64,
    disk: &DiskBody,
    separation: &Vector3<f64>,
    criterion: CaptureCriterion,
) -> bool {
    let reach = sphere_radius + disk.delta_rho;
    let axial = separation.dot(&disk.normal).abs();
    let radial = (separation.norm_squared() - axial * axial).abs().sqrt();
    let beyond_rim = radial - disk.rho;

    match criterion {
        CaptureCriterion::AllPart if beyond_rim < 0.0 => axial < reach,
        CaptureCriterion::AllPart | CaptureCriterion::Ring => {
            beyond_rim * beyond_rim + axial * axial < reach * reach
        }
    }
}

/// Whether two bodies are close enough to react.
///
/// Disks test each other as sphere against disk in both directions; a disk without an
/// orientation falls back to its capture sphere.
pub fn captures(a: &Body, b: &Body, separation: &Vector3<f64>, criterion: CaptureCriterion) -> bool {
    match (a, b) {
        (Body::Disk(disk_a), Body::Disk(disk_b)) => {
            sphere_disk(disk_a.rho + disk_a.delta_rho, disk_b, separation, criterion)
                || sphere_disk(disk_b.rho + disk_b.delta_rho, disk_a, separation, criterion)
        }
        (Body::Disk(disk), other) | (other, Body::Disk(disk)) => {
            sphere_disk(other.capture_radius(), disk, separation, criterion)
        }
        (Body::Sphere(sphere_a), Body::Sphere(sphere_b)) => {
            sphere_sphere(sphere_a, sphere_b, separation)
        }
        (a, b) => {
            let reach = a.capture_radius() + b.capture_radius();
            separation.norm_squared() < reach * reach
        }
    }
}
