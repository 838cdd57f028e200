//! Migration, emission and rotation barriers of tungsten defects.
//!
//! Values follow Becquart et al., J. Nucl. Mater. 403 (2010) 75, with the large-size emission
//! energies of Fikar et al., Nucl. Mater. Energy 16 (2018) 60.

use super::params::MaterialParams;
use super::species::Species;
use crate::core::model::Arrhenius;
use std::f64::consts::PI;

const ATTEMPT_FREQUENCY: f64 = 6.0e12;

const INTERSTITIAL_MIGRATION: f64 = 0.013;
const VACANCY_MIGRATION: f64 = 1.66;

/// Binding energy of an interstitial to a cluster of size `n`, for `n` in `2..=7`.
const INTERSTITIAL_BINDING: [f64; 6] = [2.12, 3.02, 3.60, 3.98, 4.27, 5.39];

/// Asymptotic interstitial binding energy of a large ⟨111⟩ loop.
const LOOP_BINDING_LIMIT: f64 = 9.31;
const LOOP_LINE_TENSION: f64 = 1845.64;
const LOOP_CORE_COEFFICIENT: f64 = 22.41;

/// Vacancy formation energy entering the capillary binding law.
const VACANCY_FORMATION: f64 = 3.727;
/// Surface term `gamma (9 pi)^(1/3)` of the capillary law, per squared lattice constant.
const VOID_SURFACE: f64 = 70.068_899_133;

/// Barrier for any migration hop of `species` holding `size` point defects.
pub fn migration(species: Species, size: u32) -> Arrhenius {
    let n = f64::from(size);
    match species {
        Species::I => Arrhenius::new(ATTEMPT_FREQUENCY, INTERSTITIAL_MIGRATION),
        Species::ICluster | Species::ILoop111 => {
            Arrhenius::new(ATTEMPT_FREQUENCY / n.sqrt(), INTERSTITIAL_MIGRATION)
        }
        Species::V => Arrhenius::new(ATTEMPT_FREQUENCY, VACANCY_MIGRATION),
        Species::VCluster => Arrhenius::new(
            ATTEMPT_FREQUENCY * 1000.0_f64.powf(1.0 - n),
            VACANCY_MIGRATION,
        ),
    }
}

/// Barrier for reorienting the Burgers direction, where one exists.
pub fn rotation(species: Species, size: u32) -> Option<Arrhenius> {
    match (species, size) {
        (Species::I, _) => Some(Arrhenius::new(ATTEMPT_FREQUENCY, 0.38)),
        (Species::ICluster, 2) => Some(Arrhenius::new(1.0e12, 1.307)),
        (Species::ICluster, 3) => Some(Arrhenius::new(1.0e12, 1.730)),
        _ => None,
    }
}

/// Barrier for shedding one point defect, for species of size two or more.
pub fn emission(species: Species, size: u32, params: &MaterialParams) -> Option<Arrhenius> {
    let prefactor = ATTEMPT_FREQUENCY * f64::from(size);
    match species {
        Species::ICluster => {
            let binding = interstitial_binding(size, params)?;
            Some(Arrhenius::new(
                prefactor,
                0.5 * binding + INTERSTITIAL_MIGRATION,
            ))
        }
        Species::ILoop111 => {
            let binding = interstitial_binding(size, params)?;
            Some(Arrhenius::new(prefactor, binding + INTERSTITIAL_MIGRATION))
        }
        Species::VCluster if size >= 2 => Some(Arrhenius::new(
            prefactor,
            0.5 * vacancy_binding(size, params) + VACANCY_MIGRATION,
        )),
        _ => None,
    }
}

/// Energy released when one interstitial joins a cluster of `size - 1` to form one of `size`.
pub fn interstitial_binding(size: u32, params: &MaterialParams) -> Option<f64> {
    match size {
        0..=1 => None,
        2..=7 => INTERSTITIAL_BINDING.get(size as usize - 2).copied(),
        _ => {
            let n = f64::from(size);
            Some(LOOP_BINDING_LIMIT + loop_formation(n - 1.0, params) - loop_formation(n, params))
        }
    }
}

/// Energy released when one vacancy joins a void of `size - 1`, from the capillary law.
pub fn vacancy_binding(size: u32, params: &MaterialParams) -> f64 {
    let surface = VOID_SURFACE * params.lattice_constant * params.lattice_constant;
    let n = f64::from(size);
    surface * (n - 1.0).powf(2.0 / 3.0) + VACANCY_FORMATION - surface * n.powf(2.0 / 3.0)
}

/// Line-tension formation energy of a ⟨111⟩ interstitial loop holding `n` interstitials.
fn loop_formation(n: f64, params: &MaterialParams) -> f64 {
    let a = params.lattice_constant;
    let core_radius = a / (2.0 * 6.0_f64.sqrt());
    let radius = a * (n / (PI * 3.0_f64.sqrt())).sqrt() + core_radius;
    let burgers_squared = params.first_neighbor().powi(2);
    let core = LOOP_CORE_COEFFICIENT / (2.0 * params.atomic_volume());
    radius * burgers_squared * (LOOP_LINE_TENSION + core * radius.ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_defect_migration_uses_fixed_barriers() {
        assert_eq!(migration(Species::I, 1), Arrhenius::new(6.0e12, 0.013));
        assert_eq!(migration(Species::V, 1), Arrhenius::new(6.0e12, 1.66));
    }

    #[test]
    fn cluster_mobility_drops_with_size() {
        let small = migration(Species::ICluster, 2);
        let loop_ = migration(Species::ILoop111, 16);
        assert!((small.prefactor - 6.0e12 / 2.0_f64.sqrt()).abs() < 1.0);
        assert!((loop_.prefactor - 1.5e12).abs() < 1.0);

        let void = migration(Species::VCluster, 3);
        assert!((void.prefactor - 6.0e6).abs() < 1e-3);
    }

    #[test]
    fn rotation_is_defined_for_small_interstitials_only() {
        assert_eq!(rotation(Species::I, 1), Some(Arrhenius::new(6.0e12, 0.38)));
        assert_eq!(rotation(Species::ICluster, 3), Some(Arrhenius::new(1.0e12, 1.730)));
        assert_eq!(rotation(Species::ILoop111, 5), None);
        assert_eq!(rotation(Species::V, 1), None);
    }

    #[test]
    fn small_interstitial_emission_uses_tabulated_binding() {
        let params = MaterialParams::default();
        let pair = emission(Species::ICluster, 2, &params).unwrap();
        assert!((pair.activation - (0.5 * 2.12 + 0.013)).abs() < 1e-12);
        assert_eq!(pair.prefactor, 1.2e13);

        let loop_ = emission(Species::ILoop111, 7, &params).unwrap();
        assert!((loop_.activation - (5.39 + 0.013)).abs() < 1e-12);
    }

    #[test]
    fn large_loop_binding_rises_towards_its_limit() {
        let params = MaterialParams::default();
        let eight = interstitial_binding(8, &params).unwrap();
        let hundred = interstitial_binding(100, &params).unwrap();
        let thousand = interstitial_binding(1000, &params).unwrap();
        assert!((eight - 5.6498).abs() < 1e-3);
        assert!(eight < hundred && hundred < thousand && thousand < LOOP_BINDING_LIMIT);
    }

    #[test]
    fn void_binding_follows_the_capillary_law() {
        let params = MaterialParams::default();
        assert!((vacancy_binding(2, &params) + 0.39594).abs() < 1e-4);
        assert!((vacancy_binding(100, &params) - 2.71719).abs() < 1e-4);

        let divacancy = emission(Species::VCluster, 2, &params).unwrap();
        let expected = 0.5 * vacancy_binding(2, &params) + 1.66;
        assert!((divacancy.activation - expected).abs() < 1e-12);
    }

    #[test]
    fn point_defects_do_not_emit() {
        let params = MaterialParams::default();
        assert_eq!(emission(Species::I, 1, &params), None);
        assert_eq!(emission(Species::V, 1, &params), None);
    }
}
