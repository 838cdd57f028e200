use super::geometry::{ImageConvention, SimulationBox};
use super::linkcell::{LinkCellError, SpatialIndex};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Whether a defect currently sits inside a trap, and how strongly it is bound there.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TrapState {
    #[default]
    Free,
    Trapped { site: usize, energy: f64 },
}

impl TrapState {
    /// Extra migration barrier in eV contributed by the trap.
    #[inline]
    pub fn energy(&self) -> f64 {
        match self {
            TrapState::Free => 0.0,
            TrapState::Trapped { energy, .. } => *energy,
        }
    }

    #[inline]
    pub fn is_trapped(&self) -> bool {
        matches!(self, TrapState::Trapped { .. })
    }
}

/// Resolves the trap state of a position inside the primary box.
pub trait TrapLookup: Send + Sync {
    fn lookup(&self, wrapped: &Point3<f64>) -> Result<TrapState, TrapError>;
}

/// How many sites of a trap type to place.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapDensity {
    /// Sites per nm³.
    PerVolume(f64),
    /// Atomic parts per million.
    Appm(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TrapSpecies {
    pub density: TrapDensity,
    /// Capture radius in nm.
    pub radius: f64,
    /// Binding energy in eV, added to the migration barrier of a trapped defect.
    pub energy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapSite {
    pub species: usize,
    pub position: Point3<f64>,
    pub radius: f64,
    pub energy: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrapError {
    #[error("Trap radius {radius} exceeds the lookup cell size {cell}")]
    RadiusExceedsCell { radius: f64, cell: f64 },

    #[error("Trap site {index} lies outside the simulation box")]
    SiteOutsideBox { index: usize },

    #[error("Trap index error: {0}")]
    Index(#[from] LinkCellError),
}

/// A static set of spherical trap sites with a linked-cell lookup.
#[derive(Debug, Clone)]
pub struct TrapField {
    sim_box: SimulationBox,
    sites: Vec<TrapSite>,
    fractionals: Vec<Vector3<f64>>,
    index: SpatialIndex,
}

impl TrapField {
    /// Builds a field from explicit sites. Every site radius must fit within one cell.
    pub fn from_sites(
        sim_box: SimulationBox,
        sites: Vec<TrapSite>,
        cell_size: f64,
    ) -> Result<Self, TrapError> {
        if let Some(site) = sites.iter().find(|s| s.radius > cell_size) {
            return Err(TrapError::RadiusExceedsCell {
                radius: site.radius,
                cell: cell_size,
            });
        }

        let mut fractionals = Vec::with_capacity(sites.len());
        for (index, site) in sites.iter().enumerate() {
            let (fractional, image) = sim_box.wrap(&site.position);
            if image != Vector3::zeros() {
                return Err(TrapError::SiteOutsideBox { index });
            }
            fractionals.push(fractional);
        }

        let mut index = SpatialIndex::new(
            sim_box.lengths(),
            &Vector3::repeat(cell_size),
            sim_box.periodic(),
            sites.len(),
        )?;
        index.rebuild(fractionals.iter())?;

        Ok(Self {
            sim_box,
            sites,
            fractionals,
            index,
        })
    }

    /// Scatters sites of each species uniformly over the box.
    pub fn generate<R: Rng + ?Sized>(
        species: &[TrapSpecies],
        sim_box: SimulationBox,
        atomic_volume: f64,
        rng: &mut R,
    ) -> Result<Self, TrapError> {
        let volume = sim_box.volume();
        let mut sites = Vec::new();
        for (type_id, trap) in species.iter().enumerate() {
            let expected = match trap.density {
                TrapDensity::PerVolume(density) => density * volume,
                TrapDensity::Appm(appm) => appm * 1.0e-6 * volume / atomic_volume,
            };
            let count = expected.round().max(0.0) as usize;
            debug!(type_id, count, "Generating trap sites.");
            for _ in 0..count {
                let fractional = Vector3::new(rng.r#gen::<f64>(), rng.r#gen::<f64>(), rng.r#gen::<f64>());
                sites.push(TrapSite {
                    species: type_id,
                    position: sim_box.to_cartesian(&fractional),
                    radius: trap.radius,
                    energy: trap.energy,
                });
            }
        }

        let cell_size = species
            .iter()
            .map(|s| s.radius)
            .fold(0.0_f64, f64::max)
            .max(sim_box.lengths().min() / 64.0);
        Self::from_sites(sim_box, sites, cell_size)
    }

    pub fn sites(&self) -> &[TrapSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    fn candidates(&self, fractional: &Vector3<f64>) -> Result<Vec<usize>, TrapError> {
        let mut candidates = self.index.around(fractional)?;
        // Descending chains; ascending order makes the lowest-numbered site win ties.
        candidates.sort_unstable();
        Ok(candidates)
    }
}

impl TrapLookup for TrapField {
    /// Fails only for a position that maps to no cell, such as one with a NaN coordinate.
    fn lookup(&self, wrapped: &Point3<f64>) -> Result<TrapState, TrapError> {
        if self.sites.is_empty() {
            return Ok(TrapState::Free);
        }
        let (fractional, _) = self.sim_box.wrap(wrapped);
        for site_index in self.candidates(&fractional)? {
            let site = &self.sites[site_index];
            let site_wrapped = self.sim_box.to_cartesian(&self.fractionals[site_index]);
            let distance = self
                .sim_box
                .separation(wrapped, &site_wrapped, ImageConvention::Periodic)
                .norm();
            if distance < site.radius {
                return Ok(TrapState::Trapped {
                    site: site_index,
                    energy: site.energy,
                });
            }
        }
        Ok(TrapState::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn field(periodic: [bool; 3]) -> TrapField {
        let sim_box = SimulationBox::new([20.0, 20.0, 20.0], periodic);
        let sites = vec![
            TrapSite {
                species: 0,
                position: Point3::new(0.5, 10.0, 10.0),
                radius: 1.0,
                energy: 0.8,
            },
            TrapSite {
                species: 1,
                position: Point3::new(10.0, 10.0, 10.0),
                radius: 1.5,
                energy: 0.3,
            },
        ];
        TrapField::from_sites(sim_box, sites, 2.0).unwrap()
    }

    #[test]
    fn lookup_finds_site_within_radius() {
        let field = field([true; 3]);
        let state = field.lookup(&Point3::new(10.5, 10.5, 10.0)).unwrap();
        assert_eq!(state, TrapState::Trapped { site: 1, energy: 0.3 });
        assert_eq!(state.energy(), 0.3);
        assert_eq!(field.lookup(&Point3::new(5.0, 5.0, 5.0)), Ok(TrapState::Free));
    }

    #[test]
    fn lookup_respects_periodicity() {
        let point = Point3::new(19.8, 10.0, 10.0);
        assert!(field([true; 3]).lookup(&point).unwrap().is_trapped());
        assert!(!field([false, true, true]).lookup(&point).unwrap().is_trapped());
    }

    #[test]
    fn unindexable_position_is_an_error() {
        let field = field([true; 3]);
        assert!(matches!(
            field.lookup(&Point3::new(f64::NAN, 10.0, 10.0)),
            Err(TrapError::Index(LinkCellError::CellOutOfRange { axis: 0, .. }))
        ));
    }

    #[test]
    fn oversized_radius_is_rejected() {
        let sim_box = SimulationBox::new([20.0, 20.0, 20.0], [true; 3]);
        let site = TrapSite {
            species: 0,
            position: Point3::new(1.0, 1.0, 1.0),
            radius: 3.0,
            energy: 1.0,
        };
        assert!(matches!(
            TrapField::from_sites(sim_box, vec![site], 2.0),
            Err(TrapError::RadiusExceedsCell { .. })
        ));
    }

    #[test]
    fn generate_places_expected_number_of_sites_inside_the_box() {
        let sim_box = SimulationBox::new([10.0, 10.0, 10.0], [true; 3]);
        let species = [
            TrapSpecies {
                density: TrapDensity::PerVolume(0.05),
                radius: 0.5,
                energy: 1.0,
            },
            TrapSpecies {
                density: TrapDensity::Appm(1000.0),
                radius: 0.5,
                energy: 0.5,
            },
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let field = TrapField::generate(&species, sim_box, 0.0158, &mut rng).unwrap();

        let expected_appm = (1000.0e-6_f64 * 1000.0 / 0.0158).round() as usize;
        assert_eq!(field.len(), 50 + expected_appm);
        assert!(field.sites().iter().all(|s| {
            (0..3).all(|k| s.position[k] >= 0.0 && s.position[k] < 10.0)
        }));
    }
}
