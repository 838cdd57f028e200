use super::capture::CaptureCriterion;
use super::species::Species;
use crate::core::model::Action;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use thiserror::Error;

/// One entry of a species' action list as written in a material file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionSpec {
    /// Hops of one first-neighbour distance back and forth along the Burgers direction.
    #[serde(rename = "migrate_1D")]
    Migrate1D,
    /// Hops of one first-neighbour distance along either sense of the four ⟨111⟩ axes.
    #[serde(rename = "migrate_3D")]
    Migrate3D,
    #[serde(rename = "emit")]
    Emit,
    #[serde(rename = "rotate")]
    Rotate,
}

impl ActionSpec {
    fn expand(self) -> Vec<Action> {
        match self {
            ActionSpec::Migrate1D => (0..2).map(Action::Migrate).collect(),
            ActionSpec::Migrate3D => (0..8).map(Action::Migrate).collect(),
            ActionSpec::Emit => vec![Action::Emit],
            ActionSpec::Rotate => vec![Action::Rotate],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionTable {
    #[serde(rename = "I")]
    pub interstitial: Vec<ActionSpec>,
    #[serde(rename = "V")]
    pub vacancy: Vec<ActionSpec>,
    #[serde(rename = "ICluster")]
    pub interstitial_cluster: Vec<ActionSpec>,
    #[serde(rename = "VCluster")]
    pub vacancy_cluster: Vec<ActionSpec>,
    #[serde(rename = "ILoop111")]
    pub loop_111: Vec<ActionSpec>,
}

impl Default for ActionTable {
    fn default() -> Self {
        use ActionSpec::*;
        Self {
            interstitial: vec![Migrate1D, Rotate],
            vacancy: vec![Migrate3D],
            interstitial_cluster: vec![Migrate1D, Rotate, Emit],
            vacancy_cluster: vec![Migrate3D, Emit],
            loop_111: vec![Migrate1D, Emit],
        }
    }
}

impl ActionTable {
    pub fn specs(&self, species: Species) -> &[ActionSpec] {
        match species {
            Species::I => &self.interstitial,
            Species::V => &self.vacancy,
            Species::ICluster => &self.interstitial_cluster,
            Species::VCluster => &self.vacancy_cluster,
            Species::ILoop111 => &self.loop_111,
        }
    }

    /// The concrete action list of `species`, with migration expanded into one action per
    /// jump direction.
    pub fn actions(&self, species: Species) -> Vec<Action> {
        self.specs(species)
            .iter()
            .flat_map(|spec| spec.expand())
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        for species in Species::ALL {
            let specs = self.specs(species);
            let count = |wanted: ActionSpec| specs.iter().filter(|&&s| s == wanted).count();

            let migrations = count(ActionSpec::Migrate1D) + count(ActionSpec::Migrate3D);
            if migrations > 1 || count(ActionSpec::Emit) > 1 || count(ActionSpec::Rotate) > 1 {
                return Err(format!("species {} lists an action more than once", species));
            }
            if !species.is_oriented()
                && (count(ActionSpec::Migrate1D) > 0 || count(ActionSpec::Rotate) > 0)
            {
                return Err(format!(
                    "species {} has no Burgers direction for 1D migration or rotation",
                    species
                ));
            }
            if species == species.point() && count(ActionSpec::Emit) > 0 {
                return Err(format!("point defect {} cannot emit", species));
            }
            if species == Species::ILoop111 && count(ActionSpec::Rotate) > 0 {
                return Err("ILoop111 has no rotation barrier".to_string());
            }
        }
        Ok(())
    }
}

/// Material constants of the tungsten model. Lengths are in nm, energies in eV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct MaterialParams {
    pub lattice_constant: f64,
    /// Shear modulus in eV/nm³.
    pub shear_modulus: f64,
    pub poisson_ratio: f64,
    /// Capture shell of interstitial-type disks; one lattice constant when absent.
    pub interstitial_capture_shell: Option<f64>,
    /// Capture shell of vacancy-type spheres; half a lattice constant when absent.
    pub vacancy_capture_shell: Option<f64>,
    pub capture: CaptureCriterion,
    pub actions: ActionTable,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            lattice_constant: 0.3165,
            shear_modulus: 161.0 / 1.602_176_634 * 10.0,
            poisson_ratio: 0.28,
            interstitial_capture_shell: None,
            vacancy_capture_shell: None,
            capture: CaptureCriterion::default(),
            actions: ActionTable::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid material parameters: {0}")]
    Invalid(String),
}

impl MaterialParams {
    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let params: Self = toml::from_str(&content).map_err(|e| ParamLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamLoadError> {
        let positive = [
            ("lattice-constant", self.lattice_constant),
            ("shear-modulus", self.shear_modulus),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ParamLoadError::Invalid(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(-1.0..0.5).contains(&self.poisson_ratio) {
            return Err(ParamLoadError::Invalid(format!(
                "poisson-ratio must lie in [-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        for shell in [self.interstitial_capture_shell, self.vacancy_capture_shell]
            .into_iter()
            .flatten()
        {
            if !(shell.is_finite() && shell >= 0.0) {
                return Err(ParamLoadError::Invalid(format!(
                    "capture shells must be non-negative, got {}",
                    shell
                )));
            }
        }
        self.actions.validate().map_err(ParamLoadError::Invalid)
    }

    /// First-neighbour distance of the bcc lattice, which is also the ⟨111⟩ Burgers length.
    #[inline]
    pub fn first_neighbor(&self) -> f64 {
        3.0_f64.sqrt() * 0.5 * self.lattice_constant
    }

    #[inline]
    pub fn atomic_volume(&self) -> f64 {
        0.5 * self.lattice_constant.powi(3)
    }

    pub fn interstitial_shell(&self) -> f64 {
        self.interstitial_capture_shell
            .unwrap_or(self.lattice_constant)
    }

    pub fn vacancy_shell(&self) -> f64 {
        self.vacancy_capture_shell
            .unwrap_or(0.5 * self.lattice_constant)
    }

    pub(crate) fn disk_disk_prefactor(&self) -> f64 {
        self.shear_modulus / (4.0 * PI * (1.0 - self.poisson_ratio))
    }

    pub(crate) fn sphere_disk_prefactor(&self) -> f64 {
        (1.0 + self.poisson_ratio) / (1.0 - self.poisson_ratio) * self.shear_modulus / (3.0 * PI)
    }
}
