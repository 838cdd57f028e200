use crate::error::{CliError, Result};
use okmc::core::trap::TrapSpecies;
use okmc::core::tungsten::MaterialParams;
use okmc::engine::snapshot::OutputCadence;
use okmc::workflows::anneal::OffsetMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The run file as written by the user. Every value is optional here; defaults and command-line
/// overrides are merged in by the builder.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub domain: Option<FileDomainConfig>,
    pub run: Option<FileRunConfig>,
    /// Inline material parameters.
    pub material: Option<MaterialParams>,
    /// Material parameters kept in a separate TOML file.
    pub material_file: Option<PathBuf>,
    pub traps: Option<FileTrapConfig>,
    pub output: Option<FileOutputConfig>,
    pub cascade: Option<FileCascadeConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileDomainConfig {
    /// Box lengths in nm.
    #[serde(rename = "box")]
    pub box_lengths: Option<[f64; 3]>,
    pub periodic: Option<[bool; 3]>,
    pub cutoff: Option<f64>,
    pub cell_size: Option<[f64; 3]>,
    pub max_neighbors: Option<usize>,
    pub max_image: Option<[i64; 3]>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRunConfig {
    pub temperature: Option<f64>,
    pub max_time: Option<f64>,
    pub max_steps: Option<u64>,
    pub seed: Option<u64>,
    pub elastic_interaction: Option<bool>,
    pub activation_bound: Option<f64>,
    pub initial_recombination: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileTrapConfig {
    #[serde(default)]
    pub species: Vec<TrapSpecies>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum FileCadence {
    StepUniform { every: u64 },
    TimeUniform { interval: f64 },
    StepExp { factor: f64 },
    TimeExp { factor: f64 },
}

impl From<FileCadence> for OutputCadence {
    fn from(c: FileCadence) -> Self {
        match c {
            FileCadence::StepUniform { every } => OutputCadence::StepUniform(every),
            FileCadence::TimeUniform { interval } => OutputCadence::TimeUniform(interval),
            FileCadence::StepExp { factor } => OutputCadence::StepExp(factor),
            FileCadence::TimeExp { factor } => OutputCadence::TimeExp(factor),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOutputConfig {
    pub directory: Option<PathBuf>,
    pub cadence: Option<FileCadence>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileCascadeConfig {
    pub files: Option<Vec<PathBuf>>,
    pub recenter: Option<bool>,
    /// Number of cascades for cumulative annealing.
    pub count: Option<usize>,
    /// Cascades per nm² of box cross-section, an alternative to `count`.
    pub fluence: Option<f64>,
    pub offset: Option<OffsetMode>,
}

impl FileConfig {
    /// Reads a run file. Relative paths inside it are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading run configuration from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("Failed to parse '{}': {}", path.display(), e))
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(path) = self.material_file.as_mut() {
            rebase(path);
        }
        if let Some(dir) = self.output.as_mut().and_then(|o| o.directory.as_mut()) {
            rebase(dir);
        }
        if let Some(files) = self.cascade.as_mut().and_then(|c| c.files.as_mut()) {
            files.iter_mut().for_each(rebase);
        }
    }
}
