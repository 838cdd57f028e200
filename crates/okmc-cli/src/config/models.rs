use okmc::core::trap::TrapSpecies;
use okmc::core::tungsten::MaterialParams;
use okmc::workflows::anneal::{AnnealConfig, OffsetMode};
use std::path::PathBuf;

pub struct AppConfig {
    pub output_dir: PathBuf,
    pub cascade_files: Vec<PathBuf>,
    pub material: MaterialParams,
    pub traps: Vec<TrapSpecies>,
    pub anneal: AnnealConfig,
    /// Number of cascades for cumulative annealing; unused by individual annealing.
    pub stages: usize,
    pub offset: OffsetMode,
}
