use okmc::engine::config::{DEFAULT_ACTIVATION_BOUND, DEFAULT_MAX_NEIGHBORS};
use okmc::engine::snapshot::OutputCadence;
use okmc::workflows::anneal::OffsetMode;
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub periodic: [bool; 3],
    pub cutoff: f64,
    pub max_neighbors: usize,
    pub max_image: [i64; 3],
    pub temperature: f64,
    pub seed: u64,
    pub elastic_interaction: bool,
    pub activation_bound: f64,
    pub initial_recombination: bool,
    pub output_directory: PathBuf,
    pub cadence: OutputCadence,
    pub recenter: bool,
    pub cascades: usize,
    pub offset: OffsetMode,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            periodic: [true; 3],
            cutoff: 2.0,
            max_neighbors: DEFAULT_MAX_NEIGHBORS,
            max_image: [1; 3],
            temperature: 300.0,
            seed: 42,
            elastic_interaction: false,
            activation_bound: DEFAULT_ACTIVATION_BOUND,
            initial_recombination: true,
            output_directory: PathBuf::from("okmc-output"),
            cadence: OutputCadence::StepExp(2.0),
            recenter: false,
            cascades: 1,
            offset: OffsetMode::Xy,
        }
    }
}
