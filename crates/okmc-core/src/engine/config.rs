use crate::core::geometry::SimulationBox;
use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Geometry of the simulated domain and its neighbour-search grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainConfig {
    /// Box edge lengths in nm.
    pub box_lengths: [f64; 3],
    pub periodic: [bool; 3],
    /// Linked-cell edge lengths in nm; each must be at least `cutoff`.
    pub cell_size: [f64; 3],
    /// Interaction cutoff in nm.
    pub cutoff: f64,
    /// Sanity bound on the size of one 27-cell neighbour query.
    pub max_neighbors: usize,
    /// Largest tolerated image offset per periodic axis before a defect counts as escaped.
    pub max_image: [i64; 3],
}

impl DomainConfig {
    pub fn simulation_box(&self) -> SimulationBox {
        SimulationBox::new(self.box_lengths, self.periodic)
    }

    /// Per-axis escape bound: the configured image limit on periodic axes, zero elsewhere.
    pub fn escape_bound(&self) -> Vector3<i64> {
        Vector3::from_fn(|k, _| self.max_image[k] * i64::from(self.periodic[k]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunBounds {
    /// Simulated seconds.
    pub max_time: f64,
    pub max_steps: u64,
}

impl Default for RunBounds {
    fn default() -> Self {
        Self {
            max_time: f64::INFINITY,
            max_steps: u64::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub domain: DomainConfig,
    /// Kelvin.
    pub temperature: f64,
    pub elastic_interaction: bool,
    /// Symmetric clamp, in eV, applied to interaction-corrected activation energies.
    pub activation_bound: f64,
    pub initial_recombination: bool,
    pub bounds: RunBounds,
    pub seed: u64,
}

pub const DEFAULT_ACTIVATION_BOUND: f64 = 10.0;
pub const DEFAULT_MAX_NEIGHBORS: usize = 1000;

#[derive(Default)]
pub struct EngineConfigBuilder {
    box_lengths: Option<[f64; 3]>,
    periodic: Option<[bool; 3]>,
    cell_size: Option<[f64; 3]>,
    cutoff: Option<f64>,
    max_neighbors: Option<usize>,
    max_image: Option<[i64; 3]>,
    temperature: Option<f64>,
    elastic_interaction: Option<bool>,
    activation_bound: Option<f64>,
    initial_recombination: Option<bool>,
    max_time: Option<f64>,
    max_steps: Option<u64>,
    seed: Option<u64>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn box_lengths(mut self, lengths: [f64; 3]) -> Self {
        self.box_lengths = Some(lengths);
        self
    }
    pub fn periodic(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = Some(periodic);
        self
    }
    pub fn cell_size(mut self, size: [f64; 3]) -> Self {
        self.cell_size = Some(size);
        self
    }
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }
    pub fn max_neighbors(mut self, bound: usize) -> Self {
        self.max_neighbors = Some(bound);
        self
    }
    pub fn max_image(mut self, bound: [i64; 3]) -> Self {
        self.max_image = Some(bound);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn elastic_interaction(mut self, enabled: bool) -> Self {
        self.elastic_interaction = Some(enabled);
        self
    }
    pub fn activation_bound(mut self, bound: f64) -> Self {
        self.activation_bound = Some(bound);
        self
    }
    pub fn initial_recombination(mut self, enabled: bool) -> Self {
        self.initial_recombination = Some(enabled);
        self
    }
    pub fn max_time(mut self, seconds: f64) -> Self {
        self.max_time = Some(seconds);
        self
    }
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let box_lengths = self
            .box_lengths
            .ok_or(ConfigError::MissingParameter("box_lengths"))?;
        let cutoff = self.cutoff.ok_or(ConfigError::MissingParameter("cutoff"))?;
        let cell_size = self.cell_size.unwrap_or([cutoff; 3]);
        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;

        if !(cutoff > 0.0) {
            return Err(invalid("cutoff", format!("must be positive, got {cutoff}")));
        }
        for axis in 0..3 {
            if !(box_lengths[axis] > 0.0) {
                return Err(invalid(
                    "box_lengths",
                    format!("axis {axis} has non-positive length {}", box_lengths[axis]),
                ));
            }
            if cell_size[axis] < cutoff {
                return Err(invalid(
                    "cell_size",
                    format!(
                        "axis {axis} cell {} is smaller than the cutoff {cutoff}",
                        cell_size[axis]
                    ),
                ));
            }
            if cell_size[axis] > box_lengths[axis] {
                return Err(invalid(
                    "cell_size",
                    format!(
                        "axis {axis} cell {} is larger than the box {}",
                        cell_size[axis], box_lengths[axis]
                    ),
                ));
            }
        }
        if !(temperature > 0.0) {
            return Err(invalid(
                "temperature",
                format!("must be positive, got {temperature}"),
            ));
        }

        let activation_bound = self.activation_bound.unwrap_or(DEFAULT_ACTIVATION_BOUND);
        if !(activation_bound > 0.0) {
            return Err(invalid(
                "activation_bound",
                format!("must be positive, got {activation_bound}"),
            ));
        }
        let max_neighbors = self.max_neighbors.unwrap_or(DEFAULT_MAX_NEIGHBORS);
        if max_neighbors == 0 {
            return Err(invalid("max_neighbors", "must be at least 1".to_string()));
        }
        let max_image = self.max_image.unwrap_or([1; 3]);
        if max_image.iter().any(|&m| m < 0) {
            return Err(invalid("max_image", "must not be negative".to_string()));
        }

        let bounds = RunBounds {
            max_time: self.max_time.unwrap_or(f64::INFINITY),
            max_steps: self.max_steps.unwrap_or(u64::MAX),
        };
        if !(bounds.max_time > 0.0) {
            return Err(invalid("max_time", "must be positive".to_string()));
        }

        Ok(EngineConfig {
            domain: DomainConfig {
                box_lengths,
                periodic: self.periodic.unwrap_or([true; 3]),
                cell_size,
                cutoff,
                max_neighbors,
                max_image,
            },
            temperature,
            elastic_interaction: self.elastic_interaction.unwrap_or(false),
            activation_bound,
            initial_recombination: self.initial_recombination.unwrap_or(true),
            bounds,
            seed: self.seed.unwrap_or(0),
        })
    }
}

fn invalid(parameter: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { parameter, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
            .box_lengths([20.0, 20.0, 20.0])
            .cutoff(2.0)
            .temperature(600.0)
    }

    #[test]
    fn build_fills_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.domain.cell_size, [2.0; 3]);
        assert_eq!(config.domain.periodic, [true; 3]);
        assert_eq!(config.activation_bound, DEFAULT_ACTIVATION_BOUND);
        assert!(config.initial_recombination);
        assert!(!config.elastic_interaction);
        assert_eq!(config.bounds, RunBounds::default());
    }

    #[test]
    fn build_fails_if_required_parameter_is_missing() {
        let result = EngineConfigBuilder::new()
            .box_lengths([20.0; 3])
            .cutoff(2.0)
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("temperature")));
    }

    #[test]
    fn cell_smaller_than_cutoff_is_rejected() {
        let result = base().cell_size([2.0, 1.5, 2.0]).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                parameter: "cell_size",
                ..
            })
        ));
    }

    #[test]
    fn cell_larger_than_box_is_rejected() {
        let result = base().cell_size([2.0, 2.0, 25.0]).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                parameter: "cell_size",
                ..
            })
        ));
    }

    #[test]
    fn escape_bound_is_zero_on_open_axes() {
        let config = base()
            .periodic([true, true, false])
            .max_image([3, 2, 5])
            .build()
            .unwrap();
        assert_eq!(config.domain.escape_bound(), Vector3::new(3, 2, 0));
    }
}
