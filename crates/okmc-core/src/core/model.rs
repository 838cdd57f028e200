use super::defect::DefectState;
use super::io::descriptor::DefectDescriptor;
use nalgebra::{Point3, Vector3};
use rand::RngCore;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

/// Boltzmann constant in eV/K.
pub const BOLTZMANN_EV: f64 = 8.617_333_262e-5;

/// One transition channel of a defect. Migration carries the index of its jump direction so
/// that a species with several equivalent destinations exposes one rate per destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Migrate(u8),
    Emit,
    Rotate,
    Transform,
}

impl Action {
    #[inline]
    pub fn is_migration(&self) -> bool {
        matches!(self, Action::Migrate(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Migrate(direction) => write!(f, "migrate_{}", direction),
            Action::Emit => write!(f, "emit"),
            Action::Rotate => write!(f, "rotate"),
            Action::Transform => write!(f, "transform"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Sphere,
    Disk,
}

/// Shape parameters of a defect of a given kind and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub shape: Shape,
    /// Characteristic radius of the object (loop radius or void radius).
    pub rho: f64,
    /// Capture shell thickness added to `rho` for recombination tests.
    pub delta_rho: f64,
}

impl Geometry {
    #[inline]
    pub fn capture_radius(&self) -> f64 {
        self.rho + self.delta_rho
    }
}

/// Which point-defect family a species belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Interstitial,
    Vacancy,
}

/// Prefactor and activation energy of a thermally activated transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrhenius {
    /// Attempt frequency in Hz.
    pub prefactor: f64,
    /// Barrier in eV.
    pub activation: f64,
}

impl Arrhenius {
    pub fn new(prefactor: f64, activation: f64) -> Self {
        Self {
            prefactor,
            activation,
        }
    }

    #[inline]
    pub fn rate(&self, temperature: f64) -> f64 {
        self.rate_with_activation(self.activation, temperature)
    }

    #[inline]
    pub fn rate_with_activation(&self, activation: f64, temperature: f64) -> f64 {
        self.prefactor * (-activation / (BOLTZMANN_EV * temperature)).exp()
    }
}

/// The defect states produced by one committed action.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<K> {
    /// Migration, rotation and transformation replace the object in place.
    Single(DefectState<K>),
    /// Emission replaces the body and releases a new point defect.
    Split {
        body: DefectState<K>,
        emitted: DefectState<K>,
    },
}

impl<K> Transition<K> {
    pub fn into_parts(self) -> (DefectState<K>, Option<DefectState<K>>) {
        match self {
            Transition::Single(state) => (state, None),
            Transition::Split { body, emitted } => (body, Some(emitted)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recombination<K> {
    None,
    Annihilate,
    Merge(DefectState<K>),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown defect species: '{0}'")]
    UnknownSpecies(String),

    #[error("Species {kind} does not support action '{action}'")]
    UnsupportedAction { kind: String, action: Action },

    #[error("Size {size} is outside the valid range for species {kind}")]
    SizeOutOfRange { kind: String, size: u32 },

    #[error("Species {0} requires an orientation but none was given")]
    MissingOrientation(String),
}

/// The physics a [`KineticEngine`](crate::engine::kinetic::KineticEngine) runs on.
///
/// The engine never interprets energies, prefactors or shapes itself; it only calls through this
/// trait. Implementations must be deterministic in every method except [`transition`] and
/// [`complete`], which receive the random stream explicitly.
///
/// [`transition`]: PhysicalModel::transition
/// [`complete`]: PhysicalModel::complete
pub trait PhysicalModel: Send + Sync {
    /// The closed set of species tags understood by this model.
    type Kind: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync;

    /// Resolves a species name as it appears in defect descriptors.
    fn parse_kind(&self, name: &str) -> Result<Self::Kind, ModelError>;

    fn polarity(&self, kind: Self::Kind) -> Polarity;

    /// Shape parameters for a defect of `kind` and `size`.
    fn geometry(&self, kind: Self::Kind, size: u32) -> Geometry;

    /// The ordered action set of a species. The same list must be returned on every call.
    fn actions_for(&self, kind: Self::Kind) -> Arc<[Action]>;

    /// Prefactor and bare activation energy of `action` for `state`.
    fn barrier(
        &self,
        state: &DefectState<Self::Kind>,
        action: Action,
    ) -> Result<Arrhenius, ModelError>;

    /// Bare transition rate at `temperature` without interaction or trap corrections.
    fn base_rate(
        &self,
        state: &DefectState<Self::Kind>,
        action: Action,
        temperature: f64,
    ) -> Result<f64, ModelError> {
        Ok(self.barrier(state, action)?.rate(temperature))
    }

    /// Interaction energy in eV between `a` and `b`, where `displacement` points from `a` to `b`.
    ///
    /// Must satisfy `pair_energy(a, b, d) == pair_energy(b, a, -d)`.
    fn pair_energy(
        &self,
        a: &DefectState<Self::Kind>,
        b: &DefectState<Self::Kind>,
        displacement: &Vector3<f64>,
    ) -> f64;

    /// Outcome of `a` and `b` meeting at separation `displacement` (pointing from `a` to `b`).
    fn recombination(
        &self,
        a: &DefectState<Self::Kind>,
        b: &DefectState<Self::Kind>,
        displacement: &Vector3<f64>,
    ) -> Recombination<Self::Kind>;

    /// The species a defect of family `kind` belongs to once its size becomes `new_size`.
    fn kind_after_size_change(&self, kind: Self::Kind, new_size: u32) -> Self::Kind;

    /// A deterministic representative outcome of `action`, used only to evaluate the energy of a
    /// hypothetical move while computing rates. Nothing is committed.
    fn trial_transition(
        &self,
        state: &DefectState<Self::Kind>,
        action: Action,
    ) -> Result<Transition<Self::Kind>, ModelError>;

    /// The actual outcome of `action`, drawing any random choices from `rng`.
    fn transition(
        &self,
        state: &DefectState<Self::Kind>,
        action: Action,
        rng: &mut dyn RngCore,
    ) -> Result<Transition<Self::Kind>, ModelError>;

    /// Fills in anything a freshly described defect is missing, such as a random orientation
    /// for an oriented species.
    fn complete(
        &self,
        state: DefectState<Self::Kind>,
        _rng: &mut dyn RngCore,
    ) -> DefectState<Self::Kind> {
        state
    }
}

/// Turns a raw descriptor into a defect state understood by `model`.
///
/// The species is canonicalized through [`PhysicalModel::kind_after_size_change`], so a
/// descriptor naming a cluster of size one yields the corresponding point defect.
pub fn materialize<M: PhysicalModel>(
    model: &M,
    descriptor: &DefectDescriptor,
    rng: &mut dyn RngCore,
) -> Result<DefectState<M::Kind>, ModelError> {
    let named = model.parse_kind(&descriptor.kind)?;
    if descriptor.size == 0 {
        return Err(ModelError::SizeOutOfRange {
            kind: descriptor.kind.clone(),
            size: 0,
        });
    }
    let kind = model.kind_after_size_change(named, descriptor.size);
    let mut state = DefectState::new(kind, descriptor.size, Point3::from(descriptor.position));
    if let Some(orientation) = descriptor.orientation {
        state = state.with_orientation(Vector3::from(orientation));
    }
    Ok(model.complete(state, rng))
}

/// The descriptor that reproduces `state` when read back.
pub fn describe<K: fmt::Display>(state: &DefectState<K>) -> DefectDescriptor {
    DefectDescriptor {
        kind: state.kind.to_string(),
        size: state.size,
        position: state.position.coords.into(),
        orientation: state.orientation.map(Into::into),
    }
}
