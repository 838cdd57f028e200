//! Reference physical model for point defects, clusters and ⟨111⟩ loops in bcc tungsten.

pub mod barriers;
pub mod bodies;
pub mod capture;
pub mod elastic;
pub mod lattice;
pub mod params;
pub mod species;

pub use capture::CaptureCriterion;
pub use params::{ActionSpec, ActionTable, MaterialParams, ParamLoadError};
pub use species::Species;

use self::bodies::{Body, DiskBody, SphereBody};
use crate::core::defect::DefectState;
use crate::core::model::{
    Action, Arrhenius, Geometry, ModelError, PhysicalModel, Polarity, Recombination, Shape,
    Transition,
};
use nalgebra::Vector3;
use rand::{Rng, RngCore};
use std::f64::consts::PI;
use std::sync::Arc;

/// Where an emitted point defect is placed relative to its parent.
enum Placement<'a> {
    /// The fixed representative placement used while evaluating rates.
    Reference,
    Random(&'a mut dyn RngCore),
}

#[derive(Debug, Clone)]
pub struct TungstenModel {
    params: MaterialParams,
    actions: [Arc<[Action]>; 5],
}

impl Default for TungstenModel {
    fn default() -> Self {
        Self::build(MaterialParams::default())
    }
}

impl TungstenModel {
    pub fn new(params: MaterialParams) -> Result<Self, ParamLoadError> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: MaterialParams) -> Self {
        let actions = Species::ALL.map(|species| Arc::from(params.actions.actions(species)));
        Self { params, actions }
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    fn body(&self, state: &DefectState<Species>) -> Body {
        let geometry = self.geometry(state.kind, state.size);
        match (geometry.shape, state.orientation) {
            (Shape::Disk, Some(normal)) => Body::Disk(DiskBody {
                normal,
                burgers: self.params.first_neighbor(),
                rho: geometry.rho,
                delta_rho: geometry.delta_rho,
            }),
            (Shape::Disk, None) => Body::Unoriented {
                radius: geometry.capture_radius(),
            },
            (Shape::Sphere, _) => Body::Sphere(SphereBody {
                radius: geometry.capture_radius(),
                relax_volume: self.relaxation_volume(state.kind, state.size),
            }),
        }
    }

    fn relaxation_volume(&self, species: Species, size: u32) -> f64 {
        let omega = self.params.atomic_volume();
        match species {
            Species::VCluster => -0.531 * f64::from(size).powf(2.0 / 3.0) * omega,
            _ => -0.37 * omega,
        }
    }

    fn unsupported(state: &DefectState<Species>, action: Action) -> ModelError {
        ModelError::UnsupportedAction {
            kind: state.kind.to_string(),
            action,
        }
    }

    fn orientation(state: &DefectState<Species>) -> Result<Vector3<f64>, ModelError> {
        state
            .orientation
            .ok_or_else(|| ModelError::MissingOrientation(state.kind.to_string()))
    }

    fn check(&self, state: &DefectState<Species>, action: Action) -> Result<(), ModelError> {
        if !state.kind.accepts_size(state.size) {
            return Err(ModelError::SizeOutOfRange {
                kind: state.kind.to_string(),
                size: state.size,
            });
        }
        if !self.actions[state.kind as usize].contains(&action) {
            return Err(Self::unsupported(state, action));
        }
        Ok(())
    }

    /// Displacement of the `direction`-th migration hop.
    fn jump(&self, state: &DefectState<Species>, direction: u8) -> Result<Vector3<f64>, ModelError> {
        let specs = self.params.actions.specs(state.kind);
        let sign = if direction % 2 == 0 { 1.0 } else { -1.0 };
        let step = sign * self.params.first_neighbor();
        if specs.contains(&ActionSpec::Migrate1D) {
            Ok(Self::orientation(state)? * step)
        } else if specs.contains(&ActionSpec::Migrate3D) {
            Ok(lattice::unit_111(usize::from(direction / 2)) * step)
        } else {
            Err(Self::unsupported(state, Action::Migrate(direction)))
        }
    }

    fn rotated(
        state: &DefectState<Species>,
        component: usize,
    ) -> Result<Transition<Species>, ModelError> {
        let orientation = Self::orientation(state)?;
        Ok(Transition::Single(DefectState {
            orientation: Some(lattice::flip_component(&orientation, component)),
            ..state.clone()
        }))
    }

    fn emitted(
        &self,
        state: &DefectState<Species>,
        placement: Placement<'_>,
    ) -> Result<Transition<Species>, ModelError> {
        let rho = self.geometry(state.kind, state.size).rho;
        let hop = 2.0 * self.params.lattice_constant;
        let offset = match (state.orientation, placement) {
            (Some(axis), Placement::Reference) => {
                lattice::reference_perpendicular(&axis) * rho + axis * hop
            }
            (Some(axis), Placement::Random(rng)) => {
                let across = lattice::random_perpendicular(&axis, &mut *rng);
                across * rho + lattice::random_unit_111(&mut *rng) * hop
            }
            (None, Placement::Reference) => Vector3::x() * (rho + hop),
            (None, Placement::Random(rng)) => lattice::random_unit_vector(rng) * (rho + hop),
        };

        let remaining = state.size - 1;
        let body_kind = state.kind.with_size(remaining);
        let point = state.kind.point();
        let body = DefectState {
            kind: body_kind,
            size: remaining,
            position: state.position,
            orientation: state.orientation.filter(|_| body_kind.is_oriented()),
        };
        let emitted = DefectState {
            kind: point,
            size: 1,
            position: state.position + offset,
            orientation: state.orientation.filter(|_| point.is_oriented()),
        };
        Ok(Transition::Split { body, emitted })
    }

    fn realize(
        &self,
        state: &DefectState<Species>,
        action: Action,
        placement: Placement<'_>,
    ) -> Result<Transition<Species>, ModelError> {
        self.check(state, action)?;
        match (action, placement) {
            (Action::Migrate(direction), _) => {
                let step = self.jump(state, direction)?;
                Ok(Transition::Single(state.translated(&step)))
            }
            (Action::Rotate, Placement::Reference) => Self::rotated(state, 0),
            (Action::Rotate, Placement::Random(rng)) => Self::rotated(state, rng.gen_range(0..3)),
            (Action::Emit, placement) => self.emitted(state, placement),
            (Action::Transform, _) => Err(Self::unsupported(state, action)),
        }
    }
}

impl PhysicalModel for TungstenModel {
    type Kind = Species;

    fn parse_kind(&self, name: &str) -> Result<Species, ModelError> {
        Species::from_name(name).ok_or_else(|| ModelError::UnknownSpecies(name.to_string()))
    }

    fn polarity(&self, kind: Species) -> Polarity {
        kind.polarity()
    }

    fn geometry(&self, kind: Species, size: u32) -> Geometry {
        let a = self.params.lattice_constant;
        let n = f64::from(size);
        match kind.shape() {
            Shape::Disk => Geometry {
                shape: Shape::Disk,
                rho: a * (n / (PI * 3.0_f64.sqrt())).sqrt(),
                delta_rho: self.params.interstitial_shell(),
            },
            Shape::Sphere => Geometry {
                shape: Shape::Sphere,
                rho: a * (3.0 * n / (8.0 * PI)).cbrt(),
                delta_rho: self.params.vacancy_shell(),
            },
        }
    }

    fn actions_for(&self, kind: Species) -> Arc<[Action]> {
        self.actions[kind as usize].clone()
    }

    fn barrier(&self, state: &DefectState<Species>, action: Action) -> Result<Arrhenius, ModelError> {
        self.check(state, action)?;
        let barrier = match action {
            Action::Migrate(_) => Some(barriers::migration(state.kind, state.size)),
            Action::Rotate => barriers::rotation(state.kind, state.size),
            Action::Emit => barriers::emission(state.kind, state.size, &self.params),
            Action::Transform => None,
        };
        barrier.ok_or_else(|| Self::unsupported(state, action))
    }

    fn pair_energy(
        &self,
        a: &DefectState<Species>,
        b: &DefectState<Species>,
        displacement: &Vector3<f64>,
    ) -> f64 {
        match (self.body(a), self.body(b)) {
            (Body::Disk(disk_a), Body::Disk(disk_b)) => elastic::disk_disk(
                self.params.disk_disk_prefactor(),
                self.params.poisson_ratio,
                &disk_a,
                &disk_b,
                displacement,
            ),
            (Body::Sphere(sphere), Body::Disk(disk)) => elastic::sphere_disk(
                self.params.sphere_disk_prefactor(),
                &sphere,
                &disk,
                displacement,
            ),
            (Body::Disk(disk), Body::Sphere(sphere)) => elastic::sphere_disk(
                self.params.sphere_disk_prefactor(),
                &sphere,
                &disk,
                &(-displacement),
            ),
            _ => 0.0,
        }
    }

    fn recombination(
        &self,
        a: &DefectState<Species>,
        b: &DefectState<Species>,
        displacement: &Vector3<f64>,
    ) -> Recombination<Species> {
        if !capture::captures(&self.body(a), &self.body(b), displacement, self.params.capture) {
            return Recombination::None;
        }

        let larger = if a.size >= b.size { a } else { b };
        if a.kind.polarity() == b.kind.polarity() {
            let size = a.size + b.size;
            let kind = larger.kind.with_size(size);
            let weight = f64::from(b.size) / f64::from(size);
            return Recombination::Merge(DefectState {
                kind,
                size,
                position: a.position + displacement * weight,
                orientation: larger.orientation.filter(|_| kind.is_oriented()),
            });
        }

        let size = a.size.abs_diff(b.size);
        if size == 0 {
            return Recombination::Annihilate;
        }
        let kind = larger.kind.with_size(size);
        Recombination::Merge(DefectState {
            kind,
            size,
            position: larger.position,
            orientation: larger.orientation.filter(|_| kind.is_oriented()),
        })
    }

    fn kind_after_size_change(&self, kind: Species, new_size: u32) -> Species {
        kind.with_size(new_size)
    }

    fn trial_transition(
        &self,
        state: &DefectState<Species>,
        action: Action,
    ) -> Result<Transition<Species>, ModelError> {
        self.realize(state, action, Placement::Reference)
    }

    fn transition(
        &self,
        state: &DefectState<Species>,
        action: Action,
        rng: &mut dyn RngCore,
    ) -> Result<Transition<Species>, ModelError> {
        self.realize(state, action, Placement::Random(rng))
    }

    fn complete(&self, mut state: DefectState<Species>, rng: &mut dyn RngCore) -> DefectState<Species> {
        if !state.kind.is_oriented() {
            state.orientation = None;
        } else if state.orientation.is_none() {
            state.orientation = Some(lattice::random_unit_111(rng));
        }
        state
    }
}
