//! A small deterministic physical model shared by the unit tests.

use crate::core::defect::DefectState;
use crate::core::model::{
    Action, Arrhenius, Geometry, ModelError, PhysicalModel, Polarity, Recombination, Shape,
    Transition,
};
use nalgebra::Vector3;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToyKind {
    Sia,
    Vac,
    Cluster,
}

impl fmt::Display for ToyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToyKind::Sia => "Sia",
            ToyKind::Vac => "Vac",
            ToyKind::Cluster => "Cluster",
        };
        f.write_str(name)
    }
}

pub const SIA_STEP: f64 = 0.5;
pub const VAC_STEP: f64 = 0.3;

/// Interstitials hop along ±x, vacancies along the six axis directions, clusters along ±x and
/// can shed an interstitial. Pair energies fall off as `1/r` with sign set by polarity.
#[derive(Debug, Clone)]
pub struct ToyModel {
    pub interaction: f64,
    sia_actions: Arc<[Action]>,
    vac_actions: Arc<[Action]>,
    cluster_actions: Arc<[Action]>,
}

impl Default for ToyModel {
    fn default() -> Self {
        Self::with_interaction(0.01)
    }
}

impl ToyModel {
    pub fn with_interaction(interaction: f64) -> Self {
        Self {
            interaction,
            sia_actions: Arc::from(vec![Action::Migrate(0), Action::Migrate(1)]),
            vac_actions: Arc::from((0..6).map(Action::Migrate).collect::<Vec<_>>()),
            cluster_actions: Arc::from(vec![Action::Migrate(0), Action::Migrate(1), Action::Emit]),
        }
    }

    fn jump(kind: ToyKind, direction: u8) -> Option<Vector3<f64>> {
        match kind {
            ToyKind::Sia | ToyKind::Cluster => match direction {
                0 => Some(Vector3::x() * SIA_STEP),
                1 => Some(-Vector3::x() * SIA_STEP),
                _ => None,
            },
            ToyKind::Vac => {
                let axis = usize::from(direction / 2);
                if axis >= 3 {
                    return None;
                }
                let sign = if direction % 2 == 0 { 1.0 } else { -1.0 };
                let mut step = Vector3::zeros();
                step[axis] = sign * VAC_STEP;
                Some(step)
            }
        }
    }

    fn unsupported(kind: ToyKind, action: Action) -> ModelError {
        ModelError::UnsupportedAction {
            kind: kind.to_string(),
            action,
        }
    }
}

impl PhysicalModel for ToyModel {
    type Kind = ToyKind;

    fn parse_kind(&self, name: &str) -> Result<ToyKind, ModelError> {
        match name {
            "Sia" => Ok(ToyKind::Sia),
            "Vac" => Ok(ToyKind::Vac),
            "Cluster" => Ok(ToyKind::Cluster),
            other => Err(ModelError::UnknownSpecies(other.to_string())),
        }
    }

    fn polarity(&self, kind: ToyKind) -> Polarity {
        match kind {
            ToyKind::Vac => Polarity::Vacancy,
            ToyKind::Sia | ToyKind::Cluster => Polarity::Interstitial,
        }
    }

    fn geometry(&self, _kind: ToyKind, size: u32) -> Geometry {
        Geometry {
            shape: Shape::Sphere,
            rho: 0.1 * f64::from(size).cbrt(),
            delta_rho: 0.1,
        }
    }

    fn actions_for(&self, kind: ToyKind) -> Arc<[Action]> {
        match kind {
            ToyKind::Sia => self.sia_actions.clone(),
            ToyKind::Vac => self.vac_actions.clone(),
            ToyKind::Cluster => self.cluster_actions.clone(),
        }
    }

    fn barrier(&self, state: &DefectState<ToyKind>, action: Action) -> Result<Arrhenius, ModelError> {
        match (state.kind, action) {
            (ToyKind::Sia, Action::Migrate(_)) => Ok(Arrhenius::new(1.0e12, 0.1)),
            (ToyKind::Vac, Action::Migrate(_)) => Ok(Arrhenius::new(1.0e12, 0.5)),
            (ToyKind::Cluster, Action::Migrate(_)) => {
                Ok(Arrhenius::new(1.0e12 / f64::from(state.size), 0.2))
            }
            (ToyKind::Cluster, Action::Emit) => Ok(Arrhenius::new(1.0e12, 1.0)),
            (kind, action) => Err(Self::unsupported(kind, action)),
        }
    }

    fn pair_energy(
        &self,
        a: &DefectState<ToyKind>,
        b: &DefectState<ToyKind>,
        displacement: &Vector3<f64>,
    ) -> f64 {
        let sign = if self.polarity(a.kind) == self.polarity(b.kind) {
            1.0
        } else {
            -1.0
        };
        let product = f64::from(a.size) * f64::from(b.size);
        sign * self.interaction * product / displacement.norm().max(1.0e-3)
    }

    fn recombination(
        &self,
        a: &DefectState<ToyKind>,
        b: &DefectState<ToyKind>,
        displacement: &Vector3<f64>,
    ) -> Recombination<ToyKind> {
        let reach = self.geometry(a.kind, a.size).capture_radius()
            + self.geometry(b.kind, b.size).capture_radius();
        if displacement.norm() >= reach {
            return Recombination::None;
        }

        if self.polarity(a.kind) == self.polarity(b.kind) {
            let size = a.size + b.size;
            let weight = f64::from(b.size) / f64::from(size);
            let kind = self.kind_after_size_change(a.kind, size);
            return Recombination::Merge(DefectState::new(
                kind,
                size,
                a.position + displacement * weight,
            ));
        }

        let (larger, smaller) = if a.size >= b.size { (a, b) } else { (b, a) };
        match larger.size - smaller.size {
            0 => Recombination::Annihilate,
            size => Recombination::Merge(DefectState::new(
                self.kind_after_size_change(larger.kind, size),
                size,
                larger.position,
            )),
        }
    }

    fn kind_after_size_change(&self, kind: ToyKind, new_size: u32) -> ToyKind {
        match kind {
            ToyKind::Vac => ToyKind::Vac,
            ToyKind::Sia | ToyKind::Cluster if new_size <= 1 => ToyKind::Sia,
            ToyKind::Sia | ToyKind::Cluster => ToyKind::Cluster,
        }
    }

    fn trial_transition(
        &self,
        state: &DefectState<ToyKind>,
        action: Action,
    ) -> Result<Transition<ToyKind>, ModelError> {
        match action {
            Action::Migrate(direction) => Self::jump(state.kind, direction)
                .map(|step| Transition::Single(state.translated(&step)))
                .ok_or_else(|| Self::unsupported(state.kind, action)),
            Action::Emit if state.kind == ToyKind::Cluster => {
                let reach = self.geometry(state.kind, state.size).capture_radius() + 0.5;
                let size = state.size - 1;
                let body = DefectState::new(
                    self.kind_after_size_change(state.kind, size),
                    size,
                    state.position,
                );
                let emitted = DefectState::new(
                    ToyKind::Sia,
                    1,
                    state.position + Vector3::x() * reach,
                );
                Ok(Transition::Split { body, emitted })
            }
            _ => Err(Self::unsupported(state.kind, action)),
        }
    }

    fn transition(
        &self,
        state: &DefectState<ToyKind>,
        action: Action,
        _rng: &mut dyn RngCore,
    ) -> Result<Transition<ToyKind>, ModelError> {
        self.trial_transition(state, action)
    }
}
