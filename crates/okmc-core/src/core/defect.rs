use super::geometry::SimulationBox;
use super::model::Action;
use super::trap::TrapState;
use nalgebra::{Point3, Vector3};
use std::sync::Arc;

/// The physical identity of a defect: what it is, how large it is, and where it sits.
///
/// A `DefectState` is a plain value. Physical models produce new states as the result of an
/// action or a recombination, and the engine turns them into [`Defect`] objects when they are
/// committed to the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectState<K> {
    pub kind: K,
    pub size: u32,
    /// Unbounded Cartesian position; may lie outside the primary box by whole-box multiples.
    pub position: Point3<f64>,
    /// Unit crystallographic direction for oriented species (loops, crowdions).
    pub orientation: Option<Vector3<f64>>,
}

impl<K: Copy> DefectState<K> {
    pub fn new(kind: K, size: u32, position: Point3<f64>) -> Self {
        Self {
            kind,
            size,
            position,
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Vector3<f64>) -> Self {
        self.orientation = orientation.try_normalize(f64::EPSILON);
        self
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            position: self.position + offset,
            ..self.clone()
        }
    }
}

/// A live defect object in the ensemble.
///
/// Besides its [`DefectState`], a defect carries everything the engine derives from it once at
/// construction: the action set of its kind, its fractional coordinate and image offset in the
/// simulation box, and its trap state. None of these are edited in place; a change of kind, size
/// or position always produces a new `Defect`.
#[derive(Debug, Clone, PartialEq)]
pub struct Defect<K> {
    state: DefectState<K>,
    actions: Arc<[Action]>,
    fractional: Vector3<f64>,
    image: Vector3<i64>,
    wrapped: Point3<f64>,
    trap: TrapState,
}

impl<K: Copy> Defect<K> {
    pub(crate) fn new(
        state: DefectState<K>,
        actions: Arc<[Action]>,
        sim_box: &SimulationBox,
        trap: TrapState,
    ) -> Self {
        let (fractional, image) = sim_box.wrap(&state.position);
        let wrapped = sim_box.to_cartesian(&fractional);
        Self {
            state,
            actions,
            fractional,
            image,
            wrapped,
            trap,
        }
    }

    pub(crate) fn with_trap(mut self, trap: TrapState) -> Self {
        self.trap = trap;
        self
    }

    #[inline]
    pub fn state(&self) -> &DefectState<K> {
        &self.state
    }

    #[inline]
    pub fn kind(&self) -> K {
        self.state.kind
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.state.size
    }

    #[inline]
    pub fn position(&self) -> &Point3<f64> {
        &self.state.position
    }

    #[inline]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[inline]
    pub fn fractional(&self) -> &Vector3<f64> {
        &self.fractional
    }

    #[inline]
    pub fn image(&self) -> &Vector3<i64> {
        &self.image
    }

    /// Position folded into the primary box.
    #[inline]
    pub fn wrapped(&self) -> &Point3<f64> {
        &self.wrapped
    }

    #[inline]
    pub fn trap(&self) -> TrapState {
        self.trap
    }

    /// Whether the image offset exceeds `bound` in magnitude along any axis.
    pub fn exceeds_image_bound(&self, bound: &Vector3<i64>) -> bool {
        (0..3).any(|k| self.image[k].abs() > bound[k])
    }

    pub fn into_state(self) -> DefectState<K> {
        self.state
    }
}
