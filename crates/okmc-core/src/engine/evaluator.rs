//! Side-effect-free energy and rate evaluation.
//!
//! Nothing here touches the ensemble. Hypothetical states are passed in by value and simply
//! dropped afterwards, so evaluating a move never has to be undone.

use crate::core::defect::DefectState;
use crate::core::geometry::{ImageConvention, SimulationBox};
use crate::core::model::{Arrhenius, PhysicalModel};
use nalgebra::Point3;

/// One half of the summed pair energy between `state`, located at the in-box position
/// `wrapped`, and every partner closer than `cutoff`.
pub fn half_pair_sum<'a, M, I>(
    model: &M,
    sim_box: &SimulationBox,
    cutoff: f64,
    convention: ImageConvention,
    state: &DefectState<M::Kind>,
    wrapped: &Point3<f64>,
    partners: I,
) -> f64
where
    M: PhysicalModel,
    M::Kind: 'a,
    I: IntoIterator<Item = (&'a DefectState<M::Kind>, &'a Point3<f64>)>,
{
    let sum: f64 = partners
        .into_iter()
        .filter_map(|(other, other_wrapped)| {
            let displacement = sim_box.separation(wrapped, other_wrapped, convention);
            (displacement.norm() < cutoff).then(|| model.pair_energy(state, other, &displacement))
        })
        .sum();
    0.5 * sum
}

/// Inputs of one rate evaluation beyond the bare barrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTerms {
    /// Trap binding energy in eV, already zero for non-migration actions.
    pub trap: f64,
    /// Interaction energy change of the move in eV, or `None` when interactions are disabled.
    pub interaction_delta: Option<f64>,
}

/// Arrhenius rate of a transition with trap and interaction corrections folded into the
/// activation energy. With an interaction delta the corrected activation is clamped to
/// `[-bound, bound]`.
pub fn activated_rate(barrier: Arrhenius, terms: RateTerms, bound: f64, temperature: f64) -> f64 {
    let activation = barrier.activation + terms.trap;
    match terms.interaction_delta {
        Some(delta) => {
            let corrected = (activation + delta).clamp(-bound, bound);
            barrier.rate_with_activation(corrected, temperature)
        }
        None => barrier.rate_with_activation(activation, temperature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::BOLTZMANN_EV;
    use crate::testing::{ToyKind, ToyModel};

    #[test]
    fn half_pair_sum_ignores_partners_beyond_cutoff() {
        let model = ToyModel::with_interaction(0.1);
        let sim_box = SimulationBox::new([10.0; 3], [true; 3]);
        let center = DefectState::new(ToyKind::Vac, 1, Point3::new(5.0, 5.0, 5.0));
        let near = DefectState::new(ToyKind::Vac, 1, Point3::new(6.0, 5.0, 5.0));
        let wrapped_across = DefectState::new(ToyKind::Sia, 2, Point3::new(5.0, 5.0, 9.5));
        let far = DefectState::new(ToyKind::Vac, 1, Point3::new(5.0, 9.0, 5.0));
        let partners = [
            (&near, &near.position),
            (&wrapped_across, &wrapped_across.position),
            (&far, &far.position),
        ];

        let energy = half_pair_sum(
            &model,
            &sim_box,
            3.0,
            ImageConvention::Periodic,
            &center,
            &center.position,
            partners,
        );
        // near: +0.1 / 1.0; wrapped_across sits 4.5 away inside the box, far is 4.0 away.
        assert!((energy - 0.05).abs() < 1e-12);

        let reach_all = half_pair_sum(
            &model,
            &sim_box,
            5.0,
            ImageConvention::Periodic,
            &center,
            &center.position,
            partners,
        );
        let expected = 0.5 * (0.1 - 0.2 / 4.5 + 0.1 / 4.0);
        assert!((reach_all - expected).abs() < 1e-12);
    }

    #[test]
    fn interaction_corrected_activation_is_clamped() {
        let barrier = Arrhenius::new(1.0e13, 0.5);
        let kt = BOLTZMANN_EV * 500.0;

        let unclamped = activated_rate(
            barrier,
            RateTerms {
                trap: 0.2,
                interaction_delta: Some(-0.1),
            },
            10.0,
            500.0,
        );
        assert!((unclamped - 1.0e13 * (-0.6 / kt).exp()).abs() / unclamped < 1e-12);

        let clamped = activated_rate(
            barrier,
            RateTerms {
                trap: 0.0,
                interaction_delta: Some(-50.0),
            },
            10.0,
            500.0,
        );
        assert_eq!(clamped, barrier.rate_with_activation(-10.0, 500.0));
    }

    #[test]
    fn disabled_interactions_skip_the_clamp() {
        let barrier = Arrhenius::new(1.0e13, 12.0);
        let rate = activated_rate(
            barrier,
            RateTerms {
                trap: 1.0,
                interaction_delta: None,
            },
            10.0,
            800.0,
        );
        assert_eq!(rate, barrier.rate_with_activation(13.0, 800.0));
    }
}
