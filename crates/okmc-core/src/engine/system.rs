use super::config::EngineConfig;
use super::ensemble::Ensemble;
use super::error::EngineError;
use super::evaluator::{self, RateTerms};
use super::rate_table::RateTable;
use crate::core::defect::{Defect, DefectState};
use crate::core::geometry::{ImageConvention, SimulationBox};
use crate::core::io::descriptor::DefectDescriptor;
use crate::core::linkcell::SpatialIndex;
use crate::core::model::{self, Action, PhysicalModel, Recombination};
use crate::core::trap::{TrapLookup, TrapState};
use nalgebra::{Point3, Vector3};
use rand::RngCore;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// The ensemble and its three derived structures, kept mutually consistent.
///
/// Every change to the population goes through [`substitute`](Self::substitute),
/// [`add`](Self::add) or [`delete`](Self::delete). Each of them updates the spatial index first,
/// then refreshes the energy share and the rate segment of exactly the objects whose
/// neighbourhood changed, and finally repairs the cumulative rate sum from the lowest touched
/// object onward. No caller can observe the structures between those stages: a mutation that
/// fails partway puts the ensemble back and rebuilds the derived structures before returning
/// its error.
pub struct DefectSystem<M: PhysicalModel> {
    model: M,
    config: EngineConfig,
    sim_box: SimulationBox,
    escape_bound: Vector3<i64>,
    ensemble: Ensemble<M::Kind>,
    index: SpatialIndex,
    rates: RateTable,
    traps: Option<Box<dyn TrapLookup>>,
}

/// How to restore the ensemble after a mutation fails partway.
enum Undo<K> {
    /// Put `defect` back at `index`.
    Restore { index: usize, defect: Defect<K> },
    /// Drop everything past the first `len` defects.
    Truncate { len: usize },
    /// Reinsert removed defects at their original indices, lowest first.
    Reinsert(Vec<(usize, Defect<K>)>),
    Replace(Vec<Defect<K>>),
}

impl<M: PhysicalModel> DefectSystem<M> {
    /// Builds a system from defect states, rejecting any that lie outside the box along a
    /// non-periodic axis.
    #[instrument(skip_all, name = "defect_system_new", fields(objects = states.len()))]
    pub fn new(
        model: M,
        config: EngineConfig,
        states: Vec<DefectState<M::Kind>>,
        traps: Option<Box<dyn TrapLookup>>,
    ) -> Result<Self, EngineError> {
        let sim_box = config.domain.simulation_box();
        let index = SpatialIndex::new(
            sim_box.lengths(),
            &Vector3::from(config.domain.cell_size),
            config.domain.periodic,
            config.domain.max_neighbors,
        )?;

        let mut system = Self {
            escape_bound: config.domain.escape_bound(),
            model,
            config,
            sim_box,
            ensemble: Ensemble::new(),
            index,
            rates: RateTable::new(),
            traps,
        };

        for (position, state) in states.iter().enumerate() {
            if let Some(axis) = system.open_axis_outside(&state.position) {
                return Err(EngineError::OutsideDomain {
                    index: position,
                    kind: state.kind.to_string(),
                    axis,
                });
            }
        }
        system.reset(states)?;
        info!(
            objects = system.len(),
            total_rate = system.total_rate(),
            "Defect system built."
        );
        Ok(system)
    }

    /// Materializes raw descriptors through the model and builds a system from them.
    pub fn from_descriptors(
        model: M,
        config: EngineConfig,
        descriptors: &[DefectDescriptor],
        traps: Option<Box<dyn TrapLookup>>,
        rng: &mut dyn RngCore,
    ) -> Result<Self, EngineError> {
        let states = descriptors
            .iter()
            .map(|d| model::materialize(&model, d, rng))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(model, config, states, traps)
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn sim_box(&self) -> &SimulationBox {
        &self.sim_box
    }

    #[inline]
    pub fn ensemble(&self) -> &Ensemble<M::Kind> {
        &self.ensemble
    }

    #[inline]
    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    #[inline]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ensemble.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ensemble.is_empty()
    }

    #[inline]
    pub fn total_rate(&self) -> f64 {
        self.rates.total_rate()
    }

    #[inline]
    pub fn total_energy(&self) -> f64 {
        self.ensemble.total_energy()
    }

    pub fn defect(&self, index: usize) -> Result<&Defect<M::Kind>, EngineError> {
        self.ensemble.get(index).ok_or(EngineError::IndexOutOfRange {
            index,
            len: self.ensemble.len(),
        })
    }

    /// Objects in the 27-cell neighbourhood of `index`, centre cell first.
    pub fn neighbors(&self, index: usize) -> Result<Vec<usize>, EngineError> {
        let defect = self.defect(index)?;
        Ok(self.index.neighbors(index, defect.fractional())?)
    }

    /// Separation from defect `from` to defect `to` under the periodic convention.
    pub fn displacement(&self, from: usize, to: usize) -> Result<Vector3<f64>, EngineError> {
        let a = self.defect(from)?;
        let b = self.defect(to)?;
        Ok(self
            .sim_box
            .separation(a.wrapped(), b.wrapped(), ImageConvention::Periodic))
    }

    /// Whether defect `index` has drifted past the escape bound.
    pub fn has_escaped(&self, index: usize) -> Result<bool, EngineError> {
        Ok(self.defect(index)?.exceeds_image_bound(&self.escape_bound))
    }

    /// Replaces defect `index` with `state` in place.
    pub fn substitute(
        &mut self,
        index: usize,
        state: DefectState<M::Kind>,
    ) -> Result<(), EngineError> {
        let old_fractional = *self.defect(index)?.fractional();
        let old_neighbors = self.index.neighbors(index, &old_fractional)?;

        let defect = self.make_defect(state)?;
        let new_fractional = *defect.fractional();
        self.index.cell_of(&new_fractional)?;

        let previous = self.ensemble.replace(index, defect).ok_or_else(|| {
            EngineError::Internal(format!("defect {index} vanished during substitution"))
        })?;
        self.relink_and_refresh(index, &old_fractional, &new_fractional, old_neighbors)
            .map_err(|cause| self.rollback(Undo::Restore { index, defect: previous }, cause))
    }

    fn relink_and_refresh(
        &mut self,
        index: usize,
        old_fractional: &Vector3<f64>,
        new_fractional: &Vector3<f64>,
        old_neighbors: Vec<usize>,
    ) -> Result<(), EngineError> {
        self.index.relocate(index, old_fractional, new_fractional)?;
        let new_neighbors = self.index.neighbors(index, new_fractional)?;

        let affected: BTreeSet<usize> = old_neighbors
            .into_iter()
            .chain(new_neighbors)
            .chain(std::iter::once(index))
            .collect();
        let affected: Vec<usize> = affected.into_iter().collect();
        let first = affected[0];
        self.refresh(&affected, first)
    }

    /// Appends a new defect and returns its index.
    pub fn add(&mut self, state: DefectState<M::Kind>) -> Result<usize, EngineError> {
        let defect = self.make_defect(state)?;
        let fractional = *defect.fractional();
        let action_count = defect.actions().len();
        self.index.cell_of(&fractional)?;

        let len = self.len();
        let index = self.ensemble.push(defect);
        self.link_and_refresh(index, &fractional, action_count)
            .map(|()| index)
            .map_err(|cause| self.rollback(Undo::Truncate { len }, cause))
    }

    fn link_and_refresh(
        &mut self,
        index: usize,
        fractional: &Vector3<f64>,
        action_count: usize,
    ) -> Result<(), EngineError> {
        let linked = self.index.insert(fractional)?;
        if linked != index {
            return Err(EngineError::Internal(format!(
                "spatial index assigned {linked} to new defect {index}"
            )));
        }
        self.rates.push_segment(&vec![0.0; action_count]);

        let mut affected = self.index.neighbors(index, fractional)?;
        affected.push(index);
        affected.sort_unstable();
        let first = affected[0];
        self.refresh(&affected, first)
    }

    /// Removes every defect in `indices` and returns them in ascending index order. Indices above
    /// each removed one shift down.
    pub fn delete(&mut self, indices: &[usize]) -> Result<Vec<Defect<M::Kind>>, EngineError> {
        let doomed: BTreeSet<usize> = indices.iter().copied().collect();
        let Some(&lowest) = doomed.first() else {
            return Ok(Vec::new());
        };

        let mut affected = BTreeSet::new();
        for &index in &doomed {
            affected.extend(self.neighbors(index)?);
        }

        // Filled from the highest index down; reversed, it lists the original slots in order.
        let mut removed = Vec::with_capacity(doomed.len());
        let result = self.unlink_and_refresh(&doomed, &affected, lowest, &mut removed);
        removed.reverse();
        match result {
            Ok(()) => Ok(removed.into_iter().map(|(_, defect)| defect).collect()),
            Err(cause) => Err(self.rollback(Undo::Reinsert(removed), cause)),
        }
    }

    fn unlink_and_refresh(
        &mut self,
        doomed: &BTreeSet<usize>,
        affected: &BTreeSet<usize>,
        lowest: usize,
        removed: &mut Vec<(usize, Defect<M::Kind>)>,
    ) -> Result<(), EngineError> {
        for &index in doomed.iter().rev() {
            let fractional = *self.defect(index)?.fractional();
            self.index.remove(index, &fractional)?;
            self.rates.remove_segment(index);
            let defect = self.ensemble.remove(index).ok_or_else(|| {
                EngineError::Internal(format!("defect {index} vanished during deletion"))
            })?;
            removed.push((index, defect));
        }

        let remapped: Vec<usize> = affected
            .difference(doomed)
            .map(|&j| j - doomed.range(..j).count())
            .collect();
        let first = remapped.first().map_or(lowest, |&j| j.min(lowest));
        self.refresh(&remapped, first)
    }

    /// Replaces the whole population and rebuilds every derived structure from scratch. If the
    /// new population cannot be built, the previous one is restored.
    pub fn reset(&mut self, states: Vec<DefectState<M::Kind>>) -> Result<(), EngineError> {
        let defects = states
            .into_iter()
            .map(|state| self.make_defect(state))
            .collect::<Result<Vec<_>, _>>()?;
        let previous = self.swap_population(defects);
        self.rebuild()
            .map_err(|cause| self.rollback(Undo::Replace(previous), cause))
    }

    fn swap_population(&mut self, defects: Vec<Defect<M::Kind>>) -> Vec<Defect<M::Kind>> {
        let previous = self.ensemble.drain();
        for defect in defects {
            self.ensemble.push(defect);
        }
        previous
    }

    /// Recomputes the spatial index, all energies and all rates from the current ensemble.
    pub fn rebuild(&mut self) -> Result<(), EngineError> {
        self.index
            .rebuild(self.ensemble.iter().map(|d| d.fractional()))?;

        let indices: Vec<usize> = (0..self.len()).collect();

        #[cfg(not(feature = "parallel"))]
        let energies = indices
            .iter()
            .map(|&i| self.compute_energy(i))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(feature = "parallel")]
        let energies = indices
            .par_iter()
            .map(|&i| self.compute_energy(i))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, energy) in energies.into_iter().enumerate() {
            self.ensemble.set_energy(i, energy);
        }

        #[cfg(not(feature = "parallel"))]
        let segments = indices
            .iter()
            .map(|&i| self.compute_rates(i))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(feature = "parallel")]
        let segments = indices
            .par_iter()
            .map(|&i| self.compute_rates(i))
            .collect::<Result<Vec<_>, _>>()?;

        self.rates.clear();
        for segment in &segments {
            self.rates.push_segment(segment);
        }
        self.rates.recompute_all();
        Ok(())
    }

    /// Resolves recombinations in the current population until a full sweep finds none.
    /// Returns the number of reactions.
    ///
    /// Each sweep pairs every object with the first unconsumed neighbour the model lets it react
    /// with. Untouched objects keep their relative order; merge products are appended after them.
    #[instrument(skip_all, name = "initial_recombination")]
    pub fn initial_recombination(&mut self) -> Result<usize, EngineError> {
        let mut total = 0;
        loop {
            let count = self.len();
            let mut consumed = vec![false; count];
            let mut products = Vec::new();
            let mut reactions = 0;

            for i in 0..count {
                if consumed[i] {
                    continue;
                }
                for j in self.neighbors(i)? {
                    if consumed[j] {
                        continue;
                    }
                    let displacement = self.displacement(i, j)?;
                    let a = self.defect(i)?.state();
                    let b = self.defect(j)?.state();
                    match self.model.recombination(a, b, &displacement) {
                        Recombination::None => continue,
                        Recombination::Annihilate => {}
                        Recombination::Merge(state) => products.push(state),
                    }
                    consumed[i] = true;
                    consumed[j] = true;
                    reactions += 1;
                    break;
                }
            }

            if reactions == 0 {
                break;
            }
            total += reactions;
            debug!(reactions, "Recombination sweep changed the population.");

            let survivors: Vec<DefectState<M::Kind>> = self
                .ensemble
                .iter()
                .zip(consumed)
                .filter_map(|(defect, gone)| (!gone).then(|| defect.state().clone()))
                .chain(products)
                .collect();
            self.reset(survivors)?;
        }
        info!(reactions = total, objects = self.len(), "Initial recombination converged.");
        Ok(total)
    }

    /// Checks every structural invariant and reports the first violation.
    pub fn verify(&self, tolerance: f64) -> Result<(), EngineError> {
        if self.rates.object_count() != self.len() {
            return Err(EngineError::Internal(format!(
                "rate table holds {} segments for {} defects",
                self.rates.object_count(),
                self.len()
            )));
        }
        for (i, defect) in self.ensemble.iter().enumerate() {
            if self.rates.segment(i).len() != defect.actions().len() {
                return Err(EngineError::Internal(format!(
                    "segment of defect {i} has {} entries for {} actions",
                    self.rates.segment(i).len(),
                    defect.actions().len()
                )));
            }
        }
        if self.index.len() != self.len() || !self.index.is_partition() {
            return Err(EngineError::Internal(
                "spatial index is not a partition of the ensemble".to_string(),
            ));
        }
        if !self.rates.is_consistent(tolerance) {
            return Err(EngineError::Internal(
                "cumulative rate sum is inconsistent".to_string(),
            ));
        }
        Ok(())
    }

    /// Index of the first non-periodic axis along which `position` leaves the box.
    pub(crate) fn open_axis_outside(&self, position: &Point3<f64>) -> Option<usize> {
        let (_, image) = self.sim_box.wrap(position);
        let periodic = self.sim_box.periodic();
        (0..3).find(|&k| !periodic[k] && image[k] != 0)
    }

    fn make_defect(&self, state: DefectState<M::Kind>) -> Result<Defect<M::Kind>, EngineError> {
        let actions = self.model.actions_for(state.kind);
        let defect = Defect::new(state, actions, &self.sim_box, TrapState::Free);
        Ok(match &self.traps {
            Some(traps) => {
                let trap = traps.lookup(defect.wrapped())?;
                defect.with_trap(trap)
            }
            None => defect,
        })
    }

    /// Puts the ensemble back as `undo` describes and rebuilds the index, energies and rates from
    /// it. Returns the error the caller should report.
    fn rollback(&mut self, undo: Undo<M::Kind>, cause: EngineError) -> EngineError {
        match undo {
            Undo::Restore { index, defect } => {
                self.ensemble.replace(index, defect);
            }
            Undo::Truncate { len } => {
                while self.len() > len {
                    let last = self.len() - 1;
                    self.ensemble.remove(last);
                }
            }
            Undo::Reinsert(defects) => {
                for (index, defect) in defects {
                    self.ensemble.insert(index, defect);
                }
            }
            Undo::Replace(defects) => {
                self.swap_population(defects);
            }
        }
        match self.rebuild() {
            Ok(()) => {
                warn!(error = %cause, objects = self.len(), "Mutation rolled back.");
                cause
            }
            Err(e) => EngineError::Internal(format!(
                "could not restore the defect system after `{cause}`: {e}"
            )),
        }
    }

    /// Energies first, then rates, since a rate reads the current energy of its own object.
    fn refresh(&mut self, affected: &[usize], suffix_from: usize) -> Result<(), EngineError> {
        for &i in affected {
            let energy = self.compute_energy(i)?;
            self.ensemble.set_energy(i, energy);
        }
        for &i in affected {
            let rates = self.compute_rates(i)?;
            self.rates.set_rates_for(i, &rates);
        }
        self.rates.recompute_suffix_from(suffix_from);
        trace!(affected = affected.len(), suffix_from, "Refreshed local neighbourhood.");
        Ok(())
    }

    fn compute_energy(&self, index: usize) -> Result<f64, EngineError> {
        let defect = self.defect(index)?;
        let neighbors = self.index.neighbors(index, defect.fractional())?;
        Ok(evaluator::half_pair_sum(
            &self.model,
            &self.sim_box,
            self.config.domain.cutoff,
            ImageConvention::Periodic,
            defect.state(),
            defect.wrapped(),
            neighbors.iter().map(|&j| {
                let other = &self.ensemble.defects()[j];
                (other.state(), other.wrapped())
            }),
        ))
    }

    /// Half-sum energy of a hypothetical state against `partners`, the current neighbourhood of
    /// the object it would replace.
    fn trial_energy(
        &self,
        state: &DefectState<M::Kind>,
        partners: &[usize],
    ) -> f64 {
        let (fractional, _) = self.sim_box.wrap(&state.position);
        let wrapped = self.sim_box.to_cartesian(&fractional);
        evaluator::half_pair_sum(
            &self.model,
            &self.sim_box,
            self.config.domain.cutoff,
            ImageConvention::Nearest,
            state,
            &wrapped,
            partners.iter().map(|&j| {
                let other = &self.ensemble.defects()[j];
                (other.state(), other.wrapped())
            }),
        )
    }

    fn compute_rates(&self, index: usize) -> Result<Vec<f64>, EngineError> {
        let defect = self.defect(index)?;
        let temperature = self.config.temperature;
        let current_energy = self.ensemble.energy(index).unwrap_or(0.0);
        let partners = if self.config.elastic_interaction {
            self.index.neighbors(index, defect.fractional())?
        } else {
            Vec::new()
        };

        defect
            .actions()
            .iter()
            .map(|&action| {
                let barrier = self.model.barrier(defect.state(), action)?;
                let trap = if action.is_migration() {
                    defect.trap().energy()
                } else {
                    0.0
                };
                let interaction_delta = if self.config.elastic_interaction {
                    Some(self.interaction_delta(defect.state(), action, &partners, current_energy)?)
                } else {
                    None
                };
                let rate = evaluator::activated_rate(
                    barrier,
                    RateTerms {
                        trap,
                        interaction_delta,
                    },
                    self.config.activation_bound,
                    temperature,
                );
                if rate.is_finite() {
                    Ok(rate)
                } else {
                    Err(EngineError::NonFiniteRate { index, action })
                }
            })
            .collect()
    }

    /// Energy change of `action`, evaluated on the model's representative outcome. The partners
    /// of the trial state are the mover's current neighbours, so a rate depends only on objects
    /// whose own neighbourhood contains the mover.
    fn interaction_delta(
        &self,
        state: &DefectState<M::Kind>,
        action: Action,
        partners: &[usize],
        current_energy: f64,
    ) -> Result<f64, EngineError> {
        let (body, emitted) = self.model.trial_transition(state, action)?.into_parts();
        let mut after = self.trial_energy(&body, partners);
        if let Some(emitted) = emitted {
            after += self.trial_energy(&emitted, partners);
        }
        Ok(after - current_energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Arrhenius;
    use crate::engine::config::EngineConfigBuilder;
    use crate::core::linkcell::LinkCellError;
    use crate::testing::{SIA_STEP, ToyKind, ToyModel};
    use proptest::prelude::*;

    fn config(elastic: bool) -> EngineConfig {
        EngineConfigBuilder::new()
            .box_lengths([10.0, 10.0, 10.0])
            .cell_size([2.0, 2.0, 2.0])
            .cutoff(2.0)
            .temperature(600.0)
            .elastic_interaction(elastic)
            .max_neighbors(256)
            .build()
            .unwrap()
    }

    fn state(kind: ToyKind, size: u32, x: f64, y: f64, z: f64) -> DefectState<ToyKind> {
        DefectState::new(kind, size, Point3::new(x, y, z))
    }

    fn system(states: Vec<DefectState<ToyKind>>, elastic: bool) -> DefectSystem<ToyModel> {
        DefectSystem::new(ToyModel::default(), config(elastic), states, None).unwrap()
    }

    fn crowd() -> Vec<DefectState<ToyKind>> {
        vec![
            state(ToyKind::Vac, 1, 1.0, 1.0, 1.0),
            state(ToyKind::Sia, 1, 2.0, 1.5, 1.0),
            state(ToyKind::Cluster, 3, 5.0, 5.0, 5.0),
            state(ToyKind::Vac, 1, 6.0, 5.5, 5.0),
            state(ToyKind::Vac, 2, 9.5, 9.5, 9.5),
            state(ToyKind::Sia, 1, 0.5, 9.8, 0.2),
        ]
    }

    /// Energies and rates recomputed from scratch on a clone of `system`.
    fn recomputed(system: &DefectSystem<ToyModel>) -> (Vec<f64>, Vec<f64>) {
        let states: Vec<_> = system.ensemble().iter().map(|d| d.state().clone()).collect();
        let fresh = DefectSystem::new(
            ToyModel::default(),
            system.config().clone(),
            states,
            None,
        )
        .unwrap();
        (
            fresh.ensemble().energies().to_vec(),
            fresh.rates().rates().to_vec(),
        )
    }

    #[test]
    fn construction_satisfies_invariants() {
        let system = system(crowd(), true);
        system.verify(1e-12).unwrap();
        assert_eq!(system.len(), 6);
        assert_eq!(system.rates().segment(2).len(), 3);
        assert_eq!(system.rates().segment(3).len(), 6);
    }

    #[test]
    fn defect_outside_open_axis_is_rejected() {
        let config = EngineConfigBuilder::new()
            .box_lengths([10.0; 3])
            .cutoff(2.0)
            .periodic([true, true, false])
            .temperature(600.0)
            .build()
            .unwrap();
        let result = DefectSystem::new(
            ToyModel::default(),
            config,
            vec![
                state(ToyKind::Vac, 1, 1.0, 1.0, 1.0),
                state(ToyKind::Sia, 1, 1.0, 1.0, 10.5),
            ],
            None,
        );
        assert!(matches!(
            result,
            Err(EngineError::OutsideDomain { index: 1, axis: 2, .. })
        ));
    }

    #[test]
    fn energies_are_half_pair_sums_and_total_is_their_sum() {
        let model = ToyModel::default();
        let system = system(
            vec![
                state(ToyKind::Vac, 1, 5.0, 5.0, 5.0),
                state(ToyKind::Vac, 1, 6.0, 5.0, 5.0),
            ],
            false,
        );
        let expected = 0.5 * model.interaction;
        assert!((system.ensemble().energy(0).unwrap() - expected).abs() < 1e-12);
        assert!((system.ensemble().energy(1).unwrap() - expected).abs() < 1e-12);
        assert!((system.total_energy() - 2.0 * expected).abs() < 1e-12);
    }

    #[test]
    fn rates_without_interactions_follow_the_bare_barrier() {
        let system = system(vec![state(ToyKind::Sia, 1, 5.0, 5.0, 5.0)], false);
        let expected = Arrhenius::new(1.0e12, 0.1).rate(600.0);
        assert_eq!(system.rates().rates_of(0), &[expected, expected]);
    }

    #[test]
    fn elastic_rates_favour_moves_towards_attracting_partners() {
        let system = system(
            vec![
                state(ToyKind::Sia, 1, 5.0, 5.0, 5.0),
                state(ToyKind::Vac, 1, 6.0, 5.0, 5.0),
            ],
            true,
        );
        let rates = system.rates().rates_of(0);
        // Migrate(0) moves +x towards the vacancy, lowering the energy.
        assert!(rates[0] > rates[1]);
    }

    #[test]
    fn substitute_matches_full_recompute() {
        let mut system = system(crowd(), true);
        system
            .substitute(1, state(ToyKind::Sia, 1, 2.0 + SIA_STEP, 1.5, 1.0))
            .unwrap();
        system
            .substitute(2, state(ToyKind::Sia, 1, 5.0, 5.0, 5.0))
            .unwrap();
        system.verify(1e-12).unwrap();
        assert_eq!(system.rates().segment(2).len(), 2);

        let (energies, rates) = recomputed(&system);
        assert_eq!(system.ensemble().energies(), energies.as_slice());
        assert_eq!(system.rates().rates(), rates.as_slice());
    }

    #[test]
    fn add_then_delete_restores_every_structure() {
        let mut system = system(crowd(), true);
        let before_index = system.index().clone();
        let before_rates = system.rates().clone();
        let before_ensemble = system.ensemble().clone();

        let added = system
            .add(state(ToyKind::Cluster, 2, 1.5, 1.2, 1.0))
            .unwrap();
        assert_eq!(added, 6);
        system.verify(1e-12).unwrap();
        assert_ne!(system.ensemble().energies()[..6], before_ensemble.energies()[..]);

        let removed = system.delete(&[added]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(system.index(), &before_index);
        assert_eq!(system.rates(), &before_rates);
        assert_eq!(system.ensemble(), &before_ensemble);
    }

    #[test]
    fn delete_renumbers_and_refreshes_survivors() {
        let mut system = system(crowd(), true);
        let removed = system.delete(&[3, 0]).unwrap();
        assert_eq!(removed[0].kind(), ToyKind::Vac);
        assert_eq!(removed[1].position(), &Point3::new(6.0, 5.5, 5.0));

        assert_eq!(system.len(), 4);
        assert_eq!(system.defect(0).unwrap().kind(), ToyKind::Sia);
        assert_eq!(system.defect(1).unwrap().kind(), ToyKind::Cluster);
        system.verify(1e-12).unwrap();

        let (energies, rates) = recomputed(&system);
        assert_eq!(system.ensemble().energies(), energies.as_slice());
        assert_eq!(system.rates().rates(), rates.as_slice());
    }

    #[test]
    fn delete_reports_out_of_range_indices() {
        let mut system = system(crowd(), false);
        assert!(matches!(
            system.delete(&[9]),
            Err(EngineError::IndexOutOfRange { index: 9, len: 6 })
        ));
        assert!(system.delete(&[]).unwrap().is_empty());
    }

    #[test]
    fn opposite_point_defects_at_the_same_site_annihilate() {
        let mut system = system(
            vec![
                state(ToyKind::Sia, 1, 4.0, 4.0, 4.0),
                state(ToyKind::Vac, 1, 4.0, 4.0, 4.0),
            ],
            false,
        );
        let reactions = system.initial_recombination().unwrap();
        assert_eq!(reactions, 1);
        assert!(system.is_empty());
        assert_eq!(system.total_rate(), 0.0);
    }

    #[test]
    fn initial_sweep_merges_across_the_periodic_boundary() {
        let mut system = system(
            vec![
                state(ToyKind::Vac, 2, 0.05, 5.0, 5.0),
                state(ToyKind::Vac, 1, 7.0, 7.0, 7.0),
                state(ToyKind::Vac, 2, 9.95, 5.0, 5.0),
            ],
            false,
        );
        assert_eq!(system.initial_recombination().unwrap(), 1);
        assert_eq!(system.len(), 2);

        // The untouched survivor comes first, the merge product after it.
        assert_eq!(system.defect(0).unwrap().size(), 1);
        let merged = system.defect(1).unwrap();
        assert_eq!(merged.size(), 4);
        assert!((merged.wrapped().x - 0.0).abs() < 1e-9 || (merged.wrapped().x - 10.0).abs() < 1e-9);
        system.verify(1e-12).unwrap();
    }

    #[test]
    fn initial_sweep_is_idempotent() {
        let mut system = system(
            vec![
                state(ToyKind::Sia, 1, 3.0, 3.0, 3.0),
                state(ToyKind::Sia, 1, 3.1, 3.0, 3.0),
                state(ToyKind::Sia, 1, 3.2, 3.0, 3.0),
                state(ToyKind::Vac, 1, 3.05, 3.0, 3.0),
                state(ToyKind::Vac, 1, 8.0, 8.0, 8.0),
            ],
            true,
        );
        assert!(system.initial_recombination().unwrap() > 0);
        let settled_index = system.index().clone();
        let settled_rates = system.rates().clone();
        let settled_ensemble = system.ensemble().clone();

        assert_eq!(system.initial_recombination().unwrap(), 0);
        assert_eq!(system.index(), &settled_index);
        assert_eq!(system.rates(), &settled_rates);
        assert_eq!(system.ensemble(), &settled_ensemble);
    }

    #[derive(Debug, Clone)]
    enum Mutation {
        Substitute(usize, f64, f64, f64),
        Add(bool, f64, f64, f64),
        Delete(usize),
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        let coord = 0.0..10.0f64;
        prop_oneof![
            (any::<usize>(), coord.clone(), coord.clone(), coord.clone())
                .prop_map(|(i, x, y, z)| Mutation::Substitute(i, x, y, z)),
            (any::<bool>(), coord.clone(), coord.clone(), coord)
                .prop_map(|(v, x, y, z)| Mutation::Add(v, x, y, z)),
            any::<usize>().prop_map(Mutation::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn incremental_updates_touch_only_the_neighbourhood(
            mutations in prop::collection::vec(mutation(), 1..25)
        ) {
            let mut system = system(crowd(), true);
            for mutation in mutations {
                match mutation {
                    Mutation::Substitute(i, x, y, z) if !system.is_empty() => {
                        let i = i % system.len();
                        let before = system.ensemble().energies().to_vec();
                        let old: BTreeSet<usize> = system.neighbors(i).unwrap().into_iter().collect();
                        let kind = match system.defect(i).unwrap().kind() {
                            ToyKind::Vac => ToyKind::Vac,
                            _ => ToyKind::Sia,
                        };
                        system.substitute(i, state(kind, 1, x, y, z)).unwrap();
                        let new: BTreeSet<usize> = system.neighbors(i).unwrap().into_iter().collect();

                        for (j, (a, b)) in before.iter().zip(system.ensemble().energies()).enumerate() {
                            if j != i && !old.contains(&j) && !new.contains(&j) {
                                prop_assert_eq!(a, b);
                            }
                        }
                    }
                    Mutation::Add(vacancy, x, y, z) => {
                        let kind = if vacancy { ToyKind::Vac } else { ToyKind::Sia };
                        system.add(state(kind, 1, x, y, z)).unwrap();
                    }
                    Mutation::Delete(i) if !system.is_empty() => {
                        let i = i % system.len();
                        system.delete(&[i]).unwrap();
                    }
                    _ => {}
                }
                prop_assert!(system.verify(1e-9).is_ok());

                let (energies, rates) = recomputed(&system);
                prop_assert_eq!(system.ensemble().energies(), energies.as_slice());
                prop_assert_eq!(system.rates().rates(), rates.as_slice());
            }
        }
    }

    fn crowded(elastic: bool) -> DefectSystem<ToyModel> {
        let config = EngineConfigBuilder::new()
            .box_lengths([10.0, 10.0, 10.0])
            .cell_size([2.0, 2.0, 2.0])
            .cutoff(2.0)
            .temperature(600.0)
            .elastic_interaction(elastic)
            .max_neighbors(1)
            .build()
            .unwrap();
        let states = vec![
            state(ToyKind::Vac, 1, 1.0, 1.0, 1.0),
            state(ToyKind::Vac, 1, 1.4, 1.0, 1.0),
            state(ToyKind::Sia, 1, 7.0, 7.0, 7.0),
        ];
        DefectSystem::new(ToyModel::default(), config, states, None).unwrap()
    }

    fn is_overflow<T>(result: Result<T, EngineError>) -> bool {
        matches!(
            result,
            Err(EngineError::Index {
                source: LinkCellError::NeighborOverflow { found: 2, bound: 1 }
            })
        )
    }

    #[test]
    fn overflowing_substitute_leaves_every_structure_untouched() {
        let mut system = crowded(true);
        let index = system.index().clone();
        let rates = system.rates().clone();
        let ensemble = system.ensemble().clone();

        let result = system.substitute(2, state(ToyKind::Cluster, 2, 1.2, 1.0, 1.0));

        assert!(is_overflow(result));
        system.verify(1e-12).unwrap();
        assert_eq!(system.index(), &index);
        assert_eq!(system.rates(), &rates);
        assert_eq!(system.ensemble(), &ensemble);
        assert_eq!(system.defect(2).unwrap().kind(), ToyKind::Sia);
    }

    #[test]
    fn overflowing_add_leaves_every_structure_untouched() {
        let mut system = crowded(false);
        let index = system.index().clone();
        let rates = system.rates().clone();
        let ensemble = system.ensemble().clone();

        let result = system.add(state(ToyKind::Sia, 1, 1.2, 1.0, 1.0));

        assert!(is_overflow(result));
        system.verify(1e-12).unwrap();
        assert_eq!(system.len(), 3);
        assert_eq!(system.index(), &index);
        assert_eq!(system.rates(), &rates);
        assert_eq!(system.ensemble(), &ensemble);
    }
}
