use super::error::EngineError;
use super::rate_table::{Event, Selection};
use super::snapshot::{DefectRecord, Snapshot};
use super::system::DefectSystem;
use crate::core::defect::DefectState;
use crate::core::model::{Action, PhysicalModel, Polarity, Recombination};
use nalgebra::Vector3;
use rand::Rng;
use rand::distributions::Open01;
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// More events can be selected.
    Ready,
    /// No transition has a positive rate.
    Exhausted,
    TimeLimit,
    StepLimit,
    /// A step returned an error. The system holds a consistent population, but the step that
    /// failed may have been partly applied, so the engine refuses to continue.
    Failed,
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineStatus::Ready)
    }
}

/// A defect removed because it drifted past the escape bound.
#[derive(Debug, Clone, PartialEq)]
pub struct EscapedDefect<K> {
    pub step: u64,
    pub time: f64,
    pub state: DefectState<K>,
}

/// A recombination resolved during a step. Indices refer to the ensemble before the reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Annihilated { first: usize, second: usize },
    Merged { survivor: usize, absorbed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport<K> {
    /// Step count after this step.
    pub step: u64,
    pub time: f64,
    pub delta_time: f64,
    pub object: usize,
    pub action: Action,
    pub escaped: Vec<EscapedDefect<K>>,
    pub reaction: Option<Reaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<K> {
    Advanced(StepReport<K>),
    Halted(EngineStatus),
}

/// The residence-time event loop over a [`DefectSystem`].
///
/// Each step selects one `(object, action)` pair in proportion to its rate, commits the model's
/// outcome, removes escaped defects, resolves at most one recombination around the mover, and
/// advances the clock by an exponentially distributed waiting time.
pub struct KineticEngine<M: PhysicalModel, R: Rng> {
    system: DefectSystem<M>,
    rng: R,
    step: u64,
    time: f64,
    status: EngineStatus,
    escaped: Vec<EscapedDefect<M::Kind>>,
    reactions: u64,
}

impl<M: PhysicalModel, R: Rng> KineticEngine<M, R> {
    /// Wraps `system`, running the initial recombination sweep first when configured.
    pub fn new(mut system: DefectSystem<M>, rng: R) -> Result<Self, EngineError> {
        let mut reactions = 0;
        if system.config().initial_recombination {
            reactions = system.initial_recombination()? as u64;
        }
        Ok(Self {
            system,
            rng,
            step: 0,
            time: 0.0,
            status: EngineStatus::Ready,
            escaped: Vec::new(),
            reactions,
        })
    }

    #[inline]
    pub fn system(&self) -> &DefectSystem<M> {
        &self.system
    }

    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// Every defect that has escaped since construction.
    pub fn escaped(&self) -> &[EscapedDefect<M::Kind>] {
        &self.escaped
    }

    /// Recombinations resolved so far, including the initial sweeps.
    pub fn reactions(&self) -> u64 {
        self.reactions
    }

    pub fn into_system(self) -> DefectSystem<M> {
        self.system
    }

    /// Executes one event, or reports why none can run. Any error leaves the engine `Failed`.
    pub fn step(&mut self) -> Result<StepOutcome<M::Kind>, EngineError> {
        let outcome = self.advance();
        if let Err(e) = &outcome {
            warn!(step = self.step, error = %e, "Step failed; the engine is halted.");
            self.status = EngineStatus::Failed;
        }
        outcome
    }

    fn advance(&mut self) -> Result<StepOutcome<M::Kind>, EngineError> {
        if let Some(status) = self.check_bounds() {
            self.status = status;
            return Ok(StepOutcome::Halted(status));
        }

        let (event, delta_time) = match self.select_event() {
            Selection::Event { event, delta_time } => (event, delta_time),
            Selection::Exhausted => {
                debug!(step = self.step, "No event with a positive rate remains.");
                self.status = EngineStatus::Exhausted;
                return Ok(StepOutcome::Halted(EngineStatus::Exhausted));
            }
        };

        let action = self
            .system
            .defect(event.object)?
            .actions()
            .get(event.action)
            .copied()
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "selected action {} of defect {} does not exist",
                    event.action, event.object
                ))
            })?;

        let mut escaped = Vec::new();
        let survivor = self.apply_mutation(event, action, &mut escaped)?;
        let reaction = match survivor {
            Some(index) => self.check_recombination(index, &mut escaped)?,
            None => None,
        };
        self.advance_clock(delta_time);

        trace!(
            step = self.step,
            time = self.time,
            object = event.object,
            %action,
            objects = self.system.len(),
            "Step committed."
        );
        self.escaped.extend(escaped.iter().cloned());
        Ok(StepOutcome::Advanced(StepReport {
            step: self.step,
            time: self.time,
            delta_time,
            object: event.object,
            action,
            escaped,
            reaction,
        }))
    }

    /// Steps until a terminal status is reached.
    #[instrument(skip_all, name = "kinetic_run")]
    pub fn run(&mut self) -> Result<EngineStatus, EngineError> {
        loop {
            if let StepOutcome::Halted(status) = self.step()? {
                info!(
                    ?status,
                    steps = self.step,
                    time = self.time,
                    objects = self.system.len(),
                    "Kinetic run finished."
                );
                return Ok(status);
            }
        }
    }

    /// Adds `states` translated by `offset`, then settles the combined population with the
    /// initial recombination sweep. Defects landing outside the box on a non-periodic axis are
    /// recorded as escaped instead. Returns the number of defects implanted.
    ///
    /// A population that cannot be indexed is rejected as a whole and the previous one is kept.
    /// Implanting does not clear a `Failed` status.
    #[instrument(skip_all, name = "implant", fields(count = states.len()))]
    pub fn implant(
        &mut self,
        states: Vec<DefectState<M::Kind>>,
        offset: &Vector3<f64>,
    ) -> Result<usize, EngineError> {
        let mut population: Vec<DefectState<M::Kind>> = self
            .system
            .ensemble()
            .iter()
            .map(|d| d.state().clone())
            .collect();

        let mut implanted = 0;
        let mut dropped = Vec::new();
        for state in states {
            let moved = state.translated(offset);
            if self.system.open_axis_outside(&moved.position).is_some() {
                dropped.push(EscapedDefect {
                    step: self.step,
                    time: self.time,
                    state: moved,
                });
                continue;
            }
            population.push(moved);
            implanted += 1;
        }

        self.system.reset(population)?;
        self.escaped.extend(dropped);
        if self.system.config().initial_recombination {
            self.reactions += self.system.initial_recombination()? as u64;
        }
        if self.status != EngineStatus::Failed {
            self.status = EngineStatus::Ready;
        }
        debug!(implanted, objects = self.system.len(), "Cascade implanted.");
        Ok(implanted)
    }

    /// Restarts simulated time and the step counter at zero.
    pub fn reset_clock(&mut self) {
        self.step = 0;
        self.time = 0.0;
        if matches!(self.status, EngineStatus::TimeLimit | EngineStatus::StepLimit) {
            self.status = EngineStatus::Ready;
        }
    }

    pub fn snapshot(&self) -> Snapshot<M::Kind> {
        let model = self.system.model();
        let mut interstitials = 0;
        let mut vacancies = 0;
        let defects = self
            .system
            .ensemble()
            .iter()
            .map(|defect| {
                let units = u64::from(defect.size());
                match model.polarity(defect.kind()) {
                    Polarity::Interstitial => interstitials += units,
                    Polarity::Vacancy => vacancies += units,
                }
                DefectRecord {
                    kind: defect.kind(),
                    size: defect.size(),
                    position: *defect.position(),
                    orientation: defect.state().orientation,
                    radius: model.geometry(defect.kind(), defect.size()).rho,
                }
            })
            .collect();

        Snapshot {
            step: self.step,
            time: self.time,
            total_energy: self.system.total_energy(),
            total_rate: self.system.total_rate(),
            tallies: self.system.ensemble().tallies().clone(),
            interstitials,
            vacancies,
            defects,
        }
    }

    fn check_bounds(&self) -> Option<EngineStatus> {
        if self.status.is_terminal() {
            return Some(self.status);
        }
        let bounds = &self.system.config().bounds;
        if self.time >= bounds.max_time {
            Some(EngineStatus::TimeLimit)
        } else if self.step >= bounds.max_steps {
            Some(EngineStatus::StepLimit)
        } else {
            None
        }
    }

    fn select_event(&mut self) -> Selection {
        let u1: f64 = self.rng.r#gen();
        let u2: f64 = self.rng.sample(Open01);
        self.system.rates().select(u1, u2)
    }

    /// Commits the chosen action and returns the index of the mover if it is still present.
    fn apply_mutation(
        &mut self,
        event: Event,
        action: Action,
        escaped: &mut Vec<EscapedDefect<M::Kind>>,
    ) -> Result<Option<usize>, EngineError> {
        let state = self.system.defect(event.object)?.state();
        let transition = self
            .system
            .model()
            .transition(state, action, &mut self.rng)?;
        let (body, emitted) = transition.into_parts();

        self.system.substitute(event.object, body)?;
        let mut survivor = Some(event.object);
        if self.remove_if_escaped(event.object, escaped)? {
            survivor = None;
        }

        if let Some(emitted) = emitted {
            let index = self.system.add(emitted)?;
            self.remove_if_escaped(index, escaped)?;
        }
        Ok(survivor)
    }

    /// Resolves the first recombination between `index` and its neighbours, in enumeration order.
    fn check_recombination(
        &mut self,
        index: usize,
        escaped: &mut Vec<EscapedDefect<M::Kind>>,
    ) -> Result<Option<Reaction>, EngineError> {
        for other in self.system.neighbors(index)? {
            let displacement = self.system.displacement(index, other)?;
            let outcome = self.system.model().recombination(
                self.system.defect(index)?.state(),
                self.system.defect(other)?.state(),
                &displacement,
            );
            let reaction = match outcome {
                Recombination::None => continue,
                Recombination::Annihilate => {
                    self.system.delete(&[index, other])?;
                    Reaction::Annihilated {
                        first: index,
                        second: other,
                    }
                }
                Recombination::Merge(state) => {
                    self.system.substitute(index, state)?;
                    self.system.delete(&[other])?;
                    let merged = if other < index { index - 1 } else { index };
                    self.remove_if_escaped(merged, escaped)?;
                    Reaction::Merged {
                        survivor: index,
                        absorbed: other,
                    }
                }
            };
            self.reactions += 1;
            debug!(step = self.step, ?reaction, "Recombination resolved.");
            return Ok(Some(reaction));
        }
        Ok(None)
    }

    fn remove_if_escaped(
        &mut self,
        index: usize,
        escaped: &mut Vec<EscapedDefect<M::Kind>>,
    ) -> Result<bool, EngineError> {
        if !self.system.has_escaped(index)? {
            return Ok(false);
        }
        let removed = self.system.delete(&[index])?;
        for defect in removed {
            debug!(step = self.step, kind = %defect.kind(), "Defect escaped the domain.");
            escaped.push(EscapedDefect {
                step: self.step,
                time: self.time,
                state: defect.into_state(),
            });
        }
        Ok(true)
    }

    fn advance_clock(&mut self, delta_time: f64) {
        self.step += 1;
        self.time += delta_time;
    }
}
