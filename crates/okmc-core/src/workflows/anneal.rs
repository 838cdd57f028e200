use crate::core::defect::DefectState;
use crate::core::geometry::SimulationBox;
use crate::core::io::descriptor::DefectDescriptor;
use crate::core::model::{self, PhysicalModel};
use crate::core::trap::{TrapField, TrapLookup};
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::kinetic::{EngineStatus, KineticEngine, StepOutcome};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::snapshot::{OutputCadence, OutputSchedule, Snapshot};
use crate::engine::system::DefectSystem;
use nalgebra::{Point3, Vector3};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::io;
use tracing::{debug, info, instrument};

/// Steps between two clock reports.
const CLOCK_REPORT_INTERVAL: u64 = 1000;

/// One cascade of primary damage, as read from a descriptor file.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub label: String,
    pub defects: Vec<DefectDescriptor>,
}

/// Which axes are randomized when placing a cascade in cumulative annealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetMode {
    /// Random in-plane position, original depth. Suited to a surface-normal beam along z.
    #[default]
    Xy,
    Xyz,
}

#[derive(Debug, Clone)]
pub struct AnnealConfig {
    pub engine: EngineConfig,
    pub cadence: OutputCadence,
    /// Shift each cascade so that its centroid sits at the box centre.
    pub recenter: bool,
}

#[derive(Debug, Clone)]
pub struct CumulativeConfig {
    pub anneal: AnnealConfig,
    /// Number of cascades annealed in sequence.
    pub cascades: usize,
    pub offset: OffsetMode,
}

/// The outcome of one annealing run or stage.
#[derive(Debug, Clone)]
pub struct AnnealSummary<K: Ord> {
    pub label: String,
    /// Label of the cascade this run started from or, in cumulative annealing, implanted last.
    pub source: String,
    pub status: EngineStatus,
    pub steps: u64,
    pub time: f64,
    pub objects: usize,
    /// Defects lost through the boundaries so far.
    pub escaped: usize,
    /// Recombination events so far, including those of the initial sweeps.
    pub reactions: u64,
    pub snapshot: Snapshot<K>,
}

/// Anneals every cascade independently and returns one summary per cascade.
///
/// Each cascade gets its own engine seeded from the configured seed plus its position in
/// `cascades`, so results do not depend on which other cascades are run alongside it.
/// `observer` receives the run label and a snapshot whenever the output schedule fires.
#[instrument(skip_all, name = "individual_anneal", fields(cascades = cascades.len()))]
pub fn anneal_individual<M, F>(
    model: &M,
    config: &AnnealConfig,
    cascades: &[Cascade],
    traps: Option<&TrapField>,
    reporter: &ProgressReporter,
    mut observer: F,
) -> Result<Vec<AnnealSummary<M::Kind>>, EngineError>
where
    M: PhysicalModel + Clone,
    F: FnMut(&str, &Snapshot<M::Kind>) -> io::Result<()>,
{
    if cascades.is_empty() {
        return Err(EngineError::NoCascades);
    }
    reporter.report(Progress::PhaseStart {
        name: "Individual Annealing",
    });
    reporter.report(Progress::TaskStart {
        total_steps: cascades.len() as u64,
    });

    let sim_box = config.engine.domain.simulation_box();
    let mut summaries = Vec::with_capacity(cascades.len());
    for (index, cascade) in cascades.iter().enumerate() {
        let mut rng = ChaCha8Rng::seed_from_u64(config.engine.seed.wrapping_add(index as u64));
        let mut states = materialize_all(model, &cascade.defects, &mut rng)?;
        if config.recenter {
            states = recentered(states, &sim_box);
        }

        let system = DefectSystem::new(
            model.clone(),
            config.engine.clone(),
            states,
            boxed(traps),
        )?;
        let mut engine = KineticEngine::new(system, rng)?;
        let mut schedule = OutputSchedule::new(config.cadence);
        let status = drive(&mut engine, &mut schedule, &cascade.label, reporter, &mut observer)?;

        let summary = summarize(&cascade.label, &cascade.label, &engine, status);
        info!(
            cascade = %cascade.label,
            ?status,
            steps = summary.steps,
            time = summary.time,
            objects = summary.objects,
            escaped = summary.escaped,
            "Cascade annealed."
        );
        summaries.push(summary);
        reporter.report(Progress::TaskIncrement);
    }

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);
    Ok(summaries)
}

/// Anneals a growing population: one randomly chosen cascade to start, then
/// `config.cascades - 1` further cascades, each implanted at a random offset into the annealed
/// result of the previous stage. The clock restarts with every implantation.
///
/// Returns one summary per stage. Escape and reaction counts accumulate across stages.
#[instrument(skip_all, name = "cumulative_anneal", fields(stages = config.cascades))]
pub fn anneal_cumulative<M, F>(
    model: &M,
    config: &CumulativeConfig,
    library: &[Cascade],
    traps: Option<&TrapField>,
    reporter: &ProgressReporter,
    mut observer: F,
) -> Result<Vec<AnnealSummary<M::Kind>>, EngineError>
where
    M: PhysicalModel + Clone,
    F: FnMut(&str, &Snapshot<M::Kind>) -> io::Result<()>,
{
    if library.is_empty() || config.cascades == 0 {
        return Err(EngineError::NoCascades);
    }
    reporter.report(Progress::PhaseStart {
        name: "Cumulative Annealing",
    });
    reporter.report(Progress::TaskStart {
        total_steps: config.cascades as u64,
    });

    let engine_config = &config.anneal.engine;
    let sim_box = engine_config.domain.simulation_box();
    let mut picker = ChaCha8Rng::seed_from_u64(engine_config.seed);

    let mut cascade = &library[picker.gen_range(0..library.len())];
    let mut states = materialize_all(model, &cascade.defects, &mut picker)?;
    if config.anneal.recenter {
        states = recentered(states, &sim_box);
    }
    let system = DefectSystem::new(model.clone(), engine_config.clone(), states, boxed(traps))?;
    let engine_rng = ChaCha8Rng::seed_from_u64(picker.r#gen());
    let mut engine = KineticEngine::new(system, engine_rng)?;
    let mut schedule = OutputSchedule::new(config.anneal.cadence);

    let mut summaries = Vec::with_capacity(config.cascades);
    for stage in 0..config.cascades {
        if stage > 0 {
            cascade = &library[picker.gen_range(0..library.len())];
            let states = materialize_all(model, &cascade.defects, &mut picker)?;
            let offset = random_offset(&states, &sim_box, config.offset, &mut picker);
            let implanted = engine.implant(states, &offset)?;
            engine.reset_clock();
            schedule.reset();
            debug!(
                stage,
                cascade = %cascade.label,
                implanted,
                objects = engine.system().len(),
                "Stage prepared."
            );
        }

        let label = format!("stage-{:04}", stage);
        let status = drive(&mut engine, &mut schedule, &label, reporter, &mut observer)?;
        let summary = summarize(&label, &cascade.label, &engine, status);
        info!(
            stage,
            cascade = %cascade.label,
            ?status,
            time = summary.time,
            objects = summary.objects,
            escaped = summary.escaped,
            "Stage annealed."
        );
        summaries.push(summary);
        reporter.report(Progress::TaskIncrement);
    }

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);
    Ok(summaries)
}

/// Steps `engine` to a terminal status, offering a snapshot to `observer` whenever `schedule`
/// fires.
fn drive<M, R, F>(
    engine: &mut KineticEngine<M, R>,
    schedule: &mut OutputSchedule,
    label: &str,
    reporter: &ProgressReporter,
    observer: &mut F,
) -> Result<EngineStatus, EngineError>
where
    M: PhysicalModel,
    R: Rng,
    F: FnMut(&str, &Snapshot<M::Kind>) -> io::Result<()>,
{
    reporter.report(Progress::RunStart {
        label: label.to_string(),
        objects: engine.system().len(),
    });
    loop {
        if schedule.should_output(engine.step_count(), engine.time()) {
            observer(label, &engine.snapshot())?;
        }
        match engine.step()? {
            StepOutcome::Advanced(report) => {
                if report.step % CLOCK_REPORT_INTERVAL == 0 {
                    reporter.report(Progress::Clock {
                        step: report.step,
                        time: report.time,
                        objects: engine.system().len(),
                    });
                }
            }
            StepOutcome::Halted(status) => {
                reporter.report(Progress::Clock {
                    step: engine.step_count(),
                    time: engine.time(),
                    objects: engine.system().len(),
                });
                reporter.report(Progress::RunFinish {
                    label: label.to_string(),
                    status,
                });
                return Ok(status);
            }
        }
    }
}

fn summarize<M: PhysicalModel, R: Rng>(
    label: &str,
    source: &str,
    engine: &KineticEngine<M, R>,
    status: EngineStatus,
) -> AnnealSummary<M::Kind> {
    let snapshot = engine.snapshot();
    AnnealSummary {
        label: label.to_string(),
        source: source.to_string(),
        status,
        steps: engine.step_count(),
        time: engine.time(),
        objects: snapshot.object_count(),
        escaped: engine.escaped().len(),
        reactions: engine.reactions(),
        snapshot,
    }
}

fn materialize_all<M: PhysicalModel>(
    model: &M,
    descriptors: &[DefectDescriptor],
    rng: &mut dyn RngCore,
) -> Result<Vec<DefectState<M::Kind>>, EngineError> {
    descriptors
        .iter()
        .map(|d| model::materialize(model, d, rng).map_err(EngineError::from))
        .collect()
}

fn boxed(traps: Option<&TrapField>) -> Option<Box<dyn TrapLookup>> {
    traps.map(|field| Box::new(field.clone()) as Box<dyn TrapLookup>)
}

fn centroid<K>(states: &[DefectState<K>]) -> Option<Point3<f64>> {
    if states.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = states.iter().map(|s| s.position.coords).sum();
    Some(Point3::from(sum / states.len() as f64))
}

fn recentered<K: Copy>(states: Vec<DefectState<K>>, sim_box: &SimulationBox) -> Vec<DefectState<K>> {
    match centroid(&states) {
        Some(center) => {
            let shift = sim_box.center() - center;
            states.iter().map(|s| s.translated(&shift)).collect()
        }
        None => states,
    }
}

/// Translation that moves the centroid of `states` to a random point of the box.
fn random_offset<K, R: Rng + ?Sized>(
    states: &[DefectState<K>],
    sim_box: &SimulationBox,
    mode: OffsetMode,
    rng: &mut R,
) -> Vector3<f64> {
    let lengths = sim_box.lengths();
    let target = Vector3::from_fn(|k, _| rng.r#gen::<f64>() * lengths[k]);
    let Some(center) = centroid(states) else {
        return Vector3::zeros();
    };
    let mut offset = target - center.coords;
    if mode == OffsetMode::Xy {
        offset.z = 0.0;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::EngineConfigBuilder;
    use crate::engine::progress::ProgressCallback;
    use crate::testing::{ToyKind, ToyModel};
    use std::sync::Mutex;

    fn engine_config(max_steps: u64) -> EngineConfig {
        EngineConfigBuilder::new()
            .box_lengths([10.0, 10.0, 10.0])
            .cell_size([2.0, 2.0, 2.0])
            .cutoff(2.0)
            .temperature(600.0)
            .max_steps(max_steps)
            .seed(17)
            .build()
            .unwrap()
    }

    fn anneal_config(max_steps: u64, recenter: bool) -> AnnealConfig {
        AnnealConfig {
            engine: engine_config(max_steps),
            cadence: OutputCadence::StepUniform(10),
            recenter,
        }
    }

    fn cascade(label: &str, lines: &[&str]) -> Cascade {
        Cascade {
            label: label.to_string(),
            defects: lines.iter().map(|l| l.parse().unwrap()).collect(),
        }
    }

    fn library() -> Vec<Cascade> {
        vec![
            cascade("pair", &["Vac 1 2.0 2.0 2.0", "Sia 1 6.0 6.0 6.0"]),
            cascade("cluster", &["Cluster 3 5.0 5.0 5.0", "Vac 2 8.0 1.0 3.0"]),
        ]
    }

    #[test]
    fn individual_anneal_summarizes_every_cascade() {
        let mut observed = Vec::new();
        let summaries = anneal_individual(
            &ToyModel::default(),
            &anneal_config(25, false),
            &library(),
            None,
            &ProgressReporter::new(),
            |label, snapshot| {
                observed.push((label.to_string(), snapshot.step));
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].label, "pair");
        assert_eq!(summaries[1].source, "cluster");
        for summary in &summaries {
            assert!(summary.status.is_terminal());
            assert!(summary.steps <= 25);
            assert_eq!(summary.objects, summary.snapshot.object_count());
        }
        assert!(observed.contains(&("pair".to_string(), 0)));
        assert!(observed.contains(&("cluster".to_string(), 0)));
        assert!(observed.iter().all(|(_, step)| step % 10 == 0));
    }

    #[test]
    fn individual_anneal_is_reproducible() {
        let run = || {
            anneal_individual(
                &ToyModel::default(),
                &anneal_config(40, false),
                &library(),
                None,
                &ProgressReporter::new(),
                |_, _| Ok(()),
            )
            .unwrap()
        };
        let first = run();
        let second = run();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.snapshot, b.snapshot);
        }
    }

    #[test]
    fn recentering_moves_the_centroid_to_the_box_centre() {
        let summaries = anneal_individual(
            &ToyModel::default(),
            &anneal_config(0, true),
            &[cascade("far", &["Vac 1 1.0 1.0 1.0", "Vac 1 3.0 1.0 1.0"])],
            None,
            &ProgressReporter::new(),
            |_, _| Ok(()),
        )
        .unwrap();

        let positions: Vec<_> = summaries[0]
            .snapshot
            .defects
            .iter()
            .map(|d| d.position)
            .collect();
        assert_eq!(summaries[0].steps, 0);
        assert!((positions[0] - Point3::new(4.0, 5.0, 5.0)).norm() < 1e-12);
        assert!((positions[1] - Point3::new(6.0, 5.0, 5.0)).norm() < 1e-12);
    }

    #[test]
    fn empty_library_is_rejected() {
        let result = anneal_individual(
            &ToyModel::default(),
            &anneal_config(10, false),
            &[],
            None,
            &ProgressReporter::new(),
            |_, _| Ok(()),
        );
        assert!(matches!(result, Err(EngineError::NoCascades)));
    }

    #[test]
    fn observer_failures_abort_the_run() {
        let result = anneal_individual(
            &ToyModel::default(),
            &anneal_config(10, false),
            &library(),
            None,
            &ProgressReporter::new(),
            |_, _| Err(io::Error::other("disk full")),
        );
        assert!(matches!(result, Err(EngineError::Output(_))));
    }

    #[test]
    fn cumulative_anneal_accumulates_content_in_plane() {
        let config = CumulativeConfig {
            anneal: anneal_config(5, false),
            cascades: 3,
            offset: OffsetMode::Xy,
        };
        let interstitials = [cascade("sia", &["Sia 1 4.0 4.0 2.0"])];
        let stages = Mutex::new(Vec::new());
        let runs = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::TaskIncrement => stages.lock().unwrap().push(()),
            Progress::RunFinish { label, status } => runs.lock().unwrap().push((label, status)),
            _ => {}
        }) as ProgressCallback);

        let summaries = anneal_cumulative(
            &ToyModel::default(),
            &config,
            &interstitials,
            None,
            &reporter,
            |_, _| Ok(()),
        )
        .unwrap();
        drop(reporter);

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[2].label, "stage-0002");
        assert_eq!(stages.into_inner().unwrap().len(), 3);
        let runs = runs.into_inner().unwrap();
        let labels: Vec<&str> = runs.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, ["stage-0000", "stage-0001", "stage-0002"]);
        assert!(runs.iter().all(|(_, status)| *status == EngineStatus::StepLimit));

        let last = &summaries[2].snapshot;
        assert_eq!(last.interstitials, 3);
        assert_eq!(last.vacancies, 0);
        assert!(last.defects.iter().all(|d| (d.position.z - 2.0).abs() < 1e-12));
        assert!(summaries.iter().all(|s| s.steps <= 5));
    }

    #[test]
    fn random_offset_keeps_depth_in_plane_mode() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sim_box = SimulationBox::new([10.0, 20.0, 30.0], [true; 3]);
        let states = vec![
            DefectState::new(ToyKind::Vac, 1, Point3::new(1.0, 1.0, 1.0)),
            DefectState::new(ToyKind::Vac, 1, Point3::new(3.0, 3.0, 3.0)),
        ];
        for _ in 0..20 {
            let planar = random_offset(&states, &sim_box, OffsetMode::Xy, &mut rng);
            assert_eq!(planar.z, 0.0);
            let target = Point3::new(2.0, 2.0, 2.0) + planar;
            assert!((0.0..10.0).contains(&target.x) && (0.0..20.0).contains(&target.y));

            let full = random_offset(&states, &sim_box, OffsetMode::Xyz, &mut rng);
            assert!((0.0..30.0).contains(&(2.0 + full.z)));
        }
        let empty: Vec<DefectState<ToyKind>> = Vec::new();
        assert_eq!(
            random_offset(&empty, &sim_box, OffsetMode::Xyz, &mut rng),
            Vector3::zeros()
        );
    }
}
