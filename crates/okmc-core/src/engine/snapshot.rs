use super::ensemble::KindTally;
use crate::core::io::descriptor::DefectDescriptor;
use crate::core::io::steptime::StepTimeRecord;
use nalgebra::{Point3, Vector3};
use std::collections::BTreeMap;
use std::fmt;

/// One defect as seen by a reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectRecord<K> {
    pub kind: K,
    pub size: u32,
    pub position: Point3<f64>,
    pub orientation: Option<Vector3<f64>>,
    pub radius: f64,
}

/// A read-only copy of the engine state at one moment.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<K: Ord> {
    pub step: u64,
    pub time: f64,
    pub total_energy: f64,
    pub total_rate: f64,
    pub tallies: BTreeMap<K, KindTally>,
    /// Summed size of all interstitial-type defects.
    pub interstitials: u64,
    /// Summed size of all vacancy-type defects.
    pub vacancies: u64,
    pub defects: Vec<DefectRecord<K>>,
}

impl<K: Ord + fmt::Display> Snapshot<K> {
    pub fn object_count(&self) -> usize {
        self.defects.len()
    }

    pub fn descriptors(&self) -> Vec<DefectDescriptor> {
        self.defects
            .iter()
            .map(|d| DefectDescriptor {
                kind: d.kind.to_string(),
                size: d.size,
                position: d.position.coords.into(),
                orientation: d.orientation.map(Into::into),
            })
            .collect()
    }

    pub fn steptime_record(&self) -> StepTimeRecord {
        StepTimeRecord {
            step: self.step,
            time: self.time,
            interstitials: self.interstitials,
            vacancies: self.vacancies,
            objects: self.defects.len(),
            energy: self.total_energy,
        }
    }
}

/// When to take snapshots after step zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputCadence {
    /// Every step that is a multiple of `n`.
    StepUniform(u64),
    /// Whenever at least `dt` seconds have passed since the last output.
    TimeUniform(f64),
    /// Whenever the step count reaches `factor` times the step of the last output.
    StepExp(f64),
    /// Whenever the time reaches `factor` times the time of the last output.
    TimeExp(f64),
}

/// Decides at which `(step, time)` pairs output is due. Step zero always fires.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchedule {
    cadence: OutputCadence,
    last: Option<(u64, f64)>,
}

impl OutputSchedule {
    pub fn new(cadence: OutputCadence) -> Self {
        Self {
            cadence,
            last: None,
        }
    }

    pub fn cadence(&self) -> OutputCadence {
        self.cadence
    }

    /// Returns whether output is due and, if so, records `(step, time)` as the latest output.
    pub fn should_output(&mut self, step: u64, time: f64) -> bool {
        let due = match self.last {
            _ if step == 0 => true,
            None => true,
            Some((last_step, last_time)) => {
                if step == last_step {
                    false
                } else {
                    match self.cadence {
                        OutputCadence::StepUniform(n) => n > 0 && step % n == 0,
                        OutputCadence::TimeUniform(dt) => time >= last_time + dt,
                        OutputCadence::StepExp(factor) => {
                            step as f64 >= last_step.max(1) as f64 * factor
                        }
                        OutputCadence::TimeExp(factor) => time >= last_time * factor,
                    }
                }
            }
        };
        if due {
            self.last = Some((step, time));
        }
        due
    }

    /// Forgets the last output so the next call fires, as after a clock reset.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
