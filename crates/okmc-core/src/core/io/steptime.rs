use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One row of the step/time log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepTimeRecord {
    pub step: u64,
    pub time: f64,
    pub interstitials: u64,
    pub vacancies: u64,
    pub objects: usize,
    pub energy: f64,
}

/// Appends [`StepTimeRecord`]s to a CSV stream with a header row.
pub struct StepTimeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl StepTimeWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl<W: Write> StepTimeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    pub fn write(&mut self, record: &StepTimeRecord) -> Result<(), csv::Error> {
        self.writer.serialize(record)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
