use okmc::core::io::descriptor::write_descriptors_to_path;
use okmc::core::io::steptime::StepTimeWriter;
use okmc::engine::snapshot::Snapshot;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const STEPTIME_FILE: &str = "steptime.csv";
pub const FINAL_SNAPSHOT: &str = "defects.final";

/// Writes the output of every run into its own subdirectory of `root`: a `steptime.csv` log
/// with one row per scheduled snapshot, a `defects.<step>` descriptor file per snapshot and a
/// closing `defects.final`.
pub struct RunOutput {
    root: PathBuf,
    logs: HashMap<String, StepTimeWriter<File>>,
}

impl RunOutput {
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            logs: HashMap::new(),
        })
    }

    pub fn run_dir(&self, label: &str) -> PathBuf {
        self.root.join(label)
    }

    pub fn record<K: Ord + fmt::Display>(
        &mut self,
        label: &str,
        snapshot: &Snapshot<K>,
    ) -> io::Result<()> {
        let dir = self.run_dir(label);
        if !self.logs.contains_key(label) {
            fs::create_dir_all(&dir)?;
            let writer = StepTimeWriter::create(dir.join(STEPTIME_FILE)).map_err(io::Error::from)?;
            self.logs.insert(label.to_string(), writer);
        }
        if let Some(log) = self.logs.get_mut(label) {
            log.write(&snapshot.steptime_record())
                .map_err(io::Error::from)?;
            log.flush()?;
        }

        let path = dir.join(format!("defects.{}", snapshot.step));
        write_descriptors_to_path(&path, &snapshot.descriptors())?;
        debug!(label, step = snapshot.step, path = ?path, "Snapshot written.");
        Ok(())
    }

    pub fn finish<K: Ord + fmt::Display>(
        &mut self,
        label: &str,
        snapshot: &Snapshot<K>,
    ) -> io::Result<PathBuf> {
        let dir = self.run_dir(label);
        fs::create_dir_all(&dir)?;
        let path = dir.join(FINAL_SNAPSHOT);
        write_descriptors_to_path(&path, &snapshot.descriptors())?;
        if let Some(mut log) = self.logs.remove(label) {
            log.flush()?;
        }
        Ok(path)
    }
}
