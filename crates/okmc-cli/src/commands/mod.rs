pub mod anneal;
pub mod cumulative;

use crate::config::AppConfig;
use crate::error::{CliError, Result};
use okmc::core::io::descriptor::read_descriptors_from_path;
use okmc::core::trap::TrapField;
use okmc::workflows::anneal::{AnnealSummary, Cascade};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Stream of the seeded generator reserved for trap placement.
const TRAP_STREAM: u64 = 1;

/// Reads every cascade file. Labels are the file stems, made unique with the file's position
/// when two files share a stem.
pub(crate) fn load_cascades(files: &[PathBuf]) -> Result<Vec<Cascade>> {
    let mut seen = HashSet::new();
    let mut cascades = Vec::with_capacity(files.len());
    for (i, path) in files.iter().enumerate() {
        info!("Loading cascade from {:?}", path);
        let defects = read_descriptors_from_path(path).map_err(|e| CliError::FileParsing {
            path: path.clone(),
            source: e,
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("cascade-{}", i));
        let label = if seen.insert(stem.clone()) {
            stem
        } else {
            format!("{}-{}", stem, i)
        };
        cascades.push(Cascade { label, defects });
    }
    Ok(cascades)
}

pub(crate) fn build_traps(app: &AppConfig) -> Result<Option<TrapField>> {
    if app.traps.is_empty() {
        return Ok(None);
    }
    let mut rng = ChaCha8Rng::seed_from_u64(app.anneal.engine.seed);
    rng.set_stream(TRAP_STREAM);
    let field = TrapField::generate(
        &app.traps,
        app.anneal.engine.domain.simulation_box(),
        app.material.atomic_volume(),
        &mut rng,
    )?;
    info!(sites = field.len(), "Trap field generated.");
    Ok(Some(field))
}

pub(crate) fn print_summary<K: Ord>(summary: &AnnealSummary<K>, written: &Path) {
    println!(
        "  {:<16} {:?} after {} steps, t = {:.4e} s, {} objects, {} escaped -> {}",
        summary.label,
        summary.status,
        summary.steps,
        summary.time,
        summary.objects,
        summary.escaped,
        written.display()
    );
}

pub(crate) fn describe_content<K: Ord + fmt::Display>(summary: &AnnealSummary<K>) -> String {
    format!(
        "{} interstitials, {} vacancies",
        summary.snapshot.interstitials, summary.snapshot.vacancies
    )
}
