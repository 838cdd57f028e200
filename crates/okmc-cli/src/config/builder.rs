use super::defaults::DefaultsConfig;
use super::file::{FileCascadeConfig, FileConfig};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use okmc::core::tungsten::MaterialParams;
use okmc::engine::config::EngineConfigBuilder;
use okmc::workflows::anneal::{AnnealConfig, OffsetMode};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

/// Merges built-in defaults, the run file and command-line overrides, in increasing priority.
///
/// `cascades` is the cascade count given on the command line of `okmc cumulative`.
pub fn build_config(args: &RunArgs, cascades: Option<usize>) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let domain = file_config.domain.take().unwrap_or_default();
    let run = file_config.run.take().unwrap_or_default();
    let output = file_config.output.take().unwrap_or_default();
    let cascade = file_config.cascade.take().unwrap_or_default();

    let box_lengths = domain.box_lengths.ok_or_else(|| {
        CliError::Config("`domain.box` is required (box lengths in nm)".to_string())
    })?;

    let mut builder = EngineConfigBuilder::new()
        .box_lengths(box_lengths)
        .periodic(domain.periodic.unwrap_or(defaults.periodic))
        .cutoff(domain.cutoff.unwrap_or(defaults.cutoff))
        .max_neighbors(domain.max_neighbors.unwrap_or(defaults.max_neighbors))
        .max_image(domain.max_image.unwrap_or(defaults.max_image))
        .temperature(
            args.temperature
                .or(run.temperature)
                .unwrap_or(defaults.temperature),
        )
        .elastic_interaction(
            !args.no_elastic
                && run
                    .elastic_interaction
                    .unwrap_or(defaults.elastic_interaction),
        )
        .activation_bound(run.activation_bound.unwrap_or(defaults.activation_bound))
        .initial_recombination(
            run.initial_recombination
                .unwrap_or(defaults.initial_recombination),
        )
        .seed(args.seed.or(run.seed).unwrap_or(defaults.seed));
    if let Some(cell_size) = domain.cell_size {
        builder = builder.cell_size(cell_size);
    }
    let max_steps = args.max_steps.or(run.max_steps);
    let max_time = args.max_time.or(run.max_time);
    if let Some(steps) = max_steps {
        builder = builder.max_steps(steps);
    }
    if let Some(time) = max_time {
        builder = builder.max_time(time);
    }
    if max_steps.is_none() && max_time.is_none() {
        warn!("No step or time limit set; runs end only when no event remains.");
    }
    let engine = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let material = merge_material(file_config.material, file_config.material_file)?;
    let traps = file_config.traps.map(|t| t.species).unwrap_or_default();

    let cascade_files = if args.inputs.is_empty() {
        cascade.files.clone().unwrap_or_default()
    } else {
        args.inputs.clone()
    };
    if cascade_files.is_empty() {
        return Err(CliError::Config(
            "No cascade files given; list them in `cascade.files` or pass `-i`".to_string(),
        ));
    }

    let stages = merge_stage_count(cascades, &cascade, box_lengths, &defaults)?;
    debug!(stages, files = cascade_files.len(), "Run configuration merged.");

    Ok(AppConfig {
        output_dir: args
            .output
            .clone()
            .or(output.directory)
            .unwrap_or(defaults.output_directory),
        cascade_files,
        material,
        traps,
        anneal: AnnealConfig {
            engine,
            cadence: output.cadence.map(Into::into).unwrap_or(defaults.cadence),
            recenter: cascade.recenter.unwrap_or(defaults.recenter),
        },
        stages,
        offset: cascade.offset.unwrap_or(defaults.offset),
    })
}

fn merge_material(
    inline: Option<MaterialParams>,
    file: Option<PathBuf>,
) -> Result<MaterialParams> {
    match (inline, file) {
        (Some(_), Some(_)) => Err(CliError::Config(
            "`material` and `material-file` cannot both be given".to_string(),
        )),
        (Some(params), None) => {
            params.validate()?;
            Ok(params)
        }
        (None, Some(path)) => Ok(MaterialParams::load(&path)?),
        (None, None) => Ok(MaterialParams::default()),
    }
}

fn merge_stage_count(
    cli_cascades: Option<usize>,
    cascade: &FileCascadeConfig,
    box_lengths: [f64; 3],
    defaults: &DefaultsConfig,
) -> Result<usize> {
    if let Some(n) = cli_cascades {
        return Ok(n);
    }
    match (cascade.count, cascade.fluence) {
        (Some(_), Some(_)) => Err(CliError::Config(
            "`cascade.count` and `cascade.fluence` cannot both be given".to_string(),
        )),
        (Some(n), None) => Ok(n),
        (None, Some(fluence)) => {
            if !(fluence.is_finite() && fluence > 0.0) {
                return Err(CliError::Config(format!(
                    "`cascade.fluence` must be positive, got {}",
                    fluence
                )));
            }
            // One cascade per impact on the x-y face.
            let expected = fluence * box_lengths[0] * box_lengths[1];
            Ok((expected.round() as usize).max(1))
        }
        (None, None) => Ok(defaults.cascades),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Argument(format!("Invalid value for {}: {}", key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Argument(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };

        match key {
            "domain.cutoff" => {
                config.domain.get_or_insert_with(Default::default).cutoff =
                    Some(parse_value(key, value)?);
            }
            "domain.max-neighbors" => {
                config.domain.get_or_insert_with(Default::default).max_neighbors =
                    Some(parse_value(key, value)?);
            }
            "run.temperature" => {
                config.run.get_or_insert_with(Default::default).temperature =
                    Some(parse_value(key, value)?);
            }
            "run.max-time" => {
                config.run.get_or_insert_with(Default::default).max_time =
                    Some(parse_value(key, value)?);
            }
            "run.max-steps" => {
                config.run.get_or_insert_with(Default::default).max_steps =
                    Some(parse_value(key, value)?);
            }
            "run.seed" => {
                config.run.get_or_insert_with(Default::default).seed =
                    Some(parse_value(key, value)?);
            }
            "run.elastic-interaction" => {
                config
                    .run
                    .get_or_insert_with(Default::default)
                    .elastic_interaction = Some(parse_value(key, value)?);
            }
            "run.activation-bound" => {
                config.run.get_or_insert_with(Default::default).activation_bound =
                    Some(parse_value(key, value)?);
            }
            "run.initial-recombination" => {
                config
                    .run
                    .get_or_insert_with(Default::default)
                    .initial_recombination = Some(parse_value(key, value)?);
            }
            "output.directory" => {
                config.output.get_or_insert_with(Default::default).directory =
                    Some(PathBuf::from(value));
            }
            "cascade.recenter" => {
                config.cascade.get_or_insert_with(Default::default).recenter =
                    Some(parse_value(key, value)?);
            }
            "cascade.count" => {
                config.cascade.get_or_insert_with(Default::default).count =
                    Some(parse_value(key, value)?);
            }
            "cascade.fluence" => {
                config.cascade.get_or_insert_with(Default::default).fluence =
                    Some(parse_value(key, value)?);
            }
            "cascade.offset" => {
                let offset = match value {
                    "xy" => OffsetMode::Xy,
                    "xyz" => OffsetMode::Xyz,
                    _ => {
                        return Err(CliError::Argument(format!(
                            "Invalid value for {}: {} (expected 'xy' or 'xyz')",
                            key, value
                        )));
                    }
                };
                config.cascade.get_or_insert_with(Default::default).offset = Some(offset);
            }
            _ => {
                return Err(CliError::Argument(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use okmc::core::tungsten::CaptureCriterion;
    use okmc::engine::snapshot::OutputCadence;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    fn write_run_file(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("run.toml");
        fs::write(&path, body).unwrap();
        path
    }

    fn args_with_config(path: &Path) -> RunArgs {
        RunArgs {
            config: Some(path.to_path_buf()),
            ..RunArgs::default()
        }
    }

    const MINIMAL: &str = r#"
        [domain]
        box = [20.0, 30.0, 40.0]

        [cascade]
        files = ["c1.xyz"]
        "#;

    #[test]
    fn minimal_file_is_completed_with_defaults() {
        let dir = tempdir().unwrap();
        let path = write_run_file(&dir, MINIMAL);

        let app = build_config(&args_with_config(&path), None).unwrap();
        let defaults = DefaultsConfig::default();
        let engine = &app.anneal.engine;

        assert_eq!(engine.domain.box_lengths, [20.0, 30.0, 40.0]);
        assert_eq!(engine.domain.cutoff, defaults.cutoff);
        assert_eq!(engine.domain.cell_size, [defaults.cutoff; 3]);
        assert_eq!(engine.temperature, defaults.temperature);
        assert_eq!(engine.seed, defaults.seed);
        assert!(!engine.elastic_interaction);
        assert!(engine.initial_recombination);
        assert_eq!(app.anneal.cadence, defaults.cadence);
        assert_eq!(app.cascade_files, vec![dir.path().join("c1.xyz")]);
        assert_eq!(app.output_dir, defaults.output_directory);
        assert_eq!(app.material, MaterialParams::default());
        assert!(app.traps.is_empty());
        assert_eq!(app.stages, 1);
    }

    #[test]
    fn file_values_are_used() {
        let dir = tempdir().unwrap();
        let path = write_run_file(
            &dir,
            r#"
            [domain]
            box = [20.0, 20.0, 20.0]
            periodic = [true, true, false]
            cutoff = 2.5
            cell-size = [4.0, 4.0, 5.0]

            [run]
            temperature = 800.0
            max-steps = 5000
            seed = 3
            elastic-interaction = true

            [material]
            capture = "ring"

            [output]
            directory = "results"
            cadence = { type = "step-uniform", every = 100 }

            [cascade]
            files = ["a.xyz", "b.xyz"]
            recenter = true
            count = 12
            offset = "xyz"
            "#,
        );

        let app = build_config(&args_with_config(&path), None).unwrap();
        let engine = &app.anneal.engine;
        assert_eq!(engine.domain.periodic, [true, true, false]);
        assert_eq!(engine.domain.cell_size, [4.0, 4.0, 5.0]);
        assert_eq!(engine.temperature, 800.0);
        assert_eq!(engine.bounds.max_steps, 5000);
        assert_eq!(engine.seed, 3);
        assert!(engine.elastic_interaction);
        assert_eq!(app.material.capture, CaptureCriterion::Ring);
        assert_eq!(app.output_dir, dir.path().join("results"));
        assert_eq!(app.anneal.cadence, OutputCadence::StepUniform(100));
        assert!(app.anneal.recenter);
        assert_eq!(app.cascade_files.len(), 2);
        assert_eq!(app.stages, 12);
        assert_eq!(app.offset, OffsetMode::Xyz);
    }

    #[test]
    fn cli_overrides_file_values() {
        let dir = tempdir().unwrap();
        let path = write_run_file(
            &dir,
            r#"
            [domain]
            box = [20.0, 20.0, 20.0]
            [run]
            temperature = 800.0
            seed = 3
            elastic-interaction = true
            [cascade]
            files = ["a.xyz"]
            count = 4
            "#,
        );

        let mut args = args_with_config(&path);
        args.temperature = Some(450.0);
        args.seed = Some(99);
        args.max_time = Some(1.0e-2);
        args.no_elastic = true;
        args.inputs = vec![PathBuf::from("/tmp/other.xyz")];
        args.output = Some(PathBuf::from("/tmp/out"));

        let app = build_config(&args, Some(7)).unwrap();
        let engine = &app.anneal.engine;
        assert_eq!(engine.temperature, 450.0);
        assert_eq!(engine.seed, 99);
        assert_eq!(engine.bounds.max_time, 1.0e-2);
        assert!(!engine.elastic_interaction);
        assert_eq!(app.cascade_files, vec![PathBuf::from("/tmp/other.xyz")]);
        assert_eq!(app.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(app.stages, 7);
    }

    #[test]
    fn set_values_override() {
        let dir = tempdir().unwrap();
        let path = write_run_file(&dir, MINIMAL);
        let mut args = args_with_config(&path);
        args.set_values = vec![
            "run.temperature=1200".to_string(),
            "run.max-steps=50".to_string(),
            "domain.cutoff=3.0".to_string(),
            "cascade.fluence=0.01".to_string(),
            "cascade.offset=xyz".to_string(),
            "run.initial-recombination=false".to_string(),
        ];

        let app = build_config(&args, None).unwrap();
        let engine = &app.anneal.engine;
        assert_eq!(engine.temperature, 1200.0);
        assert_eq!(engine.bounds.max_steps, 50);
        assert_eq!(engine.domain.cutoff, 3.0);
        assert!(!engine.initial_recombination);
        assert_eq!(app.offset, OffsetMode::Xyz);
        // 0.01 cascades per nm² over a 20 x 30 nm face.
        assert_eq!(app.stages, 6);
    }

    #[test]
    fn malformed_set_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_run_file(&dir, MINIMAL);
        for bad in ["run.temperature", "run.temperature=hot", "run.colour=blue"] {
            let mut args = args_with_config(&path);
            args.set_values = vec![bad.to_string()];
            assert!(
                matches!(build_config(&args, None), Err(CliError::Argument(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn missing_box_is_a_config_error() {
        let mut args = RunArgs::default();
        args.inputs = vec![PathBuf::from("c.xyz")];
        assert!(matches!(build_config(&args, None), Err(CliError::Config(_))));
    }

    #[test]
    fn missing_cascades_are_a_config_error() {
        let dir = tempdir().unwrap();
        let path = write_run_file(&dir, "[domain]\nbox = [10.0, 10.0, 10.0]\n");
        assert!(matches!(
            build_config(&args_with_config(&path), None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn count_and_fluence_are_exclusive() {
        let dir = tempdir().unwrap();
        let path = write_run_file(
            &dir,
            r#"
            [domain]
            box = [10.0, 10.0, 10.0]
            [cascade]
            files = ["c.xyz"]
            count = 3
            fluence = 0.5
            "#,
        );
        assert!(matches!(
            build_config(&args_with_config(&path), None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn inline_and_external_material_are_exclusive() {
        let dir = tempdir().unwrap();
        let path = write_run_file(
            &dir,
            r#"
            material-file = "w.toml"
            [domain]
            box = [10.0, 10.0, 10.0]
            [material]
            poisson-ratio = 0.3
            [cascade]
            files = ["c.xyz"]
            "#,
        );
        assert!(matches!(
            build_config(&args_with_config(&path), None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn external_material_file_is_loaded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("w.toml"), "lattice-constant = 0.32\n").unwrap();
        let path = write_run_file(
            &dir,
            r#"
            material-file = "w.toml"
            [domain]
            box = [10.0, 10.0, 10.0]
            [cascade]
            files = ["c.xyz"]
            "#,
        );
        let app = build_config(&args_with_config(&path), None).unwrap();
        assert_eq!(app.material.lattice_constant, 0.32);
    }

    #[test]
    fn invalid_engine_values_surface_as_config_errors() {
        let dir = tempdir().unwrap();
        let path = write_run_file(&dir, MINIMAL);
        let mut args = args_with_config(&path);
        args.temperature = Some(-5.0);
        assert!(matches!(build_config(&args, None), Err(CliError::Config(_))));
    }
}
