use super::{build_traps, describe_content, load_cascades, print_summary};
use crate::cli::CumulativeArgs;
use crate::config::build_config;
use crate::error::Result;
use crate::output::RunOutput;
use crate::utils::progress::CliProgressHandler;
use okmc::core::tungsten::TungstenModel;
use okmc::engine::progress::ProgressReporter;
use okmc::workflows::anneal::{self, CumulativeConfig};
use tracing::info;

pub fn run(args: CumulativeArgs) -> Result<()> {
    let app = build_config(&args.run, args.cascades)?;
    let model = TungstenModel::new(app.material.clone())?;
    let library = load_cascades(&app.cascade_files)?;
    let traps = build_traps(&app)?;
    let mut output = RunOutput::create(&app.output_dir)?;

    let config = CumulativeConfig {
        anneal: app.anneal.clone(),
        cascades: app.stages,
        offset: app.offset,
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Implanting {} cascade(s) drawn from a library of {} at {} K...",
        config.cascades,
        library.len(),
        app.anneal.engine.temperature
    );
    info!("Invoking the cumulative annealing workflow...");

    let summaries = anneal::anneal_cumulative(
        &model,
        &config,
        &library,
        traps.as_ref(),
        &reporter,
        |label, snapshot| output.record(label, snapshot),
    )?;

    println!("Cumulative annealing complete. Stages:");
    for summary in &summaries {
        let written = output.finish(&summary.label, &summary.snapshot)?;
        info!(
            stage = %summary.label,
            cascade = %summary.source,
            content = %describe_content(summary),
            "Stage state written to {:?}",
            written
        );
        print_summary(summary, &written);
    }
    if let Some(last) = summaries.last() {
        println!("Final population: {}.", describe_content(last));
    }
    Ok(())
}
