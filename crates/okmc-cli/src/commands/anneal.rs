use super::{build_traps, describe_content, load_cascades, print_summary};
use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::Result;
use crate::output::RunOutput;
use crate::utils::progress::CliProgressHandler;
use okmc::core::tungsten::TungstenModel;
use okmc::engine::progress::ProgressReporter;
use okmc::workflows::anneal;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let app = build_config(&args, None)?;
    let model = TungstenModel::new(app.material.clone())?;
    let cascades = load_cascades(&app.cascade_files)?;
    let traps = build_traps(&app)?;
    let mut output = RunOutput::create(&app.output_dir)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Annealing {} cascade(s) at {} K...",
        cascades.len(),
        app.anneal.engine.temperature
    );
    info!("Invoking the individual annealing workflow...");

    let summaries = anneal::anneal_individual(
        &model,
        &app.anneal,
        &cascades,
        traps.as_ref(),
        &reporter,
        |label, snapshot| output.record(label, snapshot),
    )?;

    println!("Annealing complete. Final states:");
    for summary in &summaries {
        let written = output.finish(&summary.label, &summary.snapshot)?;
        info!(
            cascade = %summary.label,
            content = %describe_content(summary),
            "Final state written to {:?}",
            written
        );
        print_summary(summary, &written);
    }
    Ok(())
}
