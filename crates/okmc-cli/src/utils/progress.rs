use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use okmc::engine::kinetic::EngineStatus;
use okmc::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ClockReading {
    step: u64,
    time: f64,
    objects: usize,
}

/// One bar counting finished cascades or stages, with a status line for the run in flight.
struct AnnealDisplay {
    bar: ProgressBar,
    phase: String,
    run: Option<String>,
    clock: Option<ClockReading>,
}

impl AnnealDisplay {
    fn status_line(&self) -> String {
        match (&self.run, self.clock) {
            (None, _) => self.phase.clone(),
            (Some(run), None) => run.clone(),
            (Some(run), Some(clock)) => format!(
                "{} | step {} | t = {:.3e} s | {} objects",
                run, clock.step, clock.time, clock.objects
            ),
        }
    }

    fn refresh(&self) {
        self.bar.set_message(self.status_line());
    }

    fn handle(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                self.phase = name.to_string();
                self.run = None;
                self.clock = None;
                self.bar.reset();
                self.bar.set_length(0);
                if let Some(style) = spinner_style() {
                    self.bar.set_style(style);
                }
                self.bar
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                self.refresh();
            }
            Progress::TaskStart { total_steps } => {
                self.bar.disable_steady_tick();
                self.bar.set_length(total_steps);
                self.bar.set_position(0);
                if let Some(style) = bar_style() {
                    self.bar.set_style(style);
                }
            }
            Progress::RunStart { label, objects } => {
                self.run = Some(label);
                self.clock = Some(ClockReading {
                    step: 0,
                    time: 0.0,
                    objects,
                });
                self.refresh();
            }
            Progress::Clock {
                step,
                time,
                objects,
            } => {
                self.clock = Some(ClockReading {
                    step,
                    time,
                    objects,
                });
                self.refresh();
            }
            Progress::RunFinish { label, status } => {
                let line = match self.clock {
                    Some(clock) => format!(
                        "  {}: {} after {} steps, t = {:.3e} s, {} objects",
                        label,
                        describe_status(status),
                        clock.step,
                        clock.time,
                        clock.objects
                    ),
                    None => format!("  {}: {}", label, describe_status(status)),
                };
                self.bar.println(line);
            }
            Progress::TaskIncrement => self.bar.inc(1),
            Progress::TaskFinish => {
                let total = self.bar.length().unwrap_or(0);
                if self.bar.position() < total {
                    self.bar.set_position(total);
                }
                self.run = None;
                self.clock = None;
                self.bar.finish();
            }
            Progress::PhaseFinish => {
                self.bar.disable_steady_tick();
                self.bar.finish_with_message(format!("✓ {} done", self.phase));
            }
            Progress::Message(msg) => {
                if !self.bar.is_finished() {
                    self.bar.println(format!("  {}", msg));
                } else {
                    self.bar.set_message(msg);
                }
            }
        }
    }
}

/// Why a run stopped, as shown next to its label.
fn describe_status(status: EngineStatus) -> &'static str {
    match status {
        EngineStatus::Ready => "still running",
        EngineStatus::Exhausted => "no events left",
        EngineStatus::TimeLimit => "reached the time limit",
        EngineStatus::StepLimit => "reached the step limit",
        EngineStatus::Failed => "failed",
    }
}

fn spinner_style() -> Option<ProgressStyle> {
    ProgressStyle::with_template("{spinner:.green} {msg}").ok()
}

fn bar_style() -> Option<ProgressStyle> {
    let style = ProgressStyle::with_template("[{bar:30.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .ok()?
        .with_key(
            "eta",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            },
        )
        .progress_chars("##-");
    Some(style)
}

#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<AnnealDisplay>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.finish_and_clear();

        Self {
            display: Arc::new(Mutex::new(AnnealDisplay {
                bar,
                phase: String::new(),
                run: None,
                clock: None,
            })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let display = self.display.clone();
        Box::new(move |progress: Progress| {
            let Ok(mut display) = display.lock() else {
                warn!("Progress display mutex was poisoned. Cannot update progress.");
                return;
            };
            display.handle(progress);
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
