use std::env;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use bakeconfig::BakeConfig;
use imagetarget::OutputDirResolver;
use scheduler::{BakeEngine, BakeReport, BakeSession, JobStatus, UvFillEngine};
use shadergraph::Scene;
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;
use crate::state::AppState;

pub fn run(args: RunArgs) -> Result<()> {
    let scene_path = args
        .scene
        .clone()
        .ok_or_else(|| anyhow!("no scene file given; usage: pbrbake <SCENE> [OPTIONS]"))?;
    let paths = AppPaths::discover()?;
    let config = load_config(&args, &paths)?;
    let mut scene = Scene::load(&scene_path)
        .with_context(|| format!("failed to load scene {}", scene_path.display()))?;
    let working_dir = env::current_dir().context("failed to determine working directory")?;

    tracing::debug!(
        config = %paths.config_dir().display(),
        scene = %scene_path.display(),
        project = ?scene.project(),
        channels = ?config.channels,
        "resolved pbrbake inputs"
    );

    let mut session = BakeSession::new();
    let mut engine = UvFillEngine::new();
    session
        .start(&scene, &config, &working_dir, Instant::now())
        .context("failed to start bake")?;

    let report = drive(
        &mut session,
        &mut scene,
        &mut engine,
        config.tick_interval,
        args.cancel_after,
    )?;
    println!("{report}");

    let output_dir = OutputDirResolver::new(&working_dir)
        .with_project_file(scene.project())
        .resolve(&config.output_dir)
        .ok();
    let state_path = paths.state_file();
    let mut state = AppState::load_or_default(&state_path)?;
    state.record(output_dir, &report);
    state.persist(&state_path)?;

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    Ok(())
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<BakeConfig> {
    let path = args.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = BakeConfig::load_or_default(&path)
        .with_context(|| format!("failed to load bake config {}", path.display()))?;
    args.apply_to(&mut config);
    config.validate().context("invalid bake settings")?;
    Ok(config)
}

/// Steps the job until it stops, pausing `tick` between steps. A step error
/// cancels the job before it is returned.
fn drive(
    session: &mut BakeSession,
    scene: &mut Scene,
    engine: &mut dyn BakeEngine,
    tick: Duration,
    cancel_after: Option<usize>,
) -> Result<BakeReport> {
    let mut steps = 0usize;
    loop {
        let now = Instant::now();
        if cancel_after.is_some_and(|limit| steps >= limit) {
            tracing::info!(steps, "cancelling bake (--cancel-after)");
            session.cancel(scene, now)?;
            break;
        }

        let status = match session.advance(scene, engine, now) {
            Ok(status) => status,
            Err(err) => {
                if let Err(cancel_err) = session.cancel(scene, Instant::now()) {
                    tracing::warn!(error = %cancel_err, "failed to cancel after step error");
                }
                return Err(err).context("bake step failed");
            }
        };
        steps += 1;

        if let Some(progress) = session.progress(Instant::now()) {
            tracing::info!("{}", progress.status_line());
        }
        if status != JobStatus::Running {
            break;
        }
        if !tick.is_zero() {
            thread::sleep(tick);
        }
    }
    session
        .report()
        .ok_or_else(|| anyhow!("bake stopped without a report"))
}

fn write_report(path: &Path, report: &BakeReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    }
    fs::write(path, json)
        .with_context(|| format!("failed to write run report to {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote run report");
    Ok(())
}
