use std::process::ExitCode;

use tilecore::{
    resolve_world_dir, run_main_loop, AppError, Backends, DirResources, HeadlessPlatform, World,
};
use tracing::{error, info};

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_world(&app) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_world(app: &AppWiring) -> Result<(), AppError> {
    let world_dir = resolve_world_dir()?;
    info!(world_dir = %world_dir.display(), "world_dir_resolved");

    let backends = Backends::headless(DirResources::new(world_dir));
    let mut world = World::load(backends)?;
    let mut platform = HeadlessPlatform::new();
    let summary = run_main_loop(&mut world, &mut platform, &app.config)?;

    info!(
        frames = summary.frames,
        draws = summary.draws,
        dropped_frames = summary.dropped_frames,
        world_time_ms = world.time().as_millis() as u64,
        "shutdown_complete"
    );
    Ok(())
}
