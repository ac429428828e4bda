// Unscented Kalman filter localization sample
//
// Usage: ukf_localization [config.toml]
//
// Without an argument the reference scenario runs with its default
// parameters. Plots are written to the paths in the [output] section.

use std::path::Path;

use tracing::{info, warn};

use ukf_localization::localization::Simulation;
use ukf_localization::utils::Visualizer;
use ukf_localization::{LocalizationResult, SimulationConfig};

fn main() -> LocalizationResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SimulationConfig::load(Path::new(path))?
        }
        None => {
            info!("Using default configuration");
            SimulationConfig::default()
        }
    };

    let landmarks = config.landmarks()?;
    let filter_config = config.filter_config()?;
    let robot_config = config.robot_config()?;

    let mut vis = Visualizer::new(
        landmarks.clone(),
        robot_config.initial_pose,
        filter_config.initial_mean,
        &filter_config.initial_covariance,
    );

    let mut sim = Simulation::new(filter_config, robot_config, landmarks, config.time()?)?;
    let snapshots = sim.run_with(|snapshot| vis.update(snapshot))?;

    if let Some(last) = snapshots.last() {
        info!(
            x = last.estimate.x,
            y = last.estimate.y,
            yaw = last.estimate.yaw,
            "final estimate"
        );
    }
    let coverage = vis.two_sigma_coverage();
    info!(
        x = coverage[0],
        y = coverage[1],
        yaw = coverage[2],
        "fraction of errors inside 2 sigma"
    );

    let output = &config.output;
    let plots: [(&Option<String>, fn(&Visualizer, &str) -> LocalizationResult<()>); 4] = [
        (&output.trajectory_svg, Visualizer::save_trajectory_svg),
        (&output.state_svg, Visualizer::save_state_svg),
        (&output.error_svg, Visualizer::save_error_svg),
        (&output.gain_svg, Visualizer::save_gain_svg),
    ];
    for (path, save) in plots.iter() {
        if let Some(path) = path {
            if let Err(e) = save(&vis, path.as_str()) {
                warn!("plot {} skipped: {}", path, e);
            }
        }
    }

    Ok(())
}
