use std::sync::Arc;

use gaze_contingent::config::Config;
use gaze_contingent::constants::TRACKER_CHANNEL_CAPACITY;
use gaze_contingent::error::SetupError;
use gaze_contingent::gaze::recording::Recording;
use gaze_contingent::gaze::source::replay::ReplayClock;
use gaze_contingent::gaze::source::{
    tracker_channel, GazeSource, LiveTracker, PacedReplay, RecordedReplay, SimulatedTracker,
    SimulationConfig, SourceKind,
};
use gaze_contingent::logging::{init_tracing, LogConfig};
use gaze_contingent::session::{Pacing, Session, TrialOutcome};
use gaze_contingent::trial::{AgentTrajectories, BehaviorKind, ExperimentConfig};
use tokio::sync::{broadcast, watch};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!(source = config.source.as_str(), "Starting gaze-contingent");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    if let Err(e) = run(&config, shutdown_tx).await {
        tracing::error!(error = %e, "Session setup failed");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn run(config: &Config, shutdown_tx: broadcast::Sender<()>) -> Result<(), SetupError> {
    let experiment = Arc::new(ExperimentConfig::from_env(&config.experiment)?);
    tracing::info!(
        refresh_hz = experiment.refresh_rate_hz,
        tracker_hz = experiment.tracker_rate_hz,
        sac_to_reward = ?experiment.sac_to_reward,
        data_lag = experiment.data_lag_frames,
        "Experiment config ready"
    );

    let trajectories = Arc::new(match config.trajectory_path.as_deref() {
        Some(path) => AgentTrajectories::load(path)?,
        None => demo_trajectories(&experiment)?,
    });
    let pacing = if config.realtime {
        Pacing::RealTime
    } else {
        Pacing::Unpaced
    };

    let recording = match config.source {
        SourceKind::Live => None,
        SourceKind::Recorded | SourceKind::Paced => {
            let path = config
                .recording_path
                .as_deref()
                .ok_or(SetupError::MissingRecording)?;
            Some(Arc::new(Recording::load(path)?))
        }
    };

    let mut simulator = None;
    let (source, behavior): (Box<dyn GazeSource>, BehaviorKind) = match (&recording, config.source) {
        (Some(recording), SourceKind::Paced) => (
            Box::new(PacedReplay::new(
                Arc::clone(recording),
                experiment.tracker_fixation_params(),
                experiment.display,
                experiment.refresh_rate_hz,
                experiment.max_trial_secs,
            )) as Box<dyn GazeSource>,
            BehaviorKind::ReplayDriven,
        ),
        (Some(recording), _) => {
            let clock = match pacing {
                Pacing::RealTime => ReplayClock::Wall,
                Pacing::Unpaced => ReplayClock::Frames {
                    refresh_hz: experiment.refresh_rate_hz,
                },
            };
            (
                Box::new(
                    RecordedReplay::new(
                        Arc::clone(recording),
                        experiment.tracker_fixation_params(),
                        experiment.display,
                    )
                    .with_clock(clock)
                    .with_lag_ms(config.replay_lag_ms),
                ) as Box<dyn GazeSource>,
                BehaviorKind::ReplayDriven,
            )
        }
        (None, _) => {
            let (handle, rx) = tracker_channel(TRACKER_CHANNEL_CAPACITY);
            let (target_tx, target_rx) = watch::channel(None);
            let sim = SimulatedTracker::new(
                SimulationConfig {
                    rate_hz: experiment.tracker_rate_hz,
                    noise_deg: config.simulation.noise_deg,
                    dropout_probability: config.simulation.dropout_probability,
                    hold_ms: config.simulation.hold_ms,
                    target_agent: experiment.target_agents[0],
                    seed: config.simulation.seed,
                },
                experiment.display,
                handle,
            );
            simulator = Some((sim.spawn(target_rx, shutdown_tx.subscribe()), target_tx));
            (
                Box::new(LiveTracker::new(
                    experiment.tracker_fixation_params(),
                    experiment.display,
                    rx,
                )) as Box<dyn GazeSource>,
                BehaviorKind::GazeContingent,
            )
        }
    };

    let mut session =
        Session::new(Arc::clone(&experiment), source).with_shutdown(shutdown_tx.subscribe());
    if let Some(recording) = &recording {
        session = session.with_recording(Arc::clone(recording));
    }
    let simulator_task = match simulator {
        Some((task, target_tx)) => {
            session = session.with_simulation(target_tx);
            Some(task)
        }
        None => None,
    };

    let trials = recording
        .as_ref()
        .map_or(config.trials, |r| r.trials.len().min(config.trials));
    tracing::info!(
        session = %session.id(),
        subject = config.subject_id,
        block = config.block,
        trials,
        "Session started"
    );

    for trial in 0..trials {
        let summary = session
            .run_trial(trial, Arc::clone(&trajectories), behavior, pacing)
            .await?;
        if summary.outcome == TrialOutcome::Aborted {
            break;
        }
    }

    let report = session.into_report();
    tracing::info!(
        session = %report.session_id,
        trials = report.trials.len(),
        events = report.events.len(),
        final_phase = report.final_phase,
        "Session complete"
    );
    if let Some(path) = config.summary_path.as_deref() {
        report.save(path)?;
        tracing::info!(path, "Session report written");
    }

    if let Some(task) = simulator_task {
        let _ = shutdown_tx.send(());
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Simulated tracker task panicked");
        }
    }
    Ok(())
}

/// 未提供轨迹文件时的演示轨迹：两个目标沿圆周互相追逐，其余为干扰项
fn demo_trajectories(experiment: &ExperimentConfig) -> Result<AgentTrajectories, SetupError> {
    let frames = (experiment.refresh_rate_hz * 30.0) as usize;
    let agents = experiment
        .target_agents
        .iter()
        .copied()
        .max()
        .map_or(2, |m| m + 1)
        .max(4);
    let rows = (0..frames)
        .map(|f| {
            let t = f as f64 / experiment.refresh_rate_hz;
            (0..agents)
                .map(|a| {
                    let phase = a as f64 * std::f64::consts::TAU / agents as f64;
                    let lag = if a == 1 { -0.4 } else { 0.0 };
                    let angle = 0.5 * (t + lag) + phase * if a < 2 { 0.0 } else { 1.0 };
                    let radius = 6.0 + a as f64;
                    [radius * angle.cos(), radius * angle.sin()]
                })
                .collect()
        })
        .collect();
    AgentTrajectories::new(rows)
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
