//! `kettle` – runs PID kettle sessions against simulated hardware.
//!
//! 1. Loads the config from the path given as first argument, or from
//!    `~/.kettle/config.toml`; writes a default config there on first run.
//! 2. Starts one control session per configured kettle, each on its own
//!    simulated kettle and its own task.
//! 3. Prints every control sample until **Ctrl-C**, which stops every
//!    session; each session switches its actuators off before exiting.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use kettle_hal::{SetpointTable, SimKettle, SimKettleParams};
use kettle_runtime::{KettleController, StopHandle, init_tracing};
use kettle_types::{ControlSample, KettleError, PowerMode, SessionId, StopReason, TempUnit};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;

type SessionTask = JoinHandle<(SessionId, Result<StopReason, KettleError>)>;

fn main() -> ExitCode {
    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::from(2);
        }
    };

    let _guard = init_tracing("kettle", cfg.log_format);
    print_banner(&cfg);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {}", "Startup error".red(), e);
            ExitCode::from(2)
        }
    }
}

fn load_config() -> Result<Config, config::ConfigError> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);

    match config::load_from(&path)? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            Ok(cfg)
        }
        None => {
            let mut cfg = Config::default();
            config::save_to(&cfg, &path)?;
            println!("  Wrote default config to {}", path.display().to_string().bold());
            config::apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

fn print_banner(cfg: &Config) {
    println!();
    println!("{}", "  kettle – PID kettle control".bold().cyan());
    println!(
        "  {} kettle(s), temperatures in {}",
        cfg.kettles.len(),
        cfg.temp_unit
    );
    println!("  Press Ctrl-C to stop every session.");
    println!();
}

/// Start every session and wait for all of them.  `Ok(true)` when every
/// session ended cleanly.
async fn run(cfg: Config) -> Result<bool, KettleError> {
    let setpoints = SetpointTable::new();
    let (sample_tx, sample_rx) = broadcast::channel(64);

    // Every kettle is validated before any heater is switched on.
    let mut controllers = Vec::with_capacity(cfg.kettles.len());
    for settings in &cfg.kettles {
        let session = SessionId::new(
            settings
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        );
        let control = settings.control_config(cfg.temp_unit)?;
        setpoints.set(session.clone(), settings.target);

        let kettle = SimKettle::new(SimKettleParams {
            initial_temp: settings.initial_temp,
            ..sim_params(cfg.temp_unit)
        });
        let mut controller = KettleController::new(
            session.clone(),
            control,
            kettle.heater(format!("{session}_heater")),
            kettle.sensor(format!("{session}_probe")),
            Box::new(setpoints.clone()),
        )?
        .with_sample_channel(sample_tx.clone());
        if settings.heater_relay {
            controller = controller.with_heater_relay(kettle.relay(format!("{session}_relay")));
        }
        if settings.agitator {
            controller = controller.with_agitator(kettle.relay(format!("{session}_agitator")));
        }

        controllers.push(controller);
    }
    drop(sample_tx);

    let mut stop_handles: Vec<StopHandle> = Vec::new();
    let mut tasks: Vec<SessionTask> = Vec::new();
    for mut controller in controllers {
        let session = controller.session().clone();
        info!(%session, "starting kettle session");
        stop_handles.push(controller.stop_handle());
        tasks.push(tokio::spawn(async move {
            let result = controller.run().await;
            (session, result)
        }));
    }

    let handles = stop_handles.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping all sessions …".yellow().bold());
        for handle in &handles {
            handle.stop();
        }
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; sessions can only end on failure");
    }

    let printer = tokio::spawn(print_samples(sample_rx, cfg.temp_unit));

    let mut all_clean = true;
    for task in tasks {
        match task.await {
            Ok((session, Ok(reason))) => {
                println!("  {} {session}: {reason:?}", "✓".green());
            }
            Ok((session, Err(e))) => {
                all_clean = false;
                println!("  {} {session}: {e}", "✗".red());
            }
            Err(e) => {
                all_clean = false;
                error!(error = %e, "kettle session task panicked");
            }
        }
    }
    drop(stop_handles);
    let _ = printer.await;

    Ok(all_clean)
}

fn sim_params(unit: TempUnit) -> SimKettleParams {
    match unit {
        TempUnit::Celsius => SimKettleParams::default(),
        TempUnit::Fahrenheit => SimKettleParams {
            initial_temp: 68.0,
            ambient_temp: 68.0,
            heat_rate: 0.09,
            boiling_point: 212.0,
            ..SimKettleParams::default()
        },
    }
}

async fn print_samples(mut rx: broadcast::Receiver<ControlSample>, unit: TempUnit) {
    loop {
        match rx.recv().await {
            Ok(sample) => {
                let mode = match sample.mode {
                    PowerMode::Pid => sample.mode.to_string().green(),
                    PowerMode::FullPower => sample.mode.to_string().yellow(),
                    PowerMode::Boil => sample.mode.to_string().red(),
                };
                println!(
                    "  {} {:>12}  {:6.2}{unit} → {:6.2}{unit}  power {:5.1}%  [{mode}]{}",
                    sample.timestamp.format("%H:%M:%S").to_string().dimmed(),
                    sample.session.as_str(),
                    sample.temperature,
                    sample.target,
                    sample.power,
                    if sample.applied { " *" } else { "" },
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "sample printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
