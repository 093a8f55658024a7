//! `fgmon` - CLI for flightguard
//!
//! Runs the onboard monitor and gives ground-side access to the classifier,
//! model files, the flight log and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use flightguard::cli::{
    ClassifyCommand, Cli, Command, ConfigCommand, LogCommand, ModelCommand, RunCommand,
};
use flightguard::intake::{ArmState, ChannelSource, CommandIntake, NullSource, PositionIntake};
use flightguard::config::SensorConfig;
use flightguard::sensors::{
    AcousticSensor, MotionSensor, SimulatedAcoustic, SimulatedMotion, SysfsAdc,
};
use flightguard::storage::{run_recorder, RecordSink};
use flightguard::{
    init_logging, spawn_periodic, Config, DenseModel, FlightLog, InferenceLoop,
    OrientationEstimator, SafetyClassifier, SafetyModel, SamplingLoop, TaskHandle, TaskManager,
    TelemetryPort, TelemetryStore,
};

/// Chunks buffered between an input reader and the sampling loop.
const INTAKE_QUEUE_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Run(cmd) => handle_run(config, cmd).await,
        Command::Classify(cmd) => handle_classify(&config, &cmd),
        Command::Model(cmd) => handle_model(cmd),
        Command::Log(cmd) => handle_log(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_run(config: Config, cmd: RunCommand) -> anyhow::Result<()> {
    let store = TelemetryStore::shared();

    let stdin = ChannelSource::spawn_reader("operator", std::io::stdin(), INTAKE_QUEUE_DEPTH)?;
    let commands = CommandIntake::new(Box::new(stdin), ArmState::new());

    let position = match &cmd.gps {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open GPS source {}", path.display()))?;
            info!(path = %path.display(), "reading NMEA position");
            let source = ChannelSource::spawn_reader("gps", file, INTAKE_QUEUE_DEPTH)?;
            PositionIntake::new(Box::new(source))
        }
        None => PositionIntake::new(Box::new(NullSource)),
    };

    let (sink, recorder) = if config.recorder.enabled && !cmd.no_record {
        let path = config.database_path();
        let log = FlightLog::open(&path)
            .with_context(|| format!("failed to open flight log {}", path.display()))?;
        let (sink, rx) = RecordSink::channel(config.recorder.queue_depth);
        let max_records = config.recorder.max_records;
        let task = tokio::task::spawn_blocking(move || run_recorder(log, rx, max_records));
        (Some(sink), Some(task))
    } else {
        info!("flight log disabled");
        (None, None)
    };

    let motion = open_motion(&config.sensor, cmd.i2c.or_else(|| config.sensor.bus.clone()))?;
    let acoustic = open_acoustic(cmd.mic.or_else(|| config.acoustic.adc_path.clone()))?;

    let mut sampling = SamplingLoop::new(
        Arc::clone(&store),
        motion,
        acoustic,
        Box::new(std::io::stdout()),
    )
    .with_commands(commands)
    .with_position(position)
    .with_period(config.sampling_period())
    .with_timeouts(config.publish_timeout(), config.read_timeout())
    .with_estimator(OrientationEstimator::new(config.sensor.one_g))
    .with_full_scale(config.acoustic.full_scale);

    if let Some(sink) = sink {
        let session = cmd
            .session
            .unwrap_or_else(|| Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
        info!(session = %session, "recording session");
        sampling = sampling.with_recorder(sink, Some(session));
    }

    let model_path = cmd.model.or_else(|| config.inference.model_path.clone());
    let inference = InferenceLoop::new(
        DenseModel::loader(model_path),
        TelemetryPort::new(Arc::clone(&store), config.inference_timeout()),
    )
    .with_period(config.inference_period());

    let mut tasks = TaskManager::new();
    let sampling_handle = TaskHandle::new("sampling");
    let inference_handle = TaskHandle::new("inference");
    tasks.add(sampling_handle.clone());
    tasks.add(inference_handle.clone());

    let sampling_thread = spawn_periodic(sampling, sampling_handle)?;
    let inference_thread = match spawn_periodic(inference, inference_handle) {
        Ok(thread) => thread,
        Err(e) => {
            tasks.stop_all();
            return Err(e.into());
        }
    };
    info!(tasks = tasks.count(), "monitor running, press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    tasks.stop_all();
    signal.context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    let (sampling_ticks, inference_ticks) = tokio::task::spawn_blocking(move || {
        let sampling = sampling_thread.join();
        let inference = inference_thread.join();
        (sampling, inference)
    })
    .await?;
    let sampling_ticks = sampling_ticks.map_err(|_| anyhow!("sampling loop panicked"))?;
    let inference_ticks = inference_ticks.map_err(|_| anyhow!("inference loop panicked"))?;
    info!(sampling_ticks, inference_ticks, "loops stopped");

    // The sampling loop owned the record sink, so the recorder drains and exits.
    if let Some(task) = recorder {
        let summary = task.await??;
        info!(
            written = summary.written,
            pruned = summary.pruned,
            "flight log closed"
        );
    }

    Ok(())
}

fn open_motion(
    sensor: &SensorConfig,
    bus: Option<PathBuf>,
) -> anyhow::Result<Box<dyn MotionSensor>> {
    match bus {
        Some(path) => open_i2c(&path, sensor),
        None => {
            warn!("no I2C bus given, using simulated motion");
            Ok(Box::new(SimulatedMotion::default()))
        }
    }
}

#[cfg(target_os = "linux")]
fn open_i2c(path: &Path, sensor: &SensorConfig) -> anyhow::Result<Box<dyn MotionSensor>> {
    let driver = flightguard::sensors::linux::open_motion(path, sensor)
        .with_context(|| format!("failed to start motion sensor on {}", path.display()))?;
    Ok(Box::new(driver))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(path: &Path, _sensor: &SensorConfig) -> anyhow::Result<Box<dyn MotionSensor>> {
    anyhow::bail!("I2C bus {} needs a Linux host", path.display())
}

fn open_acoustic(adc: Option<PathBuf>) -> anyhow::Result<Box<dyn AcousticSensor>> {
    match adc {
        Some(path) => {
            let adc = SysfsAdc::open(&path)
                .with_context(|| format!("failed to open acoustic input {}", path.display()))?;
            Ok(Box::new(adc))
        }
        None => {
            warn!("no acoustic input given, using simulated noise");
            Ok(Box::new(SimulatedAcoustic::default()))
        }
    }
}

fn handle_classify(config: &Config, cmd: &ClassifyCommand) -> anyhow::Result<()> {
    let model_path = cmd
        .model
        .clone()
        .or_else(|| config.inference.model_path.clone());
    let mut classifier = SafetyClassifier::load(DenseModel::loader(model_path));
    let result = classifier.classify(cmd.roll, cmd.pitch, cmd.accel)?;

    if cmd.json {
        let out = serde_json::json!({
            "roll": cmd.roll,
            "pitch": cmd.pitch,
            "accel": cmd.accel,
            "safety_score": result.safety_score,
            "status": result.status,
            "code": result.status.code(),
            "model_available": classifier.is_available(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Safety score:  {:.0}", result.safety_score);
        println!("Status:        {} ({})", result.status, result.status.code());
        if let Some(reason) = classifier.unavailable_reason() {
            println!("Model:         unavailable ({reason})");
        }
    }
    Ok(())
}

fn handle_model(cmd: ModelCommand) -> anyhow::Result<()> {
    match cmd {
        ModelCommand::Check { file } => {
            let model = DenseModel::load(&file)?;
            println!("Model:         {}", file.display());
            println!("Layers:        {}", model.layer_count());
            println!("Parameters:    {}", model.parameter_count());

            let boxed: Box<dyn SafetyModel> = Box::new(model);
            let mut classifier = SafetyClassifier::new(boxed);
            let level = classifier.classify(0.0, 0.0, 1.0)?;
            println!(
                "Level flight:  score {:.0}, {}",
                level.safety_score, level.status
            );
        }
    }
    Ok(())
}

fn handle_log(config: &Config, cmd: LogCommand) -> anyhow::Result<()> {
    let path = config.database_path();
    let log = FlightLog::open(&path)
        .with_context(|| format!("failed to open flight log {}", path.display()))?;

    match cmd {
        LogCommand::Recent { limit, json } => {
            let records = log.recent(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No records in {}", path.display());
            } else {
                for entry in records {
                    println!(
                        "{}  {:<16}  {}",
                        entry.recorded_at.to_rfc3339(),
                        entry.session.as_deref().unwrap_or("-"),
                        entry.record
                    );
                }
            }
        }
        LogCommand::Stats { json } => {
            let stats = log.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let optional =
                    |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
                println!("Flight log:    {}", path.display());
                println!("Records:       {}", stats.total_records);
                println!("  nominal:     {}", stats.nominal_records);
                println!("  caution:     {}", stats.caution_records);
                println!("  critical:    {}", stats.critical_records);
                println!("Min score:     {}", optional(stats.min_safety_score));
                println!("Mean score:    {}", optional(stats.mean_safety_score));
                if let (Some(first), Some(last)) = (stats.first_record, stats.last_record) {
                    println!("First record:  {}", first.to_rfc3339());
                    println!("Last record:   {}", last.to_rfc3339());
                }
                println!("Size:          {} bytes", stats.db_size_bytes);
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Sampling]");
                println!("  Period (ms):          {}", config.sampling.period_ms);
                println!(
                    "  Publish timeout (ms): {}",
                    config.sampling.publish_timeout_ms
                );
                println!("  Read timeout (ms):    {}", config.sampling.read_timeout_ms);
                println!();
                println!("[Inference]");
                println!("  Period (ms):          {}", config.inference.period_ms);
                println!("  Timeout (ms):         {}", config.inference.timeout_ms);
                println!(
                    "  Model:                {}",
                    config
                        .inference
                        .model_path
                        .as_ref()
                        .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
                );
                println!();
                println!("[Sensor]");
                println!(
                    "  I2C bus:              {}",
                    config
                        .sensor
                        .bus
                        .as_ref()
                        .map_or_else(|| "(simulated)".to_string(), |p| p.display().to_string())
                );
                println!("  Address:              {:#04x}", config.sensor.address);
                println!("  One g (counts):       {}", config.sensor.one_g);
                println!("  Acoustic full scale:  {}", config.acoustic.full_scale);
                println!(
                    "  Acoustic input:       {}",
                    config
                        .acoustic
                        .adc_path
                        .as_ref()
                        .map_or_else(|| "(simulated)".to_string(), |p| p.display().to_string())
                );
                println!();
                println!("[Recorder]");
                println!("  Enabled:              {}", config.recorder.enabled);
                println!(
                    "  Database path:        {}",
                    config.database_path().display()
                );
                println!("  Max records:          {}", config.recorder.max_records);
                println!("  Queue depth:          {}", config.recorder.queue_depth);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
