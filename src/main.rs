//! Sitewatch - Transformer-Site Camera Event-Capture Engine
//!
//! Main entry point for the appliance camera core.

use sitewatch::{
    artifact_sweeper::ArtifactSweeper,
    config::MonitorConfig,
    day_night::{DayNightAdjuster, DetectorTuning},
    event_controller::EventController,
    event_log_service::{self, EventLogService},
    frame_source::{FrameSource, NullFrameSource, SyntheticFrameSource},
    ring_recorder::RingRecorder,
    snapshot_service::SnapshotService,
    state::{AppConfig, SystemHealth},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Select the frame source implementation. The real camera/encoder driver is
/// integrated at this seam; `synthetic` exercises the full pipeline on a
/// bench without hardware.
fn build_frame_source() -> Box<dyn FrameSource> {
    match std::env::var("SITEWATCH_SOURCE").as_deref() {
        Ok("synthetic") => {
            tracing::info!("Using synthetic frame source");
            Box::new(SyntheticFrameSource::new(640, 480, 30))
        }
        _ => {
            tracing::warn!("Camera driver not wired in, preview capture will report failures");
            Box::new(NullFrameSource)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitewatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sitewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let app_config = AppConfig::default();
    tracing::info!(
        site_id = %app_config.site_id,
        video_dir = %app_config.video_dir.display(),
        image_dir = %app_config.image_dir.display(),
        config_path = %app_config.config_path.display(),
        "Configuration loaded"
    );

    let monitor_config = MonitorConfig::load(&app_config.config_path)?;
    monitor_config.validate()?;

    // Initialize system health
    let system_health = Arc::new(RwLock::new(SystemHealth::default()));

    // Initialize components
    let recorder = Arc::new(RingRecorder::new(
        app_config.video_dir.clone(),
        app_config.site_id.clone(),
        monitor_config.recording.clone(),
    ));
    tracing::info!("RingRecorder initialized");

    let snapshot_service = Arc::new(SnapshotService::new(
        app_config.image_dir.clone(),
        app_config.site_id.clone(),
        monitor_config.snapshot.clone(),
    )?);
    tracing::info!("SnapshotService initialized");

    let event_log = Arc::new(EventLogService::with_log_file(
        2000,
        app_config.event_log_path.clone(),
    ));
    tracing::info!(
        event_log_path = %app_config.event_log_path.display(),
        "EventLogService initialized"
    );

    // Frame source and encoded stream routing
    let mut source = build_frame_source();
    source.attach_encoded_stream(recorder.stream_writer())?;
    let frame_source: Arc<Mutex<Box<dyn FrameSource>>> = Arc::new(Mutex::new(source));

    // Shared detector tuning for day/night adjustment
    let tuning = Arc::new(RwLock::new(DetectorTuning {
        threshold: monitor_config.motion.threshold,
    }));

    // Event handoff channel and consumer
    let (events_tx, events_rx) = mpsc::channel(64);
    let consumer = event_log_service::spawn_consumer(event_log.clone(), events_rx);
    tracing::info!("Event consumer started");

    let controller = Arc::new(EventController::new(
        app_config.site_id.clone(),
        monitor_config.clone(),
        frame_source.clone(),
        recorder.clone(),
        snapshot_service.clone(),
        events_tx,
        tuning.clone(),
    ));
    tracing::info!("EventController initialized");

    // Start day/night adjustment worker
    let day_night = Arc::new(DayNightAdjuster::new(
        monitor_config.night_mode.clone(),
        monitor_config.motion.threshold,
        tuning.clone(),
    ));
    day_night.adjust().await;
    let day_night_task = day_night.start();
    tracing::info!("Day/night adjuster started (30-minute check interval)");

    // Start artifact retention sweeper
    let sweeper = Arc::new(ArtifactSweeper::new(
        vec![app_config.video_dir.clone(), app_config.image_dir.clone()],
        monitor_config.snapshot.retention_days,
    ));
    let sweeper_task = sweeper.start();
    tracing::info!(
        retention_days = monitor_config.snapshot.retention_days,
        "Artifact sweeper started (hourly)"
    );

    // Start periodic routine snapshots
    let snapshot_interval = monitor_config.snapshot.interval_seconds.max(60);
    let routine_snapshots = snapshot_service.clone();
    let routine_source = frame_source.clone();
    let routine_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(snapshot_interval));
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            let still = {
                let mut source = routine_source.lock().await;
                source.capture_still()
            };
            match still {
                Ok(jpeg) => {
                    if let Err(e) = routine_snapshots.capture_routine(&jpeg, chrono::Utc::now()) {
                        tracing::warn!(error = %e, "Routine snapshot failed");
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Routine snapshot capture unavailable");
                }
            }
        }
    });
    tracing::info!(interval_seconds = snapshot_interval, "Routine snapshot worker started");

    // Start system health monitoring
    let health_monitor = system_health.clone();
    let health_task = tokio::spawn(async move {
        use sysinfo::System;
        let mut sys = System::new_all();
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            sys.refresh_all();

            let cpu = {
                let cpus = sys.cpus();
                if cpus.is_empty() {
                    0.0
                } else {
                    cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
                }
            };
            let memory = if sys.total_memory() > 0 {
                (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
            } else {
                0.0
            };

            let mut health = health_monitor.write().await;
            health.update(cpu, memory);
            if health.overloaded {
                tracing::warn!(
                    cpu_percent = format!("{:.0}", cpu),
                    memory_percent = format!("{:.0}", memory),
                    "System overloaded"
                );
            }
        }
    });

    // Start the detection loop
    controller.start().await;
    tracing::info!("Detection loop started - event capture active");

    // Run until shutdown is requested
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // Orderly shutdown: the detection loop first (it flushes any active
    // recording), then the periodic workers.
    controller.stop().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    day_night_task.abort();
    sweeper_task.abort();
    routine_task.abort();
    health_task.abort();
    drop(controller);
    consumer.abort();

    let stats = event_log.count().await;
    tracing::info!(recorded_events = stats, "Shutdown complete");

    Ok(())
}
