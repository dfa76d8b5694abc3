//! EventController - Motion-Triggered Capture State Machine
//!
//! ## Responsibilities
//!
//! - Drive the detection loop at the preview frame rate
//! - Debounce raw motion into confirmed events and gate re-triggers behind
//!   the motion cooldown
//! - Start/stop the ring recorder, feed the classifier, and orchestrate the
//!   start/peak/end snapshots
//! - Hand each finished event off through a bounded channel so the loop is
//!   never stalled by downstream storage or network work
//!
//! States: IDLE -> DEBOUNCING -> RECORDING <-> COOLDOWN -> IDLE. The
//! recorder's safety limits are checked on every pass through RECORDING and
//! COOLDOWN, so a stuck scene cannot record forever. Per-frame errors are
//! absorbed and logged; only a failed recording start aborts an event.

use crate::config::MonitorConfig;
use crate::day_night::DetectorTuning;
use crate::event_classifier::EventClassifier;
use crate::event_log_service::CapturedEvent;
use crate::frame_source::{FrameSource, PreviewFrame};
use crate::motion_detector::{MotionDetector, MotionRegion};
use crate::ring_recorder::{FinishedRecording, RingRecorder, StopReason, TriggerKind};
use crate::snapshot_service::{SnapshotPhase, SnapshotService, SnapshotSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Consecutive capture failures before a health warning is raised
const CAPTURE_FAILURE_WARN_EVERY: u32 = 30;

/// Detection state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No motion
    Idle,
    /// Motion seen but not yet confirmed
    Debouncing,
    /// Confirmed event, session active, motion ongoing
    Recording,
    /// Motion stopped, post-record window open
    Cooldown,
}

/// Engine statistics surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub motion_events: u64,
    pub recordings_saved: u64,
    pub snapshots_taken: u64,
    pub total_recording_seconds: u64,
    pub buffer_size_mb: f64,
    pub is_recording: bool,
    pub last_motion_at: Option<DateTime<Utc>>,
    pub consecutive_capture_failures: u32,
}

/// The per-loop engine: owns the detector, the per-event state and the
/// machine itself. Created by `EventController::start` and driven once per
/// processed frame.
pub(crate) struct DetectionEngine {
    site_id: String,
    config: MonitorConfig,
    detector: MotionDetector,
    classifier: EventClassifier,
    recorder: Arc<RingRecorder>,
    snapshots: Arc<SnapshotService>,
    frame_source: Arc<Mutex<Box<dyn FrameSource>>>,
    events_tx: mpsc::Sender<CapturedEvent>,
    stats: Arc<RwLock<EngineStats>>,
    state: ControllerState,
    consecutive_motion: u32,
    quiet_frames: u32,
    post_record_frames: u32,
    snapshot_set: SnapshotSet,
    peak_taken: bool,
    event_started_at: Option<DateTime<Utc>>,
    last_recording_end: Option<DateTime<Utc>>,
}

impl DetectionEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        site_id: String,
        config: MonitorConfig,
        frame_rate: u32,
        recorder: Arc<RingRecorder>,
        snapshots: Arc<SnapshotService>,
        frame_source: Arc<Mutex<Box<dyn FrameSource>>>,
        events_tx: mpsc::Sender<CapturedEvent>,
        stats: Arc<RwLock<EngineStats>>,
    ) -> Self {
        let effective_fps = (frame_rate / config.motion.frame_skip.max(1)).max(1);
        let post_record_frames =
            (config.recording.post_record_seconds as u32 * effective_fps).max(1);

        Self {
            detector: MotionDetector::new(config.motion.clone()),
            classifier: EventClassifier::new(config.classifier.clone()),
            site_id,
            config,
            recorder,
            snapshots,
            frame_source,
            events_tx,
            stats,
            state: ControllerState::Idle,
            consecutive_motion: 0,
            quiet_frames: 0,
            post_record_frames,
            snapshot_set: SnapshotSet::default(),
            peak_taken: false,
            event_started_at: None,
            last_recording_end: None,
        }
    }

    pub(crate) fn state(&self) -> ControllerState {
        self.state
    }

    pub(crate) fn set_detector_threshold(&mut self, threshold: f32) {
        self.detector.set_threshold(threshold);
    }

    /// Drive the machine with one processed preview frame
    pub(crate) async fn handle_frame(&mut self, frame: &PreviewFrame) {
        let now = frame.timestamp;
        let regions = self.detector.process(frame);
        let motion = !regions.is_empty();
        let frame_area = frame.width * frame.height;

        // Safety limits are enforced on every pass while a session is open,
        // even if motion never naturally ends.
        if matches!(self.state, ControllerState::Recording | ControllerState::Cooldown) {
            match self.recorder.tick(now) {
                Ok(Some(finished)) => {
                    self.finalize_event(finished, now).await;
                    return;
                }
                Ok(None) => {
                    if !self.recorder.is_active() {
                        // Session aborted out from under us (output failure).
                        // No classification for it; back to idle.
                        tracing::warn!("Recording session aborted, event discarded");
                        self.reset_event_state();
                        let mut stats = self.stats.write().await;
                        stats.is_recording = false;
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Recorder tick failed");
                }
            }
        }

        match self.state {
            ControllerState::Idle => {
                if motion {
                    self.state = ControllerState::Debouncing;
                    self.consecutive_motion = 1;
                }
            }
            ControllerState::Debouncing => {
                if motion {
                    self.consecutive_motion += 1;
                    if self.consecutive_motion >= self.config.motion.trigger_threshold
                        && self.cooldown_elapsed(now)
                    {
                        self.begin_event(&regions, frame_area, now).await;
                    }
                } else {
                    self.state = ControllerState::Idle;
                    self.consecutive_motion = 0;
                }
            }
            ControllerState::Recording => {
                if motion {
                    self.classifier.observe(&regions, frame_area, now);
                    self.maybe_capture_peak(now).await;
                } else {
                    self.state = ControllerState::Cooldown;
                    self.quiet_frames = 1;
                }
            }
            ControllerState::Cooldown => {
                if motion {
                    // Motion reappeared: cancel the pending stop, same session
                    self.state = ControllerState::Recording;
                    self.quiet_frames = 0;
                    self.classifier.observe(&regions, frame_area, now);
                    self.maybe_capture_peak(now).await;
                } else {
                    self.quiet_frames += 1;
                    if self.quiet_frames >= self.post_record_frames {
                        match self.recorder.stop(StopReason::MotionEnded, now) {
                            Ok(Some(finished)) => {
                                tracing::info!("Motion ended, stopping recording");
                                self.finalize_event(finished, now).await;
                            }
                            Ok(None) => {
                                tracing::warn!("Cooldown elapsed with no active session");
                                self.reset_event_state();
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to stop recording");
                                self.reset_event_state();
                            }
                        }
                    }
                }
            }
        }
    }

    /// Shutdown contract: stop an active session cleanly without starting
    /// any new transitions; the artifact stays on disk for later pickup.
    pub(crate) async fn shutdown(&mut self, now: DateTime<Utc>) {
        match self.recorder.stop(StopReason::Shutdown, now) {
            Ok(Some(finished)) => {
                tracing::info!(
                    path = %finished.path.display(),
                    "Active recording flushed on shutdown"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to stop recording on shutdown");
            }
        }
        self.reset_event_state();
        let mut stats = self.stats.write().await;
        stats.is_recording = false;
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_recording_end {
            Some(end) => {
                (now - end).num_milliseconds() as f64 / 1000.0
                    >= self.config.motion.cooldown_seconds as f64
            }
            None => true,
        }
    }

    async fn begin_event(&mut self, regions: &[MotionRegion], frame_area: u32, now: DateTime<Utc>) {
        self.classifier.reset();
        self.snapshot_set = SnapshotSet::default();
        self.peak_taken = false;

        match self.recorder.start(TriggerKind::Motion, now) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Trigger raced an already-active session, ignoring");
                return;
            }
            Err(e) => {
                // Recording start failure aborts the event; no classification
                // is emitted for it.
                tracing::error!(error = %e, "Failed to start recording, event aborted");
                self.reset_event_state();
                return;
            }
        }

        self.event_started_at = Some(now);
        self.state = ControllerState::Recording;
        self.consecutive_motion = 0;
        self.quiet_frames = 0;

        let total_area: f64 = regions.iter().map(|r| r.area as f64).sum();
        tracing::info!(
            motion_area = format!("{:.0}", total_area),
            "Motion confirmed, event capture started"
        );

        {
            let mut stats = self.stats.write().await;
            stats.motion_events += 1;
            stats.is_recording = true;
            stats.last_motion_at = Some(now);
        }

        self.classifier.observe(regions, frame_area, now);
        self.capture_phase_snapshot(SnapshotPhase::Start, now).await;
    }

    /// The peak snapshot is attempted once per event, after the configured
    /// delay into the recording.
    async fn maybe_capture_peak(&mut self, now: DateTime<Utc>) {
        if self.peak_taken {
            return;
        }
        let Some(started) = self.event_started_at else {
            return;
        };
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        if elapsed >= self.config.snapshot.peak_delay_seconds as f64 {
            self.peak_taken = true;
            self.capture_phase_snapshot(SnapshotPhase::Peak, now).await;
        }
    }

    async fn capture_phase_snapshot(&mut self, phase: SnapshotPhase, now: DateTime<Utc>) {
        if self.snapshot_set.get(phase).is_some() {
            return;
        }
        let event_started = self.event_started_at.unwrap_or(now);

        let still = {
            let mut source = self.frame_source.lock().await;
            source.capture_still()
        };

        match still {
            Ok(jpeg) => match self.snapshots.stage_phase(&jpeg, phase, event_started) {
                Ok(path) => {
                    self.snapshot_set.set(phase, path);
                    let mut stats = self.stats.write().await;
                    stats.snapshots_taken += 1;
                }
                Err(e) => {
                    tracing::warn!(phase = phase.as_str(), error = %e, "Snapshot staging failed");
                }
            },
            Err(e) => {
                tracing::warn!(phase = phase.as_str(), error = %e, "Snapshot capture failed");
            }
        }
    }

    /// End of event, natural or limit-forced: end snapshot, classification
    /// over the full history, retroactive annotation, summary, handoff.
    async fn finalize_event(&mut self, finished: FinishedRecording, now: DateTime<Utc>) {
        self.capture_phase_snapshot(SnapshotPhase::End, now).await;

        let classification = self.classifier.classify(now);

        if let Err(e) = self.snapshots.annotate_set(&self.snapshot_set, &classification) {
            tracing::warn!(error = %e, "Snapshot annotation failed");
        }
        match self.snapshots.build_summary(&self.snapshot_set, &classification) {
            Ok(Some(path)) => self.snapshot_set.summary = Some(path),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Summary composite failed");
            }
        }

        let event = CapturedEvent::from_classification(
            self.site_id.clone(),
            &classification,
            finished.reason,
            finished.path.clone(),
            self.snapshot_set.paths(),
        );

        // Fire-and-forget handoff: a slow uploader must never stall the
        // detection loop. Artifacts stay on disk either way.
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    "Event queue full, record dropped; artifacts remain on disk"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(event_id = %event.event_id, "Event sink closed");
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.recordings_saved += 1;
            stats.total_recording_seconds += finished.duration_seconds as u64;
            stats.is_recording = false;
        }

        self.last_recording_end = Some(now);
        self.reset_event_state();
    }

    /// Back to idle; the sample history and snapshot set belong to exactly
    /// one event and are cleared here.
    fn reset_event_state(&mut self) {
        self.classifier.reset();
        self.snapshot_set = SnapshotSet::default();
        self.peak_taken = false;
        self.event_started_at = None;
        self.consecutive_motion = 0;
        self.quiet_frames = 0;
        self.state = ControllerState::Idle;
    }
}

/// EventController instance: owns the detection worker
pub struct EventController {
    site_id: String,
    config: MonitorConfig,
    frame_source: Arc<Mutex<Box<dyn FrameSource>>>,
    recorder: Arc<RingRecorder>,
    snapshots: Arc<SnapshotService>,
    events_tx: mpsc::Sender<CapturedEvent>,
    tuning: Arc<RwLock<DetectorTuning>>,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<EngineStats>>,
}

impl EventController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site_id: String,
        config: MonitorConfig,
        frame_source: Arc<Mutex<Box<dyn FrameSource>>>,
        recorder: Arc<RingRecorder>,
        snapshots: Arc<SnapshotService>,
        events_tx: mpsc::Sender<CapturedEvent>,
        tuning: Arc<RwLock<DetectorTuning>>,
    ) -> Self {
        let stats = EngineStats {
            buffer_size_mb: recorder.stats().buffer_size_mb,
            ..Default::default()
        };
        Self {
            site_id,
            config,
            frame_source,
            recorder,
            snapshots,
            events_tx,
            tuning,
            running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(stats)),
        }
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Start the detection loop worker
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Detection loop already running");
                return;
            }
            *running = true;
        }

        let frame_rate = {
            let source = self.frame_source.lock().await;
            source.frame_rate()
        };
        let frame_skip = self.config.motion.frame_skip.max(1);
        let tick = Duration::from_secs_f64(frame_skip as f64 / frame_rate.max(1) as f64);

        tracing::info!(
            frame_rate = frame_rate,
            frame_skip = frame_skip,
            tick_ms = tick.as_millis() as u64,
            "Starting detection loop"
        );

        let mut engine = DetectionEngine::new(
            self.site_id.clone(),
            self.config.clone(),
            frame_rate,
            self.recorder.clone(),
            self.snapshots.clone(),
            self.frame_source.clone(),
            self.events_tx.clone(),
            self.stats.clone(),
        );
        let frame_source = self.frame_source.clone();
        let tuning = self.tuning.clone();
        let running = self.running.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                {
                    let is_running = running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                {
                    let tuning = tuning.read().await;
                    engine.set_detector_threshold(tuning.threshold);
                }

                let frame = {
                    let mut source = frame_source.lock().await;
                    source.preview_frame()
                };

                match frame {
                    Ok(Some(frame)) => {
                        {
                            let mut stats = stats.write().await;
                            stats.consecutive_capture_failures = 0;
                        }
                        engine.handle_frame(&frame).await;
                    }
                    Ok(None) => {
                        // Transient capture failure, retry next tick
                        let failures = {
                            let mut stats = stats.write().await;
                            stats.consecutive_capture_failures += 1;
                            stats.consecutive_capture_failures
                        };
                        if failures % CAPTURE_FAILURE_WARN_EVERY == 0 {
                            tracing::warn!(
                                consecutive_failures = failures,
                                "Preview capture failing persistently"
                            );
                        }
                    }
                    Err(e) => {
                        let mut stats = stats.write().await;
                        stats.consecutive_capture_failures += 1;
                        tracing::error!(error = %e, "Preview capture error");
                    }
                }
            }

            engine.shutdown(Utc::now()).await;
            tracing::info!("Detection loop stopped");
        });
    }

    /// Request the detection loop to stop. The loop flushes any active
    /// session on its way out.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping detection loop");
    }
}
