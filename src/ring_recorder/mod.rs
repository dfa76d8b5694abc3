//! RingRecorder - Pre-Record Ring Buffer and Recording Sessions
//!
//! ## Responsibilities
//!
//! - Continuously retain the last `pre_record_seconds` of encoded output
//! - On start, drain the retained buffer into a new file and pass live
//!   output straight through
//! - Enforce duration and file-size safety limits on every tick
//! - Keep cumulative recording statistics
//!
//! The session singleton and the buffer live behind one mutex; `start`,
//! `stop` and `tick` hold it for their full duration and never across
//! uploader I/O.

mod ring_buffer;

pub use ring_buffer::{required_capacity, RingBuffer};

use crate::config::RecordingSettings;
use crate::error::{Error, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// What caused a recording to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Motion,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Motion => "motion",
            TriggerKind::Manual => "manual",
        }
    }
}

/// Why a recording stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Motion ended and the post-record window elapsed
    MotionEnded,
    /// A duration or file-size safety limit tripped
    LimitReached,
    /// The engine is shutting down
    Shutdown,
}

/// One active recording. Exactly one may exist at a time.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub started_at: DateTime<Utc>,
    pub path: PathBuf,
    pub trigger: TriggerKind,
}

/// A completed recording, handed back from `stop`/`tick`
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub bytes_written: u64,
    pub reason: StopReason,
}

/// Cumulative recording statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordingStats {
    pub recordings_saved: u64,
    pub total_recording_seconds: u64,
    pub buffer_size_mb: f64,
}

struct RecorderInner {
    ring: RingBuffer,
    sink: Option<BufWriter<File>>,
    session: Option<RecordingSession>,
    bytes_written: u64,
    stats: RecordingStats,
}

impl RecorderInner {
    /// Drop the session without counting it as a saved recording. Used when
    /// a sink write fails mid-session; the partial file stays on disk.
    fn abort_locked(&mut self) {
        if let Some(session) = self.session.take() {
            self.sink = None;
            self.bytes_written = 0;
            tracing::error!(
                path = %session.path.display(),
                "Recording aborted after output failure"
            );
        }
    }

    fn stop_locked(&mut self, reason: StopReason, now: DateTime<Utc>) -> Option<FinishedRecording> {
        let session = self.session.take()?;

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush() {
                tracing::error!(error = %e, path = %session.path.display(), "Failed to flush recording");
            }
        }

        let duration_seconds = (now - session.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;

        self.stats.recordings_saved += 1;
        self.stats.total_recording_seconds += duration_seconds as u64;

        let finished = FinishedRecording {
            path: session.path,
            started_at: session.started_at,
            duration_seconds,
            bytes_written: self.bytes_written,
            reason,
        };
        self.bytes_written = 0;

        tracing::info!(
            path = %finished.path.display(),
            duration_seconds = format!("{:.1}", finished.duration_seconds),
            bytes = finished.bytes_written,
            reason = ?reason,
            "Recording stopped"
        );

        Some(finished)
    }
}

/// RingRecorder instance
pub struct RingRecorder {
    inner: Arc<Mutex<RecorderInner>>,
    video_dir: PathBuf,
    site_id: String,
    settings: RecordingSettings,
}

impl RingRecorder {
    /// Create a recorder with a ring sized from the pre-record duration and
    /// encoder bitrate.
    pub fn new(video_dir: PathBuf, site_id: String, settings: RecordingSettings) -> Self {
        let capacity = required_capacity(settings.pre_record_seconds, settings.bitrate);
        let buffer_size_mb = capacity as f64 / (1024.0 * 1024.0);

        tracing::info!(
            pre_record_seconds = settings.pre_record_seconds,
            buffer_size_mb = format!("{:.1}", buffer_size_mb),
            "Pre-record ring buffer initialized"
        );

        Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                ring: RingBuffer::new(capacity),
                sink: None,
                session: None,
                bytes_written: 0,
                stats: RecordingStats {
                    buffer_size_mb: (buffer_size_mb * 100.0).round() / 100.0,
                    ..Default::default()
                },
            })),
            video_dir,
            site_id,
            settings,
        }
    }

    /// Handle for the encoder side. Writes land in the ring while idle and
    /// pass through to the output file while a session is active.
    pub fn stream_writer(&self) -> EncodedStreamWriter {
        EncodedStreamWriter {
            inner: self.inner.clone(),
        }
    }

    /// Start a recording. Returns `Ok(false)` if a session is already
    /// active. Opens the output file, drains the retained buffer into it and
    /// switches live output to pass-through.
    pub fn start(&self, trigger: TriggerKind, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Recording("recorder lock poisoned".into()))?;

        if inner.session.is_some() {
            tracing::debug!("Already recording, ignoring trigger");
            return Ok(false);
        }

        std::fs::create_dir_all(&self.video_dir)?;
        let filename = format!(
            "{}_video_{}_{}.h264",
            self.site_id,
            trigger.as_str(),
            now.with_timezone(&Local).format("%Y%m%d_%H%M%S")
        );
        let path = self.video_dir.join(filename);

        let file = File::create(&path)
            .map_err(|e| Error::Recording(format!("cannot open {}: {}", path.display(), e)))?;
        let mut sink = BufWriter::new(file);

        let drained = inner
            .ring
            .drain_into(&mut sink)
            .map_err(|e| Error::Recording(format!("buffer drain failed: {}", e)))?;

        inner.sink = Some(sink);
        inner.bytes_written = drained;
        inner.session = Some(RecordingSession {
            started_at: now,
            path: path.clone(),
            trigger,
        });

        tracing::info!(
            path = %path.display(),
            pre_buffer_bytes = drained,
            trigger = trigger.as_str(),
            "Recording started (includes pre-record buffer)"
        );

        Ok(true)
    }

    /// Stop the active recording. No-op returning `None` when idle, so a
    /// second call never double-counts statistics.
    pub fn stop(&self, reason: StopReason, now: DateTime<Utc>) -> Result<Option<FinishedRecording>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Recording("recorder lock poisoned".into()))?;
        Ok(inner.stop_locked(reason, now))
    }

    /// Enforce the duration and file-size safety limits. Returns the
    /// finished recording when a limit forced the stop.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Option<FinishedRecording>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Recording("recorder lock poisoned".into()))?;

        let Some(session) = inner.session.as_ref() else {
            return Ok(None);
        };

        let elapsed = (now - session.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        if elapsed >= self.settings.max_duration_seconds as f64 {
            tracing::warn!(
                max_duration_seconds = self.settings.max_duration_seconds,
                "Max recording duration reached, forcing stop"
            );
            return Ok(inner.stop_locked(StopReason::LimitReached, now));
        }

        if inner.bytes_written >= self.settings.max_file_size_bytes {
            tracing::warn!(
                max_file_size_bytes = self.settings.max_file_size_bytes,
                bytes_written = inner.bytes_written,
                "Max recording size reached, forcing stop"
            );
            return Ok(inner.stop_locked(StopReason::LimitReached, now));
        }

        Ok(None)
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.session.is_some())
            .unwrap_or(false)
    }

    pub fn active_session(&self) -> Option<RecordingSession> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.session.clone())
    }

    pub fn stats(&self) -> RecordingStats {
        self.inner
            .lock()
            .map(|inner| inner.stats.clone())
            .unwrap_or_default()
    }
}

/// Encoder-facing write handle. The encoded stream writes continuously; the
/// recorder decides whether bytes are retained or persisted.
#[derive(Clone)]
pub struct EncodedStreamWriter {
    inner: Arc<Mutex<RecorderInner>>,
}

impl EncodedStreamWriter {
    pub fn write(&self, chunk: &[u8]) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Recording("recorder lock poisoned".into()))?;

        if let Some(sink) = inner.sink.as_mut() {
            if let Err(e) = sink.write_all(chunk) {
                inner.abort_locked();
                return Err(Error::Recording(format!("sink write failed: {}", e)));
            }
            inner.bytes_written += chunk.len() as u64;
        } else {
            inner.ring.push(chunk.to_vec());
        }
        Ok(())
    }
}
