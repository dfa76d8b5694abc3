//! EventLogService - Finished Event Records (Ring Buffer + JSONL)
//!
//! ## Responsibilities
//!
//! - Store finished event records in a bounded ring buffer
//! - Append each record to the JSONL file the external uploader consumes
//! - Provide record queries
//!
//! The handoff from the controller is a bounded channel drained by
//! `spawn_consumer`, so the detection loop never blocks on this service.

use crate::event_classifier::{EventClassification, EventType, PatternClass, SizeClass, TimeClass};
use crate::ring_recorder::StopReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, RwLock};

/// One finished, classified event with its artifacts. This is the record
/// handed to the external persistence/upload path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub event_id: uuid::Uuid,
    pub site_id: String,
    pub event_type: EventType,
    pub confidence_score: f32,
    pub motion_area: f64,
    pub motion_pattern: PatternClass,
    pub time_classification: TimeClass,
    pub size_classification: SizeClass,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    pub stop_reason: StopReason,
    pub video_path: PathBuf,
    pub snapshot_paths: Vec<PathBuf>,
}

impl CapturedEvent {
    pub fn from_classification(
        site_id: String,
        classification: &EventClassification,
        stop_reason: StopReason,
        video_path: PathBuf,
        snapshot_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            site_id,
            event_type: classification.event_type,
            confidence_score: classification.confidence,
            motion_area: classification.motion_area,
            motion_pattern: classification.pattern,
            time_classification: classification.time_class,
            size_classification: classification.size_class,
            timestamp: classification.started_at,
            duration_seconds: classification.duration_seconds,
            stop_reason,
            video_path,
            snapshot_paths,
        }
    }
}

/// Ring buffer for event records
struct EventRingBuffer {
    events: VecDeque<CapturedEvent>,
    capacity: usize,
}

impl EventRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, event: CapturedEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn get_latest(&self, count: usize) -> Vec<CapturedEvent> {
        self.events.iter().rev().take(count).cloned().collect()
    }

    fn get_by_type(&self, event_type: EventType, count: usize) -> Vec<CapturedEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| e.event_type == event_type)
            .take(count)
            .cloned()
            .collect()
    }
}

/// EventLogService instance
pub struct EventLogService {
    buffer: RwLock<EventRingBuffer>,
    log_path: Option<PathBuf>,
}

impl EventLogService {
    /// In-memory only
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity)),
            log_path: None,
        }
    }

    /// Ring buffer plus an append-only JSONL file for the uploader
    pub fn with_log_file(capacity: usize, log_path: PathBuf) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity)),
            log_path: Some(log_path),
        }
    }

    /// Record one finished event
    pub async fn record(&self, event: CapturedEvent) -> crate::error::Result<()> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = event.event_type.as_str(),
            confidence = format!("{:.2}", event.confidence_score),
            video_path = %event.video_path.display(),
            snapshots = event.snapshot_paths.len(),
            "Event recorded"
        );

        {
            let mut buffer = self.buffer.write().await;
            buffer.push(event.clone());
        }

        if let Some(path) = &self.log_path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut line = serde_json::to_vec(&event)?;
            line.push(b'\n');

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(&line).await?;
        }

        Ok(())
    }

    /// Get latest events
    pub async fn get_latest(&self, count: usize) -> Vec<CapturedEvent> {
        let buffer = self.buffer.read().await;
        buffer.get_latest(count)
    }

    /// Get events by category
    pub async fn get_by_type(&self, event_type: EventType, count: usize) -> Vec<CapturedEvent> {
        let buffer = self.buffer.read().await;
        buffer.get_by_type(event_type, count)
    }

    /// Get event count
    pub async fn count(&self) -> usize {
        let buffer = self.buffer.read().await;
        buffer.events.len()
    }
}

impl Default for EventLogService {
    fn default() -> Self {
        Self::new(2000)
    }
}

/// Drain the controller's handoff channel into the log. Errors are absorbed
/// so a full disk never feeds back into the detection loop.
pub fn spawn_consumer(
    log: Arc<EventLogService>,
    mut rx: mpsc::Receiver<CapturedEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = log.record(event).await {
                tracing::error!(error = %e, "Failed to record event");
            }
        }
        tracing::info!("Event consumer stopped");
    })
}
