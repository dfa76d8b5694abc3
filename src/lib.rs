//! Sitewatch - Transformer-Site Camera Event-Capture Engine
//!
//! Motion-triggered event capture for a Pi-class condition-monitoring
//! appliance.
//!
//! ## Architecture (9 Components)
//!
//! 1. MonitorConfig - typed engine configuration surface
//! 2. FrameSource - camera driver seam (preview frames, stills, encoded stream)
//! 3. MotionDetector - adaptive background model, foreground regions
//! 4. RingRecorder - pre-record ring buffer, session singleton, safety limits
//! 5. EventClassifier - time/size/pattern rules, category + confidence
//! 6. SnapshotService - start/peak/end stills, annotation, summary composite
//! 7. EventController - detection loop and record/snapshot state machine
//! 8. EventLogService - finished-event ring buffer + JSONL sink
//! 9. DayNightAdjuster / ArtifactSweeper - periodic parameter and retention workers
//!
//! ## Design Principles
//!
//! - One recording session at a time, guarded by a single lock
//! - Per-frame errors are absorbed; the loop outlives any single failure
//! - End-of-event handoff is fire-and-forget, never blocking detection

pub mod artifact_sweeper;
pub mod config;
pub mod day_night;
pub mod error;
pub mod event_classifier;
pub mod event_controller;
pub mod event_log_service;
pub mod frame_source;
pub mod motion_detector;
pub mod ring_recorder;
pub mod snapshot_service;
pub mod state;

pub use error::{Error, Result};
pub use state::AppConfig;
