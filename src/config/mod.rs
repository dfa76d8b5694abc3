//! MonitorConfig - Engine Configuration Surface
//!
//! ## Responsibilities
//!
//! - Typed settings for motion detection, recording, classification,
//!   snapshots, night mode and site identity
//! - Load from a JSON file (path from `SITEWATCH_CONFIG`), fall back to
//!   defaults when the file is absent
//! - Validate ranges before any component consumes them

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Motion detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Background model sensitivity. A fresh Gaussian component starts at
    /// this variance, so larger values mean wider components and less
    /// foreground.
    pub threshold: f32,
    /// Minimum region area in processed-frame pixels
    pub min_area: u32,
    /// Minimum seconds between the end of one recording and the next trigger
    pub cooldown_seconds: u64,
    /// Statistical weight horizon of the background model, in frames
    pub history: u32,
    /// Consecutive motion frames required to confirm an event
    pub trigger_threshold: u32,
    /// Process every Nth preview frame (CPU budget knob)
    pub frame_skip: u32,
    /// Integer downscale factor applied to the preview before processing
    pub downscale: u32,
    /// Radius of the square morphology kernel (2 -> 5x5)
    pub kernel_radius: u8,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            threshold: 1500.0,
            min_area: 500,
            cooldown_seconds: 5,
            history: 200,
            trigger_threshold: 3,
            frame_skip: 1,
            downscale: 1,
            kernel_radius: 2,
        }
    }
}

/// Recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Seconds of encoded video retained before the trigger
    pub pre_record_seconds: u64,
    /// Seconds of quiet required after motion ends before stopping
    pub post_record_seconds: u64,
    /// Hard duration limit per recording
    pub max_duration_seconds: u64,
    /// Hard output size limit per recording
    pub max_file_size_bytes: u64,
    /// Encoder target bitrate, used to size the pre-record buffer
    pub bitrate: u64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            pre_record_seconds: 10,
            post_record_seconds: 10,
            max_duration_seconds: 300,
            max_file_size_bytes: 100 * 1024 * 1024,
            bitrate: 2_000_000,
        }
    }
}

/// Per-rule confidence blend. `cap` bounds the result, the weights scale the
/// contributing sub-confidences, `base` is the constant term.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleBlend {
    pub cap: f32,
    pub time_weight: f32,
    pub size_weight: f32,
    pub pattern_weight: f32,
    pub base: f32,
}

impl RuleBlend {
    pub const fn new(cap: f32, time_weight: f32, size_weight: f32, pattern_weight: f32, base: f32) -> Self {
        Self { cap, time_weight, size_weight, pattern_weight, base }
    }

    /// Blend the sub-confidences under this rule's weights and cap
    pub fn apply(&self, time_conf: f32, size_conf: f32, pattern_conf: f32) -> f32 {
        let blended = time_conf * self.time_weight
            + size_conf * self.size_weight
            + pattern_conf * self.pattern_weight
            + self.base;
        blended.min(self.cap)
    }
}

/// Confidence blend weights per combination rule. The rule order and the
/// category each rule yields are fixed in code; the numeric blend is tuning
/// data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendWeights {
    /// Rule 1: business hours + large + long duration -> maintenance
    pub maintenance_clear: RuleBlend,
    /// Rule 2: small + short duration -> animal
    pub animal_clear: RuleBlend,
    /// Rule 3: small, any duration -> animal
    pub animal_small: RuleBlend,
    /// Rule 4: off-hours, large object -> security breach
    pub breach_large: RuleBlend,
    /// Rule 4: off-hours, other sizes -> security breach
    pub breach_other: RuleBlend,
    /// Rule 5: business hours + large + sustained -> maintenance
    pub maintenance_sustained: RuleBlend,
    /// Rule 6: business hours + erratic -> animal
    pub animal_erratic: RuleBlend,
    /// Rule 7: business-hours fallback -> maintenance
    pub maintenance_fallback: RuleBlend,
    /// Rule 8: final fallback -> security breach
    pub breach_fallback: RuleBlend,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            maintenance_clear: RuleBlend::new(0.95, 0.3, 0.4, 0.0, 0.3),
            animal_clear: RuleBlend::new(0.92, 0.0, 0.6, 0.0, 0.4),
            animal_small: RuleBlend::new(0.85, 0.0, 0.9, 0.0, 0.0),
            breach_large: RuleBlend::new(0.90, 0.5, 0.5, 0.0, 0.0),
            breach_other: RuleBlend::new(0.75, 0.85, 0.0, 0.0, 0.0),
            maintenance_sustained: RuleBlend::new(0.85, 0.4, 0.3, 0.3, 0.0),
            animal_erratic: RuleBlend::new(0.70, 0.0, 0.0, 0.8, 0.0),
            maintenance_fallback: RuleBlend::new(0.55, 0.65, 0.0, 0.0, 0.0),
            breach_fallback: RuleBlend::new(0.50, 0.60, 0.0, 0.0, 0.0),
        }
    }
}

/// Event classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Business days as offsets from Monday (0 = Monday .. 6 = Sunday)
    pub business_days: Vec<u32>,
    /// First business hour (inclusive), local time
    pub business_start_hour: u32,
    /// Last business hour (exclusive), local time
    pub business_end_hour: u32,
    /// Largest-region fraction of frame below which an object is small
    pub animal_size_threshold: f32,
    /// Largest-region fraction of frame above which an object is large
    pub maintenance_size_threshold: f32,
    /// Event duration in seconds below which a small object is clearly an animal
    pub animal_duration_seconds: f64,
    /// Event duration in seconds above which a large business-hours object is
    /// clearly maintenance
    pub maintenance_duration_seconds: f64,
    /// Direction changes per second above which motion is erratic
    pub erratic_change_rate: f64,
    /// Minimum sample-window span in seconds for sustained motion
    pub sustained_min_duration: f64,
    /// Maximum average centroid speed (px/s) for sustained motion
    pub sustained_max_speed: f64,
    /// Sliding sample window in seconds
    pub sample_window_seconds: f64,
    /// Minimum samples before pattern analysis is meaningful
    pub min_samples: usize,
    /// Per-rule confidence blends
    pub blend: BlendWeights,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            business_days: vec![0, 1, 2, 3, 4],
            business_start_hour: 8,
            business_end_hour: 17,
            animal_size_threshold: 0.20,
            maintenance_size_threshold: 0.30,
            animal_duration_seconds: 30.0,
            maintenance_duration_seconds: 120.0,
            erratic_change_rate: 0.6,
            sustained_min_duration: 3.0,
            sustained_max_speed: 50.0,
            sample_window_seconds: 10.0,
            min_samples: 5,
            blend: BlendWeights::default(),
        }
    }
}

/// Snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// Seconds between routine (non-event) snapshots
    pub interval_seconds: u64,
    /// Size budget per compressed snapshot
    pub max_size_kb: u64,
    /// Initial JPEG quality
    pub quality: u8,
    /// JPEG quality floor for the compression loop
    pub quality_floor: u8,
    /// Seconds of recording before the peak snapshot is attempted
    pub peak_delay_seconds: u64,
    /// Days to keep finished snapshots/videos before the sweeper removes them
    pub retention_days: u64,
    /// TTF font used for annotation overlays
    pub font_path: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 1800,
            max_size_kb: 500,
            quality: 85,
            quality_floor: 40,
            peak_delay_seconds: 30,
            retention_days: 30,
            font_path: "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string(),
        }
    }
}

/// Night mode settings: the detector sensitivity is swapped inside the
/// configured window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightModeSettings {
    pub enabled: bool,
    /// Hour (local) at which night begins
    pub start_hour: u32,
    /// Hour (local) at which night ends
    pub end_hour: u32,
    /// Background model sensitivity while in the night window
    pub night_threshold: f32,
}

impl Default for NightModeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: 18,
            end_hour: 6,
            night_threshold: 1000.0,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub motion: MotionSettings,
    pub recording: RecordingSettings,
    pub classifier: ClassifierSettings,
    pub snapshot: SnapshotSettings,
    pub night_mode: NightModeSettings,
}

impl MonitorConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Validate ranges. Called on load and by tests for constructed configs.
    pub fn validate(&self) -> Result<()> {
        if self.motion.frame_skip == 0 {
            return Err(Error::Config("motion.frame_skip must be >= 1".into()));
        }
        if self.motion.downscale == 0 {
            return Err(Error::Config("motion.downscale must be >= 1".into()));
        }
        if self.motion.trigger_threshold == 0 {
            return Err(Error::Config("motion.trigger_threshold must be >= 1".into()));
        }
        if self.motion.history == 0 {
            return Err(Error::Config("motion.history must be >= 1".into()));
        }
        if self.motion.threshold <= 0.0 {
            return Err(Error::Config("motion.threshold must be positive".into()));
        }
        if self.recording.pre_record_seconds == 0 {
            return Err(Error::Config("recording.pre_record_seconds must be >= 1".into()));
        }
        if self.recording.bitrate == 0 {
            return Err(Error::Config("recording.bitrate must be positive".into()));
        }
        if self.recording.max_duration_seconds == 0 {
            return Err(Error::Config("recording.max_duration_seconds must be >= 1".into()));
        }
        if self.classifier.business_start_hour >= self.classifier.business_end_hour {
            return Err(Error::Config(
                "classifier business hour window is inverted".into(),
            ));
        }
        if self.classifier.business_days.iter().any(|d| *d > 6) {
            return Err(Error::Config(
                "classifier.business_days entries must be 0-6 (Monday-Sunday)".into(),
            ));
        }
        if self.classifier.animal_size_threshold >= self.classifier.maintenance_size_threshold {
            return Err(Error::Config(
                "classifier size thresholds are inverted".into(),
            ));
        }
        if self.snapshot.quality_floor > self.snapshot.quality {
            return Err(Error::Config("snapshot.quality_floor exceeds quality".into()));
        }
        if self.night_mode.start_hour > 23 || self.night_mode.end_hour > 23 {
            return Err(Error::Config("night_mode hours must be 0-23".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.motion.trigger_threshold, 3);
        assert_eq!(config.recording.pre_record_seconds, 10);
        assert_eq!(config.classifier.business_days, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_inverted_business_hours_rejected() {
        let mut config = MonitorConfig::default();
        config.classifier.business_start_hour = 17;
        config.classifier.business_end_hour = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_frame_skip_rejected() {
        let mut config = MonitorConfig::default();
        config.motion.frame_skip = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = MonitorConfig::load(Path::new("/nonexistent/sitewatch.json")).unwrap();
        assert_eq!(config.motion.min_area, 500);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"motion": {"min_area": 200, "threshold": 900.0, "cooldown_seconds": 5, "history": 200, "trigger_threshold": 3, "frame_skip": 1, "downscale": 1, "kernel_radius": 2}}"#).unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.motion.min_area, 200);
        assert_eq!(config.recording.post_record_seconds, 10);
    }

    #[test]
    fn test_rule_blend_caps() {
        let blend = RuleBlend::new(0.9, 0.5, 0.5, 0.0, 0.0);
        assert!((blend.apply(1.0, 1.0, 0.0) - 0.9).abs() < f32::EPSILON);
        assert!((blend.apply(0.4, 0.4, 0.0) - 0.4).abs() < 1e-6);
    }
}
