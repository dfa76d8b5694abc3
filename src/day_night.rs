//! Day/Night Parameter Adjustment
//!
//! Swaps the detector sensitivity between day and night values on a periodic
//! check. Only transitions are logged. The detection loop reads the shared
//! tuning between processed frames.

use crate::config::NightModeSettings;
use chrono::{Local, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Detector parameters shared between the adjuster and the detection loop
#[derive(Debug, Clone, Copy)]
pub struct DetectorTuning {
    /// Background model sensitivity currently in effect
    pub threshold: f32,
}

/// DayNightAdjuster instance
pub struct DayNightAdjuster {
    settings: NightModeSettings,
    day_threshold: f32,
    tuning: Arc<RwLock<DetectorTuning>>,
    check_interval: Duration,
}

impl DayNightAdjuster {
    pub fn new(
        settings: NightModeSettings,
        day_threshold: f32,
        tuning: Arc<RwLock<DetectorTuning>>,
    ) -> Self {
        Self {
            settings,
            day_threshold,
            tuning,
            check_interval: Duration::from_secs(1800),
        }
    }

    /// Shorter cadence for tests
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Whether `hour` falls inside the night window, which wraps midnight
    /// when `start_hour > end_hour`.
    pub fn is_night(&self, hour: u32) -> bool {
        let start = self.settings.start_hour;
        let end = self.settings.end_hour;
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Threshold that should be in effect at `hour`
    pub fn select_threshold(&self, hour: u32) -> f32 {
        if self.settings.enabled && self.is_night(hour) {
            self.settings.night_threshold
        } else {
            self.day_threshold
        }
    }

    /// Apply the threshold for the current hour. Returns true on a change.
    pub async fn adjust(&self) -> bool {
        let hour = Local::now().hour();
        let target = self.select_threshold(hour);

        let mut tuning = self.tuning.write().await;
        if (tuning.threshold - target).abs() > f32::EPSILON {
            let mode = if self.is_night(hour) { "night" } else { "day" };
            tracing::info!(
                mode = mode,
                threshold = target,
                "Detector sensitivity adjusted"
            );
            tuning.threshold = target;
            true
        } else {
            false
        }
    }

    /// Periodic adjustment worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.check_interval);
            loop {
                interval.tick().await;
                self.adjust().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjuster(start_hour: u32, end_hour: u32) -> DayNightAdjuster {
        DayNightAdjuster::new(
            NightModeSettings {
                enabled: true,
                start_hour,
                end_hour,
                night_threshold: 1000.0,
            },
            1500.0,
            Arc::new(RwLock::new(DetectorTuning { threshold: 1500.0 })),
        )
    }

    #[test]
    fn test_wraparound_window() {
        let adj = adjuster(18, 6);
        assert!(adj.is_night(18));
        assert!(adj.is_night(23));
        assert!(adj.is_night(0));
        assert!(adj.is_night(5));
        assert!(!adj.is_night(6));
        assert!(!adj.is_night(12));
    }

    #[test]
    fn test_non_wrapping_window() {
        let adj = adjuster(0, 6);
        assert!(adj.is_night(3));
        assert!(!adj.is_night(6));
        assert!(!adj.is_night(22));
    }

    #[test]
    fn test_threshold_selection() {
        let adj = adjuster(18, 6);
        assert_eq!(adj.select_threshold(2), 1000.0);
        assert_eq!(adj.select_threshold(12), 1500.0);
    }

    #[test]
    fn test_disabled_never_switches() {
        let adj = DayNightAdjuster::new(
            NightModeSettings {
                enabled: false,
                ..Default::default()
            },
            1500.0,
            Arc::new(RwLock::new(DetectorTuning { threshold: 1500.0 })),
        );
        assert_eq!(adj.select_threshold(2), 1500.0);
    }

    #[tokio::test]
    async fn test_adjust_is_transition_only() {
        let tuning = Arc::new(RwLock::new(DetectorTuning { threshold: 0.0 }));
        let adj = DayNightAdjuster::new(
            NightModeSettings {
                enabled: true,
                start_hour: 0,
                end_hour: 0, // empty window: always day
                night_threshold: 1000.0,
            },
            1500.0,
            tuning.clone(),
        );

        assert!(adj.adjust().await);
        assert_eq!(tuning.read().await.threshold, 1500.0);
        // Second pass with no change
        assert!(!adj.adjust().await);
    }
}
