//! Application state
//!
//! Process-level configuration and system health

use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Site identifier stamped into artifact filenames and event records
    pub site_id: String,
    /// Directory for finished event videos
    pub video_dir: PathBuf,
    /// Directory for snapshots
    pub image_dir: PathBuf,
    /// Engine config file (JSON)
    pub config_path: PathBuf,
    /// Append-only event record file consumed by the external uploader
    pub event_log_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site_id: std::env::var("SITE_ID").unwrap_or_else(|_| "SITE_UNKNOWN".to_string()),
            video_dir: std::env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/videos")),
            image_dir: std::env::var("IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/images")),
            config_path: std::env::var("SITEWATCH_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/config/sitewatch.json")),
            event_log_path: std::env::var("EVENT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/buffer/events.jsonl")),
        }
    }
}

/// System health metrics
#[derive(Debug, Clone, Default)]
pub struct SystemHealth {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub overloaded: bool,
    pub last_overload_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SystemHealth {
    /// Check and update overload status
    pub fn update(&mut self, cpu: f32, memory: f32) {
        self.cpu_percent = cpu;
        self.memory_percent = memory;

        if cpu > 85.0 || memory > 90.0 {
            self.overloaded = true;
            self.last_overload_at = Some(chrono::Utc::now());
        } else if self.overloaded {
            // Recovery with hysteresis
            if let Some(last) = self.last_overload_at {
                let elapsed = chrono::Utc::now() - last;
                if elapsed > chrono::Duration::seconds(60) && cpu < 60.0 && memory < 70.0 {
                    self.overloaded = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_trips_on_high_cpu() {
        let mut health = SystemHealth::default();
        health.update(95.0, 50.0);
        assert!(health.overloaded);
    }

    #[test]
    fn test_recovery_needs_hysteresis_window() {
        let mut health = SystemHealth::default();
        health.update(95.0, 50.0);
        // An immediate dip does not clear the flag
        health.update(40.0, 40.0);
        assert!(health.overloaded);
    }
}
