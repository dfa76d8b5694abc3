//! Classification result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Scheduled maintenance during business hours
    MaintenanceVisit,
    /// Unexpected activity during off-hours
    SecurityBreach,
    /// Small, erratic movement
    Animal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MaintenanceVisit => "maintenance_visit",
            EventType::SecurityBreach => "security_breach",
            EventType::Animal => "animal",
        }
    }
}

/// Time-of-day sub-classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeClass {
    BusinessHours,
    OffHours,
}

impl TimeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeClass::BusinessHours => "business_hours",
            TimeClass::OffHours => "off_hours",
        }
    }
}

/// Object-size sub-classification, from the largest single region's share of
/// the preview frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
    Unknown,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
            SizeClass::Unknown => "unknown",
        }
    }
}

/// Motion-pattern sub-classification over the sample window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternClass {
    Erratic,
    Sustained,
    Steady,
    /// Fewer samples than the pattern analysis needs
    Initializing,
    Unknown,
}

impl PatternClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternClass::Erratic => "erratic",
            PatternClass::Sustained => "sustained",
            PatternClass::Steady => "steady",
            PatternClass::Initializing => "initializing",
            PatternClass::Unknown => "unknown",
        }
    }
}

/// One timestamped observation feeding pattern analysis
#[derive(Debug, Clone, Copy)]
pub struct MotionSample {
    pub timestamp: DateTime<Utc>,
    /// Area-weighted combined centroid of all regions in the frame
    pub centroid: (f64, f64),
    /// Total foreground area in the frame
    pub total_area: f64,
}

/// Final result for one completed event. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventClassification {
    pub event_type: EventType,
    pub confidence: f32,
    /// Peak total foreground area observed during the event
    pub motion_area: f64,
    pub pattern: PatternClass,
    pub time_class: TimeClass,
    pub size_class: SizeClass,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}
