//! EventClassifier - Rule-Based Event Categorization
//!
//! ## Responsibilities
//!
//! - Accumulate one event's motion observations (bounded sample window)
//! - Sub-classify time of day, object size and motion pattern
//! - Combine them through a fixed-priority rule set into a category and
//!   confidence score
//!
//! The rule order and the category each rule yields are fixed; every
//! numeric confidence blend comes from `ClassifierSettings` so it can be
//! re-tuned without touching this module.

mod types;

pub use types::{EventClassification, EventType, MotionSample, PatternClass, SizeClass, TimeClass};

use crate::config::ClassifierSettings;
use crate::motion_detector::MotionRegion;
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use std::collections::VecDeque;

/// Per-event classifier state. Owned by one controller instance, reset on
/// every return to idle.
pub struct EventClassifier {
    settings: ClassifierSettings,
    samples: VecDeque<MotionSample>,
    started_at: Option<DateTime<Utc>>,
    largest_region_area: f64,
    peak_total_area: f64,
    frame_area: f64,
}

impl EventClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self {
            settings,
            samples: VecDeque::new(),
            started_at: None,
            largest_region_area: 0.0,
            peak_total_area: 0.0,
            frame_area: 0.0,
        }
    }

    /// Fold one processed frame's regions into the event history
    pub fn observe(&mut self, regions: &[MotionRegion], frame_area: u32, timestamp: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(timestamp);
            self.samples.clear();
        }
        self.frame_area = frame_area as f64;

        if regions.is_empty() {
            return;
        }

        let total_area: f64 = regions.iter().map(|r| r.area as f64).sum();
        if total_area <= 0.0 {
            return;
        }

        let cx = regions
            .iter()
            .map(|r| r.centroid.0 as f64 * r.area as f64)
            .sum::<f64>()
            / total_area;
        let cy = regions
            .iter()
            .map(|r| r.centroid.1 as f64 * r.area as f64)
            .sum::<f64>()
            / total_area;

        let largest = regions.iter().map(|r| r.area as f64).fold(0.0, f64::max);
        self.largest_region_area = self.largest_region_area.max(largest);
        self.peak_total_area = self.peak_total_area.max(total_area);

        self.samples.push_back(MotionSample {
            timestamp,
            centroid: (cx, cy),
            total_area,
        });

        // Keep only the recent window
        let cutoff = timestamp.timestamp_millis()
            - (self.settings.sample_window_seconds * 1000.0) as i64;
        while let Some(front) = self.samples.front() {
            if front.timestamp.timestamp_millis() <= cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Produce the final classification for the event ending at `ended_at`.
    /// Only called after the recording stop was requested, with the full
    /// accumulated history.
    pub fn classify(&self, ended_at: DateTime<Utc>) -> EventClassification {
        let started_at = self.started_at.unwrap_or(ended_at);
        let duration_seconds = ((ended_at - started_at).num_milliseconds().max(0) as f64) / 1000.0;

        let (time_class, time_conf) = self.classify_time(started_at);
        let (size_class, size_conf) = self.classify_size();
        let (pattern, pattern_conf) = self.classify_pattern();

        let (event_type, confidence) = self.combine(
            time_class,
            time_conf,
            size_class,
            size_conf,
            pattern,
            pattern_conf,
            duration_seconds,
        );

        tracing::debug!(
            event_type = event_type.as_str(),
            confidence = format!("{:.2}", confidence),
            size = size_class.as_str(),
            pattern = pattern.as_str(),
            time = time_class.as_str(),
            "Event classified"
        );

        EventClassification {
            event_type,
            confidence,
            motion_area: self.peak_total_area,
            pattern,
            time_class,
            size_class,
            started_at,
            duration_seconds,
        }
    }

    /// Clear all per-event state for the next event
    pub fn reset(&mut self) {
        self.samples.clear();
        self.started_at = None;
        self.largest_region_area = 0.0;
        self.peak_total_area = 0.0;
    }

    fn classify_time(&self, timestamp: DateTime<Utc>) -> (TimeClass, f32) {
        let local = timestamp.with_timezone(&Local);
        let hour = local.hour();
        let weekday = local.weekday().num_days_from_monday();

        let in_hours = hour >= self.settings.business_start_hour
            && hour < self.settings.business_end_hour;
        let in_days = self.settings.business_days.contains(&weekday);

        if in_hours && in_days {
            (TimeClass::BusinessHours, 0.8)
        } else {
            (TimeClass::OffHours, 0.9)
        }
    }

    fn classify_size(&self) -> (SizeClass, f32) {
        if self.largest_region_area <= 0.0 || self.frame_area <= 0.0 {
            return (SizeClass::Unknown, 0.0);
        }

        let fraction = (self.largest_region_area / self.frame_area) as f32;
        let animal = self.settings.animal_size_threshold;
        let maintenance = self.settings.maintenance_size_threshold;

        if fraction < animal {
            let confidence = (0.5 + (animal - fraction) * 4.0).min(0.9);
            (SizeClass::Small, confidence)
        } else if fraction > maintenance {
            let confidence = (0.6 + (fraction - maintenance) * 2.0).min(0.95);
            (SizeClass::Large, confidence)
        } else {
            (SizeClass::Medium, 0.5)
        }
    }

    fn classify_pattern(&self) -> (PatternClass, f32) {
        if self.samples.len() < self.settings.min_samples {
            return (PatternClass::Initializing, 0.3);
        }

        let samples: Vec<&MotionSample> = self.samples.iter().collect();
        let mut direction_changes = 0u32;
        let mut total_distance = 0.0f64;

        for i in 1..samples.len() {
            let prev = samples[i - 1];
            let curr = samples[i];
            let dx = curr.centroid.0 - prev.centroid.0;
            let dy = curr.centroid.1 - prev.centroid.1;
            total_distance += (dx * dx + dy * dy).sqrt();

            if i >= 2 {
                let prev2 = samples[i - 2];
                let prev_dx = prev.centroid.0 - prev2.centroid.0;
                let prev_dy = prev.centroid.1 - prev2.centroid.1;
                if prev_dx != 0.0 || prev_dy != 0.0 {
                    let prev_angle = prev_dy.atan2(prev_dx);
                    let curr_angle = dy.atan2(dx);
                    let mut diff = (curr_angle - prev_angle).abs();
                    if diff > std::f64::consts::PI {
                        diff = 2.0 * std::f64::consts::PI - diff;
                    }
                    if diff > std::f64::consts::FRAC_PI_4 {
                        direction_changes += 1;
                    }
                }
            }
        }

        let window = (samples[samples.len() - 1].timestamp - samples[0].timestamp)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        if window <= 0.0 {
            return (PatternClass::Steady, 0.5);
        }

        let change_rate = direction_changes as f64 / window;
        let avg_speed = total_distance / window;

        if change_rate > self.settings.erratic_change_rate {
            let confidence = (0.5 + change_rate).min(0.85) as f32;
            (PatternClass::Erratic, confidence)
        } else if window >= self.settings.sustained_min_duration
            && avg_speed < self.settings.sustained_max_speed
        {
            let confidence = (0.5 + window / 10.0).min(0.85) as f32;
            (PatternClass::Sustained, confidence)
        } else {
            (PatternClass::Steady, 0.5)
        }
    }

    /// Combination rules in priority order; first match wins.
    #[allow(clippy::too_many_arguments)]
    fn combine(
        &self,
        time_class: TimeClass,
        time_conf: f32,
        size_class: SizeClass,
        size_conf: f32,
        pattern: PatternClass,
        pattern_conf: f32,
        duration_seconds: f64,
    ) -> (EventType, f32) {
        let blend = &self.settings.blend;
        let business = time_class == TimeClass::BusinessHours;

        // Rule 1: clear maintenance visit
        if business
            && size_class == SizeClass::Large
            && duration_seconds > self.settings.maintenance_duration_seconds
        {
            return (
                EventType::MaintenanceVisit,
                blend.maintenance_clear.apply(time_conf, size_conf, 0.0),
            );
        }

        // Rule 2: clear animal (small and brief)
        if size_class == SizeClass::Small
            && duration_seconds < self.settings.animal_duration_seconds
        {
            return (
                EventType::Animal,
                blend.animal_clear.apply(0.0, size_conf, 0.0),
            );
        }

        // Rule 3: any small object is likely an animal
        if size_class == SizeClass::Small {
            return (
                EventType::Animal,
                blend.animal_small.apply(0.0, size_conf, 0.0),
            );
        }

        // Rule 4: off-hours motion is a security breach
        if time_class == TimeClass::OffHours {
            let confidence = if size_class == SizeClass::Large {
                blend.breach_large.apply(time_conf, size_conf, 0.0)
            } else {
                blend.breach_other.apply(time_conf, 0.0, 0.0)
            };
            return (EventType::SecurityBreach, confidence);
        }

        // Rule 5: large sustained presence during business hours
        if business && size_class == SizeClass::Large && pattern == PatternClass::Sustained {
            return (
                EventType::MaintenanceVisit,
                blend
                    .maintenance_sustained
                    .apply(time_conf, size_conf, pattern_conf),
            );
        }

        // Rule 6: erratic business-hours motion (bird/squirrel near camera)
        if business && pattern == PatternClass::Erratic {
            return (
                EventType::Animal,
                blend.animal_erratic.apply(0.0, 0.0, pattern_conf),
            );
        }

        // Rule 7: business hours with an unclear signal
        if business {
            return (
                EventType::MaintenanceVisit,
                blend.maintenance_fallback.apply(time_conf, 0.0, 0.0),
            );
        }

        // Rule 8: final fallback
        (
            EventType::SecurityBreach,
            blend.breach_fallback.apply(time_conf, 0.0, 0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const FRAME_AREA: u32 = 640 * 480;

    fn region(area: u32, cx: f32, cy: f32) -> MotionRegion {
        MotionRegion {
            area,
            centroid: (cx, cy),
            bbox: (0, 0, 1, 1),
        }
    }

    /// A local-time instant inside the default business window (Wednesday
    /// 2024-01-03 10:00) converted to Utc, so the test is timezone-stable.
    fn business_instant() -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 1, 3, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Sunday 03:00 local: off-hours on both the weekday and hour axes
    fn off_hours_instant() -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 1, 7, 3, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn feed(
        classifier: &mut EventClassifier,
        start: DateTime<Utc>,
        count: usize,
        area: u32,
        step: f64,
    ) {
        for i in 0..count {
            let t = start + Duration::milliseconds((i as i64) * 200);
            classifier.observe(
                &[region(area, (100.0 + step * i as f64) as f32, 100.0)],
                FRAME_AREA,
                t,
            );
        }
    }

    #[test]
    fn test_off_hours_large_is_security_breach() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = off_hours_instant();
        // ~35% of the frame: large
        feed(&mut classifier, start, 10, FRAME_AREA * 35 / 100, 2.0);

        let result = classifier.classify(start + Duration::seconds(60));
        assert_eq!(result.event_type, EventType::SecurityBreach);
        assert!(result.confidence > 0.0 && result.confidence <= 0.90);
        assert_eq!(result.time_class, TimeClass::OffHours);
        assert_eq!(result.size_class, SizeClass::Large);
    }

    #[test]
    fn test_small_brief_is_animal_with_confidence() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        // 2% of the frame, 10-second event
        feed(&mut classifier, start, 8, FRAME_AREA * 2 / 100, 1.0);

        let result = classifier.classify(start + Duration::seconds(10));
        assert_eq!(result.event_type, EventType::Animal);
        assert!(result.confidence >= 0.5);
        assert_eq!(result.size_class, SizeClass::Small);
    }

    #[test]
    fn test_small_long_event_still_animal() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        feed(&mut classifier, start, 8, FRAME_AREA * 2 / 100, 1.0);

        let result = classifier.classify(start + Duration::seconds(90));
        assert_eq!(result.event_type, EventType::Animal);
    }

    #[test]
    fn test_business_large_long_is_maintenance() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        feed(&mut classifier, start, 10, FRAME_AREA * 40 / 100, 1.0);

        let result = classifier.classify(start + Duration::seconds(180));
        assert_eq!(result.event_type, EventType::MaintenanceVisit);
        assert!(result.confidence > 0.7);
    }

    #[test]
    fn test_business_medium_falls_back_to_maintenance_low_confidence() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        // 25%: medium size, short duration, steady-ish motion
        feed(&mut classifier, start, 10, FRAME_AREA / 4, 30.0);

        let result = classifier.classify(start + Duration::seconds(20));
        assert_eq!(result.event_type, EventType::MaintenanceVisit);
        assert!(result.confidence <= 0.55);
    }

    #[test]
    fn test_fewer_than_min_samples_is_initializing() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = off_hours_instant();
        feed(&mut classifier, start, 3, FRAME_AREA / 4, 1.0);

        let result = classifier.classify(start + Duration::seconds(5));
        assert_eq!(result.pattern, PatternClass::Initializing);
        // Still yields a record, never an error
        assert_eq!(result.event_type, EventType::SecurityBreach);
    }

    #[test]
    fn test_no_samples_still_classifies() {
        let classifier = EventClassifier::new(ClassifierSettings::default());
        let result = classifier.classify(off_hours_instant());
        assert_eq!(result.size_class, SizeClass::Unknown);
        assert_eq!(result.pattern, PatternClass::Initializing);
    }

    #[test]
    fn test_erratic_motion_detected() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        // Medium blob zig-zagging hard every sample
        for i in 0..20 {
            let t = start + Duration::milliseconds(i * 250);
            let x = if i % 2 == 0 { 100.0 } else { 160.0 };
            let y = if i % 4 < 2 { 100.0 } else { 150.0 };
            classifier.observe(&[region(FRAME_AREA / 4, x, y)], FRAME_AREA, t);
        }

        let result = classifier.classify(start + Duration::seconds(5));
        assert_eq!(result.pattern, PatternClass::Erratic);
        assert_eq!(result.event_type, EventType::Animal);
    }

    #[test]
    fn test_sustained_slow_motion_detected() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        // Large blob creeping 1 px per 500 ms for 8 seconds
        for i in 0..16 {
            let t = start + Duration::milliseconds(i * 500);
            classifier.observe(
                &[region(FRAME_AREA * 40 / 100, 100.0 + i as f32, 100.0)],
                FRAME_AREA,
                t,
            );
        }

        let result = classifier.classify(start + Duration::seconds(8));
        assert_eq!(result.pattern, PatternClass::Sustained);
        assert_eq!(result.event_type, EventType::MaintenanceVisit);
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        for i in 0..100 {
            let t = start + Duration::milliseconds(i * 500);
            classifier.observe(&[region(1000, 100.0, 100.0)], FRAME_AREA, t);
        }
        // 10-second window at 2 samples/s keeps about 20 samples
        assert!(classifier.sample_count() <= 21);
    }

    #[test]
    fn test_reset_clears_event_state() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        let start = business_instant();
        feed(&mut classifier, start, 10, FRAME_AREA / 4, 1.0);
        assert!(classifier.has_started());

        classifier.reset();
        assert!(!classifier.has_started());
        assert_eq!(classifier.sample_count(), 0);

        let result = classifier.classify(start);
        assert_eq!(result.size_class, SizeClass::Unknown);
    }

    #[test]
    fn test_weekday_outside_hours_is_off_hours() {
        let mut classifier = EventClassifier::new(ClassifierSettings::default());
        // Wednesday 22:00 local
        let start = Local
            .with_ymd_and_hms(2024, 1, 3, 22, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        feed(&mut classifier, start, 8, FRAME_AREA / 4, 1.0);

        let result = classifier.classify(start + Duration::seconds(10));
        assert_eq!(result.time_class, TimeClass::OffHours);
        assert_eq!(result.event_type, EventType::SecurityBreach);
    }
}
