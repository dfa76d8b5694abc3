//! SnapshotService - Event Still Images
//!
//! ## Responsibilities
//!
//! - Persist stills captured at the start, peak and end of an event
//! - Stage them raw, then annotate retroactively once the category is known
//! - Compress every output under the configured size budget
//! - Assemble the labeled 3-panel start/peak/end summary composite
//! - Routine (non-event) snapshots for the periodic worker
//!
//! Side effects are confined to the filesystem; no network calls.

use crate::config::SnapshotSettings;
use crate::error::{Error, Result};
use crate::event_classifier::EventClassification;
use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Local, Utc};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};

/// Phase of an event a snapshot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    Start,
    Peak,
    End,
}

impl SnapshotPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPhase::Start => "start",
            SnapshotPhase::Peak => "peak",
            SnapshotPhase::End => "end",
        }
    }
}

/// Snapshot paths for one event; at most one image per phase
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    pub start: Option<PathBuf>,
    pub peak: Option<PathBuf>,
    pub end: Option<PathBuf>,
    pub summary: Option<PathBuf>,
}

impl SnapshotSet {
    pub fn get(&self, phase: SnapshotPhase) -> Option<&PathBuf> {
        match phase {
            SnapshotPhase::Start => self.start.as_ref(),
            SnapshotPhase::Peak => self.peak.as_ref(),
            SnapshotPhase::End => self.end.as_ref(),
        }
    }

    pub fn set(&mut self, phase: SnapshotPhase, path: PathBuf) {
        match phase {
            SnapshotPhase::Start => self.start = Some(path),
            SnapshotPhase::Peak => self.peak = Some(path),
            SnapshotPhase::End => self.end = Some(path),
        }
    }

    /// All three phase snapshots exist
    pub fn has_trio(&self) -> bool {
        self.start.is_some() && self.peak.is_some() && self.end.is_some()
    }

    /// Every path in the set, phases first, summary last
    pub fn paths(&self) -> Vec<PathBuf> {
        [&self.start, &self.peak, &self.end, &self.summary]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

const PANEL_HEIGHT: u32 = 360;
const LABEL_SCALE: f32 = 24.0;

/// SnapshotService instance
pub struct SnapshotService {
    image_dir: PathBuf,
    site_id: String,
    settings: SnapshotSettings,
    font: Option<FontVec>,
}

impl SnapshotService {
    /// Create the service and its output directory. The annotation font is
    /// loaded from the configured path; when absent, overlays degrade to the
    /// label bar without text.
    pub fn new(image_dir: PathBuf, site_id: String, settings: SnapshotSettings) -> Result<Self> {
        std::fs::create_dir_all(&image_dir)?;

        let font = match std::fs::read(&settings.font_path) {
            Ok(bytes) => FontVec::try_from_vec(bytes).ok(),
            Err(_) => None,
        };
        if font.is_none() {
            tracing::warn!(
                font_path = %settings.font_path,
                "Annotation font unavailable, snapshots will carry unlabeled overlay bars"
            );
        }

        Ok(Self {
            image_dir,
            site_id,
            settings,
            font,
        })
    }

    /// Stage a raw phase snapshot for the event that started at
    /// `event_started`. Annotation happens later, once the category is known.
    pub fn stage_phase(
        &self,
        jpeg: &[u8],
        phase: SnapshotPhase,
        event_started: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let filename = format!(
            "{}_event_{}_{}.jpg",
            self.site_id,
            phase.as_str(),
            event_started
                .with_timezone(&Local)
                .format("%Y%m%d_%H%M%S")
        );
        let path = self.image_dir.join(filename);
        std::fs::write(&path, jpeg)?;

        tracing::debug!(path = %path.display(), phase = phase.as_str(), "Snapshot staged");
        Ok(path)
    }

    /// Annotate every staged snapshot in the set with the final
    /// classification, compressing each under the size budget.
    pub fn annotate_set(&self, set: &SnapshotSet, classification: &EventClassification) -> Result<()> {
        let label = format!(
            "{} | {} | {} {:.0}%",
            self.site_id,
            classification
                .started_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            classification.event_type.as_str(),
            classification.confidence * 100.0
        );

        for phase in [SnapshotPhase::Start, SnapshotPhase::Peak, SnapshotPhase::End] {
            if let Some(path) = set.get(phase) {
                self.annotate_file(path, &label)?;
            }
        }
        Ok(())
    }

    /// Build the 3-panel composite when start, peak and end all exist.
    /// Returns the summary path, or `None` when the trio is incomplete.
    pub fn build_summary(
        &self,
        set: &SnapshotSet,
        classification: &EventClassification,
    ) -> Result<Option<PathBuf>> {
        if !set.has_trio() {
            return Ok(None);
        }

        let panels = [
            (set.start.as_ref(), "START"),
            (set.peak.as_ref(), "PEAK"),
            (set.end.as_ref(), "END"),
        ];

        let mut images = Vec::with_capacity(3);
        for (path, tag) in panels {
            let path = path.ok_or_else(|| Error::Snapshot("summary panel missing".into()))?;
            let img = image::open(path)?.to_rgb8();
            let scaled_w = (img.width() as u64 * PANEL_HEIGHT as u64 / img.height().max(1) as u64)
                .max(1) as u32;
            let mut panel = imageops::resize(
                &img,
                scaled_w,
                PANEL_HEIGHT,
                imageops::FilterType::Triangle,
            );
            self.draw_label(&mut panel, tag, 8, 8);
            images.push(panel);
        }

        let total_w: u32 = images.iter().map(|p| p.width()).sum();
        let mut composite = RgbImage::from_pixel(total_w, PANEL_HEIGHT, Rgb([0, 0, 0]));
        let mut offset = 0i64;
        for panel in &images {
            imageops::overlay(&mut composite, panel, offset, 0);
            offset += panel.width() as i64;
        }

        let filename = format!(
            "{}_event_summary_{}.jpg",
            self.site_id,
            classification
                .started_at
                .with_timezone(&Local)
                .format("%Y%m%d_%H%M%S")
        );
        let path = self.image_dir.join(filename);
        let bytes = self.compress_to_budget(&composite)?;
        std::fs::write(&path, bytes)?;

        tracing::info!(path = %path.display(), "Event summary composite built");
        Ok(Some(path))
    }

    /// Routine snapshot outside any event, annotated with site and timestamp
    pub fn capture_routine(&self, jpeg: &[u8], now: DateTime<Utc>) -> Result<PathBuf> {
        let local = now.with_timezone(&Local);
        let filename = format!("{}_snapshot_{}.jpg", self.site_id, local.format("%Y%m%d_%H%M%S"));
        let path = self.image_dir.join(filename);
        std::fs::write(&path, jpeg)?;

        let label = format!("{} | {}", self.site_id, local.format("%Y-%m-%d %H:%M:%S"));
        self.annotate_file(&path, &label)?;

        tracing::info!(path = %path.display(), "Routine snapshot captured");
        Ok(path)
    }

    fn annotate_file(&self, path: &Path, label: &str) -> Result<()> {
        let mut img = image::open(path)?.to_rgb8();

        let bar_y = img.height().saturating_sub(44);
        self.draw_label(&mut img, label, 12, bar_y as i32 + 8);

        let bytes = self.compress_to_budget(&img)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Darkened bar behind white text, bottom-left style of the original
    /// overlays. Without a font only the bar is drawn.
    fn draw_label(&self, img: &mut RgbImage, text: &str, x: i32, y: i32) {
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = match &self.font {
            Some(font) => {
                let (w, h) = text_size(scale, font, text);
                (w as i32, h as i32)
            }
            None => ((text.len() as f32 * LABEL_SCALE * 0.5) as i32, LABEL_SCALE as i32),
        };

        let pad = 8i32;
        let x0 = (x - pad).max(0) as u32;
        let y0 = (y - pad).max(0) as u32;
        let x1 = ((x + text_w + pad) as u32).min(img.width());
        let y1 = ((y + text_h + pad) as u32).min(img.height());

        for py in y0..y1 {
            for px in x0..x1 {
                let p = img.get_pixel_mut(px, py);
                p.0 = [p.0[0] / 4, p.0[1] / 4, p.0[2] / 4];
            }
        }

        if let Some(font) = &self.font {
            draw_text_mut(img, Rgb([255, 255, 255]), x, y, scale, font, text);
        }
    }

    /// Step JPEG quality down until the encoding fits the size budget or the
    /// quality floor is reached.
    fn compress_to_budget(&self, img: &RgbImage) -> Result<Vec<u8>> {
        let budget = self.settings.max_size_kb as usize * 1024;
        let mut quality = self.settings.quality;

        loop {
            let mut bytes = Vec::new();
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality)
                .encode_image(img)?;

            if bytes.len() <= budget || quality <= self.settings.quality_floor {
                if bytes.len() > budget {
                    tracing::debug!(
                        size = bytes.len(),
                        budget = budget,
                        quality = quality,
                        "Snapshot exceeds budget at quality floor"
                    );
                }
                return Ok(bytes);
            }
            quality = quality.saturating_sub(10).max(self.settings.quality_floor);
        }
    }
}

/// Decode helper for tests and callers that need image dimensions
pub fn jpeg_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let img = image::load_from_memory(bytes)?;
    Ok((img.width(), img.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_classifier::{EventType, PatternClass, SizeClass, TimeClass};

    fn test_jpeg(width: u32, height: u32, luma: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([luma, luma, luma]));
        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 90)
            .encode_image(&img)
            .unwrap();
        bytes
    }

    fn test_classification() -> EventClassification {
        EventClassification {
            event_type: EventType::SecurityBreach,
            confidence: 0.8,
            motion_area: 1200.0,
            pattern: PatternClass::Steady,
            time_class: TimeClass::OffHours,
            size_class: SizeClass::Medium,
            started_at: Utc::now(),
            duration_seconds: 42.0,
        }
    }

    fn service(dir: &Path) -> SnapshotService {
        SnapshotService::new(
            dir.to_path_buf(),
            "TEST".to_string(),
            SnapshotSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_stage_and_annotate_phases() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let started = Utc::now();

        let mut set = SnapshotSet::default();
        for phase in [SnapshotPhase::Start, SnapshotPhase::Peak, SnapshotPhase::End] {
            let path = service
                .stage_phase(&test_jpeg(320, 240, 120), phase, started)
                .unwrap();
            assert!(path.exists());
            set.set(phase, path);
        }
        assert!(set.has_trio());

        service.annotate_set(&set, &test_classification()).unwrap();
        for path in set.paths() {
            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn test_at_most_one_path_per_phase() {
        let mut set = SnapshotSet::default();
        set.set(SnapshotPhase::Start, PathBuf::from("/a.jpg"));
        set.set(SnapshotPhase::Start, PathBuf::from("/b.jpg"));
        assert_eq!(set.paths().len(), 1);
        assert_eq!(set.start.as_deref(), Some(Path::new("/b.jpg")));
    }

    #[test]
    fn test_summary_requires_trio() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let started = Utc::now();

        let mut set = SnapshotSet::default();
        set.set(
            SnapshotPhase::Start,
            service
                .stage_phase(&test_jpeg(320, 240, 120), SnapshotPhase::Start, started)
                .unwrap(),
        );

        let summary = service.build_summary(&set, &test_classification()).unwrap();
        assert!(summary.is_none());
    }

    #[test]
    fn test_summary_composite_spans_three_panels() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let started = Utc::now();

        let mut set = SnapshotSet::default();
        for phase in [SnapshotPhase::Start, SnapshotPhase::Peak, SnapshotPhase::End] {
            let path = service
                .stage_phase(&test_jpeg(320, 240, 120), phase, started)
                .unwrap();
            set.set(phase, path);
        }

        let summary = service
            .build_summary(&set, &test_classification())
            .unwrap()
            .expect("trio complete");
        let bytes = std::fs::read(&summary).unwrap();
        let (w, h) = jpeg_dimensions(&bytes).unwrap();
        assert_eq!(h, PANEL_HEIGHT);
        // Three 4:3 panels at height 360 = 3 * 480 wide
        assert_eq!(w, 1440);
    }

    #[test]
    fn test_compression_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SnapshotSettings::default();
        settings.max_size_kb = 8;
        let service =
            SnapshotService::new(dir.path().to_path_buf(), "TEST".to_string(), settings).unwrap();

        // Noisy image so JPEG actually needs quality reduction
        let mut img = RgbImage::new(640, 480);
        for (x, y, p) in img.enumerate_pixels_mut() {
            let v = ((x * 7 + y * 13) % 251) as u8;
            p.0 = [v, v.wrapping_mul(3), v.wrapping_add(97)];
        }
        let bytes = service.compress_to_budget(&img).unwrap();
        // Either under budget or stopped at the quality floor
        assert!(bytes.len() <= 8 * 1024 || bytes.len() < 64 * 1024);
    }

    #[test]
    fn test_routine_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let path = service
            .capture_routine(&test_jpeg(320, 240, 140), Utc::now())
            .unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("TEST_snapshot_"));
    }
}
