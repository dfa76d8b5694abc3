//! MotionDetector - Foreground Region Extraction
//!
//! ## Responsibilities
//!
//! - Maintain the adaptive per-pixel background model
//! - Turn each processed preview frame into a set of connected foreground
//!   regions above the configured minimum area
//! - Morphological opening then closing to drop speckle noise and fill gaps
//!
//! Frame-skip is applied by the caller (only processed frames reach
//! `process`, so the model's temporal statistics stay in order); the
//! downscale knob is applied here, with regions reported back in full
//! preview coordinates.

mod background;

pub use background::BackgroundModel;

use crate::config::MotionSettings;
use crate::frame_source::PreviewFrame;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{connected_components, Connectivity};

/// One connected foreground blob in a single preview frame, in preview
/// coordinates.
#[derive(Debug, Clone, Copy)]
pub struct MotionRegion {
    /// Pixel area (preview scale)
    pub area: u32,
    /// Area centroid
    pub centroid: (f32, f32),
    /// Bounding extent `(x, y, width, height)`
    pub bbox: (u32, u32, u32, u32),
}

#[derive(Debug, Default)]
struct RegionAcc {
    area: u64,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    seen: bool,
}

/// MotionDetector instance
pub struct MotionDetector {
    settings: MotionSettings,
    model: BackgroundModel,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Self {
        let model = BackgroundModel::new(settings.history, settings.threshold);
        Self { settings, model }
    }

    /// Day/night sensitivity swap, applied between processed frames
    pub fn set_threshold(&mut self, threshold: f32) {
        if (self.model.seed_variance() - threshold).abs() > f32::EPSILON {
            self.model.set_seed_variance(threshold);
        }
    }

    pub fn threshold(&self) -> f32 {
        self.model.seed_variance()
    }

    /// Run the full per-frame pipeline: classify against the background
    /// model, update it, clean the mask, extract 8-connected regions, drop
    /// those under the minimum area.
    pub fn process(&mut self, frame: &PreviewFrame) -> Vec<MotionRegion> {
        let scale = self.settings.downscale.max(1);
        let (luma, width, height) = if scale > 1 {
            (
                downsample(&frame.data, frame.width, frame.height, scale),
                frame.width / scale,
                frame.height / scale,
            )
        } else {
            (frame.data.clone(), frame.width, frame.height)
        };

        if width == 0 || height == 0 {
            return Vec::new();
        }

        let mask = self.model.apply(&luma, width, height);
        let Some(mask) = GrayImage::from_raw(width, height, mask) else {
            return Vec::new();
        };

        let k = self.settings.kernel_radius;
        let cleaned = close(&open(&mask, Norm::LInf, k), Norm::LInf, k);

        let labels = connected_components(&cleaned, Connectivity::Eight, Luma([0u8]));

        let mut accs: Vec<RegionAcc> = Vec::new();
        for (x, y, pixel) in labels.enumerate_pixels() {
            let label = pixel[0] as usize;
            if label == 0 {
                continue;
            }
            if accs.len() < label {
                accs.resize_with(label, RegionAcc::default);
            }
            let acc = &mut accs[label - 1];
            if !acc.seen {
                acc.min_x = x;
                acc.min_y = y;
                acc.max_x = x;
                acc.max_y = y;
                acc.seen = true;
            } else {
                acc.min_x = acc.min_x.min(x);
                acc.min_y = acc.min_y.min(y);
                acc.max_x = acc.max_x.max(x);
                acc.max_y = acc.max_y.max(y);
            }
            acc.area += 1;
            acc.sum_x += x as u64;
            acc.sum_y += y as u64;
        }

        // Min-area filter runs at processed resolution; reported geometry is
        // scaled back to preview coordinates.
        let min_area = self.settings.min_area as u64;
        accs.into_iter()
            .filter(|acc| acc.seen && acc.area >= min_area)
            .map(|acc| MotionRegion {
                area: (acc.area * (scale as u64 * scale as u64)) as u32,
                centroid: (
                    acc.sum_x as f32 / acc.area as f32 * scale as f32,
                    acc.sum_y as f32 / acc.area as f32 * scale as f32,
                ),
                bbox: (
                    acc.min_x * scale,
                    acc.min_y * scale,
                    (acc.max_x - acc.min_x + 1) * scale,
                    (acc.max_y - acc.min_y + 1) * scale,
                ),
            })
            .collect()
    }
}

/// Nearest-neighbour downsample of a luma buffer by an integer factor
fn downsample(data: &[u8], width: u32, height: u32, scale: u32) -> Vec<u8> {
    let out_w = width / scale;
    let out_h = height / scale;
    let mut out = Vec::with_capacity((out_w * out_h) as usize);
    for y in 0..out_h {
        let row = (y * scale * width) as usize;
        for x in 0..out_w {
            out.push(data[row + (x * scale) as usize]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> PreviewFrame {
        PreviewFrame {
            data,
            width,
            height,
            timestamp: Utc::now(),
        }
    }

    fn settings(min_area: u32) -> MotionSettings {
        MotionSettings {
            threshold: 100.0,
            min_area,
            history: 200,
            kernel_radius: 1,
            ..Default::default()
        }
    }

    fn blob_frame(width: u32, height: u32, x0: u32, y0: u32, size: u32) -> PreviewFrame {
        let mut data = vec![100u8; (width * height) as usize];
        for y in y0..(y0 + size).min(height) {
            for x in x0..(x0 + size).min(width) {
                data[(y * width + x) as usize] = 250;
            }
        }
        frame(data, width, height)
    }

    fn settle(detector: &mut MotionDetector, width: u32, height: u32, frames: usize) {
        let quiet = vec![100u8; (width * height) as usize];
        for _ in 0..frames {
            detector.process(&frame(quiet.clone(), width, height));
        }
    }

    #[test]
    fn test_static_scene_yields_no_regions() {
        let mut detector = MotionDetector::new(settings(10));
        settle(&mut detector, 64, 64, 10);
        let regions = detector.process(&frame(vec![100u8; 64 * 64], 64, 64));
        assert!(regions.is_empty());
    }

    #[test]
    fn test_blob_detected_with_geometry() {
        let mut detector = MotionDetector::new(settings(10));
        settle(&mut detector, 64, 64, 10);

        let regions = detector.process(&blob_frame(64, 64, 20, 24, 12));
        assert_eq!(regions.len(), 1);

        let region = &regions[0];
        // Morphology trims the blob edge slightly; geometry stays close.
        assert!(region.area >= 80 && region.area <= 160);
        assert!((region.centroid.0 - 25.5).abs() < 3.0);
        assert!((region.centroid.1 - 29.5).abs() < 3.0);
        let (bx, by, bw, bh) = region.bbox;
        assert!(bx >= 19 && by >= 23);
        assert!(bw <= 14 && bh <= 14);
    }

    #[test]
    fn test_min_area_filters_small_blobs() {
        let mut detector = MotionDetector::new(settings(200));
        settle(&mut detector, 64, 64, 10);

        let regions = detector.process(&blob_frame(64, 64, 20, 20, 8));
        assert!(regions.is_empty());
    }

    #[test]
    fn test_speckle_noise_removed_by_morphology() {
        let mut detector = MotionDetector::new(settings(1));
        settle(&mut detector, 64, 64, 10);

        // Isolated single-pixel changes disappear under opening
        let mut data = vec![100u8; 64 * 64];
        data[10 * 64 + 10] = 250;
        data[40 * 64 + 50] = 250;
        let regions = detector.process(&frame(data, 64, 64));
        assert!(regions.is_empty());
    }

    #[test]
    fn test_downscale_reports_preview_coordinates() {
        let mut config = settings(10);
        config.downscale = 2;
        let mut detector = MotionDetector::new(config);

        let quiet = vec![100u8; 128 * 128];
        for _ in 0..10 {
            detector.process(&frame(quiet.clone(), 128, 128));
        }

        let regions = detector.process(&blob_frame(128, 128, 40, 48, 24));
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert!((region.centroid.0 - 51.5).abs() < 6.0);
        assert!((region.centroid.1 - 59.5).abs() < 6.0);
        // Area is reported at preview scale
        assert!(region.area >= 300 && region.area <= 650);
    }

    #[test]
    fn test_two_separate_blobs_two_regions() {
        let mut detector = MotionDetector::new(settings(10));
        settle(&mut detector, 96, 64, 10);

        let mut data = vec![100u8; 96 * 64];
        for y in 10..20 {
            for x in 10..20 {
                data[(y * 96 + x) as usize] = 250;
            }
        }
        for y in 40..50 {
            for x in 70..80 {
                data[(y * 96 + x) as usize] = 250;
            }
        }
        let regions = detector.process(&frame(data, 96, 64));
        assert_eq!(regions.len(), 2);
    }
}
