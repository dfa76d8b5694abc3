//! FrameSource - Camera Driver Seam
//!
//! ## Responsibilities
//!
//! - Define the boundary to the external camera/encoder driver: low-res
//!   preview frames for detection, encoded JPEG stills for snapshots, and
//!   the encoded high-res stream that feeds the recorder's ring buffer
//! - Provide a deterministic synthetic source for development and tests
//!
//! Hardware quirk workarounds belong entirely on the driver side of this
//! seam; the engine only ever sees frames or a transient failure.

use crate::error::{Error, Result};
use crate::ring_recorder::EncodedStreamWriter;
use chrono::{DateTime, Duration, Utc};

/// One low-resolution luma frame from the preview stream
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Row-major luma bytes, `width * height` long
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: DateTime<Utc>,
}

impl PreviewFrame {
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Camera driver contract consumed by the engine
pub trait FrameSource: Send {
    /// Fetch the next preview frame. `Ok(None)` is a transient capture
    /// failure: skip and retry on the next tick.
    fn preview_frame(&mut self) -> Result<Option<PreviewFrame>>;

    /// Capture a full-resolution still as encoded JPEG bytes
    fn capture_still(&mut self) -> Result<Vec<u8>>;

    /// Preview stream frame rate
    fn frame_rate(&self) -> u32;

    /// Route the encoded high-res stream into the recorder's ring buffer
    fn attach_encoded_stream(&mut self, writer: EncodedStreamWriter) -> Result<()>;
}

/// Placeholder source for a bench without the camera driver wired in. Every
/// poll reports a transient capture failure, which surfaces through the
/// engine's health counters.
pub struct NullFrameSource;

impl FrameSource for NullFrameSource {
    fn preview_frame(&mut self) -> Result<Option<PreviewFrame>> {
        Ok(None)
    }

    fn capture_still(&mut self) -> Result<Vec<u8>> {
        Err(Error::Capture("camera driver not attached".into()))
    }

    fn frame_rate(&self) -> u32 {
        30
    }

    fn attach_encoded_stream(&mut self, _writer: EncodedStreamWriter) -> Result<()> {
        Ok(())
    }
}

/// A rectangular foreground blob moving across the synthetic scene
#[derive(Debug, Clone, Copy)]
pub struct SyntheticBlob {
    pub x: i32,
    pub y: i32,
    pub size: u32,
    pub luma: u8,
    /// Per-frame velocity in pixels
    pub dx: i32,
    pub dy: i32,
}

/// Deterministic frame source: a flat background, an optional moving blob,
/// and a clock that advances one frame interval per poll. Each preview poll
/// also pushes one encoded chunk into the attached stream so the recording
/// path runs end to end.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    fps: u32,
    background: u8,
    blob: Option<SyntheticBlob>,
    clock: DateTime<Utc>,
    frame_index: u64,
    writer: Option<EncodedStreamWriter>,
    chunk_bytes: usize,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            background: 96,
            blob: None,
            clock: Utc::now(),
            frame_index: 0,
            writer: None,
            // One frame's worth of a nominal 2 Mbps stream
            chunk_bytes: (2_000_000 / 8 / fps.max(1)) as usize,
        }
    }

    /// Pin the frame clock, for deterministic time-of-day tests
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.clock = start;
        self
    }

    pub fn set_blob(&mut self, blob: Option<SyntheticBlob>) {
        self.blob = blob;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn render(&self) -> Vec<u8> {
        let mut data = vec![self.background; (self.width * self.height) as usize];
        if let Some(blob) = &self.blob {
            for dy in 0..blob.size as i32 {
                for dx in 0..blob.size as i32 {
                    let x = blob.x + dx;
                    let y = blob.y + dy;
                    if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
                        data[(y as u32 * self.width + x as u32) as usize] = blob.luma;
                    }
                }
            }
        }
        data
    }
}

impl FrameSource for SyntheticFrameSource {
    fn preview_frame(&mut self) -> Result<Option<PreviewFrame>> {
        let frame = PreviewFrame {
            data: self.render(),
            width: self.width,
            height: self.height,
            timestamp: self.clock,
        };

        if let Some(writer) = &self.writer {
            let payload = vec![(self.frame_index % 251) as u8; self.chunk_bytes];
            writer.write(&payload)?;
        }

        if let Some(blob) = self.blob.as_mut() {
            blob.x += blob.dx;
            blob.y += blob.dy;
        }
        self.clock = self.clock + Duration::microseconds(1_000_000 / self.fps.max(1) as i64);
        self.frame_index += 1;

        Ok(Some(frame))
    }

    fn capture_still(&mut self) -> Result<Vec<u8>> {
        let luma = image::GrayImage::from_raw(self.width, self.height, self.render())
            .ok_or_else(|| Error::Capture("synthetic frame buffer mismatch".into()))?;
        let rgb = image::DynamicImage::ImageLuma8(luma).to_rgb8();

        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 85).encode_image(&rgb)?;
        Ok(bytes)
    }

    fn frame_rate(&self) -> u32 {
        self.fps
    }

    fn attach_encoded_stream(&mut self, writer: EncodedStreamWriter) -> Result<()> {
        self.writer = Some(writer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_clock_advances_per_frame() {
        let start = Utc::now();
        let mut source = SyntheticFrameSource::new(64, 48, 10).with_start_time(start);

        let first = source.preview_frame().unwrap().unwrap();
        let second = source.preview_frame().unwrap().unwrap();

        assert_eq!(first.timestamp, start);
        assert_eq!((second.timestamp - first.timestamp).num_milliseconds(), 100);
    }

    #[test]
    fn test_blob_rendered_and_moves() {
        let mut source = SyntheticFrameSource::new(64, 48, 30);
        source.set_blob(Some(SyntheticBlob {
            x: 10,
            y: 10,
            size: 4,
            luma: 230,
            dx: 2,
            dy: 0,
        }));

        let first = source.preview_frame().unwrap().unwrap();
        assert_eq!(first.data[(10 * 64 + 10) as usize], 230);

        let second = source.preview_frame().unwrap().unwrap();
        assert_eq!(second.data[(10 * 64 + 12) as usize], 230);
        assert_eq!(second.data[(10 * 64 + 10) as usize], 96);
    }

    #[test]
    fn test_capture_still_is_jpeg() {
        let mut source = SyntheticFrameSource::new(64, 48, 30);
        let bytes = source.capture_still().unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_null_source_reports_transient_failure() {
        let mut source = NullFrameSource;
        assert!(source.preview_frame().unwrap().is_none());
        assert!(source.capture_still().is_err());
    }
}
