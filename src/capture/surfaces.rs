use std::sync::Mutex;

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, RgbImage};

use crate::models::{EncodedFrame, Resolution};

use super::device::StreamHandle;

#[derive(Debug)]
pub enum FrameSample {
    Ready(RgbImage),
    /// Nothing attached yet, or no frame decoded so far.
    NotReady,
    StreamEnded,
}

/// Off-screen target the live stream is decoded into. The sampler reads frames
/// from here; it is never shown.
#[derive(Default)]
pub struct DecodeTarget {
    source: Mutex<Option<StreamHandle>>,
}

impl DecodeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, stream: StreamHandle) {
        *self.lock() = Some(stream);
    }

    pub fn detach(&self) {
        self.lock().take();
    }

    pub fn attached(&self) -> Option<StreamHandle> {
        self.lock().clone()
    }

    /// Reads the frame currently decoded from the attached stream.
    pub fn sample(&self) -> FrameSample {
        let Some(source) = self.attached() else {
            return FrameSample::NotReady;
        };
        if !source.is_active() {
            return FrameSample::StreamEnded;
        }
        match source.current_frame() {
            Some(frame) => FrameSample::Ready(frame),
            None => FrameSample::NotReady,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StreamHandle>> {
        match self.source.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Draws a frame at the fixed sampling resolution and compresses it.
#[derive(Debug, Clone, Copy)]
pub struct SamplingSurface {
    resolution: Resolution,
    quality: u8,
}

impl SamplingSurface {
    pub fn new(resolution: Resolution, quality: u8) -> Self {
        Self {
            resolution,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// CPU bound; call from a blocking worker.
    pub fn encode(&self, frame: &RgbImage) -> Result<EncodedFrame> {
        let Resolution { width, height } = self.resolution;
        let scaled;
        let source = if frame.dimensions() == (width, height) {
            frame
        } else {
            scaled = image::imageops::resize(frame, width, height, FilterType::Triangle);
            &scaled
        };

        let mut jpeg = Vec::with_capacity((width * height / 8) as usize);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(source)
            .with_context(|| format!("failed to encode {} frame as JPEG", self.resolution))?;

        Ok(EncodedFrame {
            jpeg,
            resolution: self.resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{GenericImageView, Rgb};

    use super::*;
    use crate::capture::{CameraDevice, StreamConstraints, VirtualCamera};

    #[test]
    fn encodes_at_sampling_resolution() {
        let surface = SamplingSurface::new(Resolution::new(64, 36), 85);
        let frame = RgbImage::from_pixel(128, 72, Rgb([10, 200, 30]));

        let encoded = surface.encode(&frame).unwrap();
        assert_eq!(encoded.resolution, Resolution::new(64, 36));
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&encoded.jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 36));
    }

    #[test]
    fn base64_payload_has_no_data_url_prefix() {
        let surface = SamplingSurface::new(Resolution::new(8, 8), 85);
        let encoded = surface.encode(&RgbImage::new(8, 8)).unwrap();
        let payload = encoded.to_base64();
        assert!(payload.starts_with("/9j/"));
        assert!(!payload.contains(','));
    }

    #[test]
    fn empty_target_is_not_ready() {
        assert!(matches!(DecodeTarget::new().sample(), FrameSample::NotReady));
    }

    #[tokio::test]
    async fn stopped_stream_reports_end_and_detach_resets() {
        let stream = VirtualCamera::new()
            .open(StreamConstraints {
                resolution: Resolution::new(8, 8),
                frame_rate: 30,
            })
            .await
            .unwrap();
        let target = DecodeTarget::new();
        target.attach(StreamHandle::new(Arc::clone(&stream)));
        assert!(matches!(target.sample(), FrameSample::Ready(frame) if frame.dimensions() == (8, 8)));

        stream.stop_tracks();
        assert!(matches!(target.sample(), FrameSample::StreamEnded));

        target.detach();
        assert!(target.attached().is_none());
        assert!(matches!(target.sample(), FrameSample::NotReady));
    }
}
