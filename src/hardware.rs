//! capabilities the controller drives, implemented by platform backends or by [`crate::mock`]

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// a captured image, 8 bit grayscale, row major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// create an all-black frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Frame {
            width,
            height,
            pixels: vec![0x00; width as usize * height as usize],
        }
    }
}

/// text extracted from a 2D code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub text: String,
}

impl From<&str> for DecodedPayload {
    fn from(text: &str) -> Self {
        DecodedPayload {
            text: text.to_string(),
        }
    }
}

/// failures reported by a camera
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// the device could not be opened
    #[error("camera not available: {0}")]
    NotAvailable(String),
    /// no frame could be read (transient, or the device was never opened)
    #[error("no frame available")]
    NoFrame,
}

/// direction of a digital line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// pull resistor configuration of an input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

/// video source yielding frames on demand
pub trait Camera {
    /// open the device with the requested resolution
    fn open(&mut self, width: u32, height: u32) -> Result<(), CameraError>;
    /// block until a frame is available or the read failed
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
    /// release the device, must be safe to call on a camera that failed to open
    fn release(&mut self);
}

/// 2D code decoder, returns every payload found in the frame (possibly none)
pub trait Decoder {
    fn decode(&mut self, frame: &Frame) -> Vec<DecodedPayload>;
}

/// servo driver exposing one duty-cycle register per channel
pub trait PwmOutput {
    fn set_duty(&mut self, channel: u8, value: u16) -> Result<()>;
    fn deinit(&mut self) -> Result<()>;
}

/// GPIO substrate, levels are `true` for high
pub trait DigitalLine {
    fn set_mode(&mut self, pin: u8, mode: PinMode, pull: Pull) -> Result<()>;
    fn write(&mut self, pin: u8, level: bool) -> Result<()>;
    fn read(&mut self, pin: u8) -> Result<bool>;
    fn cleanup(&mut self) -> Result<()>;
}

/// side channel for url payloads (e.g. launching a viewer)
pub trait Notifier {
    fn notify_url(&mut self, url: &str) -> Result<()>;
}

/// opens url payloads with the system default handler
#[derive(Debug, Default)]
pub struct SystemNotifier;

impl Notifier for SystemNotifier {
    fn notify_url(&mut self, url: &str) -> Result<()> {
        debug!("opening {} with the system handler", url);
        if let Err(err) = open::that(url) {
            // fire and forget, the scan loop must not depend on a viewer
            warn!("unable to open {}: {}", url, err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_size() {
        let frame = Frame::blank(4, 3);
        assert_eq!(frame.pixels.len(), 12);
        assert!(frame.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_camera_error_messages() {
        assert_eq!(
            CameraError::NotAvailable(String::from("/dev/video0 busy")).to_string(),
            "camera not available: /dev/video0 busy"
        );
        assert_eq!(CameraError::NoFrame.to_string(), "no frame available");
    }
}
