//! Label-reading recognition backend

use std::sync::atomic::{AtomicU64, Ordering};
use vrs_common::{BarcodeKind, ScanOptions};

use crate::backend::{BackendError, RecognitionBackend};
use crate::frame::Frame;

/// What a scripted frame shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLabel {
    Image(String),
    /// Image known only to the online catalog
    Remote(String),
    Barcode(BarcodeKind, String),
    Error,
    Misuse,
    Nothing,
}

impl FrameLabel {
    /// Parse a label such as `image:poster` or `qrcode:https://example.com`
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        match label {
            "error" => return FrameLabel::Error,
            "misuse" => return FrameLabel::Misuse,
            _ => {}
        }

        let Some((prefix, payload)) = label.split_once(':') else {
            return FrameLabel::Nothing;
        };
        if payload.is_empty() {
            return FrameLabel::Nothing;
        }

        match prefix {
            "image" => FrameLabel::Image(payload.to_string()),
            "remote" => FrameLabel::Remote(payload.to_string()),
            other => match BarcodeKind::from_label(other) {
                Some(kind) => FrameLabel::Barcode(kind, payload.to_string()),
                None => FrameLabel::Nothing,
            },
        }
    }

    /// Label spelled by the frame's pixel bytes
    pub fn of(frame: &Frame) -> Self {
        match std::str::from_utf8(frame.data()) {
            Ok(text) => Self::parse(text.trim_end_matches('\0')),
            Err(_) => FrameLabel::Nothing,
        }
    }
}

/// Backend answering from frame labels
#[derive(Debug)]
pub struct SimBackend {
    compatible: bool,
    calls: AtomicU64,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            compatible: true,
            calls: AtomicU64::new(0),
        }
    }

    /// Backend that fails the device compatibility check
    pub fn incompatible() -> Self {
        Self {
            compatible: false,
            ..Self::new()
        }
    }

    /// Number of recognition calls served
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn read(&self, frame: &Frame) -> Result<FrameLabel, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match FrameLabel::of(frame) {
            FrameLabel::Error => Err(BackendError::Transient("scripted error".to_string())),
            FrameLabel::Misuse => Err(BackendError::Misuse(
                "scripted backend misuse".to_string(),
            )),
            label => Ok(label),
        }
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionBackend for SimBackend {
    fn verify(&self, frame: &Frame, expected_id: &str) -> Result<bool, BackendError> {
        Ok(matches!(self.read(frame)?, FrameLabel::Image(id) if id == expected_id))
    }

    fn search(&self, frame: &Frame) -> Result<Option<String>, BackendError> {
        match self.read(frame)? {
            FrameLabel::Image(id) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    fn decode_barcode(
        &self,
        frame: &Frame,
        formats: ScanOptions,
    ) -> Result<Option<(BarcodeKind, String)>, BackendError> {
        match self.read(frame)? {
            FrameLabel::Barcode(kind, text) if formats.contains(kind.format_flag()) => {
                Ok(Some((kind, text)))
            }
            _ => Ok(None),
        }
    }

    fn check_compatibility(&self) -> Result<(), String> {
        if self.compatible {
            Ok(())
        } else {
            Err("Simulated device does not support recognition".to_string())
        }
    }

    fn remote_search(&self, frame: &Frame) -> Result<Option<String>, BackendError> {
        match self.read(frame)? {
            FrameLabel::Image(id) | FrameLabel::Remote(id) => Ok(Some(id)),
            _ => Ok(None),
        }
    }
}
