//! Recognition outcome type definitions
//!
//! Supporting types for per-frame recognition results and the set of
//! outcome kinds a session is allowed to produce.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Barcode symbology reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarcodeKind {
    Ean8,
    Ean13,
    Qrcode,
}

impl BarcodeKind {
    /// Every symbology the decoder understands, in mask order
    pub const ALL: [BarcodeKind; 3] = [BarcodeKind::Ean8, BarcodeKind::Ean13, BarcodeKind::Qrcode];

    /// Single-bit decode mask for this symbology
    pub fn format_flag(self) -> ScanOptions {
        match self {
            BarcodeKind::Ean8 => ScanOptions::EAN8,
            BarcodeKind::Ean13 => ScanOptions::EAN13,
            BarcodeKind::Qrcode => ScanOptions::QRCODE,
        }
    }

    /// Lowercase label used in configuration files and scripted frames
    pub fn label(self) -> &'static str {
        match self {
            BarcodeKind::Ean8 => "ean8",
            BarcodeKind::Ean13 => "ean13",
            BarcodeKind::Qrcode => "qrcode",
        }
    }

    /// Parse a lowercase label (`ean8`, `ean13`, `qrcode`)
    pub fn from_label(label: &str) -> Option<Self> {
        BarcodeKind::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl std::fmt::Display for BarcodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarcodeKind::Ean8 => write!(f, "EAN8"),
            BarcodeKind::Ean13 => write!(f, "EAN13"),
            BarcodeKind::Qrcode => write!(f, "QRCODE"),
        }
    }
}

/// Kind of outcome a session may be configured to produce
///
/// Configuration-file form of a single [`ScanOptions`] bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Image,
    Ean8,
    Ean13,
    Qrcode,
}

impl OutcomeKind {
    pub fn flag(self) -> ScanOptions {
        match self {
            OutcomeKind::Image => ScanOptions::IMAGE,
            OutcomeKind::Ean8 => ScanOptions::EAN8,
            OutcomeKind::Ean13 => ScanOptions::EAN13,
            OutcomeKind::Qrcode => ScanOptions::QRCODE,
        }
    }
}

impl From<BarcodeKind> for OutcomeKind {
    fn from(kind: BarcodeKind) -> Self {
        match kind {
            BarcodeKind::Ean8 => OutcomeKind::Ean8,
            BarcodeKind::Ean13 => OutcomeKind::Ean13,
            BarcodeKind::Qrcode => OutcomeKind::Qrcode,
        }
    }
}

bitflags! {
    /// Set of enabled outcome kinds (bitmask semantics)
    ///
    /// The barcode bits double as the format mask handed to the decoder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ScanOptions: u32 {
        const IMAGE = 1 << 0;
        const EAN8 = 1 << 1;
        const EAN13 = 1 << 2;
        const QRCODE = 1 << 3;
        const BARCODES = Self::EAN8.bits() | Self::EAN13.bits() | Self::QRCODE.bits();
    }
}

impl ScanOptions {
    /// Build a mask from a list of kinds (duplicates are harmless)
    pub fn from_kinds<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = OutcomeKind>,
    {
        kinds
            .into_iter()
            .fold(ScanOptions::empty(), |acc, kind| acc | kind.flag())
    }

    /// Enabled kinds, in a stable order
    pub fn kinds(self) -> Vec<OutcomeKind> {
        [
            OutcomeKind::Image,
            OutcomeKind::Ean8,
            OutcomeKind::Ean13,
            OutcomeKind::Qrcode,
        ]
        .into_iter()
        .filter(|kind| self.contains(kind.flag()))
        .collect()
    }

    /// Barcode sub-mask handed to the decoder
    pub fn barcode_formats(self) -> ScanOptions {
        self & ScanOptions::BARCODES
    }

    pub fn image_enabled(self) -> bool {
        self.contains(ScanOptions::IMAGE)
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions::IMAGE | ScanOptions::EAN13 | ScanOptions::QRCODE
    }
}

/// Raw result of one recognition pass over one frame
///
/// Equality is structural: same variant and same payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    /// Nothing recognized
    None,
    /// Reference image identified by its record id
    Image { id: String },
    /// Decoded barcode
    Barcode { kind: BarcodeKind, text: String },
}

impl RecognitionOutcome {
    pub fn image(id: impl Into<String>) -> Self {
        RecognitionOutcome::Image { id: id.into() }
    }

    pub fn barcode(kind: BarcodeKind, text: impl Into<String>) -> Self {
        RecognitionOutcome::Barcode {
            kind,
            text: text.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RecognitionOutcome::None)
    }

    pub fn is_found(&self) -> bool {
        !self.is_none()
    }

    /// Outcome kind, `None` for the empty outcome
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            RecognitionOutcome::None => None,
            RecognitionOutcome::Image { .. } => Some(OutcomeKind::Image),
            RecognitionOutcome::Barcode { kind, .. } => Some((*kind).into()),
        }
    }
}

impl std::fmt::Display for RecognitionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionOutcome::None => write!(f, "none"),
            RecognitionOutcome::Image { id } => write!(f, "image:{}", id),
            RecognitionOutcome::Barcode { kind, text } => write!(f, "{}:{}", kind.label(), text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_equality_is_structural() {
        assert_eq!(RecognitionOutcome::image("A"), RecognitionOutcome::image("A"));
        assert_ne!(RecognitionOutcome::image("A"), RecognitionOutcome::image("B"));
        assert_ne!(
            RecognitionOutcome::barcode(BarcodeKind::Ean13, "123"),
            RecognitionOutcome::barcode(BarcodeKind::Ean8, "123")
        );
        assert_ne!(
            RecognitionOutcome::image("123"),
            RecognitionOutcome::barcode(BarcodeKind::Qrcode, "123")
        );
    }

    #[test]
    fn test_default_scan_options() {
        let options = ScanOptions::default();
        assert!(options.image_enabled());
        assert!(options.contains(ScanOptions::EAN13));
        assert!(options.contains(ScanOptions::QRCODE));
        assert!(!options.contains(ScanOptions::EAN8));
        assert_eq!(options.barcode_formats(), ScanOptions::EAN13 | ScanOptions::QRCODE);
    }

    #[test]
    fn test_scan_options_from_kinds() {
        let options = ScanOptions::from_kinds([OutcomeKind::Ean8, OutcomeKind::Ean8]);
        assert_eq!(options, ScanOptions::EAN8);
        assert!(!options.image_enabled());
        assert_eq!(options.barcode_formats(), ScanOptions::EAN8);
        assert_eq!(options.kinds(), vec![OutcomeKind::Ean8]);
    }

    #[test]
    fn test_image_only_has_no_barcode_formats() {
        let options = ScanOptions::IMAGE;
        assert!(options.barcode_formats().is_empty());
    }

    #[test]
    fn test_outcome_kind() {
        assert_eq!(RecognitionOutcome::None.kind(), None);
        assert_eq!(RecognitionOutcome::image("x").kind(), Some(OutcomeKind::Image));
        assert_eq!(
            RecognitionOutcome::barcode(BarcodeKind::Qrcode, "x").kind(),
            Some(OutcomeKind::Qrcode)
        );
    }

    #[test]
    fn test_barcode_label_roundtrip() {
        for kind in BarcodeKind::ALL {
            assert_eq!(BarcodeKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(BarcodeKind::from_label("upc"), None);
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let json = serde_json::to_value(RecognitionOutcome::barcode(BarcodeKind::Ean13, "42"))
            .expect("serialize outcome");
        assert_eq!(json["type"], "barcode");
        assert_eq!(json["kind"], "ean13");
        assert_eq!(json["text"], "42");

        let json = serde_json::to_value(RecognitionOutcome::None).expect("serialize outcome");
        assert_eq!(json["type"], "none");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RecognitionOutcome::image("A").to_string(), "image:A");
        assert_eq!(
            RecognitionOutcome::barcode(BarcodeKind::Qrcode, "hi").to_string(),
            "qrcode:hi"
        );
        assert_eq!(RecognitionOutcome::None.to_string(), "none");
    }
}
