//! # Card and Reader Chip Identification
//!
//! Decodes the two informational bytes a contactless reader hands back: the
//! SAK of a selected card and the reader chip's version register.
//! Purely descriptive; nothing in the pipeline branches on them except
//! [`ChipVersion::is_responding`].

use std::fmt;

// =============================================================================
// PICC Type
// =============================================================================

/// Card family as indicated by the SAK (Select Acknowledge) byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiccType {
    Iso14443_4,
    Iso18092,
    MifareMini,
    Mifare1K,
    Mifare4K,
    MifareUltralight,
    MifarePlus,
    MifareTnp3xxx,
    NotComplete,
    Unknown,
}

impl PiccType {
    /// Maps a SAK byte to a card family. Bit 7 is reserved and ignored.
    pub fn from_sak(sak: u8) -> Self {
        match sak & 0x7F {
            0x04 => PiccType::NotComplete,
            0x09 => PiccType::MifareMini,
            0x08 => PiccType::Mifare1K,
            0x18 => PiccType::Mifare4K,
            0x00 => PiccType::MifareUltralight,
            0x10 | 0x11 => PiccType::MifarePlus,
            0x01 => PiccType::MifareTnp3xxx,
            0x20 => PiccType::Iso14443_4,
            0x40 => PiccType::Iso18092,
            _ => PiccType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PiccType::Iso14443_4 => "PICC compliant with ISO/IEC 14443-4",
            PiccType::Iso18092 => "PICC compliant with ISO/IEC 18092 (NFC)",
            PiccType::MifareMini => "MIFARE Mini, 320 bytes",
            PiccType::Mifare1K => "MIFARE 1KB",
            PiccType::Mifare4K => "MIFARE 4KB",
            PiccType::MifareUltralight => "MIFARE Ultralight or Ultralight C",
            PiccType::MifarePlus => "MIFARE Plus",
            PiccType::MifareTnp3xxx => "MIFARE TNP3XXX",
            PiccType::NotComplete => "SAK indicates UID is not complete",
            PiccType::Unknown => "Unknown type",
        }
    }
}

impl fmt::Display for PiccType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Reader Chip Version
// =============================================================================

/// Reader chip identification from the version register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVersion {
    Fm17522,
    V0_0,
    V1_0,
    V2_0,
    Counterfeit,
    /// 0x00 or 0xFF: the bus returned nothing meaningful.
    NoResponse,
    Other(u8),
}

impl ChipVersion {
    pub fn from_register(value: u8) -> Self {
        match value {
            0x88 => ChipVersion::Fm17522,
            0x90 => ChipVersion::V0_0,
            0x91 => ChipVersion::V1_0,
            0x92 => ChipVersion::V2_0,
            0x12 => ChipVersion::Counterfeit,
            0x00 | 0xFF => ChipVersion::NoResponse,
            other => ChipVersion::Other(other),
        }
    }

    /// False when the register read indicates a dead bus or missing chip.
    pub fn is_responding(&self) -> bool {
        !matches!(self, ChipVersion::NoResponse)
    }
}

impl fmt::Display for ChipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipVersion::Fm17522 => write!(f, "0x88 = FM17522 clone"),
            ChipVersion::V0_0 => write!(f, "0x90 = v0.0"),
            ChipVersion::V1_0 => write!(f, "0x91 = v1.0"),
            ChipVersion::V2_0 => write!(f, "0x92 = v2.0"),
            ChipVersion::Counterfeit => write!(f, "0x12 = counterfeit chip"),
            ChipVersion::NoResponse => write!(f, "no response (chip or communication failure)"),
            ChipVersion::Other(v) => write!(f, "{:#04x} = unknown", v),
        }
    }
}
