/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! Status and Error registers of an ATA drive.
//!
//! Both registers are modelled as bitfields with the historical bit assignments; the
//! [DriveFault] enum names the single error condition a failed command reports.

use modular_bitfield::bitfield;
use strum_macros::{Display, IntoStaticStr};

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusRegister {
    pub err:   bool, // Error
    pub idx:   bool, // Index
    pub corr:  bool, // Corrected Data
    pub drq:   bool, // Data Request
    pub dsc:   bool, // Seek Complete
    pub dwf:   bool, // Write Fault
    pub ready: bool, // Drive Ready
    pub busy:  bool, // Drive Busy
}

impl Default for StatusRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegister {
    #[inline]
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }

    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Self::from_bytes([bits])
    }

    /// Status = Ready
    pub fn ready_only() -> Self {
        Self::new().with_ready(true)
    }

    /// Status = DataRequest | Ready
    pub fn data_ready() -> Self {
        Self::new().with_drq(true).with_ready(true)
    }

    /// Status = Ready | SeekComplete
    pub fn ready_seek_complete() -> Self {
        Self::new().with_ready(true).with_dsc(true)
    }

    /// Status = Error
    pub fn error() -> Self {
        Self::new().with_err(true)
    }
}

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrorRegister {
    pub amnf: bool, // Address Mark Not Found
    pub tk0:  bool, // Track 0 Not Found
    pub abrt: bool, // Command Aborted
    pub mcr:  bool, // Media Change Request
    pub idnf: bool, // ID Not Found
    pub mc:   bool, // Media Changed
    pub unc:  bool, // Uncorrectable
    pub bbk:  bool, // Bad Block
}

impl Default for ErrorRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRegister {
    #[inline]
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }

    /// The fault currently latched, if the register holds exactly one known condition.
    pub fn fault(&self) -> Option<DriveFault> {
        DriveFault::from_bits(self.bits())
    }
}

/// The error condition reported by a failed command.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoStaticStr)]
pub enum DriveFault {
    Aborted,
    MediaChange,
    IdNotFound,
    MediaChanged,
    Uncorrectable,
    BadBlock,
}

impl DriveFault {
    pub const fn mask(self) -> u8 {
        match self {
            DriveFault::Aborted => 0x04,
            DriveFault::MediaChange => 0x08,
            DriveFault::IdNotFound => 0x10,
            DriveFault::MediaChanged => 0x20,
            DriveFault::Uncorrectable => 0x40,
            DriveFault::BadBlock => 0x80,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x04 => Some(DriveFault::Aborted),
            0x08 => Some(DriveFault::MediaChange),
            0x10 => Some(DriveFault::IdNotFound),
            0x20 => Some(DriveFault::MediaChanged),
            0x40 => Some(DriveFault::Uncorrectable),
            0x80 => Some(DriveFault::BadBlock),
            _ => None,
        }
    }
}

impl From<DriveFault> for ErrorRegister {
    fn from(fault: DriveFault) -> Self {
        ErrorRegister::from_bytes([fault.mask()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits_follow_ata_layout() {
        assert_eq!(StatusRegister::error().bits(), 0x01);
        assert_eq!(StatusRegister::data_ready().bits(), 0x48);
        assert_eq!(StatusRegister::ready_seek_complete().bits(), 0x50);
        assert_eq!(StatusRegister::new().with_busy(true).bits(), 0x80);
        assert_eq!(StatusRegister::new().with_dwf(true).bits(), 0x20);
    }

    #[test]
    fn error_register_latches_single_fault() {
        for fault in [
            DriveFault::Aborted,
            DriveFault::MediaChange,
            DriveFault::IdNotFound,
            DriveFault::MediaChanged,
            DriveFault::Uncorrectable,
            DriveFault::BadBlock,
        ] {
            let reg = ErrorRegister::from(fault);
            assert_eq!(reg.fault(), Some(fault));
        }
        assert!(ErrorRegister::from(DriveFault::Aborted).abrt());
        assert!(ErrorRegister::from(DriveFault::IdNotFound).idnf());
        assert_eq!(ErrorRegister::default().fault(), None);
    }
}
