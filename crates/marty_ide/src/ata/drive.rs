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

//! An [AtaDrive] couples the register file shared by every ATA device with a backend that
//! implements the command set of one device type.
//!
//! The data register handshake lives here, common to both backends: reads drain the active
//! [SectorBuffer] and invoke the backend's read-finish hook, writes fill it (opening a fresh
//! device-bound buffer when needed) and invoke the command-finish hook once it is full.

use enum_dispatch::enum_dispatch;
use serde_derive::Deserialize;
use strum_macros::{Display, IntoStaticStr};

use crate::{
    ata::{
        atapi::AtapiDrive,
        buffer::{SectorBuffer, TransferDirection},
        hard_disk::{DiskGeometry, HardDisk},
        registers::{DriveFault, ErrorRegister, StatusRegister},
    },
    error::IdeError,
    image::ImageHandle,
    ports::IdeRegister,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveKind {
    #[strum(serialize = "hard disk")]
    HardDisk,
    #[strum(serialize = "optical")]
    Optical,
}

/// ATA command opcodes understood by either backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AtaCommand {
    DeviceReset,
    Recalibrate(u8),
    ReadSectors,
    ReadSectorsNoRetry,
    WriteSectors,
    WriteSectorsNoRetry,
    ReadVerify,
    Seek(u8),
    InitializeParameters,
    Packet,
    IdentifyPacketDevice,
    IdentifyDevice,
    Unknown(u8),
}

impl From<u8> for AtaCommand {
    fn from(opcode: u8) -> Self {
        match opcode {
            0x08 => AtaCommand::DeviceReset,
            0x10..=0x1F => AtaCommand::Recalibrate(opcode),
            0x20 => AtaCommand::ReadSectors,
            0x21 => AtaCommand::ReadSectorsNoRetry,
            0x30 => AtaCommand::WriteSectors,
            0x31 => AtaCommand::WriteSectorsNoRetry,
            0x40 => AtaCommand::ReadVerify,
            0x70..=0x7F => AtaCommand::Seek(opcode),
            0x91 => AtaCommand::InitializeParameters,
            0xA0 => AtaCommand::Packet,
            0xA1 => AtaCommand::IdentifyPacketDevice,
            0xEC => AtaCommand::IdentifyDevice,
            _ => AtaCommand::Unknown(opcode),
        }
    }
}

impl AtaCommand {
    pub fn opcode(&self) -> u8 {
        match *self {
            AtaCommand::DeviceReset => 0x08,
            AtaCommand::Recalibrate(op) | AtaCommand::Seek(op) | AtaCommand::Unknown(op) => op,
            AtaCommand::ReadSectors => 0x20,
            AtaCommand::ReadSectorsNoRetry => 0x21,
            AtaCommand::WriteSectors => 0x30,
            AtaCommand::WriteSectorsNoRetry => 0x31,
            AtaCommand::ReadVerify => 0x40,
            AtaCommand::InitializeParameters => 0x91,
            AtaCommand::Packet => 0xA0,
            AtaCommand::IdentifyPacketDevice => 0xA1,
            AtaCommand::IdentifyDevice => 0xEC,
        }
    }
}

/// The task file of a single drive, together with the transfer buffer its commands stage.
#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    pub error: ErrorRegister,
    pub sector_count: u8,
    pub sector_number: u8,
    pub cylinder_low: u8,
    pub cylinder_high: u8,
    pub drive_head: u8,
    pub status: StatusRegister,
    pub buffer: Option<SectorBuffer>,
}

impl RegisterFile {
    #[inline]
    pub fn cylinder(&self) -> u16 {
        (self.cylinder_high as u16) << 8 | self.cylinder_low as u16
    }

    #[inline]
    pub fn set_cylinder(&mut self, cylinder: u16) {
        self.cylinder_low = cylinder as u8;
        self.cylinder_high = (cylinder >> 8) as u8;
    }

    /// Install a host-bound buffer for the guest to drain.
    pub fn stage(&mut self, buffer: SectorBuffer) {
        self.buffer = Some(buffer);
        self.status = StatusRegister::data_ready();
        self.error = ErrorRegister::default();
    }

    /// Fail the current command. Nothing stays staged, so a following data read returns 0.
    pub fn fail(&mut self, fault: DriveFault) {
        self.status = StatusRegister::error();
        self.error = fault.into();
        self.buffer = None;
    }

    /// Complete a command that transfers no data.
    pub fn complete(&mut self, status: StatusRegister) {
        self.status = status;
        self.error = ErrorRegister::default();
    }
}

#[enum_dispatch]
pub enum BackendDispatch {
    HardDisk,
    AtapiDrive,
}

#[enum_dispatch(BackendDispatch)]
pub trait DriveBackend {
    fn kind(&self) -> DriveKind;
    fn reset(&mut self, regs: &mut RegisterFile);
    fn run_command(&mut self, regs: &mut RegisterFile, command: AtaCommand);
    fn finish_command(&mut self, regs: &mut RegisterFile);
    fn finish_read(&mut self, regs: &mut RegisterFile);
    fn load_image(&mut self, regs: &mut RegisterFile, image: ImageHandle) -> Result<(), IdeError>;
    /// Size in words of the buffer opened when the guest writes the data register with
    /// nothing to fill.
    fn device_buffer_words(&self) -> usize;
    fn has_media(&self) -> bool;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DriveCounters {
    pub data_reads: u64,
    pub data_writes: u64,
    pub reads_finished: u64,
    pub commands_finished: u64,
    pub commands_run: u64,
}

/// A copy of a drive's visible state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveSnapshot {
    pub kind: DriveKind,
    pub status: u8,
    pub error: u8,
    pub sector_count: u8,
    pub sector_number: u8,
    pub cylinder_low: u8,
    pub cylinder_high: u8,
    pub drive_head: u8,
    pub buffer_len: Option<usize>,
    pub buffer_position: usize,
    pub has_media: bool,
    pub counters: DriveCounters,
}

impl DriveSnapshot {
    pub fn cylinder(&self) -> u16 {
        (self.cylinder_high as u16) << 8 | self.cylinder_low as u16
    }
}

pub struct AtaDrive {
    regs: RegisterFile,
    backend: BackendDispatch,
    counters: DriveCounters,
}

impl AtaDrive {
    pub fn new(backend: impl Into<BackendDispatch>) -> Self {
        let mut drive = Self {
            regs: RegisterFile::default(),
            backend: backend.into(),
            counters: DriveCounters::default(),
        };
        drive.regs.status = StatusRegister::ready_only();
        drive
    }

    pub fn hard_disk(geometry: DiskGeometry) -> Self {
        Self::new(HardDisk::new(geometry))
    }

    pub fn optical() -> Self {
        Self::new(AtapiDrive::new())
    }

    #[inline]
    pub fn kind(&self) -> DriveKind {
        self.backend.kind()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    #[cfg(test)]
    pub(crate) fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn counters(&self) -> DriveCounters {
        self.counters
    }

    pub fn has_media(&self) -> bool {
        self.backend.has_media()
    }

    pub fn snapshot(&self) -> DriveSnapshot {
        DriveSnapshot {
            kind: self.kind(),
            status: self.regs.status.bits(),
            error: self.regs.error.bits(),
            sector_count: self.regs.sector_count,
            sector_number: self.regs.sector_number,
            cylinder_low: self.regs.cylinder_low,
            cylinder_high: self.regs.cylinder_high,
            drive_head: self.regs.drive_head,
            buffer_len: self.regs.buffer.as_ref().map(|b| b.len()),
            buffer_position: self.regs.buffer.as_ref().map_or(0, |b| b.position()),
            has_media: self.has_media(),
            counters: self.counters,
        }
    }

    pub fn reset(&mut self) {
        self.backend.reset(&mut self.regs);
    }

    pub fn run_command(&mut self, opcode: u8) {
        let command = AtaCommand::from(opcode);
        log::debug!("{} drive: command {:02X} ({:?})", self.kind(), opcode, command);
        self.counters.commands_run += 1;
        self.backend.run_command(&mut self.regs, command);
        if self.regs.status.err() {
            log::debug!(
                "{} drive: command {:02X} failed: {:?}",
                self.kind(),
                opcode,
                self.regs.error.fault()
            );
        }
    }

    pub fn load_image(&mut self, image: ImageHandle) -> Result<(), IdeError> {
        self.backend.load_image(&mut self.regs, image)
    }

    /// Place a 12-byte ATAPI packet directly into the packet staging area.
    pub fn stage_packet(&mut self, packet: &[u8]) -> Result<(), IdeError> {
        let kind = self.kind();
        match &mut self.backend {
            BackendDispatch::AtapiDrive(atapi) => {
                atapi.stage_packet(packet);
                Ok(())
            }
            _ => Err(IdeError::Unsupported {
                kind,
                operation: "stage_packet",
            }),
        }
    }

    /// Deassertion of SRST: drop Busy and raise Ready.
    pub fn release_reset(&mut self) {
        self.regs.status.set_busy(false);
        self.regs.status.set_ready(true);
    }

    fn finish_read(&mut self) {
        self.counters.reads_finished += 1;
        self.backend.finish_read(&mut self.regs);
    }

    fn finish_command(&mut self) {
        self.counters.commands_finished += 1;
        self.backend.finish_command(&mut self.regs);
    }

    /// Read a word from the data register.
    ///
    /// A non-zero cylinder register doubles as a byte threshold: once the cursor has passed
    /// that many bytes the read is finished early and the cylinder register is rewritten with
    /// the number of bytes left in the buffer. The length check that follows is independent
    /// of the threshold and may finish the read a second time.
    pub fn read_data(&mut self) -> u16 {
        self.counters.data_reads += 1;

        let Some(buffer) = self.regs.buffer.as_mut()
        else {
            log::warn!("{} drive: data register read with no buffer staged", self.backend.kind());
            return 0;
        };
        let Some(word) = buffer.pop()
        else {
            log::warn!("{} drive: data register read past end of buffer", self.backend.kind());
            return 0;
        };
        let position = buffer.position();
        let len = buffer.len();

        let threshold = self.regs.cylinder() as usize;
        if threshold > 0 && position * 2 >= threshold {
            self.regs.status.set_drq(false);
            self.finish_read();
            self.regs.set_cylinder(((len - position) * 2) as u16);
        }
        if position >= len {
            self.regs.status.set_drq(false);
            self.finish_read();
        }
        word
    }

    /// Write a word to the data register.
    pub fn write_data(&mut self, word: u16) {
        self.counters.data_writes += 1;

        // Host-bound data left undrained is discarded; the guest has moved on to sending.
        let accepting = self
            .regs
            .buffer
            .as_ref()
            .is_some_and(|b| b.direction() == TransferDirection::ToDevice && !b.is_exhausted());
        if !accepting {
            self.regs.buffer = Some(SectorBuffer::to_device(self.backend.device_buffer_words()));
            self.regs.status = StatusRegister::data_ready();
        }

        let full = match self.regs.buffer.as_mut() {
            Some(buffer) => {
                buffer.push(word);
                buffer.is_exhausted()
            }
            None => false,
        };
        if full {
            self.regs.status.set_drq(false);
            self.finish_command();
        }
    }

    /// Read one of the byte-wide registers of the command block.
    pub fn read_register(&mut self, register: IdeRegister) -> u8 {
        match register {
            IdeRegister::Data => self.read_data() as u8,
            IdeRegister::ErrorPrecomp => self.regs.error.bits(),
            IdeRegister::SectorCount => self.regs.sector_count,
            IdeRegister::SectorNumber => self.regs.sector_number,
            IdeRegister::CylinderLow => self.regs.cylinder_low,
            IdeRegister::CylinderHigh => self.regs.cylinder_high,
            IdeRegister::DriveHead => self.regs.drive_head,
            IdeRegister::StatusCommand => self.regs.status.bits(),
            IdeRegister::DeviceControl => 0,
        }
    }

    /// Write one of the byte-wide registers of the command block. Writing the command
    /// register runs the command.
    pub fn write_register(&mut self, register: IdeRegister, value: u8) {
        match register {
            IdeRegister::Data => self.write_data(value as u16),
            IdeRegister::ErrorPrecomp => {}
            IdeRegister::SectorCount => self.regs.sector_count = value,
            IdeRegister::SectorNumber => self.regs.sector_number = value,
            IdeRegister::CylinderLow => self.regs.cylinder_low = value,
            IdeRegister::CylinderHigh => self.regs.cylinder_high = value,
            IdeRegister::DriveHead => self.regs.drive_head = value,
            IdeRegister::StatusCommand => self.run_command(value),
            IdeRegister::DeviceControl => {}
        }
    }
}
