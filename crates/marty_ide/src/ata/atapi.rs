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

//! ATAPI CD-ROM backend.
//!
//! The drive reads 2048-byte sectors from a read-only image. Packet commands arrive either
//! through the data register (six words written by the guest) or directly through
//! [AtapiDrive::stage_packet], and are run by the ATA PACKET command.

use std::{
    fmt::{self, Debug},
    io::{Seek, SeekFrom},
};

use crate::{
    ata::{
        buffer::{try_alloc_zeroed, SectorBuffer, TransferDirection},
        drive::{AtaCommand, DriveBackend, DriveKind, RegisterFile},
        identification::AtapiIdentification,
        registers::{DriveFault, StatusRegister},
    },
    error::IdeError,
    image::{fill_from, stream_len, ImageHandle, ImageStream},
};

pub const SECTOR_SIZE: usize = 2048;
pub const PACKET_SIZE: usize = 12;
pub const PACKET_WORDS: usize = PACKET_SIZE / 2;

pub const SIGNATURE_CYLINDER_LOW: u8 = 0x14;
pub const SIGNATURE_CYLINDER_HIGH: u8 = 0xEB;

pub const INQUIRY_RESPONSE_SIZE: usize = 36;
pub const INQUIRY_VENDOR: &[u8; 8] = b"MARTYPC ";
pub const INQUIRY_PRODUCT: &[u8; 16] = b"ATAPI CD-ROM    ";
pub const INQUIRY_REVISION: &[u8; 4] = b"1.00";

const PERIPHERAL_TYPE_CDROM: u8 = 0x05;
const INQUIRY_REMOVABLE: u8 = 0x80;
const INQUIRY_RESPONSE_FORMAT: u8 = 0x21;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketCommand {
    TestUnitReady,
    Inquiry,
    ReadCapacity,
    Read10,
    Read12,
    Unknown(u8),
}

impl From<u8> for PacketCommand {
    fn from(opcode: u8) -> Self {
        match opcode {
            0x00 => PacketCommand::TestUnitReady,
            0x12 => PacketCommand::Inquiry,
            0x25 => PacketCommand::ReadCapacity,
            0x28 => PacketCommand::Read10,
            0xA8 => PacketCommand::Read12,
            _ => PacketCommand::Unknown(opcode),
        }
    }
}

pub struct AtapiDrive {
    image: Option<Box<dyn ImageStream>>,
    image_len: u64,
    packet: [u8; PACKET_SIZE],
}

impl Debug for AtapiDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtapiDrive")
            .field("attached", &self.image.is_some())
            .field("image_len", &self.image_len)
            .field("packet", &self.packet)
            .finish()
    }
}

impl Default for AtapiDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl AtapiDrive {
    pub fn new() -> Self {
        Self {
            image: None,
            image_len: 0,
            packet: [0; PACKET_SIZE],
        }
    }

    pub fn packet(&self) -> &[u8; PACKET_SIZE] {
        &self.packet
    }

    /// Copy up to 12 bytes into the packet staging area. Missing bytes are zero.
    pub fn stage_packet(&mut self, packet: &[u8]) {
        let len = packet.len().min(PACKET_SIZE);
        self.packet = [0; PACKET_SIZE];
        self.packet[..len].copy_from_slice(&packet[..len]);
    }

    /// Number of whole sectors on the loaded image.
    pub fn sector_count(&self) -> u64 {
        self.image_len / SECTOR_SIZE as u64
    }

    fn set_signature(regs: &mut RegisterFile) {
        regs.cylinder_low = SIGNATURE_CYLINDER_LOW;
        regs.cylinder_high = SIGNATURE_CYLINDER_HIGH;
    }

    fn identify_packet_device(&mut self, regs: &mut RegisterFile) {
        match AtapiIdentification::new().to_buffer() {
            Ok(buffer) => regs.stage(buffer),
            Err(e) => {
                log::error!("ATAPI: failed to build identify block: {}", e);
                regs.fail(DriveFault::Aborted);
            }
        }
    }

    fn dispatch_packet(&mut self, regs: &mut RegisterFile) {
        let command = PacketCommand::from(self.packet[0]);
        log::debug!("ATAPI: packet {:02X?} ({:?})", self.packet, command);

        match command {
            PacketCommand::Inquiry => regs.stage(SectorBuffer::from_bytes(&inquiry_response())),
            PacketCommand::Read10 => {
                let count = u16::from_be_bytes([self.packet[7], self.packet[8]]);
                self.read(regs, count);
            }
            PacketCommand::Read12 => {
                let count = u16::from_be_bytes([self.packet[6], self.packet[7]]);
                self.read(regs, count);
            }
            PacketCommand::TestUnitReady => {
                if self.image.is_some() {
                    regs.buffer = None;
                    regs.complete(StatusRegister::ready_only());
                }
                else {
                    regs.fail(DriveFault::Aborted);
                }
            }
            PacketCommand::ReadCapacity => self.read_capacity(regs),
            PacketCommand::Unknown(opcode) => {
                log::warn!("ATAPI: unsupported packet command {:02X}", opcode);
                regs.fail(DriveFault::Aborted);
            }
        }
    }

    fn read_capacity(&mut self, regs: &mut RegisterFile) {
        if self.image.is_none() {
            regs.fail(DriveFault::Aborted);
            return;
        }
        let last_lba = self.sector_count().saturating_sub(1).min(u32::MAX as u64) as u32;
        let mut response = [0u8; 8];
        response[..4].copy_from_slice(&last_lba.to_be_bytes());
        response[4..].copy_from_slice(&(SECTOR_SIZE as u32).to_be_bytes());
        regs.stage(SectorBuffer::from_bytes(&response));
    }

    /// READ(10) and READ(12): the LBA occupies bytes 2..6 of both forms.
    fn read(&mut self, regs: &mut RegisterFile, count: u16) {
        let Some(image) = self.image.as_mut()
        else {
            log::warn!("ATAPI: READ with no image loaded");
            regs.fail(DriveFault::Aborted);
            return;
        };

        let lba = u32::from_be_bytes([self.packet[2], self.packet[3], self.packet[4], self.packet[5]]);
        let count = if count == 0 { 1 } else { count as usize };
        let total = count * SECTOR_SIZE;

        let Some(mut data) = try_alloc_zeroed::<u8>(total)
        else {
            log::error!("ATAPI: could not allocate {} bytes for READ", total);
            regs.fail(DriveFault::Aborted);
            return;
        };

        if let Err(e) = image.seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64)) {
            log::error!("ATAPI: seek to LBA {} failed: {}", lba, e);
            regs.fail(DriveFault::BadBlock);
            return;
        }

        match fill_from(image.as_mut(), &mut data) {
            Ok(n) if n == total => {
                log::trace!("ATAPI: read {} sector(s) at LBA {}", count, lba);
                regs.stage(SectorBuffer::from_bytes(&data));
            }
            Ok(n) => {
                log::warn!("ATAPI: read at LBA {} returned {} of {} bytes", lba, n, total);
                regs.fail(DriveFault::Uncorrectable);
            }
            Err(e) => {
                log::error!("ATAPI: read at LBA {} failed: {}", lba, e);
                regs.fail(DriveFault::BadBlock);
            }
        }
    }
}

fn inquiry_response() -> [u8; INQUIRY_RESPONSE_SIZE] {
    let mut response = [0u8; INQUIRY_RESPONSE_SIZE];
    response[0] = PERIPHERAL_TYPE_CDROM;
    response[1] = INQUIRY_REMOVABLE;
    response[3] = INQUIRY_RESPONSE_FORMAT;
    response[4] = (INQUIRY_RESPONSE_SIZE - 5) as u8;
    response[8..16].copy_from_slice(INQUIRY_VENDOR);
    response[16..32].copy_from_slice(INQUIRY_PRODUCT);
    response[32..36].copy_from_slice(INQUIRY_REVISION);
    response
}

impl DriveBackend for AtapiDrive {
    fn kind(&self) -> DriveKind {
        DriveKind::Optical
    }

    fn reset(&mut self, regs: &mut RegisterFile) {
        Self::set_signature(regs);
        regs.complete(StatusRegister::ready_seek_complete());
        regs.buffer = None;
    }

    fn run_command(&mut self, regs: &mut RegisterFile, command: AtaCommand) {
        match command {
            AtaCommand::IdentifyPacketDevice => self.identify_packet_device(regs),
            AtaCommand::Packet => self.dispatch_packet(regs),
            AtaCommand::DeviceReset => self.reset(regs),
            AtaCommand::IdentifyDevice => {
                // Drivers try IDENTIFY DEVICE first and fall back on the signature.
                regs.fail(DriveFault::Aborted);
                Self::set_signature(regs);
            }
            _ => {
                log::warn!("ATAPI: unsupported command {:02X}", command.opcode());
                regs.fail(DriveFault::Aborted);
            }
        }
    }

    fn finish_command(&mut self, regs: &mut RegisterFile) {
        if let Some(buffer) = regs.buffer.as_ref() {
            if buffer.direction() == TransferDirection::ToDevice && buffer.len() == PACKET_WORDS {
                let bytes = buffer.to_bytes();
                self.stage_packet(&bytes);
                log::trace!("ATAPI: packet latched from data register: {:02X?}", self.packet);
            }
        }
        regs.status = StatusRegister::ready_only();
    }

    fn finish_read(&mut self, regs: &mut RegisterFile) {
        regs.status = StatusRegister::ready_only();
    }

    fn load_image(&mut self, regs: &mut RegisterFile, image: ImageHandle) -> Result<(), IdeError> {
        let mut stream = match image {
            ImageHandle::Stream(stream) => stream,
            other => {
                return Err(IdeError::ImageKindMismatch {
                    drive: DriveKind::Optical,
                    image: other.name(),
                })
            }
        };
        self.image_len = stream_len(stream.as_mut())?;
        self.image = Some(stream);
        log::debug!("ATAPI: loaded image of {} sectors", self.sector_count());

        regs.complete(StatusRegister::ready_only());
        self.identify_packet_device(regs);
        Ok(())
    }

    fn device_buffer_words(&self) -> usize {
        PACKET_WORDS
    }

    fn has_media(&self) -> bool {
        self.image.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ata::{drive::AtaDrive, identification::string_at, registers::ErrorRegister};
    use std::io::{self, Cursor, Read};

    fn disc_image(sectors: usize) -> Vec<u8> {
        (0..sectors * SECTOR_SIZE).map(|i| (i / SECTOR_SIZE) as u8).collect()
    }

    fn loaded(sectors: usize) -> AtaDrive {
        let mut drive = AtaDrive::optical();
        drive.reset();
        drive.load_image(ImageHandle::stream(Cursor::new(disc_image(sectors)))).unwrap();
        drive
    }

    fn read10(lba: u32, count: u16) -> [u8; PACKET_SIZE] {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = 0x28;
        packet[2..6].copy_from_slice(&lba.to_be_bytes());
        packet[7..9].copy_from_slice(&count.to_be_bytes());
        packet
    }

    fn drain(drive: &mut AtaDrive) -> Vec<u8> {
        let len = drive.snapshot().buffer_len.unwrap_or(0);
        (0..len).flat_map(|_| drive.read_data().to_le_bytes()).collect()
    }

    #[test]
    fn reset_asserts_signature() {
        let mut drive = AtaDrive::optical();
        drive.reset();
        let regs = drive.registers();
        assert_eq!(regs.cylinder_low, 0x14);
        assert_eq!(regs.cylinder_high, 0xEB);
        assert_eq!(regs.status.bits(), 0x50);
        assert_eq!(regs.error, ErrorRegister::default());
    }

    #[test]
    fn read10_last_sector() {
        let mut drive = loaded(10);
        drive.stage_packet(&read10(9, 1)).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().status, StatusRegister::data_ready());
        assert_eq!(drive.snapshot().buffer_len, Some(1024));
        let data = drain(&mut drive);
        assert_eq!(data.len(), 2048);
        assert!(data.iter().all(|b| *b == 9));
    }

    #[test]
    fn read10_past_end_is_uncorrectable() {
        let mut drive = loaded(10);
        drive.stage_packet(&read10(10, 1)).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().status, StatusRegister::error());
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Uncorrectable));
        assert!(drive.registers().buffer.is_none());

        // Straddling the end is a partial read.
        drive.stage_packet(&read10(9, 2)).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Uncorrectable));
    }

    #[test]
    fn read12_past_end_is_uncorrectable() {
        let mut drive = loaded(10);
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = 0xA8;
        packet[2..6].copy_from_slice(&10u32.to_be_bytes());
        packet[6..8].copy_from_slice(&1u16.to_be_bytes());
        drive.stage_packet(&packet).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().status, StatusRegister::error());
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Uncorrectable));
        assert!(drive.registers().buffer.is_none());

        packet[2..6].copy_from_slice(&8u32.to_be_bytes());
        packet[6..8].copy_from_slice(&3u16.to_be_bytes());
        drive.stage_packet(&packet).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Uncorrectable));
        assert!(drive.registers().buffer.is_none());
    }

    #[test]
    fn read12_and_zero_count() {
        let mut drive = loaded(10);
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = 0xA8;
        packet[2..6].copy_from_slice(&3u32.to_be_bytes());
        packet[6..8].copy_from_slice(&2u16.to_be_bytes());
        drive.stage_packet(&packet).unwrap();
        drive.run_command(0xA0);
        let data = drain(&mut drive);
        assert_eq!(data.len(), 4096);
        assert!(data[..2048].iter().all(|b| *b == 3));
        assert!(data[2048..].iter().all(|b| *b == 4));

        // A transfer length of zero reads one sector.
        drive.stage_packet(&read10(5, 0)).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.snapshot().buffer_len, Some(1024));
    }

    #[test]
    fn packet_latched_from_data_register() {
        let mut drive = loaded(10);
        drain(&mut drive);
        for chunk in read10(2, 1).chunks(2) {
            drive.write_data(u16::from_le_bytes([chunk[0], chunk[1]]));
        }
        assert_eq!(drive.counters().commands_finished, 1);
        assert_eq!(drive.registers().status, StatusRegister::ready_only());

        drive.run_command(0xA0);
        let data = drain(&mut drive);
        assert!(data.iter().all(|b| *b == 2));
    }

    #[test]
    fn packet_written_over_undrained_identify() {
        let mut drive = loaded(10);
        assert_eq!(drive.snapshot().buffer_len, Some(256));
        drive.read_data();

        for chunk in read10(2, 1).chunks(2) {
            drive.write_data(u16::from_le_bytes([chunk[0], chunk[1]]));
        }
        assert_eq!(drive.counters().commands_finished, 1);

        drive.run_command(0xA0);
        assert_eq!(drive.snapshot().buffer_len, Some(1024));
        let data = drain(&mut drive);
        assert!(data.iter().all(|b| *b == 2));
    }

    #[test]
    fn inquiry_response_layout() {
        let mut drive = AtaDrive::optical();
        drive.stage_packet(&[0x12, 0, 0, 0, 36, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().status, StatusRegister::data_ready());
        let data = drain(&mut drive);
        assert_eq!(data.len(), 36);
        assert_eq!(data[0], 0x05);
        assert_eq!(data[1], 0x80);
        assert_eq!(data[3], 0x21);
        assert_eq!(data[4], 31);
        assert_eq!(&data[8..16], b"MARTYPC ");
        assert_eq!(&data[32..36], b"1.00");
    }

    #[test]
    fn no_image_aborts_media_commands() {
        let mut drive = AtaDrive::optical();
        drive.reset();
        for packet in [read10(0, 1), [0u8; PACKET_SIZE], {
            let mut p = [0u8; PACKET_SIZE];
            p[0] = 0x25;
            p
        }] {
            drive.stage_packet(&packet).unwrap();
            drive.run_command(0xA0);
            assert_eq!(drive.registers().error.fault(), Some(DriveFault::Aborted));
            assert_eq!(drive.registers().status.bits(), 0x01);
        }
    }

    #[test]
    fn test_unit_ready_and_capacity() {
        let mut drive = loaded(10);
        drive.stage_packet(&[0u8; PACKET_SIZE]).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().status, StatusRegister::ready_only());

        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = 0x25;
        drive.stage_packet(&packet).unwrap();
        drive.run_command(0xA0);
        let data = drain(&mut drive);
        assert_eq!(data, vec![0, 0, 0, 9, 0, 0, 0x08, 0x00]);
    }

    #[test]
    fn identify_packet_device_block() {
        let mut drive = AtaDrive::optical();
        drive.run_command(0xA1);
        assert_eq!(drive.registers().status, StatusRegister::data_ready());
        assert_eq!(drive.snapshot().buffer_len, Some(256));
        let words: Vec<u16> = (0..256).map(|_| drive.read_data()).collect();
        assert_eq!(words[0] >> 14, 0b10);
        assert_eq!(string_at(&words, 27, 40), crate::ata::identification::ATAPI_MODEL);
    }

    #[test]
    fn load_image_stages_identify() {
        let drive = loaded(4);
        assert!(drive.has_media());
        assert_eq!(drive.registers().status, StatusRegister::data_ready());
        assert_eq!(drive.snapshot().buffer_len, Some(256));
    }

    #[test]
    fn ata_identify_aborts_and_keeps_signature() {
        let mut drive = AtaDrive::optical();
        drive.reset();
        drive.write_register(crate::ports::IdeRegister::CylinderLow, 0);
        drive.run_command(0xEC);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Aborted));
        assert_eq!(drive.registers().cylinder_low, 0x14);
        assert_eq!(drive.registers().cylinder_high, 0xEB);

        drive.run_command(0x08);
        assert_eq!(drive.registers().status.bits(), 0x50);
    }

    struct FailingStream;

    impl Read for FailingStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "medium error"))
        }
    }
    impl Seek for FailingStream {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0x10000)
        }
    }

    #[test]
    fn io_fault_is_bad_block() {
        let mut drive = AtaDrive::optical();
        drive.load_image(ImageHandle::stream(FailingStream)).unwrap();
        drive.stage_packet(&read10(1, 1)).unwrap();
        drive.run_command(0xA0);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::BadBlock));
    }

    #[test]
    fn block_image_is_rejected() {
        let mut drive = AtaDrive::optical();
        let err = drive.load_image(ImageHandle::block(Cursor::new(vec![0u8; 2048]))).unwrap_err();
        assert!(matches!(
            err,
            IdeError::ImageKindMismatch {
                drive: DriveKind::Optical,
                ..
            }
        ));
    }
}
