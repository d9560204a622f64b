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

//! Hard disk backend.
//!
//! Sectors are addressed by the cylinder register alone, read as a linear block address.
//! The geometry is reported by IDENTIFY DEVICE but plays no part in addressing.

use std::{
    fmt::{self, Debug, Display},
    io::{self, Seek, SeekFrom},
};

use serde_derive::Deserialize;

use crate::{
    ata::{
        buffer::SectorBuffer,
        drive::{AtaCommand, DriveBackend, DriveKind, RegisterFile},
        identification::HardDiskIdentification,
        registers::{DriveFault, StatusRegister},
    },
    error::IdeError,
    image::{fill_from, stream_len, BlockStore, ImageHandle},
};

pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_WORDS: usize = SECTOR_SIZE / 2;

pub const DEFAULT_CYLINDERS: u16 = 1024;
pub const DEFAULT_HEADS: u16 = 16;
pub const DEFAULT_SECTORS: u16 = 63;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Deserialize)]
pub struct DiskGeometry {
    pub cylinders: u16,
    pub heads: u16,
    pub sectors: u16,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        Self {
            cylinders: DEFAULT_CYLINDERS,
            heads: DEFAULT_HEADS,
            sectors: DEFAULT_SECTORS,
        }
    }
}

impl Display for DiskGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[c:{} h:{} s:{}]", self.cylinders, self.heads, self.sectors)
    }
}

pub struct HardDisk {
    geometry: DiskGeometry,
    store: Option<Box<dyn BlockStore>>,
    capacity: u64,
}

impl Debug for HardDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardDisk")
            .field("geometry", &self.geometry)
            .field("attached", &self.store.is_some())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl HardDisk {
    pub fn new(geometry: DiskGeometry) -> Self {
        Self {
            geometry,
            store: None,
            capacity: 0,
        }
    }

    /// Capacity of the backing store in whole sectors.
    pub fn capacity_sectors(&self) -> u64 {
        self.capacity / SECTOR_SIZE as u64
    }

    #[inline]
    fn in_range(&self, lba: u64) -> bool {
        lba * (SECTOR_SIZE as u64) < self.capacity
    }

    /// Validate the address in the cylinder register. On failure the fault is latched and
    /// None returned.
    fn checked_lba(&self, regs: &mut RegisterFile) -> Option<u64> {
        if self.store.is_none() {
            log::warn!("Hard disk: command issued with no image attached");
            regs.fail(DriveFault::Aborted);
            return None;
        }
        let lba = regs.cylinder() as u64;
        if !self.in_range(lba) {
            log::warn!("Hard disk: LBA {} beyond end of disk ({} sectors)", lba, self.capacity_sectors());
            regs.fail(DriveFault::IdNotFound);
            return None;
        }
        Some(lba)
    }

    fn read_sector(&mut self, regs: &mut RegisterFile) {
        let Some(lba) = self.checked_lba(regs)
        else {
            return;
        };
        let Some(store) = self.store.as_mut()
        else {
            regs.fail(DriveFault::Aborted);
            return;
        };

        let mut sector = [0u8; SECTOR_SIZE];
        let result = store
            .seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))
            .and_then(|_| fill_from(store.as_mut(), &mut sector));

        match result {
            Ok(n) => {
                if n < SECTOR_SIZE {
                    log::debug!("Hard disk: short read of {} bytes at LBA {}", n, lba);
                }
                log::trace!("Hard disk: read LBA {}", lba);
                regs.stage(SectorBuffer::from_bytes(&sector));
            }
            Err(e) => {
                log::error!("Hard disk: error reading LBA {}: {}", lba, e);
                regs.fail(DriveFault::BadBlock);
            }
        }
    }

    fn write_sector(&mut self, regs: &mut RegisterFile) {
        let Some(lba) = self.checked_lba(regs)
        else {
            return;
        };
        let Some(buffer) = regs.buffer.take()
        else {
            log::warn!("Hard disk: WRITE SECTORS with no buffer resident");
            regs.fail(DriveFault::Aborted);
            return;
        };
        let Some(store) = self.store.as_mut()
        else {
            regs.fail(DriveFault::Aborted);
            return;
        };

        let mut sector = buffer.to_bytes();
        sector.resize(SECTOR_SIZE, 0);

        match write_at(store.as_mut(), lba * SECTOR_SIZE as u64, &sector) {
            Ok(()) => {
                log::trace!("Hard disk: wrote LBA {}", lba);
                regs.complete(StatusRegister::ready_only());
            }
            Err(e) => {
                log::error!("Hard disk: error writing LBA {}: {}", lba, e);
                regs.fail(DriveFault::BadBlock);
                regs.status.set_dwf(true);
            }
        }
    }

    fn identify(&mut self, regs: &mut RegisterFile) {
        let capacity = self.capacity_sectors().min(u32::MAX as u64) as u32;
        match HardDiskIdentification::new(&self.geometry, SECTOR_SIZE, capacity).to_buffer() {
            Ok(buffer) => regs.stage(buffer),
            Err(e) => {
                log::error!("Hard disk: failed to build identify block: {}", e);
                regs.fail(DriveFault::Aborted);
            }
        }
    }
}

fn write_at(store: &mut dyn BlockStore, offset: u64, bytes: &[u8]) -> io::Result<()> {
    store.seek(SeekFrom::Start(offset))?;
    store.write_all(bytes)?;
    store.flush()
}

impl DriveBackend for HardDisk {
    fn kind(&self) -> DriveKind {
        DriveKind::HardDisk
    }

    fn reset(&mut self, regs: &mut RegisterFile) {
        regs.complete(StatusRegister::ready_only());
        regs.set_cylinder(0);
        regs.buffer = None;
    }

    fn run_command(&mut self, regs: &mut RegisterFile, command: AtaCommand) {
        match command {
            AtaCommand::ReadSectors | AtaCommand::ReadSectorsNoRetry => self.read_sector(regs),
            AtaCommand::WriteSectors | AtaCommand::WriteSectorsNoRetry => self.write_sector(regs),
            AtaCommand::IdentifyDevice => self.identify(regs),
            AtaCommand::ReadVerify | AtaCommand::Seek(_) => {
                if self.checked_lba(regs).is_some() {
                    regs.buffer = None;
                    regs.complete(StatusRegister::ready_seek_complete());
                }
            }
            AtaCommand::Recalibrate(_) => {
                regs.buffer = None;
                regs.complete(StatusRegister::ready_seek_complete());
            }
            AtaCommand::InitializeParameters => {
                regs.complete(StatusRegister::ready_only());
            }
            _ => {
                log::warn!("Hard disk: unsupported command {:02X}", command.opcode());
                regs.fail(DriveFault::Aborted);
            }
        }
    }

    fn finish_command(&mut self, regs: &mut RegisterFile) {
        regs.status = StatusRegister::ready_only();
    }

    fn finish_read(&mut self, regs: &mut RegisterFile) {
        regs.status = StatusRegister::ready_only();
    }

    fn load_image(&mut self, regs: &mut RegisterFile, image: ImageHandle) -> Result<(), IdeError> {
        let mut store = match image {
            ImageHandle::Block(store) => store,
            other => {
                return Err(IdeError::ImageKindMismatch {
                    drive: DriveKind::HardDisk,
                    image: other.name(),
                })
            }
        };
        self.capacity = stream_len(store.as_mut())?;
        self.store = Some(store);
        log::debug!(
            "Hard disk: attached image of {} sectors, geometry {}",
            self.capacity_sectors(),
            self.geometry
        );
        regs.complete(StatusRegister::ready_only());
        Ok(())
    }

    fn device_buffer_words(&self) -> usize {
        SECTOR_WORDS
    }

    fn has_media(&self) -> bool {
        self.store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ata::{drive::AtaDrive, identification::string_at, registers::ErrorRegister},
        ports::IdeRegister,
    };
    use std::{
        io::{Cursor, Read, Write},
        sync::{Arc, Mutex},
    };

    /// A block store whose bytes stay inspectable after being handed to the drive.
    #[derive(Clone, Default)]
    struct SharedDisk(Arc<Mutex<Cursor<Vec<u8>>>>);

    impl SharedDisk {
        fn with_sectors(sectors: usize) -> Self {
            Self(Arc::new(Mutex::new(Cursor::new(vec![0; sectors * SECTOR_SIZE]))))
        }
        fn sector(&self, lba: usize) -> Vec<u8> {
            let disk = self.0.lock().unwrap();
            disk.get_ref()[lba * SECTOR_SIZE..(lba + 1) * SECTOR_SIZE].to_vec()
        }
    }

    impl Read for SharedDisk {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.lock().unwrap().read(buf)
        }
    }
    impl Write for SharedDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl Seek for SharedDisk {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.0.lock().unwrap().seek(pos)
        }
    }

    /// A store that fails every write.
    struct ReadOnlyDisk(Cursor<Vec<u8>>);

    impl Read for ReadOnlyDisk {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }
    impl Write for ReadOnlyDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read only"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl Seek for ReadOnlyDisk {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.0.seek(pos)
        }
    }

    fn attached(disk: &SharedDisk) -> AtaDrive {
        let mut drive = AtaDrive::hard_disk(DiskGeometry::default());
        drive.load_image(ImageHandle::block(disk.clone())).unwrap();
        drive
    }

    fn write_sector(drive: &mut AtaDrive, lba: u16, fill: u16) {
        for _ in 0..SECTOR_WORDS {
            drive.write_data(fill);
        }
        set_lba(drive, lba);
        drive.run_command(0x30);
    }

    fn set_lba(drive: &mut AtaDrive, lba: u16) {
        drive.write_register(IdeRegister::CylinderLow, lba as u8);
        drive.write_register(IdeRegister::CylinderHigh, (lba >> 8) as u8);
    }

    #[test]
    fn write_then_read_round_trips() {
        let disk = SharedDisk::with_sectors(16);
        let mut drive = attached(&disk);

        for (lba, fill) in [(0u16, 0x0000u16), (3, 0x1234), (15, 0xFFEE)] {
            write_sector(&mut drive, lba, fill);
            assert_eq!(drive.registers().status, StatusRegister::ready_only());
            assert_eq!(disk.sector(lba as usize), fill.to_le_bytes().repeat(SECTOR_WORDS));

            set_lba(&mut drive, lba);
            drive.run_command(0x20);
            assert_eq!(drive.registers().status, StatusRegister::data_ready());
            let words: Vec<u16> = (0..SECTOR_WORDS).map(|_| drive.read_data()).collect();
            assert!(words.iter().all(|w| *w == fill));
        }
    }

    #[test]
    fn out_of_range_is_id_not_found() {
        let disk = SharedDisk::with_sectors(100);
        let mut drive = attached(&disk);

        set_lba(&mut drive, 99);
        drive.run_command(0x20);
        assert_eq!(drive.registers().status, StatusRegister::data_ready());

        for opcode in [0x20, 0x21, 0x30, 0x40, 0x70] {
            set_lba(&mut drive, 100);
            drive.run_command(opcode);
            assert_eq!(drive.registers().status, StatusRegister::error());
            assert_eq!(drive.registers().error.fault(), Some(DriveFault::IdNotFound));
            assert!(drive.registers().buffer.is_none());
        }
    }

    #[test]
    fn no_store_aborts_transfers() {
        let mut drive = AtaDrive::hard_disk(DiskGeometry::default());
        for opcode in [0x20, 0x30, 0x40, 0x75] {
            drive.run_command(opcode);
            assert_eq!(drive.registers().error.fault(), Some(DriveFault::Aborted));
            assert_eq!(drive.registers().status.bits(), 0x01);
        }
        // IDENTIFY does not need the store.
        drive.run_command(0xEC);
        assert_eq!(drive.registers().status, StatusRegister::data_ready());
    }

    #[test]
    fn write_without_buffer_aborts() {
        let disk = SharedDisk::with_sectors(4);
        let mut drive = attached(&disk);
        drive.run_command(0x30);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Aborted));
    }

    #[test]
    fn partial_buffer_is_zero_padded() {
        let disk = SharedDisk::with_sectors(4);
        {
            let mut inner = disk.0.lock().unwrap();
            inner.get_mut()[SECTOR_SIZE..2 * SECTOR_SIZE].fill(0x55);
        }
        let mut drive = attached(&disk);
        drive.write_data(0xBBAA);
        set_lba(&mut drive, 1);
        drive.run_command(0x30);

        let sector = disk.sector(1);
        assert_eq!(&sector[..2], &[0xAA, 0xBB]);
        assert!(sector[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn write_failure_is_bad_block_with_write_fault() {
        let mut drive = AtaDrive::hard_disk(DiskGeometry::default());
        drive
            .load_image(ImageHandle::block(ReadOnlyDisk(Cursor::new(vec![0; 4 * SECTOR_SIZE]))))
            .unwrap();
        for _ in 0..SECTOR_WORDS {
            drive.write_data(0xAAAA);
        }
        drive.run_command(0x30);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::BadBlock));
        assert!(drive.registers().status.err());
        assert!(drive.registers().status.dwf());
    }

    #[test]
    fn identify_reports_geometry_and_capacity() {
        let disk = SharedDisk::with_sectors(100);
        let mut drive = attached(&disk);
        drive.run_command(0xEC);
        assert_eq!(drive.registers().status, StatusRegister::data_ready());
        assert_eq!(drive.registers().error, ErrorRegister::default());

        let words: Vec<u16> = (0..SECTOR_WORDS).map(|_| drive.read_data()).collect();
        assert_eq!(words[1], DEFAULT_CYLINDERS);
        assert_eq!(words[3], DEFAULT_HEADS);
        assert_eq!(words[6], DEFAULT_SECTORS);
        assert_eq!(words[60], 100);
        assert_eq!(string_at(&words, 27, 40), crate::ata::identification::HDD_MODEL);
    }

    #[test]
    fn reset_clears_cylinder_and_error() {
        let mut drive = AtaDrive::hard_disk(DiskGeometry::default());
        set_lba(&mut drive, 0x1234);
        drive.run_command(0x20);
        assert!(drive.registers().status.err());

        drive.reset();
        assert_eq!(drive.registers().cylinder(), 0);
        assert_eq!(drive.registers().status, StatusRegister::ready_only());
        assert_eq!(drive.registers().error.fault(), None);
    }

    #[test]
    fn housekeeping_commands() {
        let disk = SharedDisk::with_sectors(4);
        let mut drive = attached(&disk);
        drive.run_command(0x10);
        assert_eq!(drive.registers().status, StatusRegister::ready_seek_complete());
        drive.run_command(0x91);
        assert_eq!(drive.registers().status, StatusRegister::ready_only());
        set_lba(&mut drive, 2);
        drive.run_command(0x40);
        assert_eq!(drive.registers().status, StatusRegister::ready_seek_complete());
        assert!(drive.registers().buffer.is_none());
        drive.run_command(0xEF);
        assert_eq!(drive.registers().error.fault(), Some(DriveFault::Aborted));
    }

    #[test]
    fn stream_image_is_rejected() {
        let mut drive = AtaDrive::hard_disk(DiskGeometry::default());
        let err = drive.load_image(ImageHandle::stream(Cursor::new(vec![0u8; 512]))).unwrap_err();
        assert!(matches!(
            err,
            IdeError::ImageKindMismatch {
                drive: DriveKind::HardDisk,
                ..
            }
        ));
        assert!(!drive.has_media());
    }
}
