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

//! IDENTIFY DEVICE and IDENTIFY PACKET DEVICE data blocks.
//!
//! Both blocks are 256 little-endian words. Fields not listed in the structures below
//! are zero; the structures are written into a zeroed 512-byte sector.

use std::io::Cursor;

use binrw::{binrw, BinResult, BinWrite};

use crate::ata::{buffer::SectorBuffer, hard_disk::DiskGeometry};

pub const IDENTIFY_BLOCK_SIZE: usize = 512;

pub const GENERAL_FIXED_DISK: u16 = 0b0000_0000_0100_0000;
/// ATAPI device (bits 15:14 = 10), CD-ROM command set (bits 12:8 = 5), removable (bit 7).
pub const GENERAL_ATAPI_CDROM: u16 = 0b1000_0101_1000_0000;
pub const CAPABILITIES_LBA: u16 = 0b0000_0010_0000_0000;
pub const COMMAND_SET_ATAPI: u16 = 0b0100_0000_0000_0000;

pub const HDD_SERIAL: &str = "MARTYPC-HDD-0001";
pub const HDD_FIRMWARE: &str = "1.00";
pub const HDD_MODEL: &str = "MartyPC IDE Hard Disk";

pub const ATAPI_SERIAL: &str = "MARTYPC-CD-0001";
pub const ATAPI_FIRMWARE: &str = "1.00";
pub const ATAPI_MODEL: &str = "MartyPC ATAPI CD-ROM";

/// A fixed-width ATA string. ATA stores the first character of each pair in the high byte
/// of its word, so the bytes of every pair are swapped relative to plain ASCII.
#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtaString<const N: usize> {
    #[br(count = N)]
    #[bw(assert(raw.len() == N, "raw length must be N"))]
    raw: Vec<u8>,
}

impl<const N: usize> Default for AtaString<N> {
    fn default() -> Self {
        Self { raw: vec![b' '; N] }
    }
}

impl<const N: usize> AtaString<N> {
    /// Build a space padded string, truncated to N bytes.
    pub fn new(s: &str) -> Self {
        let mut raw = vec![b' '; N];
        let bytes = s.as_bytes();
        let len = bytes.len().min(N);
        raw[..len].copy_from_slice(&bytes[..len]);
        for pair in raw.chunks_mut(2) {
            pair.swap(0, 1);
        }
        Self { raw }
    }

    /// Undo the pair swap, returning the trimmed ASCII text.
    pub fn to_text(&self) -> String {
        let mut unswapped = self.raw.clone();
        for pair in unswapped.chunks_mut(2) {
            pair.swap(0, 1);
        }
        String::from_utf8_lossy(&unswapped).trim_end().to_string()
    }
}

/// Decode an ATA string out of a staged identify block, starting at `word` and spanning
/// `len` bytes.
pub fn string_at(words: &[u16], word: usize, len: usize) -> String {
    let mut text = Vec::with_capacity(len);
    for w in words.iter().skip(word).take(len / 2) {
        text.extend_from_slice(&w.to_be_bytes());
    }
    String::from_utf8_lossy(&text).trim_end().to_string()
}

fn sector_from_cursor(cursor: Cursor<Vec<u8>>) -> SectorBuffer {
    let mut bytes = cursor.into_inner();
    bytes.truncate(IDENTIFY_BLOCK_SIZE);
    SectorBuffer::from_bytes(&bytes)
}

#[binrw]
#[derive(Default)]
#[brw(little)]
pub struct HardDiskIdentification {
    pub general: u16,
    pub cylinders: u16,
    pub specific_configuration: u16,
    pub num_heads: u16,
    pub unformatted_bytes_per_track: u16,
    pub unformatted_bytes_per_sector: u16,
    pub sectors_per_track: u16,
    pub vendor_unique: [u16; 3],
    pub serial_no: AtaString<20>,
    pub buffer_type: u16,
    pub buffer_size: u16,
    pub long_cmd_bytes: u16,
    pub firmware_revision: AtaString<8>,
    pub model_number: AtaString<40>,
    pub maximum_block_transfer: u8,
    pub vendor_unique2: u8,
    pub double_word_io: u16,
    pub capabilities: u16,
    pub reserved: u16,
    pub pio_timing: u16,
    pub dma_timing: u16,
    pub field_validity: u16,
    pub current_cylinders: u16,
    pub current_heads: u16,
    pub current_sectors_per_track: u16,
    pub current_capacity_low: u16,
    pub current_capacity_high: u16,
    pub multiple_sector: u16,
    pub user_addressable_sectors: u32,
}

impl HardDiskIdentification {
    pub fn new(geometry: &DiskGeometry, sector_size: usize, capacity_sectors: u32) -> Self {
        let chs_capacity: u32 = geometry.cylinders as u32 * geometry.heads as u32 * geometry.sectors as u32;

        HardDiskIdentification {
            general: GENERAL_FIXED_DISK,
            cylinders: geometry.cylinders,
            num_heads: geometry.heads,
            unformatted_bytes_per_track: (sector_size as u16).wrapping_mul(geometry.sectors),
            unformatted_bytes_per_sector: sector_size as u16,
            sectors_per_track: geometry.sectors,
            serial_no: AtaString::new(HDD_SERIAL),
            firmware_revision: AtaString::new(HDD_FIRMWARE),
            model_number: AtaString::new(HDD_MODEL),
            maximum_block_transfer: 1,
            capabilities: CAPABILITIES_LBA,
            field_validity: 1,
            current_cylinders: geometry.cylinders,
            current_heads: geometry.heads,
            current_sectors_per_track: geometry.sectors,
            current_capacity_low: chs_capacity as u16,
            current_capacity_high: (chs_capacity >> 16) as u16,
            user_addressable_sectors: capacity_sectors,
            ..Default::default()
        }
    }

    pub fn to_buffer(&self) -> BinResult<SectorBuffer> {
        let mut cursor = Cursor::new(vec![0u8; IDENTIFY_BLOCK_SIZE]);
        self.write(&mut cursor)?;
        Ok(sector_from_cursor(cursor))
    }
}

#[binrw]
#[derive(Default)]
#[brw(little)]
pub struct AtapiIdentification {
    pub general: u16,
    pub reserved0: [u16; 9],
    pub serial_no: AtaString<20>,
    pub reserved1: [u16; 3],
    pub firmware_revision: AtaString<8>,
    pub model_number: AtaString<40>,
    pub reserved2: [u16; 2],
    pub capabilities: u16,
    pub reserved3: [u16; 16],
    pub reserved4: [u16; 17],
    pub command_set_support: u16,
}

impl AtapiIdentification {
    pub fn new() -> Self {
        AtapiIdentification {
            general: GENERAL_ATAPI_CDROM,
            serial_no: AtaString::new(ATAPI_SERIAL),
            firmware_revision: AtaString::new(ATAPI_FIRMWARE),
            model_number: AtaString::new(ATAPI_MODEL),
            capabilities: CAPABILITIES_LBA,
            command_set_support: COMMAND_SET_ATAPI,
            ..Default::default()
        }
    }

    pub fn to_buffer(&self) -> BinResult<SectorBuffer> {
        let mut cursor = Cursor::new(vec![0u8; IDENTIFY_BLOCK_SIZE]);
        self.write(&mut cursor)?;
        Ok(sector_from_cursor(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ata_string_swaps_pairs() {
        let s = AtaString::<8>::new("ABC");
        assert_eq!(s.raw, b"BA C    ".to_vec());
        assert_eq!(s.to_text(), "ABC");
    }

    #[test]
    fn hard_disk_block_layout() {
        let geometry = DiskGeometry::default();
        let buf = HardDiskIdentification::new(&geometry, 512, 100).to_buffer().unwrap();
        let words = buf.words();
        assert_eq!(words.len(), 256);
        assert_eq!(words[0], GENERAL_FIXED_DISK);
        assert_eq!(words[1], geometry.cylinders);
        assert_eq!(words[3], geometry.heads);
        assert_eq!(words[6], geometry.sectors);
        assert_eq!(string_at(words, 10, 20), HDD_SERIAL);
        assert_eq!(string_at(words, 23, 8), HDD_FIRMWARE);
        assert_eq!(string_at(words, 27, 40), HDD_MODEL);
        assert_eq!(words[49], CAPABILITIES_LBA);
        assert_eq!(words[60], 100);
        assert_eq!(words[61], 0);
        assert!(words[62..].iter().all(|w| *w == 0));
    }

    #[test]
    fn atapi_block_layout() {
        let buf = AtapiIdentification::new().to_buffer().unwrap();
        let words = buf.words();
        assert_eq!(words.len(), 256);
        assert_eq!(words[0], GENERAL_ATAPI_CDROM);
        assert_eq!(string_at(words, 10, 20), ATAPI_SERIAL);
        assert_eq!(string_at(words, 23, 8), ATAPI_FIRMWARE);
        assert_eq!(string_at(words, 27, 40), ATAPI_MODEL);
        assert_eq!(words[49], CAPABILITIES_LBA);
        assert_eq!(words[83], COMMAND_SET_ATAPI);
        assert!(words[84..].iter().all(|w| *w == 0));
    }
}
