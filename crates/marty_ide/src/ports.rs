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

//! Legacy port map of the two IDE channels.
//!
//! Each channel exposes an eight-register command block at its base address plus a single
//! device control register. The drive-select bit in the Drive/Head register chooses which
//! of the channel's two drives sees the command block.

use serde_derive::Deserialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

pub const PRIMARY_COMMAND_BASE: u16 = 0x1F0;
pub const PRIMARY_CONTROL_PORT: u16 = 0x3F6;
pub const SECONDARY_COMMAND_BASE: u16 = 0x170;
pub const SECONDARY_CONTROL_PORT: u16 = 0x376;

pub const REG_DATA: u16 = 0x0;
pub const REG_ERROR_PRECOMP: u16 = 0x1;
pub const REG_SECTOR_COUNT: u16 = 0x2;
pub const REG_SECTOR_NUMBER: u16 = 0x3;
pub const REG_CYLINDER_LOW: u16 = 0x4;
pub const REG_CYLINDER_HIGH: u16 = 0x5;
pub const REG_DRIVE_HEAD: u16 = 0x6;
pub const REG_STATUS_COMMAND: u16 = 0x7;

pub const DRIVE_HEAD_SELECT_BIT: u8 = 0x10;
pub const DEVICE_CONTROL_SRST: u8 = 0x04;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeChannel {
    #[strum(serialize = "primary")]
    Primary,
    #[strum(serialize = "secondary")]
    Secondary,
}

impl IdeChannel {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            IdeChannel::Primary => 0,
            IdeChannel::Secondary => 1,
        }
    }

    pub fn command_base(self) -> u16 {
        match self {
            IdeChannel::Primary => PRIMARY_COMMAND_BASE,
            IdeChannel::Secondary => SECONDARY_COMMAND_BASE,
        }
    }

    pub fn control_port(self) -> u16 {
        match self {
            IdeChannel::Primary => PRIMARY_CONTROL_PORT,
            IdeChannel::Secondary => SECONDARY_CONTROL_PORT,
        }
    }
}

/// A drive position within a channel. Master is the first-attached drive, selected when
/// bit 4 of the Drive/Head register is clear.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveSlot {
    #[strum(serialize = "master")]
    Master,
    #[strum(serialize = "slave")]
    Slave,
}

impl DriveSlot {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            DriveSlot::Master => 0,
            DriveSlot::Slave => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(DriveSlot::Master),
            1 => Some(DriveSlot::Slave),
            _ => None,
        }
    }

    pub fn from_drive_head(value: u8) -> Self {
        if value & DRIVE_HEAD_SELECT_BIT != 0 {
            DriveSlot::Slave
        }
        else {
            DriveSlot::Master
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdeRegister {
    Data,
    /// Error on read, write precompensation on write.
    ErrorPrecomp,
    SectorCount,
    SectorNumber,
    CylinderLow,
    CylinderHigh,
    DriveHead,
    /// Status on read, Command on write.
    StatusCommand,
    DeviceControl,
}

/// Resolve a port address to its channel and register.
pub fn decode_port(port: u16) -> Option<(IdeChannel, IdeRegister)> {
    let channel = match port {
        PRIMARY_CONTROL_PORT => return Some((IdeChannel::Primary, IdeRegister::DeviceControl)),
        SECONDARY_CONTROL_PORT => return Some((IdeChannel::Secondary, IdeRegister::DeviceControl)),
        0x1F0..=0x1F7 => IdeChannel::Primary,
        0x170..=0x177 => IdeChannel::Secondary,
        _ => return None,
    };

    let register = match port - channel.command_base() {
        REG_DATA => IdeRegister::Data,
        REG_ERROR_PRECOMP => IdeRegister::ErrorPrecomp,
        REG_SECTOR_COUNT => IdeRegister::SectorCount,
        REG_SECTOR_NUMBER => IdeRegister::SectorNumber,
        REG_CYLINDER_LOW => IdeRegister::CylinderLow,
        REG_CYLINDER_HIGH => IdeRegister::CylinderHigh,
        REG_DRIVE_HEAD => IdeRegister::DriveHead,
        _ => IdeRegister::StatusCommand,
    };
    Some((channel, register))
}

/// The ports serviced by the controller as (description, port) tuples.
pub fn port_list() -> Vec<(String, u16)> {
    let mut ports = Vec::new();
    for channel in IdeChannel::iter() {
        let name = match channel {
            IdeChannel::Primary => "Primary",
            IdeChannel::Secondary => "Secondary",
        };
        let base = channel.command_base();
        ports.extend([
            (format!("IDE {name} Data"), base + REG_DATA),
            (format!("IDE {name} Error/Precomp"), base + REG_ERROR_PRECOMP),
            (format!("IDE {name} Sector Count"), base + REG_SECTOR_COUNT),
            (format!("IDE {name} Sector Number"), base + REG_SECTOR_NUMBER),
            (format!("IDE {name} Cylinder Low"), base + REG_CYLINDER_LOW),
            (format!("IDE {name} Cylinder High"), base + REG_CYLINDER_HIGH),
            (format!("IDE {name} Drive/Head"), base + REG_DRIVE_HEAD),
            (format!("IDE {name} Status/Command"), base + REG_STATUS_COMMAND),
            (format!("IDE {name} Device Control"), channel.control_port()),
        ]);
    }
    ports
}
