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

//! Dual-channel ATA/ATAPI (IDE) controller emulation.
//!
//! The [IdeController] decodes the legacy primary (0x1F0-0x1F7, 0x3F6) and secondary
//! (0x170-0x177, 0x376) port blocks and routes register traffic to the selected drive of
//! each channel. Drives are an [AtaDrive] over one of two backends: a hard disk addressed
//! by linear block address through the cylinder registers, or an ATAPI CD-ROM driven by
//! packet commands.
//!
//! Data moves a word at a time through the data register, staged in a sector buffer by
//! each command. Errors a guest can cause are reported through the Status and Error
//! registers; host-side failures use [IdeError].

pub mod ata;
pub mod config;
pub mod controller;
pub mod error;
pub mod image;
pub mod observer;
pub mod ports;

pub use ata::{
    drive::{AtaDrive, DriveKind, DriveSnapshot},
    hard_disk::DiskGeometry,
    registers::DriveFault,
};
pub use config::IdeConfig;
pub use controller::{IdeController, ImageLoad};
pub use error::IdeError;
pub use image::{FileImageOpener, ImageHandle, ImageOpener, ImageSource};
pub use observer::{IdeObserver, IoCounters, NullObserver};
pub use ports::{DriveSlot, IdeChannel};
