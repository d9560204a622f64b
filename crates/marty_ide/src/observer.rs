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

//! Trace points of the controller.
//!
//! An [IdeObserver] is handed to the controller at construction and is called from the
//! emulation thread at register access, command dispatch and error transitions. All
//! methods default to no-ops so an observer only implements what it cares about.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    ata::{drive::DriveKind, registers::DriveFault},
    error::IdeError,
    ports::{DriveSlot, IdeChannel, IdeRegister},
};

pub trait IdeObserver: Send + Sync {
    /// A data or status/command register access was routed to a drive.
    fn register_access(&self, _channel: IdeChannel, _slot: DriveSlot, _kind: DriveKind, _register: IdeRegister) {}

    fn command_dispatched(&self, _channel: IdeChannel, _slot: DriveSlot, _kind: DriveKind, _opcode: u8) {}

    /// A command left the drive with the Error status bit set.
    fn drive_error(&self, _channel: IdeChannel, _slot: DriveSlot, _fault: Option<DriveFault>) {}

    /// Controller misuse that was logged and otherwise ignored.
    fn controller_error(&self, _error: &IdeError) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NullObserver;

impl IdeObserver for NullObserver {}

/// Accounting observer: counts register traffic by drive kind plus commands and errors.
#[derive(Debug, Default)]
pub struct IoCounters {
    hard_disk: AtomicU64,
    optical: AtomicU64,
    commands: AtomicU64,
    drive_errors: AtomicU64,
    controller_errors: AtomicU64,
}

impl IoCounters {
    pub fn hard_disk_accesses(&self) -> u64 {
        self.hard_disk.load(Ordering::Relaxed)
    }

    pub fn optical_accesses(&self) -> u64 {
        self.optical.load(Ordering::Relaxed)
    }

    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn drive_errors(&self) -> u64 {
        self.drive_errors.load(Ordering::Relaxed)
    }

    pub fn controller_errors(&self) -> u64 {
        self.controller_errors.load(Ordering::Relaxed)
    }
}

impl IdeObserver for IoCounters {
    fn register_access(&self, _channel: IdeChannel, _slot: DriveSlot, kind: DriveKind, _register: IdeRegister) {
        match kind {
            DriveKind::HardDisk => self.hard_disk.fetch_add(1, Ordering::Relaxed),
            DriveKind::Optical => self.optical.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn command_dispatched(&self, _channel: IdeChannel, _slot: DriveSlot, _kind: DriveKind, _opcode: u8) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    fn drive_error(&self, _channel: IdeChannel, _slot: DriveSlot, _fault: Option<DriveFault>) {
        self.drive_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn controller_error(&self, _error: &IdeError) {
        self.controller_errors.fetch_add(1, Ordering::Relaxed);
    }
}
