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

//! The dual-channel IDE controller.
//!
//! Each channel owns two drive slots, its device control byte and the drive-select latch.
//! A channel sits behind its own lock: port I/O arrives from the emulation thread while
//! drives and images may be attached from a frontend thread. A poisoned lock is recovered
//! rather than propagated so the emulation thread keeps running.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use crossbeam_channel::{Receiver, TryRecvError};
use strum::IntoEnumIterator;

use crate::{
    ata::{
        drive::{AtaDrive, DriveKind, DriveSnapshot},
        hard_disk::DiskGeometry,
    },
    config::IdeConfig,
    error::IdeError,
    image::{ImageHandle, ImageOpener, ImageSource},
    observer::{IdeObserver, NullObserver},
    ports::{self, decode_port, DriveSlot, IdeChannel, IdeRegister, DEVICE_CONTROL_SRST},
};

struct ChannelState {
    channel: IdeChannel,
    drives: [Option<AtaDrive>; 2],
    device_control: u8,
    primary_selected: bool,
}

impl ChannelState {
    fn new(channel: IdeChannel) -> Self {
        Self {
            channel,
            drives: [None, None],
            device_control: 0,
            primary_selected: true,
        }
    }

    /// The drive that register traffic is routed to. The master answers when it is present
    /// and selected; otherwise the slave answers if present.
    fn selected_slot(&self) -> Option<DriveSlot> {
        if self.primary_selected && self.drives[0].is_some() {
            Some(DriveSlot::Master)
        }
        else if self.drives[1].is_some() {
            Some(DriveSlot::Slave)
        }
        else {
            None
        }
    }

    fn is_empty(&self) -> bool {
        self.drives.iter().all(Option::is_none)
    }
}

/// Pending result of [IdeController::load_image].
pub struct ImageLoad {
    receiver: Receiver<Result<(), IdeError>>,
}

impl ImageLoad {
    /// Block until the loader reports.
    pub fn wait(self) -> Result<(), IdeError> {
        self.receiver.recv().unwrap_or_else(|_| Err(IdeError::LoadAbandoned))
    }

    /// The loader's result if it has finished, without blocking.
    pub fn try_result(&self) -> Option<Result<(), IdeError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(IdeError::LoadAbandoned)),
        }
    }
}

pub struct IdeController {
    channels: [Mutex<ChannelState>; 2],
    observer: Arc<dyn IdeObserver>,
}

impl Default for IdeController {
    fn default() -> Self {
        Self::new()
    }
}

impl IdeController {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NullObserver))
    }

    pub fn with_observer(observer: Arc<dyn IdeObserver>) -> Self {
        Self {
            channels: [
                Mutex::new(ChannelState::new(IdeChannel::Primary)),
                Mutex::new(ChannelState::new(IdeChannel::Secondary)),
            ],
            observer,
        }
    }

    /// Build a controller with every drive listed in `config` attached and its image opened.
    pub fn from_config(config: &IdeConfig, opener: &dyn ImageOpener) -> Result<Self, IdeError> {
        let controller = Self::new();
        controller.configure(config, opener)?;
        Ok(controller)
    }

    pub fn configure(&self, config: &IdeConfig, opener: &dyn ImageOpener) -> Result<(), IdeError> {
        for entry in &config.drive {
            let drive = match entry.kind {
                DriveKind::HardDisk => AtaDrive::hard_disk(entry.geometry.unwrap_or_default()),
                DriveKind::Optical => {
                    if entry.geometry.is_some() {
                        log::warn!(
                            "IDE: geometry ignored for optical drive on {} {}",
                            entry.channel,
                            entry.slot
                        );
                    }
                    AtaDrive::optical()
                }
            };
            self.attach(entry.channel, entry.slot, drive)?;

            if let Some(path) = &entry.image {
                let handle = opener.open(&ImageSource::new(path.clone(), entry.kind))?;
                self.insert_image(entry.channel, entry.slot, handle)?;
            }
        }
        Ok(())
    }

    pub fn port_list(&self) -> Vec<(String, u16)> {
        ports::port_list()
    }

    fn lock(&self, channel: IdeChannel) -> MutexGuard<'_, ChannelState> {
        self.channels[channel.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn report(&self, error: &IdeError) {
        log::error!("IDE: {}", error);
        self.observer.controller_error(error);
    }

    pub fn attach(&self, channel: IdeChannel, slot: DriveSlot, mut drive: AtaDrive) -> Result<(), IdeError> {
        let mut state = self.lock(channel);
        if state.drives[slot.index()].is_some() {
            return Err(IdeError::SlotOccupied(channel, slot));
        }
        if drive.kind() == DriveKind::Optical {
            drive.reset();
        }
        log::debug!("IDE: attached {} drive as {} {}", drive.kind(), channel, slot);
        state.drives[slot.index()] = Some(drive);
        state.primary_selected = true;
        Ok(())
    }

    /// Attach to the first free slot of the channel, master before slave.
    pub fn attach_next(&self, channel: IdeChannel, drive: AtaDrive) -> Result<DriveSlot, IdeError> {
        let slot = {
            let state = self.lock(channel);
            state
                .drives
                .iter()
                .position(Option::is_none)
                .and_then(DriveSlot::from_index)
                .ok_or(IdeError::ChannelFull(channel))?
        };
        self.attach(channel, slot, drive)?;
        Ok(slot)
    }

    pub fn attach_hard_disk(&self, channel: IdeChannel, slot: DriveSlot, geometry: DiskGeometry) -> Result<(), IdeError> {
        self.attach(channel, slot, AtaDrive::hard_disk(geometry))
    }

    pub fn attach_optical(&self, channel: IdeChannel, slot: DriveSlot) -> Result<(), IdeError> {
        self.attach(channel, slot, AtaDrive::optical())
    }

    pub fn detach(&self, channel: IdeChannel, slot: DriveSlot) -> Result<AtaDrive, IdeError> {
        let mut state = self.lock(channel);
        state.drives[slot.index()]
            .take()
            .ok_or(IdeError::EmptySlot(channel, slot))
    }

    /// Remove every drive on the channel matching `predicate`. The other slot is left where
    /// it is. Returns the number of drives removed.
    pub fn detach_all<F>(&self, channel: IdeChannel, predicate: F) -> usize
    where
        F: Fn(&AtaDrive) -> bool,
    {
        let mut state = self.lock(channel);
        let mut removed = 0;
        for slot in state.drives.iter_mut() {
            if slot.as_ref().is_some_and(&predicate) {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            log::debug!("IDE: detached {} drive(s) from {} channel", removed, channel);
        }
        removed
    }

    /// Reset every drive on the channel.
    pub fn reset(&self, channel: IdeChannel) -> Result<(), IdeError> {
        let mut state = self.lock(channel);
        self.reset_drives(&mut state)
    }

    fn reset_drives(&self, state: &mut ChannelState) -> Result<(), IdeError> {
        if state.is_empty() {
            let err = IdeError::NoDrives(state.channel);
            self.report(&err);
            return Err(err);
        }
        for drive in state.drives.iter_mut().flatten() {
            drive.reset();
        }
        log::debug!("IDE: {} channel reset", state.channel);
        Ok(())
    }

    /// Install an already opened image into the drive at `slot`.
    pub fn insert_image(&self, channel: IdeChannel, slot: DriveSlot, image: ImageHandle) -> Result<(), IdeError> {
        let mut state = self.lock(channel);
        let drive = state.drives[slot.index()]
            .as_mut()
            .ok_or(IdeError::EmptySlot(channel, slot))?;
        drive.load_image(image)
    }

    /// Open `source` on a loader thread and install it into the drive at `slot` once open.
    /// Until then the drive has no media and its media commands abort.
    pub fn load_image(
        self: &Arc<Self>,
        channel: IdeChannel,
        slot: DriveSlot,
        source: ImageSource,
        opener: Arc<dyn ImageOpener>,
    ) -> ImageLoad {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let controller = Arc::clone(self);

        let spawned = thread::Builder::new()
            .name(format!("ide-image-{}-{}", channel, slot))
            .spawn(move || {
                let result = opener
                    .open(&source)
                    .and_then(|image| controller.insert_image(channel, slot, image));
                match &result {
                    Ok(()) => log::debug!("IDE: loaded '{}' into {} {}", source.path.display(), channel, slot),
                    Err(e) => {
                        log::error!(
                            "IDE: failed to load '{}' into {} {}: {}",
                            source.path.display(),
                            channel,
                            slot,
                            e
                        );
                        controller.observer.controller_error(e);
                    }
                }
                // The ticket may have been dropped; nobody is waiting then.
                let _ = sender.send(result);
            });

        if let Err(e) = spawned {
            log::error!("IDE: failed to spawn image loader thread: {}", e);
        }
        ImageLoad { receiver }
    }

    /// Stage an ATAPI packet directly into an optical drive.
    pub fn stage_packet(&self, channel: IdeChannel, slot: DriveSlot, packet: &[u8]) -> Result<(), IdeError> {
        let mut state = self.lock(channel);
        let drive = state.drives[slot.index()]
            .as_mut()
            .ok_or(IdeError::EmptySlot(channel, slot))?;
        drive.stage_packet(packet)
    }

    pub fn drive_snapshot(&self, channel: IdeChannel, slot: DriveSlot) -> Option<DriveSnapshot> {
        let state = self.lock(channel);
        state.drives[slot.index()].as_ref().map(AtaDrive::snapshot)
    }

    pub fn drives_of_kind(&self, kind: DriveKind) -> Vec<(IdeChannel, DriveSlot)> {
        let mut found = Vec::new();
        for channel in IdeChannel::iter() {
            let state = self.lock(channel);
            for (idx, drive) in state.drives.iter().enumerate() {
                if let (Some(drive), Some(slot)) = (drive, DriveSlot::from_index(idx)) {
                    if drive.kind() == kind {
                        found.push((channel, slot));
                    }
                }
            }
        }
        found
    }

    pub fn selected_slot(&self, channel: IdeChannel) -> Option<DriveSlot> {
        self.lock(channel).selected_slot()
    }

    pub fn device_control(&self, channel: IdeChannel) -> u8 {
        self.lock(channel).device_control
    }

    /// Handle a port read. The data register yields a word; every other register a byte.
    pub fn read(&self, port: u16, size: usize) -> u32 {
        let Some((channel, register)) = decode_port(port)
        else {
            log::error!("IDE: read from unhandled port {:04X}", port);
            return 0;
        };

        let mut state = self.lock(channel);
        if register == IdeRegister::DeviceControl {
            return state.device_control as u32;
        }

        let Some(slot) = state.selected_slot()
        else {
            log::trace!("IDE: read {:04X} on {} channel with no drive", port, channel);
            return 0;
        };
        let Some(drive) = state.drives[slot.index()].as_mut()
        else {
            return 0;
        };

        let value = match register {
            IdeRegister::Data => drive.read_data() as u32,
            _ => drive.read_register(register) as u32,
        };
        if matches!(register, IdeRegister::Data | IdeRegister::StatusCommand) {
            self.observer.register_access(channel, slot, drive.kind(), register);
        }
        log::trace!(
            "IDE: read {:04X} ({:?}, {} byte(s)) from {} {}: {:04X}",
            port,
            register,
            size,
            channel,
            slot,
            value
        );
        value
    }

    /// Handle a port write. The data register takes a word; every other register a byte.
    pub fn write(&self, port: u16, value: u32, size: usize) {
        let Some((channel, register)) = decode_port(port)
        else {
            log::error!("IDE: write of {:04X} to unhandled port {:04X}", value, port);
            return;
        };
        log::trace!("IDE: write {:04X} ({:?}, {} byte(s)): {:04X}", port, register, size, value);

        let mut state = self.lock(channel);
        match register {
            IdeRegister::DeviceControl => {
                self.write_device_control(&mut state, value as u8);
                return;
            }
            IdeRegister::DriveHead => {
                state.primary_selected = DriveSlot::from_drive_head(value as u8) == DriveSlot::Master;
            }
            _ => {}
        }

        let Some(slot) = state.selected_slot()
        else {
            log::trace!("IDE: write {:04X} on {} channel with no drive", port, channel);
            return;
        };
        let Some(drive) = state.drives[slot.index()].as_mut()
        else {
            return;
        };

        match register {
            IdeRegister::Data => drive.write_data(value as u16),
            IdeRegister::StatusCommand => {
                let opcode = value as u8;
                self.observer.command_dispatched(channel, slot, drive.kind(), opcode);
                drive.run_command(opcode);
                if drive.registers().status.err() {
                    self.observer.drive_error(channel, slot, drive.registers().error.fault());
                }
            }
            _ => drive.write_register(register, value as u8),
        }
        if matches!(register, IdeRegister::Data | IdeRegister::StatusCommand) {
            self.observer.register_access(channel, slot, drive.kind(), register);
        }
    }

    fn write_device_control(&self, state: &mut ChannelState, value: u8) {
        let was_reset = state.device_control & DEVICE_CONTROL_SRST != 0;
        let is_reset = value & DEVICE_CONTROL_SRST != 0;
        state.device_control = value;

        if !was_reset && is_reset {
            log::debug!("IDE: {} channel SRST asserted", state.channel);
            // An empty channel is reported by reset_drives and otherwise ignored.
            let _ = self.reset_drives(state);
        }
        else if was_reset && !is_reset {
            log::debug!("IDE: {} channel SRST released", state.channel);
            for drive in state.drives.iter_mut().flatten() {
                drive.release_reset();
            }
        }
    }
}
