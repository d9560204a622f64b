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

//! Host-side errors of the IDE controller.
//!
//! Errors a guest can provoke are never surfaced here; they land in the Status and Error
//! registers of the drive. [IdeError] covers configuration, attachment and image loading.

use crate::{
    ata::drive::DriveKind,
    ports::{DriveSlot, IdeChannel},
};

#[derive(thiserror::Error, Debug)]
pub enum IdeError {
    #[error("No drives attached to the {0} channel")]
    NoDrives(IdeChannel),
    #[error("The {0} {1} slot is already occupied")]
    SlotOccupied(IdeChannel, DriveSlot),
    #[error("The {0} {1} slot is empty")]
    EmptySlot(IdeChannel, DriveSlot),
    #[error("The {0} channel has no free drive slot")]
    ChannelFull(IdeChannel),
    #[error("A {drive} drive cannot use a {image} image")]
    ImageKindMismatch { drive: DriveKind, image: &'static str },
    #[error("Operation '{operation}' is not supported by a {kind} drive")]
    Unsupported { kind: DriveKind, operation: &'static str },
    #[error("The image loader exited before reporting a result")]
    LoadAbandoned,
    #[error("Error parsing IDE configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
