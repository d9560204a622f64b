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

//! Backing images for the IDE drives.
//!
//! A hard disk sits on a random-access [BlockStore]; an optical drive reads from a
//! read-only [ImageStream]. Opening an image is delegated to an [ImageOpener] so a
//! frontend can supply its own resource lookup; [FileImageOpener] opens plain files.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use anyhow::Context;

use crate::{ata::drive::DriveKind, error::IdeError};

/// Random-access storage with seek, read, write and flush.
pub trait BlockStore: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> BlockStore for T {}

/// Read-only, seekable byte stream.
pub trait ImageStream: Read + Seek + Send {}
impl<T: Read + Seek + Send> ImageStream for T {}

pub enum ImageHandle {
    Block(Box<dyn BlockStore>),
    Stream(Box<dyn ImageStream>),
}

impl ImageHandle {
    pub fn block(store: impl BlockStore + 'static) -> Self {
        ImageHandle::Block(Box::new(store))
    }

    pub fn stream(stream: impl ImageStream + 'static) -> Self {
        ImageHandle::Stream(Box::new(stream))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageHandle::Block(_) => "block store",
            ImageHandle::Stream(_) => "read-only stream",
        }
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHandle({})", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSource {
    pub path: PathBuf,
    pub kind: DriveKind,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>, kind: DriveKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

pub trait ImageOpener: Send + Sync {
    fn open(&self, source: &ImageSource) -> Result<ImageHandle, IdeError>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct FileImageOpener;

impl ImageOpener for FileImageOpener {
    fn open(&self, source: &ImageSource) -> Result<ImageHandle, IdeError> {
        match source.kind {
            DriveKind::HardDisk => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&source.path)
                    .with_context(|| format!("Failed to open hard disk image '{}'", source.path.display()))?;
                Ok(ImageHandle::block(file))
            }
            DriveKind::Optical => {
                let file = File::open(&source.path)
                    .with_context(|| format!("Failed to open optical image '{}'", source.path.display()))?;
                Ok(ImageHandle::stream(file))
            }
        }
    }
}

/// Total length of a seekable stream. The cursor is returned to the start.
pub(crate) fn stream_len<S: Seek + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes read.
pub(crate) fn fill_from<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
