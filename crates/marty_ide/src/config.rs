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

//! TOML configuration of the drives attached to the controller.
//!
//! ```toml
//! [[drive]]
//! channel = "primary"
//! slot = "master"
//! kind = "hard_disk"
//! image = "disks/dos.img"
//! geometry = { cylinders = 615, heads = 4, sectors = 17 }
//!
//! [[drive]]
//! channel = "secondary"
//! slot = "master"
//! kind = "optical"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_derive::Deserialize;

use crate::{
    ata::{drive::DriveKind, hard_disk::DiskGeometry},
    error::IdeError,
    ports::{DriveSlot, IdeChannel},
};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct IdeConfig {
    #[serde(default)]
    pub drive: Vec<DriveConfigEntry>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DriveConfigEntry {
    pub channel: IdeChannel,
    pub slot: DriveSlot,
    pub kind: DriveKind,
    #[serde(default)]
    pub image: Option<PathBuf>,
    /// Hard disks only. Defaults to 1024/16/63.
    #[serde(default)]
    pub geometry: Option<DiskGeometry>,
}

impl IdeConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, IdeError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IdeError> {
        let path = path.as_ref();
        let toml_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read IDE configuration '{}'", path.display()))?;
        Self::from_toml_str(&toml_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_drive_list() {
        let config = IdeConfig::from_toml_str(
            r#"
            [[drive]]
            channel = "primary"
            slot = "master"
            kind = "hard_disk"
            image = "disks/dos.img"
            geometry = { cylinders = 615, heads = 4, sectors = 17 }

            [[drive]]
            channel = "secondary"
            slot = "slave"
            kind = "optical"
            "#,
        )
        .unwrap();

        assert_eq!(config.drive.len(), 2);
        let hdd = &config.drive[0];
        assert_eq!(hdd.channel, IdeChannel::Primary);
        assert_eq!(hdd.slot, DriveSlot::Master);
        assert_eq!(hdd.kind, DriveKind::HardDisk);
        assert_eq!(hdd.image.as_deref(), Some(Path::new("disks/dos.img")));
        assert_eq!(
            hdd.geometry,
            Some(DiskGeometry {
                cylinders: 615,
                heads: 4,
                sectors: 17
            })
        );

        let cd = &config.drive[1];
        assert_eq!(cd.channel, IdeChannel::Secondary);
        assert_eq!(cd.slot, DriveSlot::Slave);
        assert_eq!(cd.kind, DriveKind::Optical);
        assert!(cd.image.is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[drive]]\nchannel = \"secondary\"\nslot = \"master\"\nkind = \"optical\"\nimage = \"cd.iso\""
        )
        .unwrap();

        let config = IdeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.drive.len(), 1);
        assert_eq!(config.drive[0].channel, IdeChannel::Secondary);
        assert_eq!(config.drive[0].kind, DriveKind::Optical);
        assert_eq!(config.drive[0].image.as_deref(), Some(Path::new("cd.iso")));
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ide.toml");
        let err = IdeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, IdeError::Other(_)));
        assert!(format!("{err:#}").contains("ide.toml"));
    }

    #[test]
    fn empty_document_has_no_drives() {
        assert_eq!(IdeConfig::from_toml_str("").unwrap(), IdeConfig::default());
    }

    #[test]
    fn bad_kind_is_a_config_error() {
        let err = IdeConfig::from_toml_str(
            r#"
            [[drive]]
            channel = "primary"
            slot = "master"
            kind = "floppy"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, IdeError::Config(_)));
    }
}
