// SPDX-License-Identifier: GPL-3.0-only
//! Automatic mounting of attached filesystems through udisks

use crate::command;
use crate::error::CommandError;
use crate::hotplug::{HotplugAction, HotplugEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filesystem {
    pub label: String,
    pub fs_type: String,
    pub devname: String,
}

/// The mountable filesystem a block `add` event announces, if any
pub fn filesystem(event: &HotplugEvent) -> Option<Filesystem> {
    if event.action != HotplugAction::Add
        || !event.is_subsystem("block")
        || event.property("ID_FS_USAGE") != Some("filesystem")
    {
        return None;
    }

    Some(Filesystem {
        label: event.property("ID_FS_LABEL").unwrap_or("unlabeled").to_string(),
        fs_type: event.property("ID_FS_TYPE").unwrap_or_default().to_string(),
        devname: event.property("DEVNAME")?.to_string(),
    })
}

pub fn mount(filesystem: &Filesystem) -> Result<(), CommandError> {
    command::run(
        "udisksctl",
        &["mount", "--block-device", filesystem.devname.as_str(), "--no-user-interaction"],
    )
}
