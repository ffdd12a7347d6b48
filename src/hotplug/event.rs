// SPDX-License-Identifier: GPL-3.0-only
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::EventStreamError;

pub type EventResult = Result<HotplugEvent, EventStreamError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugAction {
    Add,
    Change,
    Remove,
    Other,
}

impl fmt::Display for HotplugAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HotplugAction::Add => "add",
            HotplugAction::Change => "change",
            HotplugAction::Remove => "remove",
            HotplugAction::Other => "other",
        })
    }
}

/// One device event, detached from the udev socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    pub action: HotplugAction,
    pub subsystem: String,
    pub devtype: Option<String>,
    pub syspath: PathBuf,
    pub properties: BTreeMap<String, String>,
}

impl HotplugEvent {
    pub fn new(action: HotplugAction, subsystem: &str) -> Self {
        Self {
            action,
            subsystem: subsystem.to_string(),
            devtype: None,
            syspath: PathBuf::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn from_udev(event: &udev::Event) -> Self {
        let action = match event.event_type() {
            udev::EventType::Add => HotplugAction::Add,
            udev::EventType::Change => HotplugAction::Change,
            udev::EventType::Remove => HotplugAction::Remove,
            _ => HotplugAction::Other,
        };

        let properties = event
            .properties()
            .map(|entry| {
                (
                    entry.name().to_string_lossy().into_owned(),
                    entry.value().to_string_lossy().into_owned(),
                )
            })
            .collect();

        Self {
            action,
            subsystem: event
                .subsystem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            devtype: event.devtype().map(|s| s.to_string_lossy().into_owned()),
            syspath: event.syspath().to_path_buf(),
            properties,
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn is_subsystem(&self, subsystem: &str) -> bool {
        self.subsystem == subsystem
    }

    /// One-line description for logs and diagnostics
    pub fn summary(&self) -> String {
        let subsystem = match &self.devtype {
            Some(devtype) => format!("{}/{}", self.subsystem, devtype),
            None => self.subsystem.clone(),
        };
        format!(
            "{} {} {}:{} {}",
            self.action,
            subsystem,
            self.property("ID_VENDOR").unwrap_or("no-vendor"),
            self.property("ID_MODEL").unwrap_or("no-model"),
            self.syspath.display()
        )
    }
}
