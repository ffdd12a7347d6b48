// SPDX-License-Identifier: GPL-3.0-only
//! Reactions to non-display hotplug events
//!
//! - keyboards: notify, then (after the settle delay) re-apply rate and layout
//! - block devices: notify and mount the filesystem
//! - USB devices: run the configured per-device commands

pub mod keyboard;
pub mod mount;
pub mod usb;

use std::collections::HashMap;

use crate::command;
use crate::config::{KeyboardConfig, UsbDeviceConfig};
use crate::hotplug::HotplugEvent;
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Nothing to do for this event
    Ignored,
    /// Handled immediately
    Handled,
    /// A keyboard appeared; its settings must be re-applied once it settles
    KeyboardAttached,
}

/// Handles everything the display reconciler does not
///
/// Methods block on external tools and are called from the blocking pool.
pub trait PeripheralHandler: Send + Sync {
    fn on_event(&self, event: &HotplugEvent) -> Reaction;

    /// Apply keyboard rate and layout (at startup and after a keyboard settles)
    fn apply_keyboard(&self);
}

pub struct Peripherals {
    keyboard: Option<KeyboardConfig>,
    usb: HashMap<String, UsbDeviceConfig>,
    notifier: Notifier,
}

impl Peripherals {
    pub fn new(
        keyboard: Option<KeyboardConfig>,
        usb: HashMap<String, UsbDeviceConfig>,
        notifier: Notifier,
    ) -> Self {
        Self {
            keyboard,
            usb,
            notifier,
        }
    }

    fn on_keyboard(&self, event: &HotplugEvent) -> Reaction {
        let device = format!(
            "{}:{}",
            event.property("ID_VENDOR").unwrap_or("no-vendor"),
            event.property("ID_MODEL").unwrap_or("no-model")
        );
        info!("Keyboard attached: {} {}", device, event.syspath.display());
        self.notifier.send(
            "A keyboard attached",
            &format!("{device}\nReconfiguring xkbmap and rate"),
        );

        if self.keyboard.is_some() {
            Reaction::KeyboardAttached
        } else {
            Reaction::Handled
        }
    }

    fn on_filesystem(&self, filesystem: &mount::Filesystem, event: &HotplugEvent) -> Reaction {
        info!(
            "Filesystem attached: {} ({}) at {} [{}:{} {}]",
            filesystem.label,
            filesystem.fs_type,
            filesystem.devname,
            event.property("ID_VENDOR").unwrap_or("no-vendor"),
            event.property("ID_MODEL").unwrap_or("no-model"),
            event.property("DEVPATH").unwrap_or_default()
        );
        self.notifier.send(
            "New usb device",
            &format!(
                "A filesystem attached\n{} ({}) at {}\nMounting.",
                filesystem.label, filesystem.fs_type, filesystem.devname
            ),
        );

        if let Err(e) = mount::mount(filesystem) {
            error!("Failed to mount {}: {}", filesystem.devname, e);
        }
        Reaction::Handled
    }

    fn on_usb(&self, product_id: &str, event: &HotplugEvent) -> Reaction {
        info!("usb: {} ({})", usb::product_name(event).trim(), product_id);

        let Some(device) = self.usb.get(product_id) else {
            return Reaction::Ignored;
        };

        for (name, template) in &device.actions {
            let cmd = match usb::expand(template, &event.properties) {
                Ok(cmd) => cmd,
                Err(e) => {
                    debug!("Skipping '{}' for {}: {}", name, product_id, e);
                    continue;
                }
            };

            if let Err(e) = command::run("sh", &["-c", cmd.as_str()]) {
                warn!("usb command '{}' for {} failed: {}", name, product_id, e);
            }
            self.notifier.send(
                "USB device command",
                &format!("'{name}' command executed for {product_id}"),
            );
        }
        Reaction::Handled
    }
}

impl PeripheralHandler for Peripherals {
    fn on_event(&self, event: &HotplugEvent) -> Reaction {
        if keyboard::is_keyboard_added(event) {
            return self.on_keyboard(event);
        }
        if let Some(filesystem) = mount::filesystem(event) {
            return self.on_filesystem(&filesystem, event);
        }
        if let Some(product_id) = usb::product_id(event) {
            return self.on_usb(&product_id, event);
        }
        Reaction::Ignored
    }

    fn apply_keyboard(&self) {
        let Some(config) = &self.keyboard else {
            return;
        };
        if let Err(e) = keyboard::apply(config) {
            error!("Keyboard setup failed: {}", e);
        }
    }
}
