// SPDX-License-Identifier: GPL-3.0-only
//! Hardware hotplug events from udev
//!
//! A dedicated thread listens on a udev netlink socket for the `input`,
//! `block`, `drm` and `usb` subsystems and forwards every event to the
//! reconciler over a bounded channel.

mod event;
mod udev_monitor;

pub use event::{EventResult, HotplugAction, HotplugEvent};

use tokio::sync::mpsc;

use crate::error::EventStreamError;
use udev_monitor::UdevMonitor;

/// Subsystems the reactor cares about
pub const SUBSYSTEMS: [&str; 4] = ["input", "block", "drm", "usb"];

const CHANNEL_CAPACITY: usize = 64;

/// Start the udev listener thread
///
/// The returned receiver yields hotplug events; a broken monitor is reported
/// as one final `Err` before the channel closes.
pub fn spawn_listener() -> std::io::Result<mpsc::Receiver<EventResult>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    // MonitorSocket is not Send, so it is created and polled on its own thread
    std::thread::Builder::new()
        .name("udev-monitor".into())
        .spawn(move || {
            let monitor = match UdevMonitor::new(&SUBSYSTEMS) {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to initialize hotplug monitoring: {}", e);
                    let _ = tx.blocking_send(Err(EventStreamError::Init(e)));
                    return;
                }
            };

            let err = monitor.run(|event| {
                // Blocking here only delays the udev socket; the kernel buffers meanwhile
                match tx.blocking_send(Ok(HotplugEvent::from_udev(&event))) {
                    Ok(()) => true,
                    Err(_) => {
                        debug!("Hotplug channel closed, stopping monitor");
                        false
                    }
                }
            });

            if err.kind() != std::io::ErrorKind::Interrupted {
                let _ = tx.blocking_send(Err(EventStreamError::Poll(err)));
            }
            info!("Hotplug monitoring stopped");
        })?;

    Ok(rx)
}
