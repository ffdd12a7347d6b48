// SPDX-License-Identifier: GPL-3.0-only
use std::os::fd::AsRawFd;

/// Netlink listener for udev uevents
///
/// `MonitorSocket` is not `Send`; create and run it on the thread that owns it.
pub struct UdevMonitor {
    socket: udev::MonitorSocket,
}

impl UdevMonitor {
    /// Create a udev monitor filtered to the given subsystems
    pub fn new(subsystems: &[&str]) -> Result<Self, std::io::Error> {
        let mut builder = udev::MonitorBuilder::new()?;
        for subsystem in subsystems {
            builder = builder.match_subsystem(subsystem)?;
        }
        let socket = builder.listen()?;

        Ok(Self { socket })
    }

    /// Run the monitoring loop, calling the callback for each event
    ///
    /// Blocks until the callback returns false (reported as `Interrupted`)
    /// or polling fails.
    pub fn run<F>(self, mut callback: F) -> std::io::Error
    where
        F: FnMut(udev::Event) -> bool,
    {
        info!("Hotplug monitoring started");

        let fd = self.socket.as_raw_fd();

        loop {
            let mut poll_fd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };

            // Negative timeout: wait forever
            let poll_result = unsafe { libc::poll(&mut poll_fd, 1, -1) };

            if poll_result < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!("Poll error: {}", err);
                return err;
            }

            if poll_result == 0 {
                continue;
            }

            // Drain everything that is queued on the socket
            for event in self.socket.iter() {
                debug!(
                    "udev event: type={:?}, subsystem={:?}, devtype={:?}, syspath={:?}",
                    event.event_type(),
                    event.subsystem(),
                    event.devtype(),
                    event.syspath()
                );

                if !callback(event) {
                    return std::io::Error::new(std::io::ErrorKind::Interrupted, "listener stopped");
                }
            }
        }
    }
}
