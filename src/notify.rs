// SPDX-License-Identifier: GPL-3.0-only
//! Desktop notifications through `notify-send`

use std::time::Duration;

use crate::command;

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    timeout: Option<Duration>,
}

impl Notifier {
    /// `None` disables notifications entirely
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    /// Show a notification; failures are logged and otherwise ignored
    pub fn send(&self, summary: &str, body: &str) {
        let Some(args) = self.args(summary, body) else {
            return;
        };
        if let Err(e) = command::run("notify-send", &args) {
            warn!("Failed to send notification '{}': {}", summary, e);
        }
    }

    fn args(&self, summary: &str, body: &str) -> Option<Vec<String>> {
        let timeout = self.timeout?;
        Some(vec![
            summary.to_string(),
            body.to_string(),
            "-t".to_string(),
            timeout.as_millis().to_string(),
        ])
    }
}
