// SPDX-License-Identifier: GPL-3.0-only
//! Timestamped record of what the reconciler saw and decided

use std::fmt;

use chrono::{DateTime, Local};

use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A hotplug event that triggered (or re-armed) reconfiguration
    Event { summary: String },
    /// A display configuration was selected and applied
    Matched { mode: String },
    /// No display configuration accounts for the connected outputs
    Unmatched { signature: String },
    /// The output inventory could not be read; handled like `Unmatched`
    QueryFailed { error: String },
    /// A configuration matched but applying it failed
    ApplyFailed { mode: String, error: String },
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Event { summary } => write!(f, "event: {summary}"),
            Record::Matched { mode } => write!(f, "display mode: {mode}"),
            Record::Unmatched { signature } => {
                write!(f, "no display mode matched signature {signature}")
            }
            Record::QueryFailed { error } => write!(f, "output query failed: {error}"),
            Record::ApplyFailed { mode, error } => {
                write!(f, "failed to apply display mode {mode}: {error}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub timestamp: DateTime<Local>,
    pub record: Record,
    /// Set for passes caused by a hotplug event rather than startup
    pub hotplug: bool,
}

impl Diagnostic {
    pub fn now(record: Record, hotplug: bool) -> Self {
        Self {
            timestamp: Local::now(),
            record,
            hotplug,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%F %T %Z"), self.record)
    }
}

/// Receives diagnostics
///
/// Display outcomes are recorded from the blocking pool, so implementations
/// may block (notifications).
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Logs every record and turns hotplug-driven display outcomes into
/// desktop notifications
pub struct LogSink {
    notifier: Notifier,
}

impl LogSink {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

impl DiagnosticsSink for LogSink {
    fn record(&self, diagnostic: Diagnostic) {
        match &diagnostic.record {
            Record::QueryFailed { .. } | Record::ApplyFailed { .. } => error!("{}", diagnostic),
            Record::Unmatched { .. } => warn!("{}", diagnostic),
            Record::Event { .. } | Record::Matched { .. } => info!("{}", diagnostic),
        }

        if let Some((summary, body)) = notification(&diagnostic) {
            self.notifier.send(summary, body);
        }
    }
}

/// Desktop notification for a hotplug-driven display outcome
///
/// Startup passes, events and query failures stay in the log.
fn notification(diagnostic: &Diagnostic) -> Option<(&'static str, &str)> {
    if !diagnostic.hotplug {
        return None;
    }
    match &diagnostic.record {
        Record::Matched { mode } => Some(("display configuration restored", mode.as_str())),
        Record::Unmatched { signature } => Some(("Unknown display configuration", signature.as_str())),
        Record::ApplyFailed { mode, .. } => Some(("Failed to apply display configuration", mode.as_str())),
        Record::Event { .. } | Record::QueryFailed { .. } => None,
    }
}
