// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the reactor
//!
//! Everything here except [`EventStreamError`] is recoverable: the reconciler
//! logs it and goes back to waiting for the next hotplug event.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to run an external tool
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started (missing binary, permissions)
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully
    #[error("{command} exited with {status}")]
    Status { command: String, status: std::process::ExitStatus },
}

/// Output inventory could not be obtained
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("output query returned non-UTF-8 text")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// A line did not fit the per-output block structure
    #[error("unparsable output query line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// The display layout could not be applied
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error while applying settings: {0}")]
    Io(#[from] std::io::Error),
}

/// The hotplug event stream broke; the only fatal error
#[derive(Error, Debug)]
pub enum EventStreamError {
    #[error("failed to open udev monitor: {0}")]
    Init(#[source] std::io::Error),

    #[error("udev poll failed: {0}")]
    Poll(#[source] std::io::Error),

    #[error("hotplug event stream closed")]
    Closed,
}

/// Configuration file could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine the user configuration directory")]
    NoConfigDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A USB action command template could not be expanded
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("property {0} is not set for this device")]
    MissingProperty(String),

    #[error("malformed placeholder at byte {0}")]
    Malformed(usize),
}
