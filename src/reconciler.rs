// SPDX-License-Identifier: GPL-3.0-only
//! Hotplug reconciliation loop
//!
//! Display changes go through `Idle → Debouncing → Reconfiguring → Idle`:
//! a `drm` event arms the settle timer, further events re-arm it, and once
//! the hardware is quiet the output inventory is read, matched against the
//! configured layouts and applied. A failed apply is reported but never
//! retried on its own; the next hotplug event is the next attempt.
//!
//! Other subsystems are dispatched to the [`PeripheralHandler`] as they come.
//! Keyboards get the same settle treatment as displays.
//!
//! Everything runs on one decision loop, so there is never more than one
//! reconfiguration in flight. External tools are invoked on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::diagnostics::{Diagnostic, DiagnosticsSink, Record};
use crate::error::{EventStreamError, QueryError};
use crate::hotplug::{EventResult, HotplugAction, HotplugEvent};
use crate::matcher::{ConfigTable, Directive, MatchOutcome, match_signature};
use crate::peripherals::{PeripheralHandler, Reaction};
use crate::randr::{ApplyOutputs, Output, OutputQuery, live_signature};

/// Whether `event` may have changed the set of connected outputs
pub fn is_display_trigger(event: &HotplugEvent) -> bool {
    event.is_subsystem("drm") && matches!(event.action, HotplugAction::Change | HotplugAction::Add)
}

/// Inventory plus the match decision taken on it
#[derive(Debug, Clone)]
pub struct Selection {
    pub outputs: Vec<Output>,
    pub outcome: MatchOutcome,
}

impl Selection {
    /// Selected configuration name and the full apply plan
    pub fn plan(&self) -> Option<(&str, Vec<Directive>)> {
        let (mode, directives) = self.outcome.matched.as_ref()?;
        Some((mode.as_str(), plan(directives.clone(), &self.outputs)))
    }
}

/// Matched directives followed by `disable` for every other known output
pub fn plan(mut directives: Vec<Directive>, outputs: &[Output]) -> Vec<Directive> {
    for output in outputs {
        if !directives.iter().any(|d| d.connector == output.connector_name) {
            directives.push(Directive::disable(output.connector_name.clone()));
        }
    }
    directives
}

/// Inventory → identity → match → apply, for one pass
pub struct DisplayEngine {
    query: Arc<dyn OutputQuery>,
    apply: Arc<dyn ApplyOutputs>,
    table: ConfigTable,
}

impl DisplayEngine {
    pub fn new(query: Arc<dyn OutputQuery>, apply: Arc<dyn ApplyOutputs>, table: ConfigTable) -> Self {
        Self { query, apply, table }
    }

    /// Read the current outputs and pick a configuration, without applying it
    pub fn select(&self) -> Result<Selection, QueryError> {
        let outputs = self.query.list_outputs()?;
        let live = live_signature(&outputs);
        let outcome = match_signature(&live, &self.table);
        Ok(Selection { outputs, outcome })
    }

    /// One Reconfiguring pass; every failure is folded into the returned record
    pub fn reconfigure(&self) -> Record {
        let selection = match self.select() {
            Ok(selection) => selection,
            Err(e) => {
                return Record::QueryFailed { error: e.to_string() };
            }
        };

        let Some((mode, directives)) = selection.plan() else {
            return Record::Unmatched {
                signature: selection.outcome.signature.clone(),
            };
        };

        info!("display mode: {}", mode);
        let mode = mode.to_string();
        match self.apply.apply(&directives, &selection.outputs) {
            Ok(()) => Record::Matched { mode },
            Err(e) => Record::ApplyFailed {
                mode,
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Debouncing { deadline: Instant },
}

pub struct Reconciler {
    display: Option<Arc<DisplayEngine>>,
    peripherals: Arc<dyn PeripheralHandler>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    /// Time the hardware gets to finish enumerating after a change
    settle: Duration,
}

impl Reconciler {
    /// `display` is `None` when no layouts are configured
    pub fn new(
        display: Option<DisplayEngine>,
        peripherals: Arc<dyn PeripheralHandler>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        settle: Duration,
    ) -> Self {
        Self {
            display: display.map(Arc::new),
            peripherals,
            diagnostics,
            settle,
        }
    }

    /// Apply the stored configuration once, then react to hotplug events
    ///
    /// Returns `Ok` when `shutdown` flips to `true`, and an error only when
    /// the event stream itself breaks.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<EventResult>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EventStreamError> {
        if *shutdown.borrow() {
            return Ok(());
        }

        info!("Applying stored configuration to the hardware present at startup");
        self.apply_keyboard().await;
        self.reconfigure(false).await;

        let mut state = State::Idle;
        let mut keyboard_due: Option<Instant> = None;

        loop {
            let display_due = match state {
                State::Idle => None,
                State::Debouncing { deadline } => Some(deadline),
            };
            let next_due = match (display_due, keyboard_due) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            tokio::select! {
                biased;

                () = interrupted(&mut shutdown) => {
                    if display_due.is_some() {
                        info!("Dropping pending display reconfiguration");
                    }
                    info!("Interrupted, shutting down");
                    return Ok(());
                }

                received = events.recv() => {
                    let event = match received {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => return Err(e),
                        None => return Err(EventStreamError::Closed),
                    };

                    if self.display.is_some() && is_display_trigger(&event) {
                        self.diagnostics.record(Diagnostic::now(
                            Record::Event { summary: event.summary() },
                            true,
                        ));
                        if display_due.is_some() {
                            debug!("Display event during settle delay, restarting it");
                        } else {
                            debug!("Waiting {:?} for outputs to settle", self.settle);
                        }
                        state = State::Debouncing { deadline: Instant::now() + self.settle };
                    } else if self.dispatch(event).await == Reaction::KeyboardAttached {
                        keyboard_due = Some(Instant::now() + self.settle);
                    }
                }

                () = sleep_until(next_due) => {
                    let now = Instant::now();
                    if display_due.is_some_and(|due| due <= now) {
                        state = State::Idle;
                        self.reconfigure(true).await;
                    }
                    if keyboard_due.is_some_and(|due| due <= now) {
                        keyboard_due = None;
                        self.apply_keyboard().await;
                    }
                }
            }
        }
    }

    async fn reconfigure(&self, hotplug: bool) {
        let Some(engine) = self.display.clone() else {
            return;
        };
        let diagnostics = Arc::clone(&self.diagnostics);

        let pass = tokio::task::spawn_blocking(move || {
            let record = engine.reconfigure();
            diagnostics.record(Diagnostic::now(record, hotplug));
        });
        if let Err(e) = pass.await {
            error!("Display reconfiguration task failed: {}", e);
        }
    }

    async fn dispatch(&self, event: HotplugEvent) -> Reaction {
        let peripherals = Arc::clone(&self.peripherals);
        match tokio::task::spawn_blocking(move || peripherals.on_event(&event)).await {
            Ok(reaction) => reaction,
            Err(e) => {
                error!("Hotplug handler task failed: {}", e);
                Reaction::Ignored
            }
        }
    }

    async fn apply_keyboard(&self) {
        let peripherals = Arc::clone(&self.peripherals);
        if let Err(e) = tokio::task::spawn_blocking(move || peripherals.apply_keyboard()).await {
            error!("Keyboard setup task failed: {}", e);
        }
    }
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn interrupted(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
