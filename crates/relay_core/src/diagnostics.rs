//! Non-fatal diagnostics: protocol warnings and subscriber failures
//!
//! Nothing reported here aborts the caller. Each report is logged through
//! `tracing` and counted, so tests and tooling can observe anomalies without
//! scraping logs.

use crate::error::RuntimeError;
use crate::settings::RuntimeSettings;
use relay_metrics::Counter;
use std::backtrace::Backtrace;
use std::fmt;
use tracing::warn;

pub(crate) const PROTOCOL_WARNINGS: &str = "protocol.warnings";
pub(crate) const REFS_UNDERFLOW: &str = "refs.underflow";
pub(crate) const STRAY_DISCONNECT: &str = "signals.stray_disconnect";
pub(crate) const DEPRECATED_CALL: &str = "runtime.deprecated";
pub(crate) const SIGNALS_EMITTED: &str = "signals.emitted";
pub(crate) const SIGNALS_DELIVERED: &str = "signals.delivered";
pub(crate) const SUBSCRIBER_ERRORS: &str = "signals.subscriber_errors";
pub(crate) const WEAK_PRUNED: &str = "signals.weak_pruned";

/// Sink for warnings shared by every table of one runtime.
#[derive(Debug, Default)]
pub struct Diagnostics {
    capture_backtraces: bool,
    counters: Counter,
}

impl Diagnostics {
    pub fn new(settings: &RuntimeSettings) -> Self {
        Self {
            capture_backtraces: settings.capture_backtraces,
            counters: Counter::new(),
        }
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    /// Report recoverable misuse of the runtime's contract.
    pub(crate) fn protocol_warning(&self, kind: &'static str, message: fmt::Arguments<'_>) {
        self.counters.bump(PROTOCOL_WARNINGS);
        self.counters.bump(kind);
        if self.capture_backtraces {
            let backtrace = Backtrace::force_capture();
            warn!(target: "relay::protocol", kind, "{message}\n{backtrace}");
        } else {
            warn!(target: "relay::protocol", kind, "{message}");
        }
    }

    /// Report a subscriber that failed while a signal was being emitted.
    pub(crate) fn subscriber_error(&self, signal: &str, error: &RuntimeError) {
        self.counters.bump(SUBSCRIBER_ERRORS);
        warn!(target: "relay::signal", signal, "subscriber failed: {error}");
    }
}
