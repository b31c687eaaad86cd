//! Relay Metrics - runtime counters for signal and reference traffic
//!
//! Counters are keyed by static names (`signals.emitted`, `refs.underflow`, ...)
//! and take `&self`, so they can live inside shared runtime state without
//! forcing callers through a `&mut`.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable counter collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use relay_metrics::Counter;
//!
//! let counter = Counter::new();
//! counter.bump("signals.emitted");
//! assert_eq!(counter.get("signals.emitted"), 1);
//! ```
//!
//! Without the `metrics` feature every method is an empty inline stub and
//! `get` always reports zero.

#[cfg(feature = "metrics")]
mod counter;

#[cfg(feature = "metrics")]
pub use counter::Counter;

/// Whether counters in this build actually record anything.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stub when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    #[inline]
    pub fn bump(&self, _name: &'static str) {}
    #[inline]
    pub fn add(&self, _name: &'static str, _value: u64) {}
    #[inline]
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
    pub fn reset(&self) {}
}
