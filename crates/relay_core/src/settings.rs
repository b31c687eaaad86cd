//! Runtime settings

use serde::{Deserialize, Serialize};

/// Behaviour switches for a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// # use relay_core::RuntimeSettings;
/// let settings = RuntimeSettings::from_json(r#"{ "capture_backtraces": true }"#).unwrap();
/// assert!(settings.capture_backtraces);
/// assert!(settings.warn_on_stray_disconnect);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Attach a backtrace to every protocol warning.
    pub capture_backtraces: bool,
    /// Warn when a callable that is not subscribed gets disconnected.
    pub warn_on_stray_disconnect: bool,
    /// Drop weak slots whose callable is gone while emitting.
    pub prune_dead_weak_slots: bool,
    /// Warn about references still retained at shutdown.
    pub report_leaks_on_shutdown: bool,
}

impl RuntimeSettings {
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            capture_backtraces: false,
            warn_on_stray_disconnect: true,
            prune_dead_weak_slots: true,
            report_leaks_on_shutdown: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let settings = RuntimeSettings::from_json("{}").unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[test]
    fn json_round_trip_keeps_overrides() {
        let settings = RuntimeSettings {
            prune_dead_weak_slots: false,
            ..RuntimeSettings::default()
        };
        let json = settings.to_json().unwrap();
        assert_eq!(RuntimeSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        assert!(RuntimeSettings::from_json(r#"{ "capture_backtraces": 1 }"#).is_err());
    }
}
