use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::{debug, info};
use monorange_core::{Detection, Real};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two cues (seconds). `null` disables the interval
    /// so only a change of message is required.
    pub min_interval_s: Option<Real>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_interval_s: Some(0.4),
        }
    }
}

impl AlertConfig {
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval_s
            .map(|s| Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertPhase {
    Idle,
    Alerting(String),
}

/// Memory of the last cue that actually fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    pub previous_message: String,
    pub last_alert: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDecision {
    /// Text to render on this frame, `None` when nothing was detected.
    pub message: Option<String>,
    /// Whether the audio cue fires on this frame.
    pub cue: bool,
}

/// `"Warning! car and person ahead."`
pub fn alert_message(classes: &BTreeSet<String>) -> String {
    let joined = classes.iter().map(String::as_str).collect::<Vec<_>>().join(" and ");
    format!("Warning! {joined} ahead.")
}

/// Sorted, deduplicated class labels of a frame's detections.
pub fn class_set<'a>(detections: impl IntoIterator<Item = &'a Detection>) -> BTreeSet<String> {
    detections.into_iter().map(|d| d.label.clone()).collect()
}

/// Turns the per-frame class set into a debounced warning.
///
/// A cue fires only when the message differs from the last one that fired
/// and the minimum interval since that cue has passed. Frames without
/// detections return to `Idle` but keep the memory of the last cue, so a
/// class that blinks out for a frame does not ring again.
#[derive(Debug, Clone)]
pub struct AlertMachine {
    config: AlertConfig,
    state: AlertState,
    phase: AlertPhase,
}

impl AlertMachine {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            state: AlertState::default(),
            phase: AlertPhase::Idle,
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn phase(&self) -> &AlertPhase {
        &self.phase
    }

    pub fn update(&mut self, classes: &BTreeSet<String>, now: Instant) -> AlertDecision {
        if classes.is_empty() {
            self.phase = AlertPhase::Idle;
            return AlertDecision {
                message: None,
                cue: false,
            };
        }

        let message = alert_message(classes);
        let interval_elapsed = match (self.state.last_alert, self.config.min_interval()) {
            (Some(last), Some(min)) => now.saturating_duration_since(last) > min,
            _ => true,
        };
        let cue = message != self.state.previous_message && interval_elapsed;
        if cue {
            info!("{message}");
            self.state.previous_message.clone_from(&message);
            self.state.last_alert = Some(now);
        } else if message != self.state.previous_message {
            debug!("suppressed \"{message}\": last cue too recent");
        }

        self.phase = AlertPhase::Alerting(message.clone());
        AlertDecision {
            message: Some(message),
            cue,
        }
    }
}

impl Default for AlertMachine {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    #[test]
    fn message_lists_classes_in_order() {
        assert_eq!(
            alert_message(&set(&["person", "car", "person"])),
            "Warning! car and person ahead."
        );
        assert_eq!(alert_message(&set(&["dog"])), "Warning! dog ahead.");
    }

    #[test]
    fn repeated_class_cues_once() {
        let mut m = AlertMachine::default();
        let t0 = Instant::now();
        assert!(m.update(&set(&["person"]), t0).cue);
        let second = m.update(&set(&["person"]), ms(t0, 100));
        assert!(!second.cue);
        assert_eq!(second.message.as_deref(), Some("Warning! person ahead."));
    }

    #[test]
    fn empty_frame_does_not_reset_memory() {
        let mut m = AlertMachine::default();
        let t0 = Instant::now();
        assert!(m.update(&set(&["person"]), t0).cue);

        let idle = m.update(&BTreeSet::new(), ms(t0, 1000));
        assert_eq!(idle, AlertDecision { message: None, cue: false });
        assert_eq!(m.phase(), &AlertPhase::Idle);
        assert_eq!(m.state().previous_message, "Warning! person ahead.");

        assert!(!m.update(&set(&["person"]), ms(t0, 2000)).cue);
    }

    #[test]
    fn new_message_waits_for_interval() {
        let mut m = AlertMachine::default();
        let t0 = Instant::now();
        assert!(m.update(&set(&["person"]), t0).cue);
        assert!(!m.update(&set(&["car", "person"]), ms(t0, 300)).cue);
        assert_eq!(m.state().previous_message, "Warning! person ahead.");
        // Exactly the interval is not enough.
        assert!(!m.update(&set(&["car", "person"]), ms(t0, 400)).cue);
        assert!(m.update(&set(&["car", "person"]), ms(t0, 401)).cue);
        assert_eq!(m.state().last_alert, Some(ms(t0, 401)));
    }

    #[test]
    fn disabled_interval_fires_on_every_change() {
        let mut m = AlertMachine::new(AlertConfig {
            min_interval_s: None,
        });
        let t0 = Instant::now();
        assert!(m.update(&set(&["person"]), t0).cue);
        assert!(m.update(&set(&["car"]), ms(t0, 1)).cue);
        assert!(m.update(&set(&["person"]), ms(t0, 2)).cue);
        assert!(!m.update(&set(&["person"]), ms(t0, 3)).cue);
    }

    #[test]
    fn phase_tracks_rendered_message() {
        let mut m = AlertMachine::default();
        let t0 = Instant::now();
        m.update(&set(&["person"]), t0);
        m.update(&set(&["car"]), ms(t0, 10));
        assert_eq!(m.phase(), &AlertPhase::Alerting("Warning! car ahead.".into()));
    }

    #[test]
    fn null_interval_disables_debounce() {
        let cfg: AlertConfig = serde_json::from_str(r#"{"min_interval_s": null}"#).unwrap();
        assert_eq!(cfg.min_interval(), None);
        let cfg: AlertConfig = serde_json::from_str("{}").unwrap();
        let min = cfg.min_interval().unwrap();
        assert!((min.as_secs_f64() - 0.4).abs() < 1e-9);
    }
}
