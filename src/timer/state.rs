use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMER_SECONDS: u64 = 25 * 60;

/// Countdown state shared by the persisted record, pull responses and pushed
/// `updateTimerState` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    #[serde(rename = "timeLeft", alias = "timeLeftSeconds")]
    pub time_left_seconds: u64,
    pub is_running: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::idle(DEFAULT_TIMER_SECONDS)
    }
}

impl TimerState {
    pub fn idle(time_left_seconds: u64) -> Self {
        Self {
            time_left_seconds,
            is_running: false,
        }
    }

    /// Rebuilds a state from a stored record. Anything that is not an object
    /// with a non-negative integer `timeLeft` falls back to `default_seconds`.
    /// A stored zero means the countdown already ran out, so it comes back
    /// as a fresh idle timer.
    pub fn from_stored(value: &serde_json::Value, default_seconds: u64) -> Self {
        let Some(object) = value.as_object() else {
            return Self::idle(default_seconds);
        };

        let time_left = object
            .get("timeLeft")
            .or_else(|| object.get("timeLeftSeconds"))
            .and_then(serde_json::Value::as_u64);

        match time_left {
            Some(seconds) if seconds > 0 => Self {
                time_left_seconds: seconds,
                is_running: object
                    .get("isRunning")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false),
            },
            _ => Self::idle(default_seconds),
        }
    }
}
