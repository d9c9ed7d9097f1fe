use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    blocklist::{RuleSink, RuleUpdate},
    timer::TimerState,
};

pub const EXPIRY_TITLE: &str = "Pomodoro Timer";
pub const EXPIRY_MESSAGE: &str = "Time's up! Take a break or start another session.";

/// Unsolicited pushes from the authority to whoever is listening.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    UpdateTimerState { state: TimerState },
    UpdateDynamicRules(RuleUpdate),
    ShowNotification { title: String, message: String },
}

impl Event {
    pub fn expiry_notification() -> Self {
        Event::ShowNotification {
            title: EXPIRY_TITLE.to_string(),
            message: EXPIRY_MESSAGE.to_string(),
        }
    }
}

/// Best-effort fan-out to connected observers. Publishing with nobody
/// subscribed is not an error.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            debug!("no observers connected; event dropped");
        }
    }
}

/// Raised once per countdown expiry.
pub trait ExpiryNotifier: Send + Sync {
    fn notify_expired(&self);
}

impl ExpiryNotifier for EventHub {
    fn notify_expired(&self) {
        self.publish(Event::expiry_notification());
    }
}

/// The extension side applies the rule update it receives through the hub.
impl RuleSink for EventHub {
    fn apply(&self, update: &RuleUpdate) -> Result<()> {
        self.publish(Event::UpdateDynamicRules(update.clone()));
        Ok(())
    }
}
