//! The single owner of timer, blocklist and note state.
//!
//! Every mutation runs under one lock: change the in-memory record, write it
//! through to the [`RecordStore`], publish to observers, and only then return
//! to the caller. The countdown ticker is the only work that runs without a
//! command driving it.

mod blocklist;
mod notes;
mod timer;

use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    blocklist::{normalize_site, RuleSink},
    events::{Event, EventHub, ExpiryNotifier},
    settings::Settings,
    storage::{RecordKey, RecordStore},
    timer::TimerState,
};

/// External pieces the authority talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub rules: Arc<dyn RuleSink>,
    pub notifier: Arc<dyn ExpiryNotifier>,
    pub events: EventHub,
}

impl Collaborators {
    /// Rule updates and expiry notifications travel over the same hub as timer
    /// updates; the extension applies them on its side.
    pub fn over_hub(store: Arc<dyn RecordStore>, events: EventHub) -> Self {
        Self {
            store,
            rules: Arc::new(events.clone()),
            notifier: Arc::new(events.clone()),
            events,
        }
    }
}

#[derive(Default)]
struct Records {
    timer: TimerState,
    blocked_sites: Vec<String>,
    notes: Vec<String>,
    installed_rule_ids: Vec<u32>,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every arm/disarm so a detached ticker can tell it is stale.
    ticker_generation: u64,
    ticks_since_persist: u32,
}

struct Inner {
    records: Mutex<Records>,
    collaborators: Collaborators,
    settings: Settings,
}

#[derive(Clone)]
pub struct StateAuthority {
    inner: Arc<Inner>,
}

impl StateAuthority {
    /// Loads all three records, reinstalls the blocking rules and, if the
    /// countdown was running when it was last persisted, re-arms the ticker.
    pub async fn init(collaborators: Collaborators, settings: Settings) -> Self {
        let store = collaborators.store.clone();

        let timer = match load_record(store.as_ref(), RecordKey::TimerState).await {
            Some(value) => TimerState::from_stored(&value, settings.default_timer_seconds),
            None => TimerState::idle(settings.default_timer_seconds),
        };
        let blocked_sites = load_record(store.as_ref(), RecordKey::BlockedSites)
            .await
            .map(|value| restore_list(&value, normalize_site))
            .unwrap_or_default();
        let notes = load_record(store.as_ref(), RecordKey::Notes)
            .await
            .map(|value| restore_list(&value, normalize_note))
            .unwrap_or_default();

        // The dynamic rules from the last run were compiled from this same
        // write-through list, so they occupy ids 1..=N.
        let installed_rule_ids = (1..=blocked_sites.len() as u32).collect();

        info!(
            "Loaded state: {}s left (running: {}), {} blocked sites, {} notes",
            timer.time_left_seconds,
            timer.is_running,
            blocked_sites.len(),
            notes.len()
        );

        let authority = Self {
            inner: Arc::new(Inner {
                records: Mutex::new(Records {
                    timer,
                    blocked_sites,
                    notes,
                    installed_rule_ids,
                    ..Records::default()
                }),
                collaborators,
                settings,
            }),
        };

        {
            let mut records = authority.inner.records.lock().await;
            authority.inner.install_rules(&mut records);
            if records.timer.is_running {
                info!("Countdown was running at last save; resuming");
                Inner::arm_ticker(&authority.inner, &mut records);
            }
            authority.inner.publish_timer(&records);
        }

        authority
    }

    pub async fn timer_state(&self) -> TimerState {
        self.inner.records.lock().await.timer
    }

    pub async fn blocked_sites(&self) -> Vec<String> {
        self.inner.records.lock().await.blocked_sites.clone()
    }

    pub async fn notes(&self) -> Vec<String> {
        self.inner.records.lock().await.notes.clone()
    }

    pub fn events(&self) -> &EventHub {
        &self.inner.collaborators.events
    }
}

impl Inner {
    async fn persist<T: Serialize>(&self, key: RecordKey, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                error!("Failed to serialize {}: {err}", key.as_str());
                return;
            }
        };

        if let Err(err) = self.collaborators.store.save(key, value).await {
            error!("Failed to persist {}: {err:#}", key.as_str());
        }
    }

    fn publish_timer(&self, records: &Records) {
        self.collaborators.events.publish(Event::UpdateTimerState {
            state: records.timer,
        });
    }
}

async fn load_record(store: &dyn RecordStore, key: RecordKey) -> Option<serde_json::Value> {
    match store.load(key).await {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to load {}; using defaults: {err:#}", key.as_str());
            None
        }
    }
}

/// Rebuilds a stored string list, dropping entries `clean` rejects and keeping
/// the first occurrence of duplicates.
fn restore_list(value: &serde_json::Value, clean: fn(&str) -> Option<String>) -> Vec<String> {
    let Some(items) = value.as_array() else {
        warn!("Stored list is not an array; ignoring it");
        return Vec::new();
    };

    let mut restored: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let Some(cleaned) = item.as_str().and_then(clean) else {
            warn!("Dropping invalid stored entry {item}");
            continue;
        };
        if !restored.contains(&cleaned) {
            restored.push(cleaned);
        }
    }
    restored
}

fn normalize_note(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::blocklist::RuleUpdate;
    use crate::storage::MemoryStore;

    /// Plays the network layer: applies remove-then-add and refuses any add
    /// whose id is still installed.
    #[derive(Default)]
    pub struct RecordingRules {
        pub updates: Mutex<Vec<RuleUpdate>>,
        pub installed: Mutex<Vec<u32>>,
    }

    impl RecordingRules {
        pub fn installed(&self) -> Vec<u32> {
            let mut ids = self.installed.lock().expect("installed").clone();
            ids.sort_unstable();
            ids
        }

        pub fn last_update(&self) -> RuleUpdate {
            self.updates
                .lock()
                .expect("updates")
                .last()
                .cloned()
                .expect("at least one rule update")
        }

        pub fn update_count(&self) -> usize {
            self.updates.lock().expect("updates").len()
        }
    }

    impl RuleSink for RecordingRules {
        fn apply(&self, update: &RuleUpdate) -> Result<()> {
            let mut installed = self.installed.lock().map_err(|err| anyhow!("{err}"))?;
            installed.retain(|id| !update.remove_rule_ids.contains(id));
            for rule in &update.add_rules {
                if installed.contains(&rule.id) {
                    bail!("rule id {} collides with an installed rule", rule.id);
                }
                installed.push(rule.id);
            }
            self.updates
                .lock()
                .map_err(|err| anyhow!("{err}"))?
                .push(update.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct CountingNotifier {
        pub count: AtomicUsize,
    }

    impl CountingNotifier {
        pub fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl ExpiryNotifier for CountingNotifier {
        fn notify_expired(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
            bail!("storage offline while reading {}", key.as_str())
        }

        async fn save(&self, key: RecordKey, _value: serde_json::Value) -> Result<()> {
            bail!("storage offline while writing {}", key.as_str())
        }
    }

    pub struct Harness {
        pub authority: StateAuthority,
        pub store: Arc<MemoryStore>,
        pub rules: Arc<RecordingRules>,
        pub notifier: Arc<CountingNotifier>,
    }

    /// Ticks arrive only when a test calls `tick()`.
    pub fn manual_settings() -> Settings {
        Settings {
            tick_interval_ms: 24 * 60 * 60 * 1000,
            ..Settings::default()
        }
    }

    pub async fn harness_with(store: MemoryStore, settings: Settings) -> Harness {
        let store = Arc::new(store);
        let rules = Arc::new(RecordingRules::default());
        let notifier = Arc::new(CountingNotifier::default());
        let collaborators = Collaborators {
            store: store.clone(),
            rules: rules.clone(),
            notifier: notifier.clone(),
            events: EventHub::new(settings.event_capacity),
        };
        let authority = StateAuthority::init(collaborators, settings).await;
        Harness {
            authority,
            store,
            rules,
            notifier,
        }
    }

    pub async fn harness() -> Harness {
        harness_with(MemoryStore::new(), manual_settings()).await
    }
}
