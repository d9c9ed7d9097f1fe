use std::sync::Arc;

use log::{debug, info};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{Inner, Records, StateAuthority};
use crate::{error::CommandError, storage::RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Stop,
}

impl StateAuthority {
    pub async fn start_timer(&self) {
        let mut records = self.inner.records.lock().await;
        if records.timer.is_running {
            return;
        }

        records.timer.is_running = true;
        Inner::arm_ticker(&self.inner, &mut records);
        info!("Timer started with {}s left", records.timer.time_left_seconds);
        self.inner.commit_timer(&mut records).await;
    }

    pub async fn pause_timer(&self) {
        let mut records = self.inner.records.lock().await;
        if !records.timer.is_running {
            return;
        }

        Inner::disarm_ticker(&mut records);
        records.timer.is_running = false;
        info!("Timer paused with {}s left", records.timer.time_left_seconds);
        self.inner.commit_timer(&mut records).await;
    }

    pub async fn reset_timer(&self) {
        let mut records = self.inner.records.lock().await;
        self.inner.reset_locked(&mut records);
        self.inner.commit_timer(&mut records).await;
    }

    pub async fn set_custom_timer(&self, seconds: i64) -> Result<(), CommandError> {
        let seconds = u64::try_from(seconds)
            .ok()
            .filter(|seconds| *seconds > 0)
            .ok_or(CommandError::InvalidDuration(seconds))?;

        let mut records = self.inner.records.lock().await;
        Inner::disarm_ticker(&mut records);
        records.timer.is_running = false;
        records.timer.time_left_seconds = seconds;
        info!("Timer set to {seconds}s");
        self.inner.commit_timer(&mut records).await;
        Ok(())
    }

    /// One countdown step. The armed ticker calls this once per interval;
    /// calling it while idle does nothing.
    pub async fn tick(&self) {
        self.inner.on_tick(None).await;
    }
}

impl Inner {
    /// Spawns the recurring tick task. The task only holds a weak reference,
    /// so dropping the last authority handle also ends the countdown.
    pub(super) fn arm_ticker(inner: &Arc<Inner>, records: &mut Records) {
        Self::disarm_ticker(records);
        let generation = records.ticker_generation;
        let period = inner.settings.tick_interval();
        let weak = Arc::downgrade(inner);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.on_tick(Some(generation)).await == TickOutcome::Stop {
                    break;
                }
            }
            debug!("Ticker {generation} stopped");
        });

        records.ticker = Some(handle);
    }

    /// Must be called with the records lock held: the ticker can then only be
    /// parked outside the critical section, so aborting it never cuts a tick
    /// in half.
    pub(super) fn disarm_ticker(records: &mut Records) {
        records.ticker_generation = records.ticker_generation.wrapping_add(1);
        if let Some(handle) = records.ticker.take() {
            handle.abort();
        }
    }

    fn reset_locked(&self, records: &mut Records) {
        Self::disarm_ticker(records);
        records.timer.is_running = false;
        records.timer.time_left_seconds = self.settings.default_timer_seconds;
    }

    async fn on_tick(&self, generation: Option<u64>) -> TickOutcome {
        let mut records = self.records.lock().await;
        if generation.is_some_and(|generation| generation != records.ticker_generation) {
            return TickOutcome::Stop;
        }
        if !records.timer.is_running {
            return TickOutcome::Stop;
        }

        records.timer.time_left_seconds = records.timer.time_left_seconds.saturating_sub(1);
        if records.timer.time_left_seconds > 0 {
            debug!("Tick: {}s left", records.timer.time_left_seconds);
            records.ticks_since_persist += 1;
            if records.ticks_since_persist >= self.settings.persist_every_ticks {
                records.ticks_since_persist = 0;
                self.persist(RecordKey::TimerState, &records.timer).await;
            }
            self.publish_timer(&records);
            return TickOutcome::Continue;
        }

        // Expired: stop ticking, tell the user once, then fall back to a
        // fresh idle countdown. The handle is detached instead of aborted
        // because this may be running on the ticker task itself.
        info!("Countdown expired");
        drop(records.ticker.take());
        self.collaborators.notifier.notify_expired();
        self.reset_locked(&mut records);
        self.commit_timer(&mut records).await;
        TickOutcome::Stop
    }

    async fn commit_timer(&self, records: &mut Records) {
        records.ticks_since_persist = 0;
        self.persist(RecordKey::TimerState, &records.timer).await;
        self.publish_timer(records);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::test_support::*;
    use crate::{
        error::CommandError,
        events::Event,
        settings::Settings,
        storage::{MemoryStore, RecordKey},
        timer::TimerState,
    };
    use serde_json::json;

    #[tokio::test]
    async fn custom_duration_is_reported_idle() {
        let h = harness().await;
        for seconds in [1, 59, 600, 7200] {
            h.authority.set_custom_timer(seconds).await.expect("valid duration");
            assert_eq!(
                h.authority.timer_state().await,
                TimerState::idle(seconds as u64)
            );
        }
    }

    #[tokio::test]
    async fn non_positive_durations_are_rejected() {
        let h = harness().await;
        h.authority.set_custom_timer(90).await.expect("valid");

        assert_eq!(
            h.authority.set_custom_timer(0).await,
            Err(CommandError::InvalidDuration(0))
        );
        assert_eq!(
            h.authority.set_custom_timer(-30).await,
            Err(CommandError::InvalidDuration(-30))
        );
        assert_eq!(h.authority.timer_state().await, TimerState::idle(90));
    }

    #[tokio::test]
    async fn full_countdown_expires_once_and_resets() {
        let h = harness().await;
        h.authority.start_timer().await;

        for _ in 0..1500 {
            h.authority.tick().await;
        }

        assert_eq!(h.authority.timer_state().await, TimerState::idle(1500));
        assert_eq!(h.notifier.count(), 1);

        // Further ticks while idle change nothing.
        h.authority.tick().await;
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.authority.timer_state().await, TimerState::idle(1500));
    }

    #[tokio::test]
    async fn pause_then_start_resumes_from_paused_value() {
        let h = harness().await;
        h.authority.start_timer().await;
        for _ in 0..5 {
            h.authority.tick().await;
        }
        h.authority.pause_timer().await;
        assert_eq!(h.authority.timer_state().await, TimerState::idle(1495));

        h.authority.tick().await;
        assert_eq!(h.authority.timer_state().await.time_left_seconds, 1495);

        h.authority.start_timer().await;
        h.authority.tick().await;
        let state = h.authority.timer_state().await;
        assert_eq!(state.time_left_seconds, 1494);
        assert!(state.is_running);
    }

    #[tokio::test]
    async fn start_and_pause_are_idempotent() {
        let h = harness().await;
        h.authority.pause_timer().await;
        assert_eq!(h.store.write_count(), 0);

        h.authority.start_timer().await;
        h.authority.start_timer().await;
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test]
    async fn reset_stops_and_restores_default() {
        let h = harness().await;
        h.authority.set_custom_timer(42).await.expect("set");
        h.authority.start_timer().await;
        h.authority.tick().await;
        h.authority.reset_timer().await;

        assert_eq!(h.authority.timer_state().await, TimerState::idle(1500));
        assert_eq!(
            h.store.get(RecordKey::TimerState),
            Some(json!({ "timeLeft": 1500, "isRunning": false }))
        );
    }

    #[tokio::test]
    async fn every_tick_is_persisted_and_broadcast() {
        let h = harness().await;
        let mut events = h.authority.events().subscribe();
        h.authority.start_timer().await;
        let writes_after_start = h.store.write_count();

        h.authority.tick().await;
        h.authority.tick().await;

        assert_eq!(h.store.write_count(), writes_after_start + 2);
        assert_eq!(
            h.store.get(RecordKey::TimerState),
            Some(json!({ "timeLeft": 1498, "isRunning": true }))
        );

        let mut pushed = Vec::new();
        while let Ok(Event::UpdateTimerState { state }) = events.try_recv() {
            pushed.push(state.time_left_seconds);
        }
        assert_eq!(pushed, vec![1500, 1499, 1498]);
    }

    #[tokio::test]
    async fn tick_writes_can_be_debounced() {
        let settings = Settings {
            persist_every_ticks: 10,
            ..manual_settings()
        };
        let h = harness_with(MemoryStore::new(), settings).await;
        h.authority.start_timer().await;
        let writes_after_start = h.store.write_count();

        for _ in 0..25 {
            h.authority.tick().await;
        }
        assert_eq!(h.store.write_count(), writes_after_start + 2);

        h.authority.pause_timer().await;
        assert_eq!(
            h.store.get(RecordKey::TimerState),
            Some(json!({ "timeLeft": 1475, "isRunning": false }))
        );
    }

    #[tokio::test]
    async fn expiry_is_persisted_as_idle_default() {
        let h = harness().await;
        h.authority.set_custom_timer(2).await.expect("set");
        h.authority.start_timer().await;
        h.authority.tick().await;
        h.authority.tick().await;

        assert_eq!(h.notifier.count(), 1);
        assert_eq!(
            h.store.get(RecordKey::TimerState),
            Some(json!({ "timeLeft": 1500, "isRunning": false }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn armed_ticker_counts_down_in_real_time() {
        let settings = Settings::default();
        let h = harness_with(MemoryStore::new(), settings).await;
        h.authority.set_custom_timer(3).await.expect("set");
        h.authority.start_timer().await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.authority.timer_state().await.time_left_seconds, 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.authority.timer_state().await, TimerState::idle(1500));
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_timer_stops_counting() {
        let h = harness_with(MemoryStore::new(), Settings::default()).await;
        h.authority.start_timer().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        h.authority.pause_timer().await;
        let paused = h.authority.timer_state().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.authority.timer_state().await, paused);
        assert_eq!(paused.time_left_seconds, 1498);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_a_running_countdown() {
        let store = MemoryStore::with_records([(
            RecordKey::TimerState,
            json!({ "isRunning": true, "timeLeft": 10 }),
        )]);
        let h = harness_with(store, Settings::default()).await;
        assert!(h.authority.timer_state().await.is_running);

        tokio::time::sleep(Duration::from_millis(3500)).await;

        let state = h.authority.timer_state().await;
        assert!(state.is_running);
        assert_eq!(state.time_left_seconds, 7);
    }
}
