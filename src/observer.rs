//! The popup's half of the sync contract, minus the DOM.
//!
//! An observer never trusts that it saw every push: it pulls all three
//! snapshots when it opens and re-pulls the timer after each command it
//! sends. Pushed and pulled timer states go through the same
//! [`TimerDisplay`] conversion.

use log::warn;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    commands::{CommandRouter, Request, Response},
    events::Event,
    timer::TimerState,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDisplay {
    pub minutes: u64,
    pub seconds: String,
    pub start_enabled: bool,
    pub pause_enabled: bool,
}

impl From<&TimerState> for TimerDisplay {
    fn from(state: &TimerState) -> Self {
        Self {
            minutes: state.time_left_seconds / 60,
            seconds: format!("{:02}", state.time_left_seconds % 60),
            start_enabled: !state.is_running,
            pause_enabled: state.is_running,
        }
    }
}

/// Validates the "custom minutes" input box. Returns the duration in seconds.
pub fn parse_custom_minutes(input: &str) -> Option<i64> {
    input
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|minutes| *minutes > 0)
        .and_then(|minutes| minutes.checked_mul(60))
}

pub struct ObserverSession {
    router: CommandRouter,
    events: broadcast::Receiver<Event>,
    timer: TimerState,
    blocked_sites: Vec<String>,
    notes: Vec<String>,
}

impl ObserverSession {
    /// Subscribes first, then pulls, so nothing published in between is lost.
    pub async fn open(router: CommandRouter) -> Self {
        let events = router.authority().events().subscribe();
        let mut session = Self {
            router,
            events,
            timer: TimerState::default(),
            blocked_sites: Vec::new(),
            notes: Vec::new(),
        };
        session.pull_all().await;
        session
    }

    pub fn display(&self) -> TimerDisplay {
        TimerDisplay::from(&self.timer)
    }

    pub fn timer(&self) -> TimerState {
        self.timer
    }

    pub fn blocked_sites(&self) -> &[String] {
        &self.blocked_sites
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Sends a command and, for mutations, reconciles from a fresh pull the
    /// way the popup does after every acknowledged click.
    pub async fn send(&mut self, request: Request) -> Response {
        let is_query = request.is_query();
        let response = self.router.handle_request(request).await;
        if !is_query && response == Response::ok() {
            self.pull_all().await;
        }
        response
    }

    /// Applies every push received since the last call. Returns how many
    /// timer updates were applied.
    pub fn drain_pushes(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(Event::UpdateTimerState { state }) => {
                    self.timer = state;
                    applied += 1;
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Observer missed {skipped} pushes");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }

    async fn pull_all(&mut self) {
        if let Response::Timer(state) = self.router.handle_request(Request::GetTimerState).await {
            self.timer = state;
        }
        if let Response::List(sites) = self.router.handle_request(Request::GetBlockedSites).await {
            self.blocked_sites = sites;
        }
        if let Response::List(notes) = self.router.handle_request(Request::GetNotes).await {
            self.notes = notes;
        }
    }
}
