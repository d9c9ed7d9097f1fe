use log::warn;
use serde::{Deserialize, Serialize};

use crate::{authority::StateAuthority, error::CommandError, timer::TimerState};

/// Messages the popup (or any other observer) may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    StartTimer,
    PauseTimer,
    ResetTimer,
    SetCustomTimer { time: i64 },
    BlockSite { site: String },
    UnblockSite { site: String },
    AddNote { note: String },
    DeleteNote { note: String },
    GetTimerState,
    GetBlockedSites,
    GetNotes,
}

impl Request {
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Request::GetTimerState | Request::GetBlockedSites | Request::GetNotes
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    Ack { success: bool },
    Timer(TimerState),
    List(Vec<String>),
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack { success: true }
    }

    pub fn failed() -> Self {
        Response::Ack { success: false }
    }
}

/// Entry point for every request. Rejections never reach the caller as
/// errors, only as `{ "success": false }`.
#[derive(Clone)]
pub struct CommandRouter {
    authority: StateAuthority,
}

impl CommandRouter {
    pub fn new(authority: StateAuthority) -> Self {
        Self { authority }
    }

    pub fn authority(&self) -> &StateAuthority {
        &self.authority
    }

    /// Accepts a raw JSON message; unknown `type`s and malformed payloads are
    /// answered with a failure ack.
    pub async fn handle(&self, message: serde_json::Value) -> Response {
        let request = match parse_request(message) {
            Ok(request) => request,
            Err(err) => {
                warn!("Rejected message: {err}");
                return Response::failed();
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Rejected command: {err}");
                Response::failed()
            }
        }
    }

    pub async fn dispatch(&self, request: Request) -> Result<Response, CommandError> {
        let authority = &self.authority;
        match request {
            Request::StartTimer => authority.start_timer().await,
            Request::PauseTimer => authority.pause_timer().await,
            Request::ResetTimer => authority.reset_timer().await,
            Request::SetCustomTimer { time } => authority.set_custom_timer(time).await?,
            Request::BlockSite { site } => authority.block_site(&site).await?,
            Request::UnblockSite { site } => authority.unblock_site(&site).await?,
            Request::AddNote { note } => authority.add_note(&note).await?,
            Request::DeleteNote { note } => authority.delete_note(&note).await?,
            Request::GetTimerState => return Ok(Response::Timer(authority.timer_state().await)),
            Request::GetBlockedSites => return Ok(Response::List(authority.blocked_sites().await)),
            Request::GetNotes => return Ok(Response::List(authority.notes().await)),
        }
        Ok(Response::ok())
    }
}

pub fn parse_request(message: serde_json::Value) -> Result<Request, CommandError> {
    serde_json::from_value(message).map_err(|err| CommandError::Malformed(err.to_string()))
}
