//! Line-delimited JSON over stdio between the extension and the authority.
//!
//! Each input line is `{"requestId": id, "message": {...}}` (a bare message is
//! accepted too). Each output line is either a reply carrying the `requestId`
//! echoed verbatim, whatever its JSON type, or a pushed event. Events raised while a request runs are
//! written before that request's reply.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
};
use tokio_util::sync::CancellationToken;

use crate::{
    commands::{CommandRouter, Response},
    events::Event,
};

#[derive(Debug)]
struct InboundFrame {
    request_id: Option<Value>,
    message: Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OutboundFrame {
    Reply {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<Value>,
        response: Response,
    },
    Event(Event),
}

/// Serves `router` until input closes or `shutdown` fires. `events` should be
/// subscribed before the authority is initialised; anything already queued on
/// it is written first.
pub async fn run_host<R, W>(
    router: CommandRouter,
    mut events: broadcast::Receiver<Event>,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    forward_pending(&mut events, &mut writer).await?;
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read request line")? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let reply = handle_line(&router, &line).await;
                forward_pending(&mut events, &mut writer).await?;
                write_frame(&mut writer, &reply).await?;
            }
            event = events.recv() => match event {
                Ok(event) => write_frame(&mut writer, &OutboundFrame::Event(event)).await?,
                Err(RecvError::Lagged(skipped)) => warn!("Host fell behind; {skipped} events skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    writer.flush().await.context("failed to flush output")?;
    Ok(())
}

async fn handle_line(router: &CommandRouter, line: &str) -> OutboundFrame {
    let frame = match serde_json::from_str::<Value>(line) {
        Ok(value) => split_frame(value),
        Err(err) => {
            warn!("Discarding unparsable frame: {err}");
            return OutboundFrame::Reply {
                request_id: None,
                response: Response::failed(),
            };
        }
    };

    OutboundFrame::Reply {
        request_id: frame.request_id,
        response: router.handle(frame.message).await,
    }
}

fn split_frame(value: Value) -> InboundFrame {
    match value {
        Value::Object(mut object) => match object.remove("message") {
            Some(message) => InboundFrame {
                request_id: object.remove("requestId").filter(|id| !id.is_null()),
                message,
            },
            None => InboundFrame {
                request_id: None,
                message: Value::Object(object),
            },
        },
        message => InboundFrame {
            request_id: None,
            message,
        },
    }
}

async fn forward_pending<W>(events: &mut broadcast::Receiver<Event>, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match events.try_recv() {
            Ok(event) => write_frame(writer, &OutboundFrame::Event(event)).await?,
            Err(TryRecvError::Lagged(skipped)) => warn!("Host fell behind; {skipped} events skipped"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    writer
        .write_all(&bytes)
        .await
        .context("failed to write frame")?;
    writer.flush().await.context("failed to flush frame")
}
