//! Control surface
//!
//! Typed [`Command`]s are read from a [`CommandSource`], applied by the
//! [`Controller`] and answered with one JSON [`Reply`] line each.

pub mod commands;
pub mod controller;
pub mod source;

pub use commands::{Command, Reply};
pub use controller::{ControlError, Controller, Outcome};
pub use source::{CommandEvent, CommandSource, LineSource, ScriptedSource, StdinSource};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::{TaskError, TaskName, TaskResult};

/// Read commands until EOF, a `shutdown` command, or cancellation.
///
/// A `shutdown` command cancels `cancel` so the whole engine stops.
pub async fn run_command_loop<S, W>(
    controller: Controller,
    mut source: S,
    mut replies: W,
    cancel: CancellationToken,
) -> TaskResult
where
    S: CommandSource,
    W: AsyncWrite + Unpin + Send,
{
    info!("[CommandTask] Reading commands from {}", source.source_name());
    let mut handled = 0u64;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = source.next_command() => event.map_err(|e| TaskError::Failed {
                task: TaskName::Commands,
                message: e.to_string(),
            })?,
        };

        let reply = match event {
            CommandEvent::Command(cmd) => {
                handled += 1;
                match controller.handle(cmd).await {
                    Outcome::Reply(reply) => Some(reply),
                    Outcome::Silent => None,
                    Outcome::Shutdown(reply) => {
                        write_reply(&mut replies, &reply).await;
                        info!("[CommandTask] Shutdown requested");
                        cancel.cancel();
                        break;
                    }
                }
            }
            CommandEvent::Invalid { error, .. } => Some(Reply::error("invalid", error)),
            CommandEvent::Eof => {
                info!("[CommandTask] {} reached end ({} commands)", source.source_name(), handled);
                break;
            }
        };

        if let Some(reply) = reply {
            write_reply(&mut replies, &reply).await;
        }
    }

    Ok(TaskName::Commands)
}

async fn write_reply<W: AsyncWrite + Unpin + Send>(out: &mut W, reply: &Reply) {
    let mut line = match serde_json::to_vec(reply) {
        Ok(line) => line,
        Err(e) => {
            warn!("[CommandTask] Failed to encode reply: {}", e);
            return;
        }
    };
    line.push(b'\n');
    if let Err(e) = out.write_all(&line).await {
        warn!("[CommandTask] Failed to write reply: {}", e);
        return;
    }
    let _ = out.flush().await;
}
