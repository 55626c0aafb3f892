//! Command source abstraction
//!
//! Commands arrive either from stdin (one JSON object per line, the normal
//! way to drive the engine from a UI process) or from a pre-built script
//! used by tests and demos.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::commands::Command;

/// Events produced by a command source.
#[derive(Debug)]
pub enum CommandEvent {
    Command(Command),
    /// A line that could not be parsed; reported back to the caller.
    Invalid { line: String, error: String },
    Eof,
}

/// Where control commands come from.
#[async_trait]
pub trait CommandSource: Send + 'static {
    async fn next_command(&mut self) -> std::io::Result<CommandEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// Scripted Source
// ============================================================================

/// Replays a fixed list of commands with an optional delay between them.
pub struct ScriptedSource {
    commands: std::vec::IntoIter<Command>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ScriptedSource {
    pub fn new(commands: Vec<Command>, delay_ms: u64) -> Self {
        Self {
            commands: commands.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl CommandSource for ScriptedSource {
    async fn next_command(&mut self) -> std::io::Result<CommandEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.commands.next() {
            Some(cmd) => {
                self.yielded_first = true;
                Ok(CommandEvent::Command(cmd))
            }
            None => Ok(CommandEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "script"
    }
}

// ============================================================================
// Line Source (stdin or any buffered reader)
// ============================================================================

/// Reads JSON commands, one per line.
pub struct LineSource<R> {
    reader: R,
    line_buffer: String,
    name: &'static str,
}

/// Commands from stdin.
pub type StdinSource = LineSource<BufReader<tokio::io::Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(1024),
            name,
        }
    }
}

#[async_trait]
impl<R> CommandSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_command(&mut self) -> std::io::Result<CommandEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(CommandEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(match serde_json::from_str::<Command>(line) {
                Ok(cmd) => CommandEvent::Command(cmd),
                Err(e) => {
                    tracing::warn!("[{}] Failed to parse command: {}", self.name, e);
                    CommandEvent::Invalid {
                        line: line.to_string(),
                        error: e.to_string(),
                    }
                }
            });
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_source_skips_blank_and_reports_invalid() {
        let input: &'static [u8] = b"\n{\"cmd\":\"status\"}\nnot json\n";
        let mut source = LineSource::new(input, "test");

        assert!(matches!(
            source.next_command().await.unwrap(),
            CommandEvent::Command(Command::Status)
        ));
        assert!(matches!(
            source.next_command().await.unwrap(),
            CommandEvent::Invalid { ref line, .. } if line == "not json"
        ));
        assert!(matches!(source.next_command().await.unwrap(), CommandEvent::Eof));
    }

    #[tokio::test]
    async fn test_scripted_source_replays_in_order() {
        let mut source = ScriptedSource::new(vec![Command::Status, Command::ListLoops], 0);
        assert!(matches!(source.next_command().await.unwrap(), CommandEvent::Command(Command::Status)));
        assert!(matches!(source.next_command().await.unwrap(), CommandEvent::Command(Command::ListLoops)));
        assert!(matches!(source.next_command().await.unwrap(), CommandEvent::Eof));
    }
}
