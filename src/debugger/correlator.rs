//! Request/response correlation over the unframed LLDB REPL stream.
//!
//! LLDB gives no message boundaries and no sequence numbers in its output. A command
//! reply is recognized as the block of lines that follows the command echo
//! (`(lldb) <command>`) and ends at the next bare idle prompt (`(lldb)`). Replies are
//! matched to requests strictly in issue order, so a reordering of output by the
//! debugger would misattribute replies. This is an accepted constraint.

use crate::debugger::command::{ERROR_TOKEN, PROMPT};
use crate::debugger::error::Error;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

/// Single-shot completion for a command reply.
pub type Completion = Box<dyn FnOnce(Result<Reply, Error>) + Send>;

/// Textual reply to one logical command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub seq: u64,
    /// Command echoes seen for this reply, one per physical line.
    pub echoes: Vec<String>,
    /// Reply content, echoes excluded.
    pub lines: Vec<String>,
}

impl Reply {
    pub fn echo(&self) -> Option<&str> {
        self.echoes.first().map(String::as_str)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// First `error:` message of the reply, if any.
    pub fn error(&self) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.find(ERROR_TOKEN)
                .map(|idx| line[idx + ERROR_TOKEN.len()..].trim())
        })
    }

    /// Turn an `error:` reply into [`Error::Command`].
    pub fn into_result(self, command: &str) -> Result<Reply, Error> {
        match self.error() {
            Some(message) => Err(Error::Command {
                command: command.to_string(),
                message: message.to_string(),
            }),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LineClass {
    IdlePrompt,
    Echo,
    Content,
}

fn classify(line: &str) -> LineClass {
    let trimmed = line.trim();
    if trimmed == PROMPT {
        LineClass::IdlePrompt
    } else if trimmed.starts_with(PROMPT) {
        LineClass::Echo
    } else {
        LineClass::Content
    }
}

/// What the block reader decided about the last line.
#[derive(Debug, PartialEq)]
pub enum BlockEvent {
    /// Line consumed, block still open.
    Pending,
    /// Block complete, deliver it to the oldest request.
    Complete(Block),
    /// Prompt reached but the block was not produced by any request, it is dropped.
    Discarded(Block),
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Block {
    pub echoes: Vec<String>,
    pub lines: Vec<String>,
}

/// Message-boundary state machine: echo seen, buffering, prompt terminated.
///
/// Lines that arrive before any echo belong to nobody (asynchronous stop output, startup
/// banner) and are not buffered.
#[derive(Debug, Default)]
pub struct BlockReader {
    block: Block,
}

impl BlockReader {
    /// Feed a line. `expected_echoes` is the number of physical lines of the oldest
    /// outstanding request, `None` if nothing is outstanding.
    pub fn feed(&mut self, line: &str, expected_echoes: Option<usize>) -> BlockEvent {
        match classify(line) {
            LineClass::Echo => {
                self.block.echoes.push(line.trim().to_string());
                BlockEvent::Pending
            }
            LineClass::Content => {
                if !self.block.echoes.is_empty() {
                    self.block.lines.push(line.to_string());
                }
                BlockEvent::Pending
            }
            LineClass::IdlePrompt => match expected_echoes {
                Some(parts) if self.block.echoes.len() >= parts.max(1) => {
                    BlockEvent::Complete(std::mem::take(&mut self.block))
                }
                // prompt between the physical lines of one multi-line command
                Some(_) if !self.block.echoes.is_empty() => BlockEvent::Pending,
                _ => BlockEvent::Discarded(std::mem::take(&mut self.block)),
            },
        }
    }

    fn reset(&mut self) {
        self.block = Block::default();
    }
}

/// Writes commands into LLDB stdin, one physical line at a time.
pub struct CommandWriter {
    sink: Box<dyn Write + Send>,
    settle: Duration,
}

impl CommandWriter {
    pub fn new(sink: Box<dyn Write + Send>, settle: Duration) -> Self {
        Self { sink, settle }
    }

    /// Write every part followed by a line terminator. LLDB drops input that is typed
    /// too fast, so parts are separated by the settle delay.
    fn write_parts(&mut self, parts: &[&str]) -> std::io::Result<()> {
        for (idx, part) in parts.iter().enumerate() {
            if idx > 0 && !self.settle.is_zero() {
                thread::sleep(self.settle);
            }
            log::trace!(target: "lldb", "<- {part}");
            self.sink.write_all(part.as_bytes())?;
            self.sink.write_all(b"\n")?;
            self.sink.flush()?;
        }
        Ok(())
    }
}

struct PendingRequest {
    seq: u64,
    parts: usize,
    completion: Completion,
}

#[derive(Default)]
struct State {
    pending: VecDeque<PendingRequest>,
    reader: BlockReader,
    closed: bool,
}

/// Blocking handle for a reply produced by [`Correlator::send`].
pub struct PendingReply {
    seq: u64,
    command: String,
    rx: mpsc::Receiver<Result<Reply, Error>>,
}

impl PendingReply {
    /// Block until the reply arrives.
    pub fn wait(self) -> Result<Reply, Error> {
        self.rx.recv().map_err(|_| Error::Disconnected)?
    }

    /// Block until the reply arrives, `Error::Command` if the reply carries `error:`.
    pub fn wait_ok(self) -> Result<Reply, Error> {
        let command = self.command.clone();
        self.wait()?.into_result(&command)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<Reply, Error> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(target: "bridge", "[{}] no reply to `{}` within {timeout:?}", self.seq, self.command);
                Err(Error::Timeout(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }
}

/// FIFO command correlator.
///
/// The writer mutex is the single send queue: sequence assignment, queueing of the
/// completion and the physical write all happen under it, so issue order is write order.
pub struct Correlator {
    seq: AtomicU64,
    writer: Mutex<CommandWriter>,
    state: Mutex<State>,
}

impl Correlator {
    pub fn new(writer: CommandWriter) -> Self {
        Self {
            seq: AtomicU64::new(1),
            writer: Mutex::new(writer),
            state: Mutex::new(State::default()),
        }
    }

    /// Send a command and get a handle for its reply.
    pub fn send(&self, command: &str) -> Result<PendingReply, Error> {
        let (tx, rx) = mpsc::sync_channel(1);
        let seq = self.send_with(
            command,
            Box::new(move |reply| {
                _ = tx.send(reply);
            }),
        )?;
        Ok(PendingReply {
            seq,
            command: command.to_string(),
            rx,
        })
    }

    /// Send a command, the completion is called exactly once from the line pump thread
    /// (or from [`Correlator::disconnect`]). Completions must not block.
    pub fn send_with(&self, command: &str, completion: Completion) -> Result<u64, Error> {
        let parts: Vec<&str> = command
            .split('\n')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            return Err(Error::EmptyCommand);
        }

        let mut writer = self.writer.lock().unwrap();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(Error::Disconnected);
            }
            state.pending.push_back(PendingRequest {
                seq,
                parts: parts.len(),
                completion,
            });
        }
        log::debug!(target: "bridge", "[{seq}] send `{}`", parts.join("; "));

        if let Err(e) = writer.write_parts(&parts) {
            let mut state = self.state.lock().unwrap();
            if let Some(pos) = state.pending.iter().position(|p| p.seq == seq) {
                // completion is dropped unused, the caller gets the error directly
                state.pending.remove(pos);
            }
            return Err(Error::Transport(e));
        }
        Ok(seq)
    }

    /// Feed one output line of the debugger.
    pub fn on_line(&self, line: &str) {
        let (request, block) = {
            let mut state = self.state.lock().unwrap();
            let expected = state.pending.front().map(|p| p.parts);
            match state.reader.feed(line, expected) {
                BlockEvent::Pending => return,
                BlockEvent::Discarded(block) => {
                    if !block.lines.is_empty() || !block.echoes.is_empty() {
                        log::debug!(target: "bridge", "drop unsolicited block: {block:?}");
                    }
                    return;
                }
                BlockEvent::Complete(block) => match state.pending.pop_front() {
                    Some(request) => (request, block),
                    None => return,
                },
            }
        };

        log::debug!(target: "bridge", "[{}] reply with {} line(s)", request.seq, block.lines.len());
        (request.completion)(Ok(Reply {
            seq: request.seq,
            echoes: block.echoes,
            lines: block.lines,
        }));
    }

    /// Fail every outstanding request with [`Error::Disconnected`] and reject new sends.
    pub fn disconnect(&self) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            state.reader.reset();
            std::mem::take(&mut state.pending)
        };
        for request in pending {
            log::debug!(target: "bridge", "[{}] cancelled by disconnect", request.seq);
            (request.completion)(Err(Error::Disconnected));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Number of requests waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }
}
