//! Breakpoint synchronization between the caller's registry and LLDB.
//!
//! A single actor thread owns the table of tracked breakpoints. The public
//! [`BreakpointSynchronizer`] handle and the correlator completions talk to it through
//! one inbox, so the table never needs a lock. Each breakpoint has at most one LLDB
//! operation in flight, desired state changes made meanwhile are reconciled when the
//! operation completes.

use crate::debugger::command::Command;
use crate::debugger::correlator::{Correlator, Reply};
use crate::debugger::error::Error;
use crate::debugger::EventHook;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

static SET_ACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Breakpoint (\d+):").expect("valid regex"));
static LIST_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+): file = '([^']+)', line = (\d+)").expect("valid regex")
});

/// Registry facing breakpoint identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakpointHandle {
    /// Bridge assigned number, stable for the breakpoint lifetime.
    pub number: u32,
    pub file: PathBuf,
    /// 1-based line.
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointState {
    /// Waiting for the debugger to become ready.
    Pending,
    /// `breakpoint set` sent, no acknowledgment yet.
    Requested,
    Verified,
    Invalid(String),
    /// Unregistered, removal from the debugger in progress.
    Removed,
}

/// Point in time view of a tracked breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointView {
    pub handle: BreakpointHandle,
    pub state: BreakpointState,
    /// Breakpoint id assigned by LLDB.
    pub debugger_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct BreakpointKey {
    file: PathBuf,
    line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operation {
    Set,
    List,
    Delete(u32),
}

struct Tracked {
    handle: BreakpointHandle,
    state: BreakpointState,
    /// Caller wants this breakpoint to exist.
    desired: bool,
    /// Breakpoint exists in the debugger.
    synced: bool,
    debugger_id: Option<u32>,
    in_flight: Option<Operation>,
}

impl Tracked {
    fn view(&self) -> BreakpointView {
        BreakpointView {
            handle: self.handle.clone(),
            state: self.state.clone(),
            debugger_id: self.debugger_id,
        }
    }
}

enum Message {
    Register {
        key: BreakpointKey,
        reply: SyncSender<BreakpointHandle>,
    },
    Unregister {
        key: BreakpointKey,
        reply: SyncSender<Option<BreakpointHandle>>,
    },
    SessionReady {
        correlator: Arc<Correlator>,
        done: SyncSender<()>,
    },
    SessionClosed,
    Find {
        key: BreakpointKey,
        reply: SyncSender<Option<BreakpointView>>,
    },
    ConfirmHit {
        key: BreakpointKey,
        reply: SyncSender<Option<BreakpointHandle>>,
    },
    Snapshot {
        reply: SyncSender<Vec<BreakpointView>>,
    },
    Ack {
        key: BreakpointKey,
        generation: u64,
        op: Operation,
        reply: Result<Reply, Error>,
    },
    Shutdown,
}

/// Completes when every breakpoint drained by [`BreakpointSynchronizer::on_session_ready`]
/// is acknowledged.
pub struct ReadyWaiter {
    rx: Receiver<()>,
}

impl ReadyWaiter {
    pub fn wait(self) -> Result<(), Error> {
        self.rx.recv().map_err(|_| Error::Disconnected)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<(), Error> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => Error::Timeout(timeout),
            mpsc::RecvTimeoutError::Disconnected => Error::Disconnected,
        })
    }
}

/// Handle to the breakpoint actor.
pub struct BreakpointSynchronizer {
    tx: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl BreakpointSynchronizer {
    pub fn new(hook: Arc<dyn EventHook>) -> Self {
        let (tx, rx) = mpsc::channel();
        let actor = Actor {
            hook,
            inbox: tx.clone(),
            table: BTreeMap::new(),
            next_number: 1,
            session: None,
            generation: 0,
            waiters: vec![],
        };
        let worker = thread::Builder::new()
            .name("lldb-breakpoints".to_string())
            .spawn(move || actor.run(rx))
            .ok();
        if worker.is_none() {
            log::error!(target: "bridge", "failed to spawn breakpoint actor");
        }

        Self { tx, worker }
    }

    fn request<T>(&self, msg: impl FnOnce(SyncSender<T>) -> Message) -> Result<T, Error> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.tx.send(msg(tx)).map_err(|_| Error::Disconnected)?;
        rx.recv().map_err(|_| Error::Disconnected)
    }

    /// Track a breakpoint at `file:line` (1-based). Registering an already tracked
    /// position returns the existing handle.
    pub fn register(&self, file: impl Into<PathBuf>, line: u32) -> Result<BreakpointHandle, Error> {
        let key = BreakpointKey {
            file: file.into(),
            line,
        };
        self.request(|reply| Message::Register { key, reply })
    }

    /// Stop tracking a breakpoint, returns `None` if nothing was tracked there.
    pub fn unregister(
        &self,
        file: impl Into<PathBuf>,
        line: u32,
    ) -> Result<Option<BreakpointHandle>, Error> {
        let key = BreakpointKey {
            file: file.into(),
            line,
        };
        self.request(|reply| Message::Unregister { key, reply })
    }

    /// Drain pending breakpoints into the debugger.
    pub fn on_session_ready(&self, correlator: Arc<Correlator>) -> Result<ReadyWaiter, Error> {
        let (done, rx) = mpsc::sync_channel(1);
        self.tx
            .send(Message::SessionReady { correlator, done })
            .map_err(|_| Error::Disconnected)?;
        Ok(ReadyWaiter { rx })
    }

    /// Forget the debugger state, every desired breakpoint becomes pending again.
    pub fn on_session_closed(&self) {
        _ = self.tx.send(Message::SessionClosed);
    }

    /// Find a tracked breakpoint by position, tolerating absolute vs base name paths.
    pub fn find(&self, file: impl Into<PathBuf>, line: u32) -> Result<Option<BreakpointView>, Error> {
        let key = BreakpointKey {
            file: file.into(),
            line,
        };
        self.request(|reply| Message::Find { key, reply })
    }

    /// Mark the breakpoint at a stop position as verified, the debugger just hit it.
    pub fn confirm_hit(
        &self,
        file: impl Into<PathBuf>,
        line: u32,
    ) -> Result<Option<BreakpointHandle>, Error> {
        let key = BreakpointKey {
            file: file.into(),
            line,
        };
        self.request(|reply| Message::ConfirmHit { key, reply })
    }

    pub fn snapshot(&self) -> Result<Vec<BreakpointView>, Error> {
        self.request(|reply| Message::Snapshot { reply })
    }
}

impl Drop for BreakpointSynchronizer {
    fn drop(&mut self) {
        _ = self.tx.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            _ = worker.join();
        }
    }
}

struct Waiter {
    keys: HashSet<BreakpointKey>,
    done: SyncSender<()>,
}

struct Actor {
    hook: Arc<dyn EventHook>,
    inbox: Sender<Message>,
    table: BTreeMap<BreakpointKey, Tracked>,
    next_number: u32,
    session: Option<Arc<Correlator>>,
    /// Bumped on every session change, acks of older sessions are ignored.
    generation: u64,
    waiters: Vec<Waiter>,
}

impl Actor {
    fn run(mut self, rx: Receiver<Message>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                Message::Register { key, reply } => {
                    _ = reply.send(self.register(key));
                }
                Message::Unregister { key, reply } => {
                    _ = reply.send(self.unregister(key));
                }
                Message::SessionReady { correlator, done } => {
                    self.session_ready(correlator, done);
                }
                Message::SessionClosed => self.session_closed(),
                Message::Find { key, reply } => {
                    let found = self.lookup(&key).and_then(|k| self.table.get(&k)).map(Tracked::view);
                    _ = reply.send(found);
                }
                Message::ConfirmHit { key, reply } => {
                    _ = reply.send(self.confirm_hit(&key));
                }
                Message::Snapshot { reply } => {
                    _ = reply.send(self.table.values().map(Tracked::view).collect());
                }
                Message::Ack {
                    key,
                    generation,
                    op,
                    reply,
                } => {
                    if generation != self.generation {
                        log::debug!(target: "bridge", "drop stale {op:?} ack for {key:?}");
                        continue;
                    }
                    self.on_ack(&key, op, reply);
                    self.reconcile(&key);
                }
                Message::Shutdown => break,
            }
        }
        log::debug!(target: "bridge", "breakpoint actor stopped");
    }

    fn register(&mut self, key: BreakpointKey) -> BreakpointHandle {
        if let Some(tracked) = self.table.get_mut(&key) {
            if !tracked.desired {
                tracked.desired = true;
                tracked.state = match tracked.in_flight {
                    Some(Operation::Set) => BreakpointState::Requested,
                    _ if tracked.synced => BreakpointState::Verified,
                    _ => BreakpointState::Pending,
                };
            }
            let handle = tracked.handle.clone();
            self.reconcile(&key);
            return handle;
        }

        let handle = BreakpointHandle {
            number: self.next_number,
            file: key.file.clone(),
            line: key.line,
        };
        self.next_number += 1;
        log::debug!(target: "bridge", "track breakpoint #{} at {:?}:{}", handle.number, key.file, key.line);

        self.table.insert(
            key.clone(),
            Tracked {
                handle: handle.clone(),
                state: BreakpointState::Pending,
                desired: true,
                synced: false,
                debugger_id: None,
                in_flight: None,
            },
        );
        self.reconcile(&key);
        handle
    }

    fn unregister(&mut self, key: BreakpointKey) -> Option<BreakpointHandle> {
        let key = self.lookup(&key)?;
        let tracked = self.table.get_mut(&key)?;
        let handle = tracked.handle.clone();

        if tracked.in_flight.is_none() && !tracked.synced {
            // never reached the debugger, nothing to delete
            self.table.remove(&key);
            return Some(handle);
        }

        tracked.desired = false;
        tracked.state = BreakpointState::Removed;
        self.reconcile(&key);
        Some(handle)
    }

    fn session_ready(&mut self, correlator: Arc<Correlator>, done: SyncSender<()>) {
        self.generation += 1;
        self.session = Some(correlator);

        let drained: Vec<BreakpointKey> = self
            .table
            .iter()
            .filter(|(_, t)| t.desired && t.state == BreakpointState::Pending)
            .map(|(k, _)| k.clone())
            .collect();
        log::debug!(target: "bridge", "session ready, apply {} breakpoint(s)", drained.len());

        if drained.is_empty() {
            _ = done.send(());
            return;
        }
        self.waiters.push(Waiter {
            keys: drained.iter().cloned().collect(),
            done,
        });
        for key in &drained {
            self.reconcile(key);
        }
    }

    fn session_closed(&mut self) {
        self.generation += 1;
        self.session = None;
        self.waiters.clear();
        self.table.retain(|_, tracked| {
            tracked.in_flight = None;
            tracked.synced = false;
            tracked.debugger_id = None;
            if tracked.desired {
                tracked.state = BreakpointState::Pending;
            }
            tracked.desired
        });
    }

    /// Exact position first, then a tracked file with the same base name.
    fn lookup(&self, key: &BreakpointKey) -> Option<BreakpointKey> {
        if self.table.contains_key(key) {
            return Some(key.clone());
        }
        let name = key.file.file_name()?;
        self.table
            .keys()
            .find(|k| k.line == key.line && k.file.file_name() == Some(name))
            .cloned()
    }

    fn confirm_hit(&mut self, key: &BreakpointKey) -> Option<BreakpointHandle> {
        let key = self.lookup(key)?;
        let tracked = self.table.get_mut(&key)?;
        if !tracked.desired {
            return None;
        }
        tracked.synced = true;
        tracked.state = BreakpointState::Verified;
        let handle = tracked.handle.clone();
        self.hook.on_breakpoint_verified(&handle);
        Some(handle)
    }

    /// Issue whatever operation moves the breakpoint towards its desired state.
    fn reconcile(&mut self, key: &BreakpointKey) {
        let ready = self.session.as_ref().is_some_and(|c| !c.is_closed());
        let Some(tracked) = self.table.get_mut(key) else {
            return;
        };
        if tracked.in_flight.is_some() {
            return;
        }

        match (tracked.desired, tracked.synced) {
            (true, false) if ready && tracked.state == BreakpointState::Pending => {
                tracked.state = BreakpointState::Requested;
                self.issue(key, Operation::Set);
            }
            (false, true) if ready => self.issue(key, Operation::List),
            (false, false) if tracked.state == BreakpointState::Removed => {
                self.table.remove(key);
            }
            _ => {}
        }
    }

    fn issue(&mut self, key: &BreakpointKey, op: Operation) {
        let Some(correlator) = self.session.clone() else {
            return;
        };
        if let Some(tracked) = self.table.get_mut(key) {
            tracked.in_flight = Some(op);
        }

        let command = match op {
            Operation::Set => Command::BreakpointSet {
                file: key.file.clone(),
                line: key.line,
            },
            Operation::List => Command::BreakpointList,
            Operation::Delete(id) => Command::BreakpointDelete(id),
        };

        let inbox = self.inbox.clone();
        let generation = self.generation;
        let ack_key = key.clone();
        let sent = correlator.send_with(
            &command.to_string(),
            Box::new(move |reply| {
                _ = inbox.send(Message::Ack {
                    key: ack_key,
                    generation,
                    op,
                    reply,
                });
            }),
        );

        if let Err(e) = sent {
            // delivered as a regular ack, so the table is updated in one place
            _ = self.inbox.send(Message::Ack {
                key: key.clone(),
                generation,
                op,
                reply: Err(e),
            });
        }
    }

    fn on_ack(&mut self, key: &BreakpointKey, op: Operation, reply: Result<Reply, Error>) {
        if matches!(reply, Err(Error::Disconnected)) && self.session.take().is_some() {
            log::debug!(target: "bridge", "lldb disconnected, breakpoint sync suspended until the next session");
        }

        let Some(tracked) = self.table.get_mut(key) else {
            return;
        };
        tracked.in_flight = None;

        match op {
            Operation::Set => {
                let outcome = match reply {
                    Ok(reply) => parse_set_ack(&reply),
                    Err(Error::Disconnected) => {
                        if tracked.desired {
                            tracked.state = BreakpointState::Pending;
                        }
                        self.settle_waiters(key);
                        return;
                    }
                    Err(e) => Err(e.to_string()),
                };

                match outcome {
                    Ok(id) => {
                        tracked.synced = true;
                        tracked.debugger_id = id;
                        if tracked.desired {
                            tracked.state = BreakpointState::Verified;
                            log::info!(target: "bridge", "breakpoint #{} verified", tracked.handle.number);
                            self.hook.on_breakpoint_verified(&tracked.handle);
                        }
                    }
                    Err(reason) => {
                        tracked.synced = false;
                        if tracked.desired {
                            log::warn!(target: "bridge", "breakpoint #{} invalid: {reason}", tracked.handle.number);
                            self.hook.on_breakpoint_invalid(&tracked.handle, &reason);
                            tracked.state = BreakpointState::Invalid(reason);
                        }
                    }
                }
                self.settle_waiters(key);
            }
            Operation::List => {
                let found = reply
                    .map_err(|e| e.to_string())
                    .and_then(|reply| {
                        find_breakpoint_id(&reply.text(), &key.file, key.line)
                            .ok_or_else(|| "breakpoint not found in the debugger list".to_string())
                    });
                match found {
                    Ok(id) => self.issue(key, Operation::Delete(id)),
                    Err(reason) => self.removal_failed(key, reason),
                }
            }
            Operation::Delete(id) => {
                let command = Command::BreakpointDelete(id).to_string();
                match reply.and_then(|reply| reply.into_result(&command)) {
                    Ok(_) => {
                        tracked.synced = false;
                        tracked.debugger_id = None;
                        if tracked.desired {
                            tracked.state = BreakpointState::Pending;
                        }
                    }
                    Err(e) => self.removal_failed(key, e.to_string()),
                }
            }
        }
    }

    fn removal_failed(&mut self, key: &BreakpointKey, reason: String) {
        let Some(tracked) = self.table.get_mut(key) else {
            return;
        };
        log::warn!(target: "bridge", "remove breakpoint #{}: {reason}", tracked.handle.number);
        tracked.synced = false;
        tracked.debugger_id = None;
        self.hook.on_breakpoint_invalid(&tracked.handle, &reason);
        tracked.state = BreakpointState::Invalid(reason);
    }

    fn settle_waiters(&mut self, key: &BreakpointKey) {
        self.waiters.retain_mut(|waiter| {
            waiter.keys.remove(key);
            if waiter.keys.is_empty() {
                _ = waiter.done.send(());
                return false;
            }
            true
        });
    }
}

/// Classify a `breakpoint set` reply, returns the LLDB breakpoint id when present.
fn parse_set_ack(reply: &Reply) -> Result<Option<u32>, String> {
    if let Some(message) = reply.error() {
        return Err(message.to_string());
    }

    let text = reply.text();
    if let Some(caps) = SET_ACK_RE.captures(&text) {
        if text.contains("no locations (pending)") {
            log::warn!(target: "bridge", "breakpoint resolved with no locations: {text}");
        }
        return Ok(caps[1].parse().ok());
    }
    if text.contains("Breakpoint") || text.contains("breakpoint") {
        return Ok(None);
    }
    Err("unrecognized acknowledgment".to_string())
}

/// Find the LLDB id of a breakpoint in `breakpoint list` output. LLDB may report the
/// full path or only the base name.
fn find_breakpoint_id(list: &str, file: &Path, line: u32) -> Option<u32> {
    let full = file.to_string_lossy();
    let name = file.file_name().map(|n| n.to_string_lossy());

    LIST_ENTRY_RE.captures_iter(list).find_map(|caps| {
        let listed = &caps[2];
        let same_line = caps[3].parse::<u32>().ok() == Some(line);
        let same_file = listed == full
            || full.ends_with(listed)
            || listed.ends_with(&*full)
            || Path::new(listed).file_name().map(|n| n.to_string_lossy()) == name;
        (same_line && same_file)
            .then(|| caps[1].parse().ok())
            .flatten()
    })
}
