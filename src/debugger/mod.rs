pub mod breakpoint;
pub mod command;
pub mod correlator;
pub mod detector;
mod error;
pub mod parser;
pub mod position;
pub mod process;
mod reader;
mod thread;

pub use breakpoint::{BreakpointHandle, BreakpointState, BreakpointSynchronizer, BreakpointView};
pub use detector::StopReason;
pub use error::Error;
pub use parser::{StackFrame, Variable};
pub use position::{PositionResolver, SourcePosition};
pub use thread::ThreadState;

use crate::debugger::command::{Command, StepKind};
use crate::debugger::correlator::{CommandWriter, Correlator};
use crate::debugger::detector::StopEvent;
use crate::debugger::parser::VariableSnapshot;
use crate::debugger::process::DebuggerProcess;
use crate::debugger::reader::SessionEvent;
use crate::debugger::thread::ThreadRegistry;
use crate::{muted_error, weak_error};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use strum_macros::Display;

/// Receives every notification of a debugging session.
///
/// Hooks are called from the session's own threads, never from the LLDB reader loop.
pub trait EventHook: Send + Sync {
    /// Program or debugger output that is not a lifecycle message.
    fn on_output(&self, line: &str);

    /// Execution paused, `frame` is the innermost frame with a source location.
    fn on_suspended(&self, thread: u32, reason: StopReason, frame: &StackFrame)
        -> anyhow::Result<()>;

    fn on_resumed(&self);

    /// Debugee or debugger finished, called once per session.
    fn on_terminated(&self, status: Option<i32>);

    fn on_breakpoint_verified(&self, handle: &BreakpointHandle);

    fn on_breakpoint_invalid(&self, handle: &BreakpointHandle, reason: &str);
}

pub struct NopHook;

impl EventHook for NopHook {
    fn on_output(&self, _: &str) {}

    fn on_suspended(&self, _: u32, _: StopReason, _: &StackFrame) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_resumed(&self) {}

    fn on_terminated(&self, _: Option<i32>) {}

    fn on_breakpoint_verified(&self, _: &BreakpointHandle) {}

    fn on_breakpoint_invalid(&self, _: &BreakpointHandle, _: &str) {}
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    NotStarted,
    Starting,
    TargetLoaded,
    BreakpointsSynced,
    Running,
    Suspended,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Ordered LLDB executable candidates.
    pub lldb_candidates: Vec<PathBuf>,
    /// Extra LLDB command line arguments.
    pub lldb_args: Vec<String>,
    /// Pause between the physical lines of a multi-line command.
    pub settle_delay: Duration,
    /// Time LLDB gets to exit after `quit` before it is killed.
    pub quit_grace: Duration,
    pub project_root: Option<PathBuf>,
    /// Surface the entry stop instead of continuing to the first breakpoint.
    pub stop_at_entry: bool,
    /// Treat LLDB stderr as a part of its output stream.
    pub merge_stderr: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            lldb_candidates: process::DEFAULT_LLDB_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .collect(),
            lldb_args: vec![],
            settle_delay: Duration::from_millis(100),
            quit_grace: Duration::from_millis(1000),
            project_root: None,
            stop_at_entry: false,
            merge_stderr: true,
        }
    }
}

struct SessionState {
    phase: Phase,
    connection: ConnectionState,
    threads: ThreadRegistry,
    /// Backtrace of the focused thread at the last stop.
    frames: Vec<StackFrame>,
    variables: VariableSnapshot,
}

impl SessionState {
    fn forget_stop(&mut self) {
        self.frames.clear();
        self.variables.clear();
    }
}

/// A live LLDB subprocess and the threads serving it.
struct Link {
    correlator: Arc<Correlator>,
    process: DebuggerProcess,
    pump: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

struct SessionInner {
    options: SessionOptions,
    hook: Arc<dyn EventHook>,
    resolver: PositionResolver,
    breakpoints: BreakpointSynchronizer,
    state: Mutex<SessionState>,
    link: Mutex<Option<Link>>,
    terminated: AtomicBool,
}

/// Debugging session over one LLDB subprocess.
///
/// Breakpoints may be registered through [`Session::breakpoints`] at any time, they are
/// applied when the session starts.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(options: SessionOptions, hook: impl EventHook + 'static) -> Self {
        let hook: Arc<dyn EventHook> = Arc::new(hook);
        Self {
            inner: Arc::new(SessionInner {
                resolver: PositionResolver::new(options.project_root.clone()),
                breakpoints: BreakpointSynchronizer::new(hook.clone()),
                options,
                hook,
                state: Mutex::new(SessionState {
                    phase: Phase::NotStarted,
                    connection: ConnectionState::Disconnected,
                    threads: ThreadRegistry::default(),
                    frames: vec![],
                    variables: VariableSnapshot::default(),
                }),
                link: Mutex::new(None),
                terminated: AtomicBool::new(false),
            }),
        }
    }

    /// Start LLDB and run `program` up to the first breakpoint.
    ///
    /// Startup: load the target, apply breakpoints and wait for their acknowledgments,
    /// launch stopped at entry, then continue (unless the entry stop is requested).
    pub fn start(&self, program: &Path, args: &[String]) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if !matches!(state.phase, Phase::NotStarted | Phase::Terminated) {
                return Err(Error::AlreadyStarted);
            }
            state.phase = Phase::Starting;
            state.connection = ConnectionState::Connecting;
            state.threads.clear();
            state.forget_stop();
        }
        // previous run may have left LLDB alive after the program exited
        if let Some(link) = self.inner.link.lock().unwrap().take() {
            self.inner.shutdown(link);
        }
        self.inner.terminated.store(false, Ordering::SeqCst);

        if let Err(e) = self.inner.launch(program, args) {
            log::error!(target: "bridge", "session start failed: {e:#}");
            {
                let mut state = self.inner.state.lock().unwrap();
                state.phase = Phase::Terminated;
                state.connection = ConnectionState::Failed;
            }
            self.inner.breakpoints.on_session_closed();
            if let Some(link) = self.inner.link.lock().unwrap().take() {
                self.inner.shutdown(link);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Quit LLDB and release every session thread.
    pub fn stop(&self) {
        let Some(link) = self.inner.link.lock().unwrap().take() else {
            return;
        };
        {
            let mut state = self.inner.state.lock().unwrap();
            state.phase = Phase::Terminated;
            if state.connection != ConnectionState::Failed {
                state.connection = ConnectionState::Disconnected;
            }
            state.threads.clear();
            state.forget_stop();
        }
        self.inner.breakpoints.on_session_closed();
        self.inner.shutdown(link);
        self.inner.notify_terminated(None);
    }

    pub fn resume(&self, thread: u32) -> Result<(), Error> {
        self.inner.run_command(thread, Command::Continue)
    }

    pub fn step_over(&self, thread: u32) -> Result<(), Error> {
        self.inner.run_command(thread, Command::Step(StepKind::Over))
    }

    pub fn step_into(&self, thread: u32) -> Result<(), Error> {
        self.inner.run_command(thread, Command::Step(StepKind::Into))
    }

    pub fn step_out(&self, thread: u32) -> Result<(), Error> {
        self.inner.run_command(thread, Command::Step(StepKind::Out))
    }

    /// Interrupt the running program. Sent even if other commands are in flight, the
    /// reply is only logged.
    pub fn pause(&self) -> Result<(), Error> {
        let correlator = self.inner.correlator()?;
        let command = Command::Interrupt.to_string();
        let sent = command.clone();
        correlator.send_with(
            &sent,
            Box::new(move |reply| {
                if let Err(e) = reply.and_then(|reply| reply.into_result(&command)) {
                    log::warn!(target: "bridge", "pause: {e}");
                }
            }),
        )?;
        Ok(())
    }

    /// Backtrace of a suspended thread, frames without a source location are omitted.
    pub fn stack_trace(&self, thread: u32) -> Result<Vec<StackFrame>, Error> {
        if !self.inner.state.lock().unwrap().threads.is_suspended(thread) {
            return Err(Error::ThreadNotSuspended(thread));
        }
        let frames = self.inner.fetch_frames(thread)?;
        let mut state = self.inner.state.lock().unwrap();
        if state.threads.in_focus() == Some(thread) {
            state.frames = frames.clone();
        }
        Ok(frames)
    }

    /// Local variables of a frame of the focused thread.
    pub fn variables(&self, frame: u32) -> Result<Vec<Variable>, Error> {
        {
            let state = self.inner.state.lock().unwrap();
            let thread = state.threads.in_focus().ok_or(Error::NoFocusThread)?;
            if !state.threads.is_suspended(thread) {
                return Err(Error::ThreadNotSuspended(thread));
            }
            if !state.frames.is_empty() && !state.frames.iter().any(|f| f.id == frame) {
                return Err(Error::FrameNotFound(frame));
            }
        }

        let command = Command::FrameVariables { frame }.to_string();
        let reply = self.inner.correlator()?.send(&command)?.wait_ok()?;

        let mut state = self.inner.state.lock().unwrap();
        Ok(parser::parse_variables(&reply.text(), &mut state.variables))
    }

    /// Children of a compound variable of the current stop.
    pub fn children(&self, reference: u32) -> Result<Vec<Variable>, Error> {
        let state = self.inner.state.lock().unwrap();
        state
            .variables
            .children(reference)
            .map(<[Variable]>::to_vec)
            .ok_or(Error::ReferenceNotFound(reference))
    }

    /// Evaluate an expression in the context of the current stop.
    pub fn evaluate(&self, expression: &str) -> Result<Variable, Error> {
        if expression.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }
        let command = Command::Evaluate(expression.to_string()).to_string();
        let reply = self.inner.correlator()?.send(&command)?.wait()?;

        let mut state = self.inner.state.lock().unwrap();
        parser::parse_evaluation(expression, &reply.lines, &mut state.variables)
    }

    /// Thread of the last stop.
    pub fn current_thread(&self) -> Option<u32> {
        self.inner.state.lock().unwrap().threads.in_focus()
    }

    pub fn thread_state(&self, thread: u32) -> Option<ThreadState> {
        self.inner.state.lock().unwrap().threads.state(thread)
    }

    /// Frames of the focused thread fetched at the last stop.
    pub fn current_frames(&self) -> Vec<StackFrame> {
        self.inner.state.lock().unwrap().frames.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().unwrap().phase
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().unwrap().connection
    }

    pub fn breakpoints(&self) -> &BreakpointSynchronizer {
        &self.inner.breakpoints
    }

    pub fn resolver(&self) -> &PositionResolver {
        &self.inner.resolver
    }

    /// Pid of the LLDB subprocess.
    pub fn debugger_pid(&self) -> Option<u32> {
        self.inner
            .link
            .lock()
            .unwrap()
            .as_ref()
            .map(|link| link.process.pid())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SessionInner {
    fn correlator(&self) -> Result<Arc<Correlator>, Error> {
        self.link
            .lock()
            .unwrap()
            .as_ref()
            .map(|link| link.correlator.clone())
            .ok_or(Error::NotStarted)
    }

    fn set_phase(&self, phase: Phase) {
        log::debug!(target: "bridge", "session phase: {phase}");
        self.state.lock().unwrap().phase = phase;
    }

    fn launch(self: &Arc<Self>, program: &Path, args: &[String]) -> Result<(), Error> {
        let path = process::resolve_executable(&self.options.lldb_candidates)?;
        let (process, stdin, lines) =
            DebuggerProcess::spawn(&path, &self.options.lldb_args, self.options.merge_stderr)?;

        let correlator = Arc::new(Correlator::new(CommandWriter::new(
            Box::new(stdin),
            self.options.settle_delay,
        )));
        let (events_tx, events_rx) = mpsc::channel();

        let pump = {
            let correlator = correlator.clone();
            std::thread::Builder::new()
                .name("lldb-pump".to_string())
                .spawn(move || reader::pump(lines, &correlator, &events_tx))?
        };
        let dispatcher = {
            let inner = self.clone();
            std::thread::Builder::new()
                .name("lldb-events".to_string())
                .spawn(move || inner.dispatch(events_rx))?
        };
        *self.link.lock().unwrap() = Some(Link {
            correlator: correlator.clone(),
            process,
            pump: Some(pump),
            dispatcher: Some(dispatcher),
        });
        self.state.lock().unwrap().connection = ConnectionState::Connected;

        let target = Command::TargetCreate(program.to_path_buf()).to_string();
        correlator
            .send(&target)?
            .wait_ok()
            .map_err(|e| match e {
                Error::Command { message, .. } => Error::TargetLoad(message),
                e => e,
            })?;
        self.set_phase(Phase::TargetLoaded);

        self.breakpoints.on_session_ready(correlator.clone())?.wait()?;
        self.set_phase(Phase::BreakpointsSynced);

        let launch = Command::ProcessLaunch {
            stop_at_entry: true,
            args: args.to_vec(),
        }
        .to_string();
        correlator
            .send(&launch)?
            .wait_ok()
            .map_err(|e| match e {
                Error::Command { message, .. } => Error::Launch(message),
                e => e,
            })?;
        Ok(())
    }

    /// Quit LLDB, kill it after the grace period, join every thread of the link.
    fn shutdown(&self, mut link: Link) {
        if !link.correlator.is_closed() {
            muted_error!(link.correlator.send(&Command::Quit.to_string()), "send quit:");
        }
        if !link.process.wait_exit(self.options.quit_grace) {
            log::warn!(target: "bridge", "lldb did not quit in {:?}, kill it", self.options.quit_grace);
            link.process.kill();
        }
        link.correlator.disconnect();

        let current = std::thread::current().id();
        for handle in [link.pump.take(), link.dispatcher.take()].into_iter().flatten() {
            // a hook may stop the session from the dispatcher itself
            if handle.thread().id() != current {
                _ = handle.join();
            }
        }
        link.process.join_readers();
        log::info!(target: "bridge", "lldb session closed");
    }

    fn notify_terminated(&self, status: Option<i32>) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.hook.on_terminated(status);
        }
    }

    fn dispatch(self: Arc<Self>, events: Receiver<SessionEvent>) {
        while let Ok(event) = events.recv() {
            match event {
                SessionEvent::Output(line) => self.hook.on_output(&line),
                SessionEvent::Stopped(stop) => {
                    weak_error!(self.on_stop(stop), "stop handling:");
                }
                SessionEvent::Exited(exit) => {
                    log::info!(target: "bridge", "debugee exited, status {:?}", exit.status);
                    {
                        let mut state = self.state.lock().unwrap();
                        state.phase = Phase::Terminated;
                        state.threads.clear();
                        state.forget_stop();
                    }
                    self.notify_terminated(exit.status);
                }
                SessionEvent::Closed => {
                    {
                        let mut state = self.state.lock().unwrap();
                        state.phase = Phase::Terminated;
                        if state.connection == ConnectionState::Connected {
                            state.connection = ConnectionState::Disconnected;
                        }
                        state.threads.clear();
                        state.forget_stop();
                    }
                    self.breakpoints.on_session_closed();
                    self.notify_terminated(None);
                    break;
                }
            }
        }
        log::debug!(target: "bridge", "event dispatcher stopped");
    }

    fn on_stop(&self, stop: StopEvent) -> Result<(), Error> {
        log::debug!(target: "bridge", "thread #{} stopped: {}", stop.thread, stop.reason);
        let entry = {
            let mut state = self.state.lock().unwrap();
            let entry = state.phase == Phase::BreakpointsSynced;
            state.threads.suspend(stop.thread);
            state.forget_stop();
            state.phase = Phase::Suspended;
            entry
        };

        if entry && !self.options.stop_at_entry {
            log::debug!(target: "bridge", "entry stop, continue to the first breakpoint");
            return self.run_command(stop.thread, Command::Continue);
        }

        let frames = self.fetch_frames(stop.thread)?;
        let Some(top) = frames.first().cloned() else {
            log::warn!(target: "bridge", "thread #{} stopped without source frames, stop not reported", stop.thread);
            return Ok(());
        };
        self.state.lock().unwrap().frames = frames;

        if stop.reason == StopReason::Breakpoint {
            weak_error!(
                self.breakpoints.confirm_hit(&top.file, top.line),
                "confirm breakpoint:"
            );
        }

        self.hook
            .on_suspended(stop.thread, stop.reason, &top)
            .map_err(Error::Hook)
    }

    fn fetch_frames(&self, thread: u32) -> Result<Vec<StackFrame>, Error> {
        let command = Command::Backtrace { thread }.to_string();
        let reply = self.correlator()?.send(&command)?.wait_ok()?;
        Ok(parser::parse_backtrace(&reply.text(), &self.resolver))
    }

    /// Send an execution command for a suspended thread.
    fn run_command(&self, thread: u32, command: Command) -> Result<(), Error> {
        let command = command.to_string();
        let correlator = self.correlator()?;
        {
            let mut state = self.state.lock().unwrap();
            if !state.threads.is_suspended(thread) {
                log::warn!(target: "bridge", "thread #{thread} is not suspended, `{command}` ignored");
                return Err(Error::ThreadNotSuspended(thread));
            }
            state.threads.resume_all();
            state.forget_stop();
            state.phase = Phase::Running;
        }
        self.hook.on_resumed();

        let result = correlator.send(&command).and_then(|reply| reply.wait_ok());
        if let Err(e) = result {
            let mut state = self.state.lock().unwrap();
            if state.phase == Phase::Running {
                state.threads.suspend(thread);
                state.phase = Phase::Suspended;
            }
            return Err(e);
        }
        Ok(())
    }
}
