use lldb_bridge::debugger::{
    BreakpointHandle, EventHook, SessionOptions, StackFrame, StopReason,
};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source file the scripted debugger reports stops in.
pub const MAIN_C: &str = "/src/app/main.c";

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Output(String),
    Suspended {
        thread: u32,
        reason: StopReason,
        file: PathBuf,
        line: u32,
    },
    Resumed,
    Terminated(Option<i32>),
    Verified(u32),
    Invalid(u32, String),
}

pub struct TestHooks {
    tx: Mutex<Sender<Event>>,
}

impl TestHooks {
    pub fn new() -> (Self, Events) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, Events { rx })
    }

    fn send(&self, event: Event) {
        _ = self.tx.lock().unwrap().send(event);
    }
}

impl EventHook for TestHooks {
    fn on_output(&self, line: &str) {
        self.send(Event::Output(line.to_string()));
    }

    fn on_suspended(
        &self,
        thread: u32,
        reason: StopReason,
        frame: &StackFrame,
    ) -> anyhow::Result<()> {
        self.send(Event::Suspended {
            thread,
            reason,
            file: frame.file.clone(),
            line: frame.line,
        });
        Ok(())
    }

    fn on_resumed(&self) {
        self.send(Event::Resumed);
    }

    fn on_terminated(&self, status: Option<i32>) {
        self.send(Event::Terminated(status));
    }

    fn on_breakpoint_verified(&self, handle: &BreakpointHandle) {
        self.send(Event::Verified(handle.number));
    }

    fn on_breakpoint_invalid(&self, handle: &BreakpointHandle, reason: &str) {
        self.send(Event::Invalid(handle.number, reason.to_string()));
    }
}

/// Events recorded by [`TestHooks`].
pub struct Events {
    rx: Receiver<Event>,
}

impl Events {
    /// Skip events until `select` picks one, panic on timeout.
    pub fn wait_for<T>(&self, mut select: impl FnMut(&Event) -> Option<T>) -> T {
        let deadline = Instant::now() + EVENT_TIMEOUT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(event) => {
                    if let Some(found) = select(&event) {
                        return found;
                    }
                }
                Err(RecvTimeoutError::Timeout) => panic!("event not received in time"),
                Err(RecvTimeoutError::Disconnected) => panic!("hook dropped"),
            }
        }
    }

    pub fn wait_suspended(&self) -> (u32, StopReason, u32) {
        self.wait_for(|event| match event {
            Event::Suspended {
                thread,
                reason,
                line,
                ..
            } => Some((*thread, *reason, *line)),
            _ => None,
        })
    }

    pub fn wait_terminated(&self) -> Option<i32> {
        self.wait_for(|event| match event {
            Event::Terminated(status) => Some(*status),
            _ => None,
        })
    }

    /// Events already delivered.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

/// Session options driving the scripted debugger.
pub fn options() -> SessionOptions {
    SessionOptions {
        lldb_candidates: vec![PathBuf::from(env!("CARGO_BIN_EXE_lldb-stub"))],
        settle_delay: Duration::from_millis(10),
        quit_grace: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Any existing file works as the debugee of the scripted debugger.
pub fn program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lldb-stub"))
}

/// Poll `check` until it holds, panic on timeout.
pub fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}
