mod common;

use crate::common::{eventually, options, program, Event, TestHooks, MAIN_C};
use lldb_bridge::debugger::{
    BreakpointState, ConnectionState, Error, Phase, Session, SessionOptions, StopReason,
    ThreadState,
};
use serial_test::serial;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_run_to_breakpoint() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    let handle = session.breakpoints().register(MAIN_C, 6).unwrap();

    session.start(&program(), &[]).unwrap();
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert!(session.debugger_pid().is_some());

    let verified = events.wait_for(|event| match event {
        Event::Verified(number) => Some(*number),
        _ => None,
    });
    assert_eq!(verified, handle.number);

    let (thread, reason, line) = events.wait_suspended();
    assert_eq!((thread, reason, line), (1, StopReason::Breakpoint, 6));
    assert_eq!(session.phase(), Phase::Suspended);
    assert_eq!(session.current_thread(), Some(1));
    assert_eq!(session.thread_state(1), Some(ThreadState::Suspended));

    let frames = session.current_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].function, "main");
    assert_eq!(frames[0].file, PathBuf::from(MAIN_C));

    let view = session.breakpoints().find("main.c", 6).unwrap().unwrap();
    assert_eq!(view.state, BreakpointState::Verified);
    assert_eq!(view.debugger_id, Some(1));

    session.stop();
    assert_eq!(events.wait_terminated(), None);
    assert_eq!(session.phase(), Phase::Terminated);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.debugger_pid().is_none());
}

#[test]
#[serial]
fn test_step_and_inspect() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    session.breakpoints().register(MAIN_C, 6).unwrap();
    session.start(&program(), &[]).unwrap();
    events.wait_suspended();

    session.step_over(1).unwrap();
    events.wait_for(|event| (event == &Event::Resumed).then_some(()));
    let (thread, reason, line) = events.wait_suspended();
    assert_eq!((thread, reason, line), (1, StopReason::Step, 7));

    let frames = session.stack_trace(1).unwrap();
    assert_eq!(frames[0].line, 7);

    let vars = session.variables(0).unwrap();
    let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["count", "origin", "name"]);
    assert_eq!(vars[0].type_name, "int");
    assert_eq!(vars[0].value, "3");
    assert_eq!(vars[1].value, "{x = 1, y = 2}");
    assert_ne!(vars[1].reference, 0);

    let members = session.children(vars[1].reference).unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].name, "x");
    assert_eq!(members[0].value, "1");
    assert!(matches!(
        session.children(999),
        Err(Error::ReferenceNotFound(999))
    ));

    let count = session.evaluate("count").unwrap();
    assert_eq!((count.name.as_str(), count.value.as_str()), ("count", "3"));
    let sum = session.evaluate("count + 1").unwrap();
    assert_eq!((sum.name.as_str(), sum.value.as_str()), ("count + 1", "42"));
    assert!(matches!(
        session.evaluate("undefined_var + 1"),
        Err(Error::Evaluation(_))
    ));

    session.step_out(1).unwrap();
    let (_, reason, line) = events.wait_suspended();
    assert_eq!((reason, line), (StopReason::Step, 9));

    session.stop();
}

#[test]
#[serial]
fn test_program_exit() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    session.breakpoints().register(MAIN_C, 6).unwrap();
    session.start(&program(), &[]).unwrap();
    events.wait_suspended();

    session.resume(1).unwrap();
    assert_eq!(events.wait_terminated(), Some(0));
    assert_eq!(session.phase(), Phase::Terminated);
    assert_eq!(session.current_thread(), None);

    assert!(matches!(
        session.step_over(1),
        Err(Error::ThreadNotSuspended(1))
    ));

    session.stop();
    let late: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::Terminated(_)))
        .collect();
    assert!(late.is_empty(), "terminated twice: {late:?}");
}

#[test]
#[serial]
fn test_program_output_is_forwarded() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    session.start(&program(), &[]).unwrap();

    events.wait_for(|event| match event {
        Event::Output(line) if line == "bye from debugee" => Some(()),
        _ => None,
    });
    assert_eq!(events.wait_terminated(), Some(0));
    session.stop();
}

#[test]
#[serial]
fn test_step_requires_suspended_thread() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    session.breakpoints().register(MAIN_C, 6).unwrap();
    session.start(&program(), &[]).unwrap();
    events.wait_suspended();

    assert!(matches!(
        session.step_into(2),
        Err(Error::ThreadNotSuspended(2))
    ));
    assert_eq!(session.thread_state(1), Some(ThreadState::Suspended));
    assert!(!events
        .drain()
        .iter()
        .any(|event| event == &Event::Resumed));

    session.stop();
}

#[test]
#[serial]
fn test_invalid_breakpoint() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    let handle = session.breakpoints().register(MAIN_C, 10_000).unwrap();
    session.start(&program(), &[]).unwrap();

    let (number, reason) = events.wait_for(|event| match event {
        Event::Invalid(number, reason) => Some((*number, reason.clone())),
        _ => None,
    });
    assert_eq!(number, handle.number);
    assert!(reason.contains("no line 10000"), "{reason}");

    let view = session.breakpoints().find(MAIN_C, 10_000).unwrap().unwrap();
    assert!(matches!(view.state, BreakpointState::Invalid(_)));

    assert_eq!(events.wait_terminated(), Some(0));
    session.stop();
}

#[test]
#[serial]
fn test_unregister_live_breakpoint() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    session.breakpoints().register(MAIN_C, 6).unwrap();
    session.breakpoints().register(MAIN_C, 8).unwrap();
    session.start(&program(), &[]).unwrap();
    assert_eq!(events.wait_suspended().2, 6);

    let removed = session.breakpoints().unregister(MAIN_C, 8).unwrap();
    assert!(removed.is_some());
    eventually(|| session.breakpoints().snapshot().unwrap().len() == 1);

    session.resume(1).unwrap();
    assert_eq!(events.wait_terminated(), Some(0));
    session.stop();
}

#[test]
#[serial]
fn test_stop_at_entry() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(
        SessionOptions {
            stop_at_entry: true,
            ..options()
        },
        hooks,
    );
    session.breakpoints().register(MAIN_C, 6).unwrap();
    session.start(&program(), &[]).unwrap();

    eventually(|| session.thread_state(1) == Some(ThreadState::Suspended));
    assert!(session.current_frames().is_empty());

    session.resume(1).unwrap();
    assert_eq!(events.wait_suspended().2, 6);
    session.stop();
}

#[test]
#[serial]
fn test_start_errors() {
    let (hooks, events) = TestHooks::new();
    let session = Session::new(options(), hooks);
    session.breakpoints().register(MAIN_C, 6).unwrap();

    // the debugger reports the missing target on stderr
    let err = session
        .start(Path::new("/definitely/not/here/a.out"), &[])
        .unwrap_err();
    assert!(matches!(err, Error::TargetLoad(_)));
    assert!(err.is_fatal());
    assert_eq!(session.phase(), Phase::Terminated);
    assert_eq!(session.connection_state(), ConnectionState::Failed);

    session.start(&program(), &[]).unwrap();
    assert!(matches!(
        session.start(&program(), &[]),
        Err(Error::AlreadyStarted)
    ));
    events.wait_suspended();
    session.stop();
}
