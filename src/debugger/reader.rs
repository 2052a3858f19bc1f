use crate::debugger::correlator::Correlator;
use crate::debugger::detector::{Detected, ExitEvent, StopDetector, StopEvent};
use std::sync::mpsc::Sender;

/// Lifecycle notifications handed from the line pump to the event dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum SessionEvent {
    Output(String),
    Stopped(StopEvent),
    Exited(ExitEvent),
    /// LLDB output stream closed.
    Closed,
}

/// Deliver every LLDB output line to the stop detector, then to the correlator.
///
/// Events are only queued here, never handled: a handler that sends a command and waits
/// for its reply would otherwise block the only consumer of the reply lines. At the end
/// of stream every outstanding request fails and [`SessionEvent::Closed`] is queued.
pub(super) fn pump(
    lines: impl IntoIterator<Item = String>,
    correlator: &Correlator,
    events: &Sender<SessionEvent>,
) {
    let mut detector = StopDetector::new();
    for line in lines {
        log::trace!(target: "lldb", "-> {line}");

        let event = match detector.feed(&line) {
            Detected::Stopped(stop) => Some(SessionEvent::Stopped(stop)),
            Detected::Exited(exit) => Some(SessionEvent::Exited(exit)),
            Detected::Output(text) => Some(SessionEvent::Output(text)),
            Detected::Suppressed => None,
        };
        if let Some(event) = event {
            _ = events.send(event);
        }

        correlator.on_line(&line);
    }

    log::debug!(target: "bridge", "lldb output stream closed");
    correlator.disconnect();
    _ = events.send(SessionEvent::Closed);
}
