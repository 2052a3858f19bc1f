use crate::debugger::command::PROMPT;
use once_cell::sync::Lazy;
use regex::Regex;
use strum_macros::Display;

static THREAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"thread #(\d+)").expect("valid regex"));
static PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Process (\d+)").expect("valid regex"));
static EXITED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Process \d+ exited").expect("valid regex"));
static RESUMING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Process \d+ resuming").expect("valid regex"));
static STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"status = (-?\d+)").expect("valid regex"));

/// Why the debugee stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StopReason {
    Breakpoint,
    Step,
    Signal,
    Exception,
    Unknown,
}

impl StopReason {
    fn classify(line: &str) -> Self {
        let line = line.to_lowercase();
        if line.contains("breakpoint") {
            StopReason::Breakpoint
        } else if line.contains("step") {
            StopReason::Step
        } else if line.contains("signal") {
            StopReason::Signal
        } else if line.contains("exception") {
            StopReason::Exception
        } else {
            StopReason::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopEvent {
    pub thread: u32,
    pub reason: StopReason,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitEvent {
    pub pid: Option<u32>,
    pub status: Option<i32>,
}

/// Result of feeding one line into the [`StopDetector`].
#[derive(Debug, Clone, PartialEq)]
pub enum Detected {
    Stopped(StopEvent),
    Exited(ExitEvent),
    /// Plain program or debugger output.
    Output(String),
    /// Lifecycle line or prompt, nothing to show.
    Suppressed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum State {
    #[default]
    Idle,
    StoppedPending { pid: Option<u32> },
}

/// Two-line stop pattern matcher.
///
/// `Process N stopped` arms the detector, the following `* thread #M, ... stop reason = ...`
/// line produces the stop event. Lines in between do not disarm it. Only lines that start
/// with `Process N exited` or `Process N resuming` change the process lifecycle.
#[derive(Debug, Default)]
pub struct StopDetector {
    state: State,
}

impl StopDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stop_pending(&self) -> bool {
        matches!(self.state, State::StoppedPending { .. })
    }

    pub fn feed(&mut self, line: &str) -> Detected {
        // command echoes may quote anything
        if line.trim_start().starts_with(PROMPT) {
            return Detected::Suppressed;
        }

        if EXITED_RE.is_match(line) {
            self.state = State::Idle;
            return Detected::Exited(ExitEvent {
                pid: pid(line),
                status: STATUS_RE
                    .captures(line)
                    .and_then(|caps| caps[1].parse().ok()),
            });
        }

        if RESUMING_RE.is_match(line) {
            if self.is_stop_pending() {
                log::debug!(target: "bridge", "pending stop cancelled by resume");
            }
            self.state = State::Idle;
            return Detected::Suppressed;
        }

        match self.state {
            State::Idle if line.contains("Process") && line.contains("stopped") => {
                self.state = State::StoppedPending { pid: pid(line) };
                Detected::Suppressed
            }
            State::StoppedPending { pid } if is_thread_line(line) => {
                self.state = State::Idle;
                let thread = THREAD_RE
                    .captures(line)
                    .and_then(|caps| caps[1].parse().ok())
                    .unwrap_or(1);
                Detected::Stopped(StopEvent {
                    thread,
                    reason: StopReason::classify(line),
                    pid,
                })
            }
            _ => output(line),
        }
    }
}

fn is_thread_line(line: &str) -> bool {
    line.trim_start().starts_with('*') && line.contains("thread #")
}

fn pid(line: &str) -> Option<u32> {
    PID_RE.captures(line).and_then(|caps| caps[1].parse().ok())
}

fn output(line: &str) -> Detected {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(PROMPT) {
        Detected::Suppressed
    } else {
        Detected::Output(line.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stops(detected: &[Detected]) -> usize {
        detected
            .iter()
            .filter(|d| matches!(d, Detected::Stopped(_)))
            .count()
    }

    #[test]
    fn test_stop_detection() {
        struct TestCase {
            lines: &'static [&'static str],
            expected: Option<StopEvent>,
        }
        let cases = vec![
            TestCase {
                lines: &[
                    "Process 4242 stopped",
                    "* thread #1, queue = 'com.apple.main-thread', stop reason = breakpoint 1.1",
                ],
                expected: Some(StopEvent {
                    thread: 1,
                    reason: StopReason::Breakpoint,
                    pid: Some(4242),
                }),
            },
            TestCase {
                lines: &[
                    "Process 7 stopped",
                    "some unrelated output",
                    "  * thread #3, name = 'worker', stop reason = step over",
                ],
                expected: Some(StopEvent {
                    thread: 3,
                    reason: StopReason::Step,
                    pid: Some(7),
                }),
            },
            TestCase {
                lines: &[
                    "Process 7 stopped",
                    "* thread #2, stop reason = signal SIGSTOP",
                ],
                expected: Some(StopEvent {
                    thread: 2,
                    reason: StopReason::Signal,
                    pid: Some(7),
                }),
            },
            TestCase {
                lines: &[
                    "Process 7 stopped",
                    "* thread #1, stop reason = EXC_BAD_ACCESS (code=1, address=0x0)",
                ],
                expected: Some(StopEvent {
                    thread: 1,
                    reason: StopReason::Unknown,
                    pid: Some(7),
                }),
            },
            TestCase {
                lines: &[
                    "Process 7 stopped",
                    "* thread #1, stop reason = exception",
                ],
                expected: Some(StopEvent {
                    thread: 1,
                    reason: StopReason::Exception,
                    pid: Some(7),
                }),
            },
            TestCase {
                lines: &["Process 7 stopped", "Process 7 resuming", "* thread #1, stop reason = step in"],
                expected: None,
            },
            TestCase {
                lines: &["* thread #1, stop reason = breakpoint 1.1"],
                expected: None,
            },
        ];

        for tc in cases {
            let mut detector = StopDetector::new();
            let events: Vec<_> = tc
                .lines
                .iter()
                .filter_map(|line| match detector.feed(line) {
                    Detected::Stopped(event) => Some(event),
                    _ => None,
                })
                .collect();
            assert_eq!(events.first().cloned(), tc.expected, "lines: {:?}", tc.lines);
            assert!(events.len() <= 1);
        }
    }

    #[test]
    fn test_stopped_line_alone_is_not_a_stop() {
        let mut detector = StopDetector::new();
        let detected: Vec<_> = [
            "Process 123 stopped",
            "frame #0: 0x0000 a.out`main at main.c:3",
            "   1   int main() {",
            "(lldb)",
        ]
        .iter()
        .map(|line| detector.feed(line))
        .collect();

        assert_eq!(stops(&detected), 0);
        assert!(detector.is_stop_pending());
    }

    #[test]
    fn test_exit_detection() {
        for prior in [&[][..], &["Process 123 stopped"][..]] {
            let mut detector = StopDetector::new();
            for line in prior {
                detector.feed(line);
            }
            let detected = detector.feed("Process 123 exited");
            assert_eq!(
                detected,
                Detected::Exited(ExitEvent {
                    pid: Some(123),
                    status: None
                })
            );
            assert!(!detector.is_stop_pending());
        }

        let mut detector = StopDetector::new();
        assert_eq!(
            detector.feed("Process 4242 exited with status = -1 (0xffffffff)"),
            Detected::Exited(ExitEvent {
                pid: Some(4242),
                status: Some(-1)
            })
        );
    }

    #[test]
    fn test_exit_word_in_output() {
        let mut detector = StopDetector::new();
        detector.feed("Process 4242 stopped");
        let lines = [
            "(lldb) frame variable exited",
            "(bool) exited = false",
            "worker thread exited",
            "(lldb) expr resuming",
            "(int) resuming = 1",
            "(lldb)",
        ];
        let detected: Vec<_> = lines.iter().map(|line| detector.feed(line)).collect();

        assert!(!detected.iter().any(|d| matches!(d, Detected::Exited(_))));
        assert_eq!(detected[1], Detected::Output("(bool) exited = false".to_string()));
        assert_eq!(detected[2], Detected::Output("worker thread exited".to_string()));
        assert_eq!(detected[4], Detected::Output("(int) resuming = 1".to_string()));
        assert!(detector.is_stop_pending());

        assert!(matches!(
            detector.feed("  Process 4242 exited with status = 0 (0x00000000)"),
            Detected::Exited(ExitEvent {
                status: Some(0),
                ..
            })
        ));
    }

    #[test]
    fn test_output_forwarding() {
        let mut detector = StopDetector::new();
        assert_eq!(
            detector.feed("hello from debugee"),
            Detected::Output("hello from debugee".to_string())
        );
        assert_eq!(detector.feed("(lldb)"), Detected::Suppressed);
        assert_eq!(detector.feed("(lldb) next"), Detected::Suppressed);
        assert_eq!(detector.feed("   "), Detected::Suppressed);
        assert_eq!(detector.feed("Process 1 resuming"), Detected::Suppressed);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Breakpoint.to_string(), "breakpoint");
        assert_eq!(StopReason::Unknown.to_string(), "unknown");
    }
}
