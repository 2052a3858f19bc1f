use std::collections::HashMap;

/// Execution state of a debugee thread as seen by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Suspended,
}

/// Per-thread suspended/running state and the thread in focus.
#[derive(Debug, Default)]
pub(super) struct ThreadRegistry {
    state: HashMap<u32, ThreadState>,
    in_focus: Option<u32>,
}

impl ThreadRegistry {
    /// Thread stopped, it becomes the focused one.
    pub(super) fn suspend(&mut self, thread: u32) {
        self.state.insert(thread, ThreadState::Suspended);
        self.in_focus = Some(thread);
    }

    /// The whole process resumes, LLDB does not run threads independently.
    pub(super) fn resume_all(&mut self) {
        self.state
            .values_mut()
            .for_each(|state| *state = ThreadState::Running);
    }

    pub(super) fn state(&self, thread: u32) -> Option<ThreadState> {
        self.state.get(&thread).copied()
    }

    pub(super) fn is_suspended(&self, thread: u32) -> bool {
        self.state(thread) == Some(ThreadState::Suspended)
    }

    pub(super) fn in_focus(&self) -> Option<u32> {
        self.in_focus
    }

    pub(super) fn clear(&mut self) {
        self.state.clear();
        self.in_focus = None;
    }
}
