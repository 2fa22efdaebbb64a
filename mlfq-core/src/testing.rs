//! Mock collaborators shared by this crate's own tests.
//!
//! Not `#[cfg(test)]` at the module level because it's used from the
//! integration tests in `tests/` as well as the unit tests beside each
//! module; gated behind the `std` dependency that both already require.

#![cfg(test)]

use std::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::platform::{LevelObserver, Platform};
use mlfq_abi::{HostPriority, Level, TaskHandle};

/// A [`Platform`] with a manually-advanced clock and a recorded history of
/// every priority assignment and manager notification, for assertions.
#[derive(Default)]
pub struct MockPlatform {
    now: Cell<u64>,
    ticks_per_ms: u64,
    pub priorities: RefCell<Vec<(TaskHandle, HostPriority)>>,
    pub notify_count: Cell<u32>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            ticks_per_ms: 1,
            priorities: RefCell::new(Vec::new()),
            notify_count: Cell::new(0),
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get() + ticks);
    }

    pub fn last_priority_of(&self, handle: TaskHandle) -> Option<HostPriority> {
        self.priorities
            .borrow()
            .iter()
            .rev()
            .find(|(h, _)| *h == handle)
            .map(|(_, p)| *p)
    }
}

impl Platform for MockPlatform {
    fn now_ticks(&self) -> u64 {
        self.now.get()
    }

    fn ms_to_ticks(&self, ms: u32) -> u64 {
        ms as u64 * self.ticks_per_ms
    }

    fn set_priority(&self, task: TaskHandle, priority: HostPriority) {
        self.priorities.borrow_mut().push((task, priority));
    }

    fn notify_manager(&self) {
        self.notify_count.set(self.notify_count.get() + 1);
    }
}

/// Records every level transition reported to it, for assertions about
/// demotion/promotion/boost sequencing.
#[derive(Default)]
pub struct RecordingObserver {
    pub changes: RefCell<Vec<(TaskHandle, Level)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LevelObserver for RecordingObserver {
    fn on_level_change(&self, task: TaskHandle, level: Level) {
        self.changes.borrow_mut().push((task, level));
    }
}
