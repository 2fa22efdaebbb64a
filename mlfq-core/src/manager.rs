//! The scheduler manager loop: the task-context policy brain (§4.D).
//!
//! Everything here runs at a host priority one above every policy-managed
//! task (`HostPriority::manager_priority`), so it is never preempted by the
//! tasks it is adjusting. The four level-transition operations --
//! `demote`, `promote`, `global_boost`, and the `set_level` primitive they
//! share -- are the only code in this crate that calls
//! `Platform::set_priority`.

use mlfq_abi::{HostPriority, Level, QuantumLadder, TaskHandle};

use crate::channel::EventConsumer;
use crate::platform::{LevelObserver, Platform};
use crate::table::TaskTable;

/// Configuration for a [`SchedulerManager`]: the quantum ladder and the
/// host-priority ceiling the policy is allotted, plus the anti-starvation
/// boost period.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ManagerConfig {
    pub ladder: QuantumLadder,
    /// Host priority of `Level::High`; lower levels get `top - ordinal`.
    pub top_priority: u8,
    /// Ticks between anti-starvation global boosts. Zero disables boosting.
    pub boost_period_ticks: u64,
}

impl ManagerConfig {
    pub const fn new(ladder: QuantumLadder, top_priority: u8, boost_period_ticks: u64) -> Self {
        Self {
            ladder,
            top_priority,
            boost_period_ticks,
        }
    }
}

/// Drives level transitions for the task table it was built over.
///
/// Generic over the table capacity, the event channel, the host-kernel
/// contract, and the (optional) level-change observer, so tests can swap in
/// a mock of each independently.
pub struct SchedulerManager<'a, const CAP: usize, E, P, O> {
    table: &'a TaskTable<CAP>,
    events: &'a E,
    platform: &'a P,
    observer: &'a O,
    config: ManagerConfig,
    last_boost_tick: core::cell::Cell<u64>,
}

// Safety: every field reachable through `&self` is either `Sync` already
// (`TaskTable`, the event channel, a `Platform`/`LevelObserver` impl) or
// mutated only from task context holding a critical section
// (`last_boost_tick`), which on every supported host excludes the one other
// task context (the manager itself, a singleton) that could observe it.
unsafe impl<const CAP: usize, E: Sync, P: Sync, O: Sync> Sync
    for SchedulerManager<'_, CAP, E, P, O>
{
}

impl<'a, const CAP: usize, E, P, O> SchedulerManager<'a, CAP, E, P, O>
where
    E: EventConsumer,
    P: Platform,
    O: LevelObserver,
{
    pub fn new(table: &'a TaskTable<CAP>, events: &'a E, platform: &'a P, observer: &'a O, config: ManagerConfig) -> Self {
        let now = platform.now_ticks();
        Self {
            table,
            events,
            platform,
            observer,
            config,
            last_boost_tick: core::cell::Cell::new(now),
        }
    }

    /// The configuration this manager was built with, for collaborators
    /// (namely [`crate::control::ControlApi`]) that need the priority
    /// ceiling without duplicating it in their own constructor arguments.
    pub fn config(&self) -> ManagerConfig {
        self.config
    }

    fn host_priority(&self, level: Level) -> HostPriority {
        HostPriority::for_level(self.config.top_priority, level)
    }

    /// The single mutator named in the data model: writes the new level and
    /// its quantum to the table, retunes the host-kernel priority, and fires
    /// the observer, all while holding one critical section. Ordering
    /// matters: the table write happens before the priority write, so a
    /// tick that lands between them (impossible under a real critical
    /// section, but kept explicit for the mock-platform tests that don't
    /// model preemption) never sees a priority that doesn't match the level
    /// already recorded.
    fn set_level(&self, index: usize, new_level: Level) {
        critical_section::with(|_cs| {
            let quantum = self.config.ladder.ticks(new_level);
            self.table.set_level_locked(index, new_level, quantum);
            if let Some(handle) = self.table.handle_at(index) {
                self.platform.set_priority(handle, self.host_priority(new_level));
                self.observer.on_level_change(handle, new_level);
            }
        });
    }

    /// Moves the task at `index` one band down, per the demotion rule:
    /// already-`Low` tasks stay at `Low` (invariant I4 has no floor below
    /// it).
    pub fn demote(&self, index: usize) {
        let Some(current) = self.table.level_at(index) else {
            return;
        };
        let next = current.demoted().unwrap_or(current);
        self.set_level(index, next);
    }

    /// Moves `handle` one band up, per §4.D `promote`: a no-op if the task
    /// isn't registered or is already at `Level::High` (invariant I4 has no
    /// ceiling above it). Unlike `demote`, this is not idempotent at rest --
    /// repeated calls walk a `Low` task up through `Medium` to `High`.
    pub fn promote(&self, handle: TaskHandle) {
        let Some(index) = self.table.find(handle) else {
            return;
        };
        let Some(current) = self.table.level_at(index) else {
            return;
        };
        let Some(next) = current.promoted() else {
            return;
        };
        self.set_level(index, next);
    }

    /// Resets every occupied slot to `Level::High`, the anti-starvation
    /// sweep. Each slot transitions under its own critical section (via
    /// `set_level`) rather than one critical section for the whole table,
    /// matching the data model's framing of `global-boost` as a loop over
    /// `set-level` calls. Unconditional: called on every occupied slot
    /// regardless of its current level, even one already at `Level::High`,
    /// because the burst reset is what invariant I5 actually requires — a
    /// `High` task with a nonzero sub-quantum burst must still have it
    /// zeroed.
    pub fn global_boost(&self) {
        for index in self.table.occupied_indices() {
            self.set_level(index, Level::High);
        }
    }

    fn boost_due(&self, now: u64) -> bool {
        self.config.boost_period_ticks != 0
            && now.saturating_sub(self.last_boost_tick.get()) >= self.config.boost_period_ticks
    }

    /// One iteration of the manager loop body (§2's "Scheduler Manager
    /// Loop"): drain every pending quantum-exhaustion event, demoting each
    /// reported task, then run the anti-starvation boost if its period has
    /// elapsed. Intended to be called after the manager wakes from a
    /// blocking receive on the event channel's notification and/or a timer
    /// for the boost period -- this crate does not prescribe how the host
    /// wiring arranges that wakeup.
    pub fn run_once(&self) {
        while let Some(handle) = self.events.try_recv() {
            if let Some(index) = self.table.find(handle) {
                self.demote(index);
            }
        }

        let now = self.platform.now_ticks();
        if self.boost_due(now) {
            self.global_boost();
            self.last_boost_tick.set(now);
        }
    }
}
