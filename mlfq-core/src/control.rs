//! The public control surface (§4.E): the only thing application code and
//! the host-kernel glue should touch directly.
//!
//! `ControlApi` ties a task table, an event channel, a scheduler manager,
//! and a tick profiler together into one handle. The pieces it wraps are
//! still independently testable -- see `manager.rs` and `profiler.rs` --
//! but nothing outside this module should need to reach into them.

use mlfq_abi::{QuantumLadder, RegisterOutcome, TaskHandle, TaskRecord};

use crate::channel::{EventConsumer, EventProducer};
use crate::manager::SchedulerManager;
use crate::platform::{LevelObserver, Platform};
use crate::profiler::TickProfiler;
use crate::table::{RegisterError, TaskTable};

/// Handle bundling the four collaborators a host binds together once, at
/// startup, typically as `'static` references into statically-allocated
/// storage (the embedded idiom this crate is meant to be used under).
pub struct ControlApi<'a, const CAP: usize, E, P, O> {
    table: &'a TaskTable<CAP>,
    manager: &'a SchedulerManager<'a, CAP, E, P, O>,
    profiler: &'a TickProfiler<'a, CAP, E, P>,
    platform: &'a P,
    ladder: QuantumLadder,
}

impl<'a, const CAP: usize, E, P, O> ControlApi<'a, CAP, E, P, O>
where
    E: EventProducer + EventConsumer,
    P: Platform,
    O: LevelObserver,
{
    /// The control API's `init` (§4.E): binds a control handle over
    /// already-constructed collaborators. `table`, `manager`, and
    /// `profiler` are expected to have just been constructed by the host's
    /// own startup sequence, with `table` empty -- that construction is
    /// what zeroes the table and creates the event channel, per §4.E's
    /// "zero the table, create the event channel, clear the Scheduler
    /// Manager handle" (the third of those three, `TickProfiler`'s manager
    /// handle, defaults to "none" in `TickProfiler::new`).
    ///
    /// Unlike the `ok|fail` outcome §4.E specifies, this cannot fail, so it
    /// returns `Self` rather than a `Result`: the table and event channel
    /// this crate provides are plain `const`-constructible values over
    /// inline storage (`TaskTable`'s array of slots, `heapless::mpmc`'s
    /// fixed buffer), not a runtime allocation that a host kernel's queue-
    /// creation primitive could refuse. §7's "init failure: event-channel
    /// allocation fails" describes a host kernel whose channel primitive is
    /// a fallible allocator; this crate's static-allocation strategy has no
    /// equivalent failure mode, so there is deliberately no error type for
    /// one here.
    pub fn init(
        table: &'a TaskTable<CAP>,
        manager: &'a SchedulerManager<'a, CAP, E, P, O>,
        profiler: &'a TickProfiler<'a, CAP, E, P>,
        platform: &'a P,
        ladder: QuantumLadder,
    ) -> Self {
        Self {
            table,
            manager,
            profiler,
            platform,
            ladder,
        }
    }

    /// Registers a newly-arrived task at `Level::High` (table invariant
    /// I2). Returns [`RegisterOutcome::Full`] once every slot is occupied
    /// and [`RegisterOutcome::Duplicate`] if `handle` is already present
    /// (I3); neither is treated as an error the caller must propagate,
    /// matching the policy's refusal to ever block or panic here.
    pub fn register(&self, handle: TaskHandle) -> RegisterOutcome {
        let arrival = self.platform.now_ticks();
        let quantum = self.ladder.ticks(mlfq_abi::Level::High);
        match self.table.register(handle, arrival, quantum) {
            Ok(_index) => {
                let top = self.manager.config().top_priority;
                self.platform
                    .set_priority(handle, mlfq_abi::HostPriority::for_level(top, mlfq_abi::Level::High));
                RegisterOutcome::Ok
            }
            Err(RegisterError::Full) => RegisterOutcome::Full,
            Err(RegisterError::Duplicate) => RegisterOutcome::Duplicate,
            Err(RegisterError::NoneHandle) => RegisterOutcome::Full,
        }
    }

    /// Explicit promotion hook (§4.D `promote`), for an application that
    /// classifies a task as interactive by means outside this crate's
    /// scope. A no-op if `handle` is unregistered or already `Level::High`.
    pub fn promote(&self, handle: TaskHandle) {
        self.manager.promote(handle);
    }

    /// Read-only snapshot of one task-table slot, for an external reporting
    /// collaborator. Never mutates policy state.
    pub fn stats(&self, index: usize) -> Option<TaskRecord> {
        self.table.snapshot(index)
    }

    /// Registers the scheduler manager's own host-task handle with the tick
    /// profiler, so quantum-exhaustion events reach it via direct
    /// notification and not only the event channel.
    pub fn start_manager(&self, handle: TaskHandle) {
        self.profiler.set_manager(handle);
    }

    /// Runs one manager-loop iteration: drains pending demotions and, if
    /// due, sweeps the anti-starvation boost. The host's scheduler-manager
    /// task calls this each time it wakes.
    pub fn run_once(&self) {
        self.manager.run_once();
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }
}
