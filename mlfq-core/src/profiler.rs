//! The tick profiler: the timer-ISR-context accountant (§4.B).
//!
//! `TickProfiler::tick` is the single entry point, invoked once per host
//! tick from timer-interrupt context. It is wait-free and bounded: one
//! linear scan of the task table, no suspension, no critical section (the
//! fields it touches are the atomic ones in [`crate::table::TaskTable`]).

use core::sync::atomic::{AtomicU32, Ordering};

use mlfq_abi::TaskHandle;

use crate::channel::EventProducer;
use crate::platform::Platform;
use crate::table::TaskTable;

const NO_MANAGER: u32 = u32::MAX;

/// Outcome of one `tick()` call, for the caller (typically the ISR
/// trampoline) to act on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickOutcome {
    /// A higher-priority task (the scheduler manager) may now be runnable;
    /// the ISR should request a context switch on return, per step 5 of the
    /// algorithm.
    pub wake_manager: bool,
}

impl TickOutcome {
    const NONE: Self = Self {
        wake_manager: false,
    };
}

/// ISR-context accountant. Borrowed (not owned) by whatever glue code wires
/// it to the host kernel's timer interrupt.
pub struct TickProfiler<'a, const CAP: usize, E, P> {
    table: &'a TaskTable<CAP>,
    events: &'a E,
    platform: &'a P,
    // Index of the scheduler manager's own task-table-unrelated identity,
    // encoded as `TaskHandle.0`, or `NO_MANAGER`. Atomic because
    // `start_manager` is called from task context while `tick` reads it
    // from ISR context.
    manager: AtomicU32,
}

impl<'a, const CAP: usize, E: EventProducer, P: Platform> TickProfiler<'a, CAP, E, P> {
    pub const fn new(table: &'a TaskTable<CAP>, events: &'a E, platform: &'a P) -> Self {
        Self {
            table,
            events,
            platform,
            manager: AtomicU32::new(NO_MANAGER),
        }
    }

    /// Registers the scheduler manager's own host-task handle so it can be
    /// notified directly from ISR context (§4.E `start_manager`).
    pub fn set_manager(&self, handle: TaskHandle) {
        self.manager.store(handle.0, Ordering::Relaxed);
    }

    fn has_manager(&self) -> bool {
        self.manager.load(Ordering::Relaxed) != NO_MANAGER
    }

    /// The per-tick algorithm of §4.B. `running` is whatever the host kernel
    /// reports as the currently-running task, or `None` if idle.
    pub fn tick(&self, running: Option<TaskHandle>) -> TickOutcome {
        let Some(handle) = running else {
            return TickOutcome::NONE;
        };
        let Some(index) = self.table.find_for_isr(handle) else {
            // Tick belongs to an unmanaged task; no accounting (step 2).
            return TickOutcome::NONE;
        };

        let expired = self.table.isr_tick(index).unwrap_or(false);
        if !expired {
            return TickOutcome::NONE;
        }

        // Step 4: publish the event, then wake the manager directly if one
        // is registered -- the event channel alone may not be enough to
        // bring it out of a blocking receive before the next tick.
        self.events.publish(handle);
        if self.has_manager() {
            self.platform.notify_manager();
            return TickOutcome { wake_manager: true };
        }
        TickOutcome::NONE
    }
}
