//! The task table: a fixed-capacity registry of per-task MLFQ metadata.
//!
//! Matches the global-mutable-table pattern of the source this policy was
//! drawn from, but with the non-ISR-visible fields behind a critical section
//! and the ISR-visible fields (`burst_ticks`, `quantum_ticks`) stored as
//! atomic words, per the design notes. The scheduler manager is the sole
//! writer of `level` and `quantum_ticks`; the tick profiler is the sole
//! writer of `burst_ticks`.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

use mlfq_abi::{Level, TaskHandle, TaskRecord};

/// Default task-table capacity (`MAX_TASKS` in the specification).
pub const DEFAULT_MAX_TASKS: usize = 16;

struct Slot {
    // Guarded by a critical section on every access, read or write. These
    // fields are never touched from ISR context.
    handle: UnsafeCell<Option<TaskHandle>>,
    level: UnsafeCell<Level>,
    arrival_tick: UnsafeCell<u64>,
    // Not guarded: the tick profiler increments `burst_ticks` from ISR
    // context without taking the critical section, relying on atomic
    // read-modify-write. The manager resets both of these from inside a
    // critical section, which is sufficient to make a level transition
    // appear atomic from the ISR's point of view (it masks ticks).
    burst_ticks: AtomicU32,
    quantum_ticks: AtomicU32,
}

impl Slot {
    const EMPTY: Slot = Slot {
        handle: UnsafeCell::new(None),
        level: UnsafeCell::new(Level::High),
        arrival_tick: UnsafeCell::new(0),
        burst_ticks: AtomicU32::new(0),
        quantum_ticks: AtomicU32::new(0),
    };
}

// Safety: `handle`, `level`, and `arrival_tick` are only ever read or written
// from inside `critical_section::with`, which on every supported host
// kernel excludes concurrent access (including from ISR context, which never
// touches these three fields at all -- see `TickProfiler`).
unsafe impl Sync for Slot {}

/// Error returned by [`TaskTable::register`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterError {
    /// No empty slot remains.
    Full,
    /// `handle` already occupies a slot (table invariant I3).
    Duplicate,
    /// `handle` was `TaskHandle::NONE`, which is reserved.
    NoneHandle,
}

/// Fixed-capacity registry of task-table slots.
///
/// `CAP` is the compile-time capacity (`MAX_TASKS`); the default
/// configuration uses [`DEFAULT_MAX_TASKS`].
pub struct TaskTable<const CAP: usize> {
    slots: [Slot; CAP],
}

impl<const CAP: usize> TaskTable<CAP> {
    pub const fn new() -> Self {
        Self {
            slots: [Slot::EMPTY; CAP],
        }
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Allocates the first empty slot for `handle`, at `Level::High`, with
    /// `quantum_ticks` set from `ladder_high` (the caller already resolved
    /// the ladder; the table itself has no notion of configuration).
    pub fn register(
        &self,
        handle: TaskHandle,
        arrival_tick: u64,
        quantum_high: u32,
    ) -> Result<usize, RegisterError> {
        if handle.is_none() {
            return Err(RegisterError::NoneHandle);
        }

        critical_section::with(|_cs| {
            if self.find_locked(handle).is_some() {
                return Err(RegisterError::Duplicate);
            }
            let ndx = (0..CAP)
                .find(|&i| unsafe { (*self.slots[i].handle.get()).is_none() })
                .ok_or(RegisterError::Full)?;

            let slot = &self.slots[ndx];
            unsafe {
                *slot.handle.get() = Some(handle);
                *slot.level.get() = Level::High;
                *slot.arrival_tick.get() = arrival_tick;
            }
            slot.burst_ticks.store(0, Ordering::Relaxed);
            slot.quantum_ticks.store(quantum_high, Ordering::Relaxed);
            Ok(ndx)
        })
    }

    /// Linear scan for `handle`, without taking a critical section. Callers
    /// that need a consistent read across multiple fields should wrap this
    /// (and whatever they do with the result) in their own
    /// `critical_section::with`.
    pub fn find(&self, handle: TaskHandle) -> Option<usize> {
        critical_section::with(|_cs| self.find_locked(handle))
    }

    fn find_locked(&self, handle: TaskHandle) -> Option<usize> {
        (0..CAP).find(|&i| unsafe { *self.slots[i].handle.get() } == Some(handle))
    }

    /// Linear scan used from the tick profiler: this does *not* take a
    /// critical section (it would be pointless -- we *are* the interrupt
    /// that the critical section would disable), but only compares
    /// `handle`, which is otherwise only mutated by `register` under a
    /// critical section the ISR always runs to completion before or after,
    /// never during.
    pub(crate) fn find_for_isr(&self, handle: TaskHandle) -> Option<usize> {
        (0..CAP).find(|&i| unsafe { *self.slots[i].handle.get() } == Some(handle))
    }

    pub fn occupied_indices(&self) -> impl Iterator<Item = usize> + '_ {
        critical_section::with(|_cs| {
            let mut found = [false; CAP];
            for (i, f) in found.iter_mut().enumerate() {
                *f = unsafe { (*self.slots[i].handle.get()).is_some() };
            }
            found
        })
        .into_iter()
        .enumerate()
        .filter_map(|(i, occupied)| occupied.then_some(i))
    }

    pub fn handle_at(&self, index: usize) -> Option<TaskHandle> {
        critical_section::with(|_cs| unsafe { *self.slots[index].handle.get() })
    }

    pub fn level_at(&self, index: usize) -> Option<Level> {
        critical_section::with(|_cs| unsafe {
            (*self.slots[index].handle.get()).map(|_| *self.slots[index].level.get())
        })
    }

    /// Reads back a full snapshot for reporting (`stats`, §4.E).
    pub fn snapshot(&self, index: usize) -> Option<TaskRecord> {
        if index >= CAP {
            return None;
        }
        let slot = &self.slots[index];
        critical_section::with(|_cs| {
            let handle = unsafe { *slot.handle.get() }?;
            let level = unsafe { *slot.level.get() };
            let arrival_tick = unsafe { *slot.arrival_tick.get() };
            // Taken inside the same critical section as the non-atomic
            // fields so a concurrent `set_level` can't produce a snapshot
            // mixing an old level with a freshly-reset burst, or vice versa.
            let burst_ticks = slot.burst_ticks.load(Ordering::Relaxed);
            let quantum_ticks = slot.quantum_ticks.load(Ordering::Relaxed);
            Some(TaskRecord {
                handle,
                level: level as u8,
                arrival_tick,
                burst_ticks,
                quantum_ticks,
            })
        })
    }

    /// Tick-profiler entry point: increments the burst counter for the slot
    /// at `index` and reports whether the burst now meets or exceeds the
    /// configured quantum. Lock-free; safe to call from ISR context.
    ///
    /// Returns `None` if `quantum_ticks` is `0` ("not yet configured", per
    /// the data model), which the caller must not treat as expiry.
    pub(crate) fn isr_tick(&self, index: usize) -> Option<bool> {
        let slot = &self.slots[index];
        let burst = slot.burst_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let quantum = slot.quantum_ticks.load(Ordering::Relaxed);
        if quantum == 0 {
            None
        } else {
            Some(burst >= quantum)
        }
    }

    /// The single mutator of MLFQ level (`set-level`, §4.D). Writes level,
    /// quantum, and burst-reset as one critical section so that, from the
    /// ISR's perspective, the transition is indivisible: either the old
    /// quantum/burst or the new quantum with zeroed burst, never a torn mix.
    pub(crate) fn set_level_locked(&self, index: usize, new_level: Level, new_quantum: u32) {
        let slot = &self.slots[index];
        unsafe {
            *slot.level.get() = new_level;
        }
        slot.quantum_ticks.store(new_quantum, Ordering::Relaxed);
        slot.burst_ticks.store(0, Ordering::Relaxed);
    }
}

impl<const CAP: usize> Default for TaskTable<CAP> {
    fn default() -> Self {
        Self::new()
    }
}
