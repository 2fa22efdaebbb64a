//! The abstraction boundary between the policy and its host kernel.
//!
//! Any real-time kernel that can implement this trait -- a monotonic tick
//! counter, millisecond-to-tick conversion, and a non-blocking priority set
//! -- can host the MLFQ policy. Production code wires this to the real
//! kernel contract (see `task-mlfq-scheduler`); tests wire it to a handful of
//! cells.

use mlfq_abi::{HostPriority, Level, TaskHandle};

/// Host-kernel operations the policy needs. Kept intentionally small so a
/// mock implementation is a few lines of code.
pub trait Platform {
    /// Current value of the host kernel's monotonic tick counter.
    fn now_ticks(&self) -> u64;

    /// Converts a millisecond duration into a tick count, using whatever
    /// tick rate the host kernel is configured for.
    fn ms_to_ticks(&self, ms: u32) -> u64;

    /// Sets the host-kernel priority of `task`. Must be non-blocking and
    /// callable from task context holding a critical section.
    fn set_priority(&self, task: TaskHandle, priority: HostPriority);

    /// Raises an ISR-safe direct notification to the scheduler manager task,
    /// if one has been registered with [`crate::ControlApi::start_manager`].
    /// Idempotent: raising it twice before it's observed has the same effect
    /// as raising it once.
    fn notify_manager(&self);
}

/// Optional observer of level transitions, for side effects that are not
/// part of policy correctness (the reference implementation drives a status
/// LED from this).
pub trait LevelObserver {
    fn on_level_change(&self, task: TaskHandle, level: Level);
}

/// An observer that does nothing, for platforms with no such indicator.
pub struct NoObserver;

impl LevelObserver for NoObserver {
    fn on_level_change(&self, _task: TaskHandle, _level: Level) {}
}
