//! A multi-level feedback queue (MLFQ) scheduling policy for a host
//! real-time kernel.
//!
//! This crate implements the policy layer only: a fixed-capacity task
//! table, a tick-interrupt accountant, an ISR-to-task event channel, and a
//! task-context manager loop that demotes, promotes, and periodically
//! boosts tasks across three priority bands. It does not implement a
//! kernel -- see [`Platform`] for the boundary -- and it carries no opinion
//! about how a host classifies a task as "interactive" for the explicit
//! promotion hook; that policy decision is left to the application.
//!
//! Built `no_std` so it can run in the tick interrupt of a bare-metal
//! kernel; the `std` feature (enabled automatically under `cfg(test)`) is
//! only needed to pull in `critical-section`'s mutex-backed test
//! implementation.
#![cfg_attr(not(test), no_std)]

mod channel;
mod control;
mod manager;
mod platform;
mod profiler;
mod table;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use channel::{EventChannel, EventConsumer, EventProducer};
pub use control::ControlApi;
pub use manager::{ManagerConfig, SchedulerManager};
pub use platform::{LevelObserver, NoObserver, Platform};
pub use profiler::{TickOutcome, TickProfiler};
pub use table::{RegisterError, TaskTable, DEFAULT_MAX_TASKS};

pub use mlfq_abi::{
    HostPriority, Level, QuantumLadder, RegisterOutcome, TaskHandle, TaskRecord, DEFAULT_LADDER,
    NUM_LEVELS,
};

/// Default event-channel capacity: twice [`DEFAULT_MAX_TASKS`], satisfying
/// the underlying queue's power-of-two constraint for the reference table
/// size.
pub const DEFAULT_EVENT_CAPACITY: usize = DEFAULT_MAX_TASKS * 2;
