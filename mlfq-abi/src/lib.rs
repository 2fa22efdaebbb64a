//! Shared types for the multi-level feedback queue (MLFQ) scheduling policy.
//!
//! These are the "wire" types that cross the boundary between the tick
//! profiler (ISR context), the scheduler manager (task context), and any
//! external reporting collaborator. Kept separate from `mlfq-core` so that a
//! logger or a host-side tool can depend on the data model alone.

#![no_std]

use num_derive::{FromPrimitive, ToPrimitive};
use zerocopy::{AsBytes, FromBytes, Unaligned};

/// Number of MLFQ bands. Fixed by the policy; not configurable.
pub const NUM_LEVELS: usize = 3;

/// An MLFQ priority band. Lower ordinal is higher scheduling priority.
///
/// Like `abi::Priority`, this deliberately does not implement `PartialOrd` --
/// comparing levels by derived ordering invites confusing "is greater"
/// questions. Use [`Level::ordinal`] and compare integers when you mean it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Level {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Level {
    /// All levels in priority order, highest first.
    pub const ALL: [Level; NUM_LEVELS] = [Level::High, Level::Medium, Level::Low];

    pub const fn ordinal(self) -> usize {
        match self {
            Level::High => 0,
            Level::Medium => 1,
            Level::Low => 2,
        }
    }

    pub const fn from_ordinal(ordinal: usize) -> Option<Self> {
        match ordinal {
            0 => Some(Level::High),
            1 => Some(Level::Medium),
            2 => Some(Level::Low),
            _ => None,
        }
    }

    /// The next lower-priority band, or `None` if already at the floor.
    pub const fn demoted(self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// The next higher-priority band, or `None` if already at the ceiling.
    pub const fn promoted(self) -> Option<Self> {
        match self.ordinal() {
            0 => None,
            n => Self::from_ordinal(n - 1),
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::High
    }
}

/// Per-level tick budgets. The invariant is monotonicity (`High < Medium <
/// Low`); the concrete values are configuration, not policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QuantumLadder([u32; NUM_LEVELS]);

impl QuantumLadder {
    /// Builds a ladder, panicking (at const-eval time, if used in a `const`)
    /// if it is not strictly increasing with level ordinal.
    pub const fn new(high: u32, medium: u32, low: u32) -> Self {
        assert!(high < medium && medium < low, "quantum ladder must be strictly increasing with level ordinal");
        Self([high, medium, low])
    }

    pub const fn ticks(&self, level: Level) -> u32 {
        self.0[level.ordinal()]
    }

    pub const fn is_monotonic(&self) -> bool {
        self.0[0] < self.0[1] && self.0[1] < self.0[2]
    }
}

/// The reference default ladder from the specification: `HIGH=10,
/// MEDIUM=20, LOW=50` ticks. The source repository this policy was drawn
/// from also contained a divergent `{20, 50, 100}` ladder in a duplicated
/// draft file; this is the one that was pinned.
pub const DEFAULT_LADDER: QuantumLadder = QuantumLadder::new(10, 20, 50);

/// Opaque task identity, as handed out by the host kernel. Copy-able,
/// comparable, and small enough to pass by value through an ISR-safe event
/// channel.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromBytes, AsBytes, Unaligned, Default,
)]
#[repr(transparent)]
pub struct TaskHandle(pub u32);

impl TaskHandle {
    /// Sentinel marking an unused task-table slot or an absent manager
    /// handle. No real host-kernel task identity takes this value.
    pub const NONE: Self = Self(u32::MAX);

    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

/// A host-kernel scheduling priority, derived from an MLFQ level by
/// `HostPriority::for_level(top, level)`. Numerically lower is more
/// important, matching the convention of the fixed-priority kernels this
/// policy is designed to run on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HostPriority(pub u8);

impl HostPriority {
    /// `top - ordinal(level)`, per the host priority mapping in the data
    /// model section of the policy design.
    pub const fn for_level(top: u8, level: Level) -> Self {
        Self(top - level.ordinal() as u8)
    }

    /// The priority the scheduler manager's own task runs at: `top + 1`, so
    /// it always preempts any policy-managed task.
    pub const fn manager_priority(top: u8) -> Self {
        Self(top + 1)
    }
}

/// Read-only snapshot of one task-table slot, suitable for copying out to an
/// external reporting collaborator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromBytes, AsBytes, Default)]
#[repr(C)]
pub struct TaskRecord {
    pub handle: TaskHandle,
    pub level: u8,
    pub arrival_tick: u64,
    pub burst_ticks: u32,
    pub quantum_ticks: u32,
}

impl TaskRecord {
    pub fn level(&self) -> Option<Level> {
        num_traits::FromPrimitive::from_u8(self.level)
    }
}

/// Outcome of `register`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterOutcome {
    Ok,
    /// The task table has no empty slots left.
    Full,
    /// The handle is already present in the table.
    Duplicate,
}

