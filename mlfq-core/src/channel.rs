//! The event channel: ISR producer, scheduler-manager consumer.
//!
//! Per the design notes this is exposed as two small traits -- one
//! production call, one consumption call -- so a test can substitute a
//! deterministic in-memory channel. The production implementation is a
//! lock-free bounded queue (`heapless::mpmc::MpMcQueue`), used here in its
//! single-producer/single-consumer mode.

use heapless::mpmc::MpMcQueue;
use mlfq_abi::TaskHandle;

/// ISR-side half of the event channel.
pub trait EventProducer {
    /// Publishes `handle` as having just exhausted its quantum. On overflow,
    /// silently drops the event -- the condition is latched in `burst_ticks`
    /// (which the ISR never resets) and will be re-observed on a later tick.
    fn publish(&self, handle: TaskHandle);
}

/// Manager-side half of the event channel.
pub trait EventConsumer {
    /// Non-blocking dequeue. Returns `None` once the channel is empty.
    fn try_recv(&self) -> Option<TaskHandle>;
}

/// Bounded SPSC handoff from timer-ISR context to the scheduler manager.
///
/// `N` must be a power of two (a constraint of the underlying lock-free
/// queue); the default configuration uses `2 * MAX_TASKS`, which satisfies
/// this for the reference capacities (16 and 32).
pub struct EventChannel<const N: usize> {
    queue: MpMcQueue<TaskHandle, N>,
}

impl<const N: usize> EventChannel<N> {
    pub const fn new() -> Self {
        Self {
            queue: MpMcQueue::new(),
        }
    }
}

impl<const N: usize> Default for EventChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventProducer for EventChannel<N> {
    fn publish(&self, handle: TaskHandle) {
        // `enqueue` takes `&self`; overflow returns the value back to us,
        // which we deliberately drop (§4.B rationale).
        let _ = self.queue.enqueue(handle);
    }
}

impl<const N: usize> EventConsumer for EventChannel<N> {
    fn try_recv(&self) -> Option<TaskHandle> {
        self.queue.dequeue()
    }
}
