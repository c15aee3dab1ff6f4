//! The kernel interface.
//!
//! The raw kernel boundary lives in [`raw`]; everything else in this module
//! is a safe, owning wrapper over it.

#[macro_use]
mod macros;

pub mod bits;
mod error;
pub mod event_group;
mod kernel;
pub mod message_buffer;
pub mod mutex;
pub mod queue;
pub mod raw;
pub mod semaphore;
pub mod stream_buffer;
pub mod task;
pub mod timer;
mod woken;
pub use {
    bits::{Bits, EventBits, NotificationBits, EVENT_BITS_WIDTH},
    error::*,
    event_group::{DynamicEventGroup, EventGroup, EventGroupWaitFlags, StaticEventGroup},
    kernel::*,
    message_buffer::{DynamicMessageBuffer, MessageBuffer, StaticMessageBuffer},
    mutex::{
        DynamicMutex, DynamicRecursiveMutex, Mutex, MutexGuard, RecursiveMutex,
        RecursiveMutexGuard, StaticMutex, StaticRecursiveMutex,
    },
    queue::{DynamicQueue, Queue, StaticQueue},
    raw::{Id, NotifyAction, Priority, StackDepth, TaskState, TickType, MAX_DELAY},
    semaphore::{
        BinarySemaphore, CountingSemaphore, Semaphore, SemaphoreValue, StaticBinarySemaphore,
        StaticCountingSemaphore,
    },
    stream_buffer::{DynamicStreamBuffer, StaticStreamBuffer, StreamBuffer},
    task::{CurrentTask, StaticTask, Task, TaskBuilder, TaskFunction, TaskRef},
    timer::{StaticTimer, Timer, TimerBuilder, TimerFunction},
    woken::HigherPriorityTaskWoken,
};

#[cfg(feature = "alloc")]
pub use {task::DynamicTask, timer::DynamicTimer};

/// The prelude module. This module re-exports [`Kernel`][2] and the other
/// extension traits with impl-only-use (`use ... as _`, [RFC2166][1]).
///
/// [1]: https://rust-lang.github.io/rfcs/2166-impl-only-use.html
/// [2]: crate::kernel::Kernel
pub mod prelude {
    #[doc(no_inline)]
    pub use super::{task::TaskMethods as _, Kernel as _};
}

/// Re-exports all traits defined under this module for convenience.
pub mod traits {
    #[doc(no_inline)]
    pub use super::{
        raw::{
            KernelBase, KernelEventGroup, KernelQueue, KernelSemaphore, KernelStreamBuffer,
            KernelTask, KernelTimer,
        },
        task::{TaskFunction, TaskMethods},
        timer::TimerFunction,
        Kernel,
    };
}
