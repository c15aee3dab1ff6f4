#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
//! Owning, interrupt-aware bindings for the primitives of a preemptive,
//! tick-driven real-time kernel: tasks, software timers, queues, semaphores
//! and mutexes, event groups, stream buffers, and message buffers.
//!
//! The kernel itself is not part of this crate. It is described by the
//! `unsafe trait`s in [`kernel::raw`], which a kernel implementation (or a
//! simulator such as `rtbind_port_std`) implements on a marker type. Every
//! wrapper in [`kernel`] is generic over that type, conventionally named
//! `System`.
//!
//! # Object handles
//!
//! Each primitive family has a *handle-owning base* (e.g.,
//! [`Queue`](kernel::Queue)) which owns exactly one kernel object and deletes
//! it when dropped. Handles can't be cloned. A handle whose creation failed
//! is *invalid*, which is reported by `is_valid`; invoking any other
//! operation on an invalid handle panics.
//!
//! # Storage strategies
//!
//! Every family comes in two variants:
//!
//!  - A *dynamic* variant (`DynamicQueue`, ...) asks the kernel to allocate
//!    the control block and the backing buffer from the kernel heap.
//!    Creation fails if the heap is exhausted.
//!
//!  - A *static* variant (`StaticQueue`, ...) embeds the control block and
//!    the backing buffer. The kernel retains their addresses, so the object
//!    must stay at a fixed location while registered. This is expressed with
//!    [`Pin`](core::pin::Pin): static variants are constructed by a `const fn
//!    new` and registered by `init(self: Pin<&mut Self>)`. They may live in a
//!    `static` (through [`Pin::static_mut`](core::pin::Pin::static_mut)), in a
//!    `Box`, or on the stack (through [`core::pin::pin!`]).
//!
//! Tasks and timers hand their own address to the kernel as the callback
//! context, so even their dynamic variants are returned as `Pin<Box<_>>`.
//!
//! # Contexts
//!
//! Operations are divided into a *task-context* form, which may block for up
//! to a given number of ticks, and a distinct `*_from_isr` form for
//! interrupt handlers, which never blocks and reports through a
//! [`HigherPriorityTaskWoken`](kernel::HigherPriorityTaskWoken) flag whether
//! the interrupt handler should yield before returning.
#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
pub mod kernel;

/// The prelude module.
pub mod prelude {
    #[doc(no_inline)]
    pub use crate::kernel::prelude::*;
}
