//! The low-level kernel interface to be implemented by a kernel implementor.
//!
//! # Safety
//!
//! Most traits in this module are `unsafe trait` because they have to be
//! trustworthy to be able to build sound memory-safety-critical abstractions on
//! top of them. In particular, a kernel must not retain a pointer passed to a
//! `raw_*_create_static` method after the object is deleted, and must invoke
//! task and timer callbacks with exactly the context value they were created
//! with.
//!
//! The trait methods that operate on a given [`Id`] are all defined as `unsafe
//! fn` as the caller is responsible for passing an ID that refers to a live
//! object. Passing a deleted or foreign ID is undefined behavior unless the
//! kernel documents otherwise.
//!
//! Task IDs are the exception. A [`TaskRef`](super::TaskRef) does not keep
//! its task alive, so the `raw_task_*` methods must accept the ID of a task
//! that has been deleted: deleting it again does nothing, and
//! [`KernelTask::raw_task_state`] reports [`TaskState::Deleted`].
use core::{ffi::c_void, fmt, hash::Hash};

use super::ResultCode;

/// A group of traits that must be implemented by kernel object ID types,
/// including [`KernelBase::RawTaskId`].
pub trait Id: fmt::Debug + Copy + Eq + Ord + Hash + Send + Sync + 'static {}
impl<T: ?Sized + fmt::Debug + Copy + Eq + Ord + Hash + Send + Sync + 'static> Id for T {}

/// The kernel's tick counter type.
#[cfg(not(feature = "tick16"))]
pub type TickType = u32;

/// The kernel's tick counter type.
#[cfg(feature = "tick16")]
pub type TickType = u16;

/// The timeout value representing "wait forever".
pub const MAX_DELAY: TickType = TickType::MAX;

/// Task priority. Larger values represent higher priorities. `0` is the
/// priority of the idle task.
pub type Priority = usize;

/// A stack size measured in [`KernelTask::RawStackType`] words.
pub type StackDepth = usize;

/// The native representation of event group bits. Only the lower
/// [`EVENT_BITS_WIDTH`](super::EVENT_BITS_WIDTH) bits are usable; the rest
/// are reserved by the kernel.
pub type RawEventBits = TickType;

/// The entry point of a task. Receives the context value passed to
/// [`KernelTask::raw_task_create`].
pub type TaskEntryFn = unsafe fn(param: *mut c_void);

/// The callback of a software timer. Receives the timer's own ID, from
/// which the callback retrieves the context value through
/// [`KernelTimer::raw_timer_context`].
pub type TimerCallbackFn<TimerId> = unsafe fn(timer: TimerId);

/// The version of a kernel implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// The state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// The scheduler is running but context switches are held off by
    /// [`Kernel::suspend_all`](super::Kernel::suspend_all).
    Suspended,
    /// The scheduler has not been started, or has been stopped.
    NotStarted,
    /// The scheduler is running.
    Running,
}

/// The state of a task as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task is querying its own state.
    Running,
    /// The task is ready to run.
    Ready,
    /// The task is waiting for an event or a timeout.
    Blocked,
    /// The task is suspended.
    Suspended,
    /// The task was deleted but its control block has not been reclaimed yet.
    Deleted,
    /// The handle does not refer to a task.
    Invalid,
}

/// The action a notifier applies to the target task's notification value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyAction {
    /// Make the slot pending without touching its value.
    NoAction,
    /// Bitwise-OR the value into the slot's value.
    SetBits,
    /// Increment the slot's value. The supplied value is ignored.
    Increment,
    /// Overwrite the slot's value unconditionally.
    SetValueWithOverwrite,
    /// Overwrite the slot's value only if no value is pending. Fails with
    /// [`ResultCode::QueueOverflow`] otherwise.
    SetValueWithoutOverwrite,
}

/// Where [`KernelQueue::raw_queue_send`] places an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendPosition {
    Back,
    Front,
    /// Replace the only item of a length-1 queue, or insert into it if it's
    /// empty. Never fails and never blocks.
    Overwrite,
}

/// The flavor of a semaphore-family object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreKind {
    /// A binary semaphore, created empty.
    Binary,
    /// A counting semaphore.
    Counting { max: usize, initial: usize },
    /// A mutex with priority inheritance, created available.
    Mutex,
    /// A mutex whose lock is counted per owning task.
    RecursiveMutex,
}

/// The flavor of a stream-buffer-family object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamBufferKind {
    /// Bytes are transferred as a stream.
    Stream,
    /// Discrete messages are transferred whole, each prefixed by a length
    /// field of [`KernelStreamBuffer::RAW_MESSAGE_LENGTH_BYTES`] bytes.
    Message,
}

/// A command delivered to a software timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerCommand {
    Start,
    Stop,
    Reset,
    ChangePeriod(TickType),
    Delete,
}

bitflags::bitflags! {
    /// Options for [`EventGroup::wait`][1].
    ///
    /// [1]: super::EventGroup::wait
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EventGroupWaitFlags: u8 {
        /// Wait for all of the specified bits to be set.
        const ALL = 1 << 0;

        /// Clear the specified bits after waiting for them.
        const CLEAR = 1 << 1;
    }
}

/// Provides access to the minimal API exposed by a kernel: scheduler control,
/// tick accounting, critical sections, and delays.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelBase: fmt::Debug + Copy + Sized + Send + Sync + 'static {
    /// The type to identify tasks.
    type RawTaskId: Id;

    /// The saved interrupt state returned by
    /// [`raw_enter_critical_from_isr`](Self::raw_enter_critical_from_isr).
    type RawInterruptMask: fmt::Debug + Copy + Send + Sync + 'static;

    /// The number of priority levels. Valid priorities are
    /// `0..RAW_MAX_PRIORITIES`.
    const RAW_MAX_PRIORITIES: Priority;

    /// The smallest stack depth the kernel accepts for a task.
    const RAW_MINIMAL_STACK_SIZE: StackDepth;

    /// The version of the kernel implementation.
    const RAW_KERNEL_VERSION: KernelVersion;

    /// The version string of the kernel implementation. A trailing `+`
    /// marks a development version.
    const RAW_KERNEL_VERSION_NUMBER: &'static str;

    /// Implements [`Kernel::start_scheduler`][1].
    ///
    /// [1]: super::Kernel::start_scheduler
    fn raw_start_scheduler();

    /// Implements [`Kernel::end_scheduler`][1].
    ///
    /// [1]: super::Kernel::end_scheduler
    fn raw_end_scheduler();

    /// Implements [`Kernel::suspend_all`][1].
    ///
    /// [1]: super::Kernel::suspend_all
    fn raw_suspend_all();

    /// Implements [`Kernel::resume_all`][1].
    ///
    /// [1]: super::Kernel::resume_all
    fn raw_resume_all() -> bool;

    /// Implements [`Kernel::scheduler_state`][1].
    ///
    /// [1]: super::Kernel::scheduler_state
    fn raw_scheduler_state() -> SchedulerState;

    /// Implements [`Kernel::number_of_tasks`][1].
    ///
    /// [1]: super::Kernel::number_of_tasks
    fn raw_number_of_tasks() -> usize;

    fn raw_tick_count() -> TickType;

    fn raw_tick_count_from_isr() -> TickType;

    /// Implements [`Kernel::idle_run_time_counter`][1].
    ///
    /// [1]: super::Kernel::idle_run_time_counter
    fn raw_idle_run_time_counter() -> TickType;

    /// Advance the tick count after a tickless idle period.
    fn raw_step_tick(ticks: TickType);

    /// Account for ticks that elapsed while the tick interrupt was masked.
    /// Returns `true` if a context switch is required.
    fn raw_catch_up_ticks(ticks: TickType) -> bool;

    fn raw_yield();

    /// Request a context switch on return from the current interrupt handler
    /// if `switch_required` is `true`.
    fn raw_yield_from_isr(switch_required: bool);

    fn raw_enter_critical();

    /// # Safety
    ///
    /// Must be paired with a preceding call to
    /// [`raw_enter_critical`](Self::raw_enter_critical).
    unsafe fn raw_exit_critical();

    fn raw_enter_critical_from_isr() -> Self::RawInterruptMask;

    /// # Safety
    ///
    /// `mask` must be the value returned by the matching call to
    /// [`raw_enter_critical_from_isr`](Self::raw_enter_critical_from_isr).
    unsafe fn raw_exit_critical_from_isr(mask: Self::RawInterruptMask);

    fn raw_disable_interrupts();

    /// # Safety
    ///
    /// Re-enabling interrupts inside a critical section breaks the critical
    /// section.
    unsafe fn raw_enable_interrupts();

    /// Return a flag indicating whether the current context is an interrupt
    /// context.
    fn raw_is_interrupt_context() -> bool;

    /// Get the task running in the current context, if any.
    fn raw_task_current() -> Option<Self::RawTaskId>;

    /// Block the current task for `ticks` ticks.
    fn raw_delay(ticks: TickType);

    /// Block the current task until `*previous_wake_time + increment` and
    /// advance `*previous_wake_time` by `increment`. Returns `false` without
    /// blocking if the wake time has already passed.
    fn raw_delay_until(previous_wake_time: &mut TickType, increment: TickType) -> bool;
}

/// Provides task creation, inspection, and direct-to-task notifications.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelTask: KernelBase {
    /// The control block embedded by [`StaticTask`](super::StaticTask).
    type RawStaticTaskCb: 'static;

    /// The unit of a task stack.
    type RawStackType: 'static;

    /// The number of notification slots owned by each task.
    const RAW_NOTIFICATION_ARRAY_ENTRIES: usize;

    /// Create a task whose control block and stack are allocated from the
    /// kernel heap. The new task calls `entry(param)` when first dispatched.
    ///
    /// # Safety
    ///
    /// `param` must remain valid for as long as the task exists.
    unsafe fn raw_task_create(
        entry: TaskEntryFn,
        name: &'static str,
        stack_depth: StackDepth,
        param: *mut c_void,
        priority: Priority,
    ) -> Result<Self::RawTaskId, ResultCode>;

    /// Create a task using caller-provided memory.
    ///
    /// # Safety
    ///
    /// `param`, `stack` (`stack_depth` elements), and `cb` must remain valid
    /// and must not be accessed by the caller for as long as the task exists.
    #[allow(clippy::too_many_arguments)]
    unsafe fn raw_task_create_static(
        entry: TaskEntryFn,
        name: &'static str,
        stack_depth: StackDepth,
        param: *mut c_void,
        priority: Priority,
        stack: *mut Self::RawStackType,
        cb: *mut Self::RawStaticTaskCb,
    ) -> Result<Self::RawTaskId, ResultCode>;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_delete(this: Self::RawTaskId);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_priority(this: Self::RawTaskId) -> Priority;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_set_priority(this: Self::RawTaskId, priority: Priority);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_suspend(this: Self::RawTaskId);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_resume(this: Self::RawTaskId);

    /// Returns `true` if the resumed task should preempt the interrupted one.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_resume_from_isr(this: Self::RawTaskId) -> bool;

    /// Force a task out of a time-based delay.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_abort_delay(this: Self::RawTaskId) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_state(this: Self::RawTaskId) -> TaskState;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_name(this: Self::RawTaskId) -> &'static str;

    /// The minimum amount of free stack space observed since the task
    /// started.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_stack_high_water_mark(this: Self::RawTaskId) -> StackDepth;

    /// Look up a task by name. The search is linear and intended for
    /// debugging.
    fn raw_task_by_name(name: &str) -> Option<Self::RawTaskId>;

    /// Get the idle task. Returns `None` before the scheduler is started.
    fn raw_task_idle() -> Option<Self::RawTaskId>;

    /// Apply `action` to a notification slot of `this`, storing the slot's
    /// previous value to `previous` if given.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_notify(
        this: Self::RawTaskId,
        index: usize,
        action: NotifyAction,
        value: u32,
        previous: Option<&mut u32>,
    ) -> ResultCode;

    /// The interrupt-context form of [`raw_task_notify`](Self::raw_task_notify).
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_notify_from_isr(
        this: Self::RawTaskId,
        index: usize,
        action: NotifyAction,
        value: u32,
        previous: Option<&mut u32>,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// Increment a notification slot from an interrupt context.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_notify_give_from_isr(
        this: Self::RawTaskId,
        index: usize,
        higher_priority_task_woken: &mut bool,
    );

    /// Wait for a notification slot of the current task to become pending.
    /// Clears `clear_on_entry` bits if no value is pending on entry and
    /// `clear_on_exit` bits on success. `value` receives the slot's value
    /// (before `clear_on_exit` is applied) whether or not the wait succeeds.
    fn raw_task_notify_wait(
        index: usize,
        clear_on_entry: u32,
        clear_on_exit: u32,
        value: &mut u32,
        ticks: TickType,
    ) -> ResultCode;

    /// Use a notification slot of the current task as a counting semaphore.
    /// Returns the slot's value before it was decremented or cleared, or `0`
    /// on timeout.
    fn raw_task_notify_take(index: usize, clear_count_on_exit: bool, ticks: TickType) -> u32;

    /// Make a notification slot not pending. Returns `true` if it was
    /// pending.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_notify_state_clear(this: Self::RawTaskId, index: usize) -> bool;

    /// Clear `bits` in a notification slot. Returns the previous value.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_task_notify_value_clear(this: Self::RawTaskId, index: usize, bits: u32) -> u32;
}

/// Provides software timers, which are serviced by a kernel-owned timer
/// service task.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelTimer: KernelTask {
    /// The type to identify timers.
    type RawTimerId: Id;

    /// The control block embedded by [`StaticTimer`](super::StaticTimer).
    type RawStaticTimerCb: 'static;

    /// The priority of the timer service task, which runs timer callbacks.
    const RAW_TIMER_TASK_PRIORITY: Priority;

    /// Create a dormant timer. `callback` is called from the timer service
    /// task on every expiry.
    ///
    /// # Safety
    ///
    /// `context` must remain valid for as long as the timer exists.
    unsafe fn raw_timer_create(
        name: &'static str,
        period: TickType,
        auto_reload: bool,
        context: *mut c_void,
        callback: TimerCallbackFn<Self::RawTimerId>,
    ) -> Result<Self::RawTimerId, ResultCode>;

    /// Create a dormant timer using caller-provided memory.
    ///
    /// # Safety
    ///
    /// `context` and `cb` must remain valid for as long as the timer exists.
    unsafe fn raw_timer_create_static(
        name: &'static str,
        period: TickType,
        auto_reload: bool,
        context: *mut c_void,
        callback: TimerCallbackFn<Self::RawTimerId>,
        cb: *mut Self::RawStaticTimerCb,
    ) -> Result<Self::RawTimerId, ResultCode>;

    /// Get the context value the timer was created with.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_context(this: Self::RawTimerId) -> *mut c_void;

    /// Deliver a command to the timer service task, waiting up to `ticks`
    /// ticks for the command to be accepted.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_command(
        this: Self::RawTimerId,
        command: TimerCommand,
        ticks: TickType,
    ) -> ResultCode;

    /// The interrupt-context form of
    /// [`raw_timer_command`](Self::raw_timer_command).
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_command_from_isr(
        this: Self::RawTimerId,
        command: TimerCommand,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_is_active(this: Self::RawTimerId) -> bool;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_set_reload_mode(this: Self::RawTimerId, auto_reload: bool);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_reload_mode(this: Self::RawTimerId) -> bool;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_name(this: Self::RawTimerId) -> &'static str;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_period(this: Self::RawTimerId) -> TickType;

    /// The tick count at which the timer expires next.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_timer_expiry_time(this: Self::RawTimerId) -> TickType;
}

/// Provides fixed-length queues of fixed-size items, copied by value.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelQueue: KernelBase {
    /// The type to identify queues.
    type RawQueueId: Id;

    /// The control block embedded by [`StaticQueue`](super::StaticQueue).
    type RawStaticQueueCb: 'static;

    fn raw_queue_create(length: usize, item_size: usize) -> Result<Self::RawQueueId, ResultCode>;

    /// # Safety
    ///
    /// `storage` (`length * item_size` bytes) and `cb` must remain valid and
    /// must not be accessed by the caller for as long as the queue exists.
    unsafe fn raw_queue_create_static(
        length: usize,
        item_size: usize,
        storage: *mut u8,
        cb: *mut Self::RawStaticQueueCb,
    ) -> Result<Self::RawQueueId, ResultCode>;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_delete(this: Self::RawQueueId);

    /// Copy `item_size` bytes from `item` into the queue.
    ///
    /// # Safety
    ///
    /// `item` must be valid for reading `item_size` bytes.
    unsafe fn raw_queue_send(
        this: Self::RawQueueId,
        item: *const u8,
        position: SendPosition,
        ticks: TickType,
    ) -> ResultCode;

    /// # Safety
    ///
    /// `item` must be valid for reading `item_size` bytes.
    unsafe fn raw_queue_send_from_isr(
        this: Self::RawQueueId,
        item: *const u8,
        position: SendPosition,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// Move the front item into `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for writing `item_size` bytes.
    unsafe fn raw_queue_receive(
        this: Self::RawQueueId,
        buffer: *mut u8,
        ticks: TickType,
    ) -> ResultCode;

    /// # Safety
    ///
    /// `buffer` must be valid for writing `item_size` bytes.
    unsafe fn raw_queue_receive_from_isr(
        this: Self::RawQueueId,
        buffer: *mut u8,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// Copy the front item into `buffer` without removing it.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for writing `item_size` bytes.
    unsafe fn raw_queue_peek(this: Self::RawQueueId, buffer: *mut u8, ticks: TickType)
        -> ResultCode;

    /// # Safety
    ///
    /// `buffer` must be valid for writing `item_size` bytes.
    unsafe fn raw_queue_peek_from_isr(this: Self::RawQueueId, buffer: *mut u8) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_messages_waiting(this: Self::RawQueueId) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_messages_waiting_from_isr(this: Self::RawQueueId) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_spaces_available(this: Self::RawQueueId) -> usize;

    /// Discard all items.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_reset(this: Self::RawQueueId);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_is_full_from_isr(this: Self::RawQueueId) -> bool;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_is_empty_from_isr(this: Self::RawQueueId) -> bool;

    /// Associate a name with the queue for kernel-aware debuggers.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_add_to_registry(this: Self::RawQueueId, name: &'static str);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_unregister(this: Self::RawQueueId);

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_queue_name(this: Self::RawQueueId) -> Option<&'static str>;
}

/// Provides binary and counting semaphores and mutexes, which share one
/// object type in the kernel.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelSemaphore: KernelBase {
    /// The type to identify semaphores and mutexes.
    type RawSemaphoreId: Id;

    /// The control block embedded by the static semaphore and mutex variants.
    type RawStaticSemaphoreCb: 'static;

    fn raw_semaphore_create(kind: SemaphoreKind) -> Result<Self::RawSemaphoreId, ResultCode>;

    /// # Safety
    ///
    /// `cb` must remain valid and must not be accessed by the caller for as
    /// long as the semaphore exists.
    unsafe fn raw_semaphore_create_static(
        kind: SemaphoreKind,
        cb: *mut Self::RawStaticSemaphoreCb,
    ) -> Result<Self::RawSemaphoreId, ResultCode>;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_delete(this: Self::RawSemaphoreId);

    /// Take the semaphore. For a mutex, this records the caller as the
    /// holder and engages priority inheritance while others wait.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_take(this: Self::RawSemaphoreId, ticks: TickType) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_take_from_isr(
        this: Self::RawSemaphoreId,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_give(this: Self::RawSemaphoreId) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_give_from_isr(
        this: Self::RawSemaphoreId,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// Take a recursive mutex, incrementing its lock count if the caller
    /// already holds it.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_take_recursive(
        this: Self::RawSemaphoreId,
        ticks: TickType,
    ) -> ResultCode;

    /// Decrement a recursive mutex's lock count, releasing it when the count
    /// reaches zero.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_give_recursive(this: Self::RawSemaphoreId) -> ResultCode;

    /// The current count. For a mutex, `1` if available.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_count(this: Self::RawSemaphoreId) -> usize;

    /// The task holding a mutex.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_semaphore_holder(this: Self::RawSemaphoreId) -> Option<Self::RawTaskId>;
}

/// Provides event groups.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelEventGroup: KernelBase {
    /// The type to identify event groups.
    type RawEventGroupId: Id;

    /// The control block embedded by
    /// [`StaticEventGroup`](super::StaticEventGroup).
    type RawStaticEventGroupCb: 'static;

    fn raw_event_group_create() -> Result<Self::RawEventGroupId, ResultCode>;

    /// # Safety
    ///
    /// `cb` must remain valid and must not be accessed by the caller for as
    /// long as the event group exists.
    unsafe fn raw_event_group_create_static(
        cb: *mut Self::RawStaticEventGroupCb,
    ) -> Result<Self::RawEventGroupId, ResultCode>;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_delete(this: Self::RawEventGroupId);

    /// Wait for any (or, with [`EventGroupWaitFlags::ALL`], all) of `bits`.
    /// Returns the bits at the moment the wait condition was satisfied or
    /// the timeout expired, before they are cleared by
    /// [`EventGroupWaitFlags::CLEAR`].
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_wait(
        this: Self::RawEventGroupId,
        bits: RawEventBits,
        flags: EventGroupWaitFlags,
        ticks: TickType,
    ) -> RawEventBits;

    /// Set `bits`, waking tasks whose conditions are met. Returns the bits
    /// after waiting tasks were released (and bits cleared on their behalf).
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_set(
        this: Self::RawEventGroupId,
        bits: RawEventBits,
    ) -> RawEventBits;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_set_from_isr(
        this: Self::RawEventGroupId,
        bits: RawEventBits,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode;

    /// Clear `bits`. Returns the bits before they were cleared.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_clear(
        this: Self::RawEventGroupId,
        bits: RawEventBits,
    ) -> RawEventBits;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_clear_from_isr(
        this: Self::RawEventGroupId,
        bits: RawEventBits,
    ) -> ResultCode;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_get(this: Self::RawEventGroupId) -> RawEventBits;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_get_from_isr(this: Self::RawEventGroupId) -> RawEventBits;

    /// Atomically set `set` and wait for all of `wait_for`, clearing
    /// `wait_for` on success (a rendezvous).
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_event_group_sync(
        this: Self::RawEventGroupId,
        set: RawEventBits,
        wait_for: RawEventBits,
        ticks: TickType,
    ) -> RawEventBits;
}

/// Provides single-writer, single-reader byte streams and message buffers.
///
/// # Safety
///
/// See the [Safety](self#safety) section of the module documentation.
pub unsafe trait KernelStreamBuffer: KernelBase {
    /// The type to identify stream buffers and message buffers.
    type RawStreamBufferId: Id;

    /// The control block embedded by the static stream and message buffer
    /// variants.
    type RawStaticStreamBufferCb: 'static;

    /// The number of bytes of the length field stored in front of each
    /// message in a message buffer.
    const RAW_MESSAGE_LENGTH_BYTES: usize;

    fn raw_stream_buffer_create(
        size: usize,
        trigger_level: usize,
        kind: StreamBufferKind,
    ) -> Result<Self::RawStreamBufferId, ResultCode>;

    /// # Safety
    ///
    /// `storage` (`size` bytes) and `cb` must remain valid and must not be
    /// accessed by the caller for as long as the buffer exists.
    unsafe fn raw_stream_buffer_create_static(
        size: usize,
        trigger_level: usize,
        kind: StreamBufferKind,
        storage: *mut u8,
        cb: *mut Self::RawStaticStreamBufferCb,
    ) -> Result<Self::RawStreamBufferId, ResultCode>;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_delete(this: Self::RawStreamBufferId);

    /// Returns the number of bytes written. A message buffer writes the whole
    /// message or nothing.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_send(
        this: Self::RawStreamBufferId,
        data: &[u8],
        ticks: TickType,
    ) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_send_from_isr(
        this: Self::RawStreamBufferId,
        data: &[u8],
        higher_priority_task_woken: &mut bool,
    ) -> usize;

    /// Returns the number of bytes read. A message buffer reads one whole
    /// message, or nothing if `buffer` is too small for it.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_receive(
        this: Self::RawStreamBufferId,
        buffer: &mut [u8],
        ticks: TickType,
    ) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_receive_from_isr(
        this: Self::RawStreamBufferId,
        buffer: &mut [u8],
        higher_priority_task_woken: &mut bool,
    ) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_bytes_available(this: Self::RawStreamBufferId) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_spaces_available(this: Self::RawStreamBufferId) -> usize;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_set_trigger_level(
        this: Self::RawStreamBufferId,
        trigger_level: usize,
    ) -> bool;

    /// Discard the contents. Fails if a task is blocked on the buffer.
    ///
    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_reset(this: Self::RawStreamBufferId) -> bool;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_is_empty(this: Self::RawStreamBufferId) -> bool;

    /// # Safety
    ///
    /// See the [Safety](self#safety) section of the module documentation.
    unsafe fn raw_stream_buffer_is_full(this: Self::RawStreamBufferId) -> bool;
}
