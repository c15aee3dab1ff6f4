//! Tasks
//!
//! A task is created from a [`TaskBuilder`] and a body implementing
//! [`TaskFunction`]. The kernel starts the task through a single trampoline
//! function, which recovers the owning [`Task`] from the context value
//! registered at creation and calls the body in a loop until the task is
//! deleted.
use core::{
    cell::UnsafeCell,
    ffi::c_void,
    fmt, hash,
    marker::{PhantomData, PhantomPinned},
    mem::MaybeUninit,
    ops::Deref,
    pin::Pin,
    ptr::NonNull,
};

#[cfg(feature = "alloc")]
use alloc::boxed::Box;

use super::{
    raw, HigherPriorityTaskWoken, NotificationBits, NotifyAction, Priority, ResultCode,
    StackDepth, TaskState, TickType,
};

/// The body of a task.
///
/// The kernel calls [`run`](Self::run) over and over for as long as the task
/// exists. A task ends by [deleting itself](CurrentTask::delete_self) or by
/// having its owning object dropped.
///
/// Implemented for every `FnMut(&CurrentTask<System>)` closure.
pub trait TaskFunction<System: raw::KernelTask>: Send + 'static {
    fn run(&mut self, task: &CurrentTask<System>);
}

impl<System, F> TaskFunction<System> for F
where
    System: raw::KernelTask,
    F: FnMut(&CurrentTask<System>) + Send + 'static,
{
    #[inline]
    fn run(&mut self, task: &CurrentTask<System>) {
        self(task)
    }
}

/// Owns a single kernel task.
///
/// `Task` is never constructed directly. [`DynamicTask`] and [`StaticTask`]
/// embed one alongside the task body and dereference to it.
pub struct Task<System: raw::KernelTask> {
    handle: Option<System::RawTaskId>,
    /// Only accessed by the task itself.
    previous_wake_time: UnsafeCell<TickType>,
    body: Option<NonNull<dyn TaskFunction<System>>>,
}

// Safety: `previous_wake_time` and `body` are only accessed by the task
//         itself
unsafe impl<System: raw::KernelTask> Send for Task<System> {}
unsafe impl<System: raw::KernelTask> Sync for Task<System> {}

impl<System: raw::KernelTask> Task<System> {
    /// Construct a [`TaskBuilder`] to create a task.
    #[inline]
    pub const fn build() -> TaskBuilder<System> {
        TaskBuilder::new()
    }

    const fn unregistered() -> Self {
        Self {
            handle: None,
            previous_wake_time: UnsafeCell::new(0),
            body: None,
        }
    }

    /// Get a flag indicating whether the kernel task was created
    /// successfully.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub fn raw_id(&self) -> Option<System::RawTaskId> {
        self.handle
    }

    /// Get a non-owning reference to the task.
    #[inline]
    #[track_caller]
    pub fn to_ref(&self) -> TaskRef<System> {
        TaskRef::from_id(self.task_id())
    }

    /// Create the kernel task with `create`, passing the address of `self` as
    /// the context value, and attach `body` to it.
    ///
    /// # Safety
    ///
    /// `self` and `body` must stay in place until `self` is dropped.
    unsafe fn register(
        &mut self,
        body: NonNull<dyn TaskFunction<System>>,
        create: impl FnOnce(*mut c_void) -> Result<System::RawTaskId, ResultCode>,
    ) {
        debug_assert!(self.handle.is_none());
        self.body = Some(body);
        let param = (self as *mut Self).cast();

        // The new task may preempt us as soon as it's created. Hold off
        // context switches until `handle` is stored.
        System::raw_suspend_all();
        match create(param) {
            Ok(id) => self.handle = Some(id),
            Err(e) => log::debug!("Task creation failed: {:?}", e),
        }
        System::raw_resume_all();
    }

    /// The entry point of the kernel task.
    ///
    /// # Safety
    ///
    /// Must be called only once, by the task `self` owns.
    unsafe fn enter(&self) -> ! {
        // Safety: We are the task, which is the only accessor
        unsafe { *self.previous_wake_time.get() = System::raw_tick_count() };

        let Some(id) = System::raw_task_current() else {
            unreachable!("task entry point called outside a task")
        };
        let Some(mut body) = self.body else {
            unreachable!("task started without a body")
        };
        let current = CurrentTask {
            task: NonNull::from(self),
            id,
            _no_send_sync: PhantomData,
        };

        log::trace!("task {:?} entering its body", id);
        loop {
            // Safety: The body is only accessed by this task
            unsafe { body.as_mut() }.run(&current);
        }
    }
}

/// The function registered with the kernel as the entry point of every task.
///
/// # Safety
///
/// `param` must point to the pinned [`Task`] that created the calling task.
unsafe fn task_trampoline<System: raw::KernelTask>(param: *mut c_void) {
    // Safety: Upheld by the caller
    let task = unsafe { &*(param as *const Task<System>) };
    // Safety: The kernel calls the entry point once per task
    unsafe { task.enter() }
}

impl<System: raw::KernelTask> Drop for Task<System> {
    fn drop(&mut self) {
        if let Some(id) = self.handle.take() {
            log::trace!("deleting task {:?}", id);
            // Safety: `self` owned the task, and it's not accessible anymore
            unsafe { System::raw_task_delete(id) };
        }
    }
}

impl<System: raw::KernelTask> fmt::Debug for Task<System> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Task").field(&self.handle).finish()
    }
}

/// A non-owning reference to a task.
///
/// A `TaskRef` does not keep the task alive. Operations on a `TaskRef` of a
/// deleted task report [`TaskState::Deleted`] or have no effect.
pub struct TaskRef<System: raw::KernelTask> {
    id: System::RawTaskId,
    _phantom: PhantomData<System>,
}

impl<System: raw::KernelTask> TaskRef<System> {
    #[inline]
    pub(crate) const fn from_id(id: System::RawTaskId) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub const fn id(self) -> System::RawTaskId {
        self.id
    }

    /// Get the currently running task. Returns `None` if called before the
    /// scheduler is started or from an interrupt handler that interrupted no
    /// task.
    #[inline]
    pub fn current() -> Option<Self> {
        System::raw_task_current().map(Self::from_id)
    }

    /// Get the idle task created by the scheduler.
    #[inline]
    pub fn idle_handle() -> Option<Self> {
        System::raw_task_idle().map(Self::from_id)
    }

    /// Look up a task by name. This performs a linear search and is intended
    /// for debugging.
    #[inline]
    pub fn handle_by_name(name: &str) -> Option<Self> {
        System::raw_task_by_name(name).map(Self::from_id)
    }
}

impl<System: raw::KernelTask> Clone for TaskRef<System> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<System: raw::KernelTask> Copy for TaskRef<System> {}

impl<System: raw::KernelTask> PartialEq for TaskRef<System> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<System: raw::KernelTask> Eq for TaskRef<System> {}

impl<System: raw::KernelTask> hash::Hash for TaskRef<System> {
    #[inline]
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<System: raw::KernelTask> fmt::Debug for TaskRef<System> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("TaskRef").field(&self.id).finish()
    }
}

/// The view of a task from inside its own body.
///
/// Provides the operations only the running task may perform on itself, in
/// addition to [`TaskMethods`].
pub struct CurrentTask<System: raw::KernelTask> {
    task: NonNull<Task<System>>,
    id: System::RawTaskId,
    _no_send_sync: PhantomData<*mut ()>,
}

impl<System: raw::KernelTask> CurrentTask<System> {
    #[inline]
    pub fn id(&self) -> System::RawTaskId {
        self.id
    }

    /// Get the owning [`Task`].
    #[inline]
    pub fn task(&self) -> &Task<System> {
        // Safety: The owning task outlives its own execution
        unsafe { self.task.as_ref() }
    }

    /// Block for `ticks` ticks.
    #[inline]
    pub fn delay(&self, ticks: TickType) {
        System::raw_delay(ticks)
    }

    /// Block until `increment` ticks after the previous wake time, then
    /// advance the previous wake time by `increment`. Use this to run at a
    /// fixed frequency.
    ///
    /// The previous wake time starts as the tick count at which the task
    /// first ran. Returns `false` without blocking if the wake time has
    /// already passed.
    #[inline]
    pub fn delay_until(&self, increment: TickType) -> bool {
        // Safety: `previous_wake_time` is only accessed by the task itself,
        //         and `CurrentTask` is `!Send`
        let previous_wake_time = unsafe { &mut *self.task().previous_wake_time.get() };
        System::raw_delay_until(previous_wake_time, increment)
    }

    /// Get the reference point of [`delay_until`](Self::delay_until).
    #[inline]
    pub fn previous_wake_time(&self) -> TickType {
        // Safety: See `delay_until`
        unsafe { *self.task().previous_wake_time.get() }
    }

    /// Wait for notification slot `index` to become pending, blocking for up
    /// to `ticks` ticks.
    ///
    /// `clear_on_entry` bits are cleared if no notification is pending on
    /// entry. `clear_on_exit` bits are cleared after a notification is
    /// received. Returns the slot's value as it was before `clear_on_exit`
    /// was applied, or `None` on timeout.
    #[inline]
    pub fn notify_wait(
        &self,
        clear_on_entry: NotificationBits,
        clear_on_exit: NotificationBits,
        ticks: TickType,
        index: usize,
    ) -> Option<NotificationBits> {
        let mut value = 0;
        System::raw_task_notify_wait(
            index,
            clear_on_entry.raw(),
            clear_on_exit.raw(),
            &mut value,
            ticks,
        )
        .is_success()
        .then(|| NotificationBits::from_raw(value))
    }

    /// Use notification slot `index` as a counting semaphore, blocking for up
    /// to `ticks` ticks while its value is zero.
    ///
    /// On success, the value is cleared if `clear_count_on_exit` is set and
    /// decremented otherwise. Returns the value before that, or `0` on
    /// timeout.
    #[inline]
    pub fn notify_take(&self, clear_count_on_exit: bool, ticks: TickType, index: usize) -> u32 {
        System::raw_task_notify_take(index, clear_count_on_exit, ticks)
    }

    /// Suspend the calling task until another task or an interrupt handler
    /// resumes it.
    #[inline]
    pub fn suspend_self(&self) {
        // Safety: A running task is alive
        unsafe { System::raw_task_suspend(self.id) }
    }

    /// Delete the calling task. The owning object stays valid as a handle to
    /// a deleted task until it's dropped.
    pub fn delete_self(&self) -> ! {
        log::trace!("task {:?} deleting itself", self.id);
        // Safety: A running task is alive
        unsafe { System::raw_task_delete(self.id) };
        unreachable!("a deleted task was resumed")
    }
}

impl<System: raw::KernelTask> fmt::Debug for CurrentTask<System> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CurrentTask").field(&self.id).finish()
    }
}

/// The supported operations on [`Task`], [`TaskRef`], and [`CurrentTask`].
pub trait TaskMethods {
    type System: raw::KernelTask;

    /// Get the raw ID of the referenced task.
    fn task_id(&self) -> <Self::System as raw::KernelBase>::RawTaskId;

    #[inline]
    fn priority(&self) -> Priority {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_priority(self.task_id()) }
    }

    /// Set the task's base priority. Values at or above
    /// [`RAW_MAX_PRIORITIES`] are clamped by the kernel.
    ///
    /// [`RAW_MAX_PRIORITIES`]: raw::KernelBase::RAW_MAX_PRIORITIES
    #[inline]
    fn set_priority(&self, priority: Priority) {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_set_priority(self.task_id(), priority) }
    }

    /// Suspend the task. Suspension does not nest: a single
    /// [`resume`](Self::resume) makes the task schedulable again.
    #[inline]
    fn suspend(&self) {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_suspend(self.task_id()) }
    }

    #[inline]
    fn resume(&self) {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_resume(self.task_id()) }
    }

    /// Resume the task from an interrupt handler. Returns `true` if the
    /// caller should request a context switch.
    #[inline]
    fn resume_from_isr(&self) -> bool {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_resume_from_isr(self.task_id()) }
    }

    /// Force the task out of a time-based delay. Returns `false` if the task
    /// was not delayed.
    #[inline]
    fn abort_delay(&self) -> bool {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_abort_delay(self.task_id()) }
            .is_success()
    }

    #[inline]
    fn state(&self) -> TaskState {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_state(self.task_id()) }
    }

    #[inline]
    fn name(&self) -> &'static str {
        // Safety: See the safety documentation of `raw`
        unsafe { <Self::System as raw::KernelTask>::raw_task_name(self.task_id()) }
    }

    /// Get the minimum amount of free stack space, in stack words, observed
    /// since the task started.
    #[inline]
    fn stack_high_water_mark(&self) -> StackDepth {
        // Safety: See the safety documentation of `raw`
        unsafe {
            <Self::System as raw::KernelTask>::raw_task_stack_high_water_mark(self.task_id())
        }
    }

    /// Increment notification slot `index`, the lightweight counterpart of
    /// giving a semaphore.
    #[inline]
    fn notify_give(&self, index: usize) {
        // Safety: See the safety documentation of `raw`
        let result = unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify(
                self.task_id(),
                index,
                NotifyAction::Increment,
                0,
                None,
            )
        };
        debug_assert!(result.is_success());
    }

    #[inline]
    fn notify_give_from_isr(&self, woken: &mut HigherPriorityTaskWoken, index: usize) {
        let id = self.task_id();
        // Safety: See the safety documentation of `raw`
        woken.track(|w| unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify_give_from_isr(id, index, w)
        })
    }

    /// Apply `action` with `value` to notification slot `index`. Returns
    /// `false` only for [`NotifyAction::SetValueWithoutOverwrite`] when a
    /// value was already pending.
    #[inline]
    fn notify(&self, action: NotifyAction, value: NotificationBits, index: usize) -> bool {
        // Safety: See the safety documentation of `raw`
        unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify(
                self.task_id(),
                index,
                action,
                value.raw(),
                None,
            )
        }
        .is_success()
    }

    /// [`notify`](Self::notify), additionally returning the slot's value
    /// before the action was applied.
    #[inline]
    fn notify_and_query(
        &self,
        action: NotifyAction,
        value: NotificationBits,
        index: usize,
    ) -> (bool, NotificationBits) {
        let mut previous = 0;
        // Safety: See the safety documentation of `raw`
        let result = unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify(
                self.task_id(),
                index,
                action,
                value.raw(),
                Some(&mut previous),
            )
        };
        (result.is_success(), NotificationBits::from_raw(previous))
    }

    #[inline]
    fn notify_from_isr(
        &self,
        woken: &mut HigherPriorityTaskWoken,
        action: NotifyAction,
        value: NotificationBits,
        index: usize,
    ) -> bool {
        let id = self.task_id();
        // Safety: See the safety documentation of `raw`
        woken
            .track(|w| unsafe {
                <Self::System as raw::KernelTask>::raw_task_notify_from_isr(
                    id,
                    index,
                    action,
                    value.raw(),
                    None,
                    w,
                )
            })
            .is_success()
    }

    #[inline]
    fn notify_and_query_from_isr(
        &self,
        woken: &mut HigherPriorityTaskWoken,
        action: NotifyAction,
        value: NotificationBits,
        index: usize,
    ) -> (bool, NotificationBits) {
        let id = self.task_id();
        let mut previous = 0;
        // Safety: See the safety documentation of `raw`
        let result = woken.track(|w| unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify_from_isr(
                id,
                index,
                action,
                value.raw(),
                Some(&mut previous),
                w,
            )
        });
        (result.is_success(), NotificationBits::from_raw(previous))
    }

    /// Make notification slot `index` not pending. Returns `true` if it was
    /// pending.
    #[inline]
    fn notify_state_clear(&self, index: usize) -> bool {
        // Safety: See the safety documentation of `raw`
        unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify_state_clear(self.task_id(), index)
        }
    }

    /// Clear `bits` in notification slot `index`. Returns the value before
    /// the bits were cleared.
    #[inline]
    fn notify_value_clear(&self, bits: NotificationBits, index: usize) -> NotificationBits {
        // Safety: See the safety documentation of `raw`
        NotificationBits::from_raw(unsafe {
            <Self::System as raw::KernelTask>::raw_task_notify_value_clear(
                self.task_id(),
                index,
                bits.raw(),
            )
        })
    }
}

impl<System: raw::KernelTask> TaskMethods for Task<System> {
    type System = System;

    #[inline]
    #[track_caller]
    fn task_id(&self) -> System::RawTaskId {
        match self.handle {
            Some(id) => id,
            None => super::macros::invalid_handle("Task"),
        }
    }
}

impl<System: raw::KernelTask> TaskMethods for TaskRef<System> {
    type System = System;

    #[inline]
    fn task_id(&self) -> System::RawTaskId {
        self.id
    }
}

impl<System: raw::KernelTask> TaskMethods for CurrentTask<System> {
    type System = System;

    #[inline]
    fn task_id(&self) -> System::RawTaskId {
        self.id
    }
}

// ----------------------------------------------------------------------------

/// The builder for [`DynamicTask`] and [`StaticTask`].
#[must_use = "must call `spawn()` or `finish_static()` to create a task"]
pub struct TaskBuilder<System> {
    name: &'static str,
    priority: Priority,
    stack_depth: Option<StackDepth>,
    _phantom: PhantomData<fn() -> System>,
}

impl<System: raw::KernelTask> TaskBuilder<System> {
    const fn new() -> Self {
        Self {
            name: "",
            priority: 0,
            stack_depth: None,
            _phantom: PhantomData,
        }
    }

    /// Specify the task's name. Defaults to an empty string.
    pub const fn name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Specify the task's initial priority. Defaults to `0`, the idle
    /// priority.
    pub const fn priority(self, priority: Priority) -> Self {
        Self { priority, ..self }
    }

    /// Specify the depth of the kernel-allocated stack. Defaults to
    /// [`RAW_MINIMAL_STACK_SIZE`](raw::KernelBase::RAW_MINIMAL_STACK_SIZE).
    /// [`StaticTask`] takes its stack depth from its type instead.
    pub const fn stack_depth(self, stack_depth: StackDepth) -> Self {
        Self {
            stack_depth: Some(stack_depth),
            ..self
        }
    }

    /// Create a task whose stack and control block are allocated from the
    /// kernel heap. Check [`is_valid`](Task::is_valid) for success.
    #[cfg(feature = "alloc")]
    pub fn spawn<B: TaskFunction<System>>(self, body: B) -> Pin<Box<DynamicTask<System, B>>> {
        let mut this = Box::pin(DynamicTask {
            task: Task::unregistered(),
            body: UnsafeCell::new(body),
            _pin: PhantomPinned,
        });

        // Safety: No fields are moved out of `this`
        let this_mut = unsafe { this.as_mut().get_unchecked_mut() };
        // Safety: `UnsafeCell::get` is never null
        let body: NonNull<dyn TaskFunction<System>> =
            unsafe { NonNull::new_unchecked(this_mut.body.get()) };
        let stack_depth = self
            .stack_depth
            .unwrap_or(System::RAW_MINIMAL_STACK_SIZE);

        // Safety: `this` is pinned, and `task` is dropped (deleting the task)
        //         before `body`
        unsafe {
            this_mut.task.register(body, |param| {
                System::raw_task_create(
                    task_trampoline::<System>,
                    self.name,
                    stack_depth,
                    param,
                    self.priority,
                )
            })
        };
        this
    }

    /// Construct a [`StaticTask`], which must be pinned and
    /// [initialized](StaticTask::init) to create the task.
    pub const fn finish_static<B: TaskFunction<System>, const STACK: usize>(
        self,
        body: B,
    ) -> StaticTask<System, B, STACK> {
        StaticTask {
            task: Task::unregistered(),
            cb: UnsafeCell::new(MaybeUninit::uninit()),
            stack: UnsafeCell::new(MaybeUninit::uninit()),
            body: UnsafeCell::new(body),
            name: self.name,
            priority: self.priority,
            _pin: PhantomPinned,
        }
    }
}

/// A task whose stack and control block are allocated from the kernel heap,
/// created by [`TaskBuilder::spawn`].
///
/// Dropping the task deletes the kernel task.
#[cfg(feature = "alloc")]
pub struct DynamicTask<System: raw::KernelTask, B> {
    task: Task<System>,
    body: UnsafeCell<B>,
    _pin: PhantomPinned,
}

// Safety: `body` is only accessed by the task itself
#[cfg(feature = "alloc")]
unsafe impl<System: raw::KernelTask, B: Send> Sync for DynamicTask<System, B> {}

#[cfg(feature = "alloc")]
impl<System: raw::KernelTask, B> Deref for DynamicTask<System, B> {
    type Target = Task<System>;

    #[inline]
    fn deref(&self) -> &Task<System> {
        &self.task
    }
}

/// A task with an embedded stack of `STACK` words and an embedded control
/// block.
///
/// ```rust,ignore
/// static mut TASK: StaticTask<System, fn(&CurrentTask<System>), 256> =
///     Task::build().name("blinky").priority(2).finish_static(blink);
///
/// assert!(unsafe { Pin::static_mut(&mut TASK) }.init());
/// ```
pub struct StaticTask<System: raw::KernelTask, B, const STACK: usize> {
    task: Task<System>,
    cb: UnsafeCell<MaybeUninit<System::RawStaticTaskCb>>,
    stack: UnsafeCell<MaybeUninit<[System::RawStackType; STACK]>>,
    body: UnsafeCell<B>,
    name: &'static str,
    priority: Priority,
    _pin: PhantomPinned,
}

// Safety: `cb` and `stack` are only accessed by the kernel, and `body` only
//         by the task itself
unsafe impl<System: raw::KernelTask, B: Send, const STACK: usize> Send
    for StaticTask<System, B, STACK>
{
}
unsafe impl<System: raw::KernelTask, B: Send, const STACK: usize> Sync
    for StaticTask<System, B, STACK>
{
}

impl<System: raw::KernelTask, B: TaskFunction<System>, const STACK: usize>
    StaticTask<System, B, STACK>
{
    /// Create the kernel task. Returns `true` on success or if already
    /// created.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if this.task.is_valid() {
            return true;
        }

        // Safety: `UnsafeCell::get` is never null
        let body: NonNull<dyn TaskFunction<System>> =
            unsafe { NonNull::new_unchecked(this.body.get()) };
        let (name, priority) = (this.name, this.priority);
        let stack = this.stack.get().cast();
        let cb = this.cb.get().cast();

        // Safety: `this` is pinned, and `task` is dropped (deleting the task)
        //         before the other fields
        unsafe {
            this.task.register(body, |param| {
                System::raw_task_create_static(
                    task_trampoline::<System>,
                    name,
                    STACK,
                    param,
                    priority,
                    stack,
                    cb,
                )
            })
        };
        this.task.is_valid()
    }
}

impl<System: raw::KernelTask, B, const STACK: usize> Deref for StaticTask<System, B, STACK> {
    type Target = Task<System>;

    #[inline]
    fn deref(&self) -> &Task<System> {
        &self.task
    }
}
