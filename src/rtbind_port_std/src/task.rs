//! Tasks and direct-to-task notifications
use std::{ffi::c_void, mem};

use rtbind::kernel::{
    raw::{KernelTask, NotifyAction, RawEventBits, TaskEntryFn},
    EventGroupWaitFlags, Priority, ResultCode, StackDepth, TaskState, TickType,
};

use crate::{
    sched::{Inner, TaskIndex, Wait, WaitOn, Wake},
    storage::{CbRef, StaticCb, TASK_CB_SIZE},
    PortInstance, State, System, TaskId, MAX_PRIORITIES, NOTIFICATION_ARRAY_ENTRIES,
};

/// What the backing thread of a task runs.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Entry {
    Task { entry: TaskEntryFn, param: usize },
    Idle,
    TimerService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskStatus {
    /// Ready or running
    Ready,
    Blocked(Wait),
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotifyState {
    NotWaiting,
    Waiting,
    Received,
}

#[derive(Debug, Clone, Copy)]
struct Notification {
    value: u32,
    state: NotifyState,
}

/// The condition a task waiting on an event group is waiting for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventWait {
    pub(crate) bits: RawEventBits,
    pub(crate) flags: EventGroupWaitFlags,
}

pub(crate) struct TaskCb {
    pub(crate) name: &'static str,
    /// The base priority. See [`Inner::effective_priority`].
    pub(crate) priority: Priority,
    pub(crate) status: TaskStatus,
    /// Set when a blocked task is released
    pub(crate) wake: Option<Wake>,
    /// The task's position in the ready queue or a wait list. Smaller is
    /// earlier.
    pub(crate) seq: u64,
    pub(crate) entry: Entry,
    pub(crate) thread_spawned: bool,
    stack_depth: StackDepth,
    /// The number of heap bytes to release on deletion.
    allocation: usize,
    cb: Option<CbRef>,
    notifications: [Notification; NOTIFICATION_ARRAY_ENTRIES],
    pub(crate) event_wait: Option<EventWait>,
    /// The event bits that satisfied `event_wait`, stored by the setter.
    pub(crate) event_result: Option<RawEventBits>,
}

impl TaskCb {
    pub(crate) fn new(
        name: &'static str,
        priority: Priority,
        stack_depth: StackDepth,
        entry: Entry,
    ) -> Self {
        Self {
            name,
            priority,
            status: TaskStatus::Ready,
            wake: None,
            seq: 0,
            entry,
            thread_spawned: false,
            stack_depth,
            allocation: 0,
            cb: None,
            notifications: [Notification {
                value: 0,
                state: NotifyState::NotWaiting,
            }; NOTIFICATION_ARRAY_ENTRIES],
            event_wait: None,
            event_result: None,
        }
    }
}

impl Inner {
    /// Get a task by ID. Tolerates deleted tasks.
    #[track_caller]
    fn task(&self, id: TaskId) -> &TaskCb {
        match self.tasks.get(id.index()) {
            Some(task) => task,
            None => panic!("invalid task ID: {id:?}"),
        }
    }

    #[track_caller]
    fn task_mut(&mut self, id: TaskId) -> &mut TaskCb {
        match self.tasks.get_mut(id.index()) {
            Some(task) => task,
            None => panic!("invalid task ID: {id:?}"),
        }
    }

    /// Apply a notification action. Returns the result code and whether the
    /// target task was released and should preempt the running task.
    fn notify(
        &mut self,
        id: TaskId,
        index: usize,
        action: NotifyAction,
        value: u32,
        previous: Option<&mut u32>,
    ) -> (ResultCode, bool) {
        assert!(
            index < NOTIFICATION_ARRAY_ENTRIES,
            "notification index out of range"
        );
        let task = self.task_mut(id);
        let slot = &mut task.notifications[index];
        if let Some(previous) = previous {
            *previous = slot.value;
        }

        let was = mem::replace(&mut slot.state, NotifyState::Received);
        let mut result = ResultCode::Success;
        match action {
            NotifyAction::NoAction => {}
            NotifyAction::SetBits => slot.value |= value,
            NotifyAction::Increment => slot.value = slot.value.wrapping_add(1),
            NotifyAction::SetValueWithOverwrite => slot.value = value,
            NotifyAction::SetValueWithoutOverwrite => {
                if was == NotifyState::Received {
                    result = ResultCode::QueueOverflow;
                } else {
                    slot.value = value;
                }
            }
        }
        log::trace!("notify({id:?}, {index}, {action:?}, {value:#x}) = {result:?}");

        let waiting = matches!(
            task.status,
            TaskStatus::Blocked(Wait { on: WaitOn::Notification(i), .. }) if i == index
        );
        let preempt = was == NotifyState::Waiting && waiting && self.unblock(id.index(), Wake::Signaled);
        (result, preempt)
    }
}

impl State {
    /// Delete a task. Never returns if the task is the running one.
    pub(crate) fn delete_task<I: PortInstance>(&self, index: TaskIndex) {
        let mut g = self.enter();
        let task = &mut g.tasks[index];
        if task.status == TaskStatus::Deleted {
            return;
        }
        log::trace!("deleting task {index} ({:?})", task.name);
        task.status = TaskStatus::Deleted;
        task.wake = None;
        task.event_wait = None;
        if let Some(cb) = task.cb.take() {
            cb.check();
        }
        let allocation = mem::take(&mut task.allocation);
        self.heap.lock().release(allocation);

        if g.running_task() == Some(index) {
            self.retire::<I>(g, index);
        }
        drop(self.reschedule::<I>(g));
    }

    fn create_task<I: PortInstance>(
        &self,
        mut task: TaskCb,
        allocation: usize,
        cb: Option<*mut StaticCb>,
    ) -> Result<TaskId, ResultCode> {
        let mut g = self.enter();
        if let Some(cb) = cb {
            // Safety: Upheld by `raw_task_create_static`'s caller
            task.cb = Some(unsafe { CbRef::install(cb, 0, g.tasks.len()) }.ok_or(ResultCode::BadParam)?);
        }
        self.heap.lock().allocate(allocation)?;
        task.allocation = allocation;

        let index = g.add_task(task);
        log::trace!(
            "created task {index} ({:?}) with priority {}",
            g.tasks[index].name,
            g.tasks[index].priority
        );
        drop(self.reschedule::<I>(g));
        Ok(TaskId::from_index(index))
    }

    fn suspend_task<I: PortInstance>(&self, id: TaskId) {
        let mut g = self.enter();
        let index = id.index();
        match g.task(id).status {
            TaskStatus::Deleted | TaskStatus::Suspended => return,
            TaskStatus::Blocked(_) => {
                // The wait is cancelled. The task re-checks its condition
                // when resumed.
                g.tasks[index].wake = Some(Wake::Signaled);
            }
            TaskStatus::Ready => {}
        }
        log::trace!("suspending task {index}");
        g.tasks[index].status = TaskStatus::Suspended;

        if g.running_task() == Some(index) {
            assert!(
                g.can_switch(),
                "a task can't suspend itself while context switches are held off"
            );
        }
        drop(self.reschedule::<I>(g));
    }

    fn resume_task(&self, g: &mut Inner, id: TaskId) -> bool {
        if g.task(id).status != TaskStatus::Suspended {
            return false;
        }
        log::trace!("resuming task {}", id.index());
        g.make_ready(id.index())
    }

    fn notify_wait<I: PortInstance>(
        &self,
        index: usize,
        clear_on_entry: u32,
        clear_on_exit: u32,
        value: &mut u32,
        ticks: TickType,
    ) -> ResultCode {
        assert!(
            index < NOTIFICATION_ARRAY_ENTRIES,
            "notification index out of range"
        );
        let mut g = self.enter();
        let me = g.current_task();
        let slot = &mut g.tasks[me].notifications[index];
        if slot.state != NotifyState::Received {
            slot.value &= !clear_on_entry;
            slot.state = NotifyState::Waiting;
        }

        let (mut g, received) = self.wait_for::<I, _>(g, WaitOn::Notification(index), ticks, |g| {
            (g.tasks[me].notifications[index].state == NotifyState::Received).then_some(())
        });

        let slot = &mut g.tasks[me].notifications[index];
        *value = slot.value;
        slot.state = NotifyState::NotWaiting;
        if received.is_some() {
            slot.value &= !clear_on_exit;
            ResultCode::Success
        } else {
            ResultCode::Timeout
        }
    }

    fn notify_take<I: PortInstance>(&self, index: usize, clear: bool, ticks: TickType) -> u32 {
        assert!(
            index < NOTIFICATION_ARRAY_ENTRIES,
            "notification index out of range"
        );
        let mut g = self.enter();
        let me = g.current_task();
        let slot = &mut g.tasks[me].notifications[index];
        if slot.value == 0 {
            slot.state = NotifyState::Waiting;
        }

        let (mut g, _) = self.wait_for::<I, _>(g, WaitOn::Notification(index), ticks, |g| {
            (g.tasks[me].notifications[index].value != 0).then_some(())
        });

        let slot = &mut g.tasks[me].notifications[index];
        let count = slot.value;
        if count != 0 {
            slot.value = if clear { 0 } else { count - 1 };
        }
        slot.state = NotifyState::NotWaiting;
        count
    }
}

unsafe impl<I: PortInstance> KernelTask for System<I> {
    type RawStaticTaskCb = StaticCb;
    type RawStackType = usize;

    const RAW_NOTIFICATION_ARRAY_ENTRIES: usize = NOTIFICATION_ARRAY_ENTRIES;

    unsafe fn raw_task_create(
        entry: TaskEntryFn,
        name: &'static str,
        stack_depth: StackDepth,
        param: *mut c_void,
        priority: Priority,
    ) -> Result<TaskId, ResultCode> {
        let task = TaskCb::new(
            name,
            priority,
            stack_depth,
            Entry::Task {
                entry,
                param: param as usize,
            },
        );
        let allocation = TASK_CB_SIZE + stack_depth * mem::size_of::<usize>();
        I::port_state().create_task::<I>(task, allocation, None)
    }

    unsafe fn raw_task_create_static(
        entry: TaskEntryFn,
        name: &'static str,
        stack_depth: StackDepth,
        param: *mut c_void,
        priority: Priority,
        stack: *mut usize,
        cb: *mut StaticCb,
    ) -> Result<TaskId, ResultCode> {
        if stack.is_null() {
            return Err(ResultCode::BadParam);
        }
        let task = TaskCb::new(
            name,
            priority,
            stack_depth,
            Entry::Task {
                entry,
                param: param as usize,
            },
        );
        I::port_state().create_task::<I>(task, 0, Some(cb))
    }

    unsafe fn raw_task_delete(this: TaskId) {
        I::port_state().delete_task::<I>(this.index())
    }

    unsafe fn raw_task_priority(this: TaskId) -> Priority {
        let g = I::port_state().enter();
        let _ = g.task(this);
        g.effective_priority(this.index())
    }

    unsafe fn raw_task_set_priority(this: TaskId, priority: Priority) {
        let state = I::port_state();
        let mut g = state.enter();
        let priority = priority.min(MAX_PRIORITIES - 1);
        log::trace!("task {} priority = {priority}", this.index());
        g.task_mut(this).priority = priority;
        if g.task(this).status == TaskStatus::Ready {
            g.rotate(this.index());
        }
        drop(state.reschedule::<I>(g));
    }

    unsafe fn raw_task_suspend(this: TaskId) {
        I::port_state().suspend_task::<I>(this)
    }

    unsafe fn raw_task_resume(this: TaskId) {
        let state = I::port_state();
        let mut g = state.enter();
        if state.resume_task(&mut g, this) {
            drop(state.reschedule::<I>(g));
        }
    }

    unsafe fn raw_task_resume_from_isr(this: TaskId) -> bool {
        let state = I::port_state();
        let mut g = state.enter();
        state.resume_task(&mut g, this)
    }

    unsafe fn raw_task_abort_delay(this: TaskId) -> ResultCode {
        let state = I::port_state();
        let mut g = state.enter();
        match g.task(this).status {
            TaskStatus::Blocked(Wait {
                on: WaitOn::Delay, ..
            }) => {
                g.unblock(this.index(), Wake::Aborted);
                drop(state.reschedule::<I>(g));
                ResultCode::Success
            }
            _ => ResultCode::BadObjectState,
        }
    }

    unsafe fn raw_task_state(this: TaskId) -> TaskState {
        let g = I::port_state().enter();
        let Some(task) = g.tasks.get(this.index()) else {
            return TaskState::Invalid;
        };
        match task.status {
            TaskStatus::Ready if g.running_task() == Some(this.index()) => TaskState::Running,
            TaskStatus::Ready => TaskState::Ready,
            TaskStatus::Blocked(_) => TaskState::Blocked,
            TaskStatus::Suspended => TaskState::Suspended,
            TaskStatus::Deleted => TaskState::Deleted,
        }
    }

    unsafe fn raw_task_name(this: TaskId) -> &'static str {
        I::port_state().enter().task(this).name
    }

    unsafe fn raw_task_stack_high_water_mark(this: TaskId) -> StackDepth {
        // Tasks run on host threads, so the simulated stack is never used
        I::port_state().enter().task(this).stack_depth
    }

    fn raw_task_by_name(name: &str) -> Option<TaskId> {
        let g = I::port_state().enter();
        g.tasks
            .iter()
            .position(|task| task.status != TaskStatus::Deleted && task.name == name)
            .map(TaskId::from_index)
    }

    fn raw_task_idle() -> Option<TaskId> {
        I::port_state().enter().idle_task.map(TaskId::from_index)
    }

    unsafe fn raw_task_notify(
        this: TaskId,
        index: usize,
        action: NotifyAction,
        value: u32,
        previous: Option<&mut u32>,
    ) -> ResultCode {
        let state = I::port_state();
        let mut g = state.enter();
        let (result, preempt) = g.notify(this, index, action, value, previous);
        if preempt {
            drop(state.reschedule::<I>(g));
        }
        result
    }

    unsafe fn raw_task_notify_from_isr(
        this: TaskId,
        index: usize,
        action: NotifyAction,
        value: u32,
        previous: Option<&mut u32>,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        let mut g = I::port_state().enter();
        let (result, preempt) = g.notify(this, index, action, value, previous);
        *higher_priority_task_woken |= preempt;
        result
    }

    unsafe fn raw_task_notify_give_from_isr(
        this: TaskId,
        index: usize,
        higher_priority_task_woken: &mut bool,
    ) {
        let mut g = I::port_state().enter();
        let (_, preempt) = g.notify(this, index, NotifyAction::Increment, 0, None);
        *higher_priority_task_woken |= preempt;
    }

    fn raw_task_notify_wait(
        index: usize,
        clear_on_entry: u32,
        clear_on_exit: u32,
        value: &mut u32,
        ticks: TickType,
    ) -> ResultCode {
        I::port_state().notify_wait::<I>(index, clear_on_entry, clear_on_exit, value, ticks)
    }

    fn raw_task_notify_take(index: usize, clear_count_on_exit: bool, ticks: TickType) -> u32 {
        I::port_state().notify_take::<I>(index, clear_count_on_exit, ticks)
    }

    unsafe fn raw_task_notify_state_clear(this: TaskId, index: usize) -> bool {
        let mut g = I::port_state().enter();
        let slot = &mut g.task_mut(this).notifications[index];
        if slot.state == NotifyState::Received {
            slot.state = NotifyState::NotWaiting;
            true
        } else {
            false
        }
    }

    unsafe fn raw_task_notify_value_clear(this: TaskId, index: usize, bits: u32) -> u32 {
        let mut g = I::port_state().enter();
        let slot = &mut g.task_mut(this).notifications[index];
        let previous = slot.value;
        slot.value &= !bits;
        previous
    }
}
