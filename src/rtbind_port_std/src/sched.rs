//! The simulated uniprocessor and its scheduler
//!
//! Every task is backed by a host thread, but only the thread that owns the
//! simulated CPU ([`Inner::cpu`]) is allowed to run. The others wait on
//! [`State::cpu_released`]. The CPU changes hands only inside kernel calls,
//! which makes every kernel call a potential scheduling point.
//!
//! Time is virtual. The tick count advances only when the idle task runs
//! (i.e., every other task is blocked), in which case it jumps straight to
//! the earliest timeout, or when the application calls `step_tick` or
//! `catch_up_ticks`.
use std::{
    any::Any,
    cell::Cell,
    cmp::Reverse,
    ffi::c_void,
    mem,
    panic::{self, AssertUnwindSafe},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread,
};

use rtbind::kernel::{raw::SchedulerState, Priority, TickType, MAX_DELAY};
use slab::Slab;
use spin::Mutex as SpinMutex;

use crate::{
    event_group::EventGroupCb,
    queue::QueueCb,
    semaphore::SemaphoreCb,
    storage::Heap,
    stream_buffer::StreamBufferCb,
    task::{Entry, TaskCb, TaskStatus},
    timer::TimerCb,
    PortInstance, MAX_PRIORITIES, MINIMAL_STACK_SIZE, TIMER_TASK_PRIORITY,
};

pub(crate) type TaskIndex = usize;
pub(crate) type Guard<'a> = MutexGuard<'a, Inner>;

/// The upper bound of the length of a priority inheritance chain.
const MAX_INHERITANCE_DEPTH: usize = 8;

/// The owner of the simulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cpu {
    /// The thread that called `start_scheduler`, or any thread before the
    /// scheduler is started.
    Boot,
    Task(TaskIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    NotStarted,
    Running,
    Ended,
}

/// What a blocked task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOn {
    Delay,
    QueueSend(usize),
    QueueReceive(usize),
    Semaphore(usize),
    EventGroup(usize),
    StreamBufferSend(usize),
    StreamBufferReceive(usize),
    Notification(usize),
    TimerCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wait {
    pub(crate) on: WaitOn,
    /// `None` = forever
    pub(crate) deadline: Option<u64>,
}

/// The reason a blocked task was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// The awaited object changed state, or the wait was cancelled by
    /// suspension. The task should re-check its condition.
    Signaled,
    Timeout,
    /// Released by `abort_delay`.
    Aborted,
}

/// The role of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadRole {
    Unknown,
    Boot,
    /// The backing thread for a task.
    Task(TaskIndex),
}

thread_local! {
    /// The current thread's role. It's automatically assigned after the
    /// creation of a thread managed by the port.
    static THREAD_ROLE: Cell<ThreadRole> = Cell::new(ThreadRole::Unknown);
}

/// Get the CPU owner the current thread acts as.
pub(crate) fn current_thread_cpu() -> Cpu {
    match THREAD_ROLE.with(Cell::get) {
        ThreadRole::Task(index) => Cpu::Task(index),
        ThreadRole::Unknown | ThreadRole::Boot => Cpu::Boot,
    }
}

/// The internal state of the port.
#[doc(hidden)]
pub struct State {
    inner: Mutex<Inner>,
    /// Notified whenever [`Inner::cpu`] changes.
    cpu_released: Condvar,
    /// Accessed without the kernel lock by creation and deletion paths, so
    /// `SpinMutex` is sufficient.
    pub(crate) heap: SpinMutex<Heap>,
}

/// The kernel state protected by the kernel lock.
pub(crate) struct Inner {
    pub(crate) phase: Phase,
    pub(crate) cpu: Cpu,
    /// The virtual tick count. Never wraps around; the kernel-visible tick
    /// count is this value truncated to `TickType`.
    pub(crate) now: u64,
    /// The ticks the idle task has skipped over while every other task
    /// was blocked.
    idle_ticks: u64,
    suspend_all: usize,
    critical: usize,
    interrupts_masked: bool,
    isr_nesting: usize,
    /// A context switch was held off by a suspended scheduler, a critical
    /// section, or an interrupt handler.
    switch_pending: bool,
    /// `yield_from_isr(true)` was called in the current interrupt handler.
    yield_from_isr: bool,
    next_seq: u64,
    pub(crate) tasks: Vec<TaskCb>,
    pub(crate) idle_task: Option<TaskIndex>,
    pub(crate) timer_task: Option<TaskIndex>,
    pub(crate) queues: Slab<QueueCb>,
    pub(crate) semaphores: Slab<SemaphoreCb>,
    pub(crate) event_groups: Slab<EventGroupCb>,
    pub(crate) stream_buffers: Slab<StreamBufferCb>,
    pub(crate) timers: Slab<TimerCb>,
    /// The panic that stopped the scheduler.
    panic: Option<Box<dyn Any + Send>>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::missing_safety_doc)]
impl State {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::NotStarted,
                cpu: Cpu::Boot,
                now: 0,
                idle_ticks: 0,
                suspend_all: 0,
                critical: 0,
                interrupts_masked: false,
                isr_nesting: 0,
                switch_pending: false,
                yield_from_isr: false,
                next_seq: 0,
                tasks: Vec::new(),
                idle_task: None,
                timer_task: None,
                queues: Slab::new(),
                semaphores: Slab::new(),
                event_groups: Slab::new(),
                stream_buffers: Slab::new(),
                timers: Slab::new(),
                panic: None,
            }),
            cpu_released: Condvar::new(),
            heap: SpinMutex::new(Heap::new()),
        }
    }

    /// Acquire the kernel lock.
    ///
    /// A panicking task poisons the lock; the scheduler is stopped in that
    /// case, so the poison is ignored.
    fn lock(&self) -> Guard<'_> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the kernel lock on behalf of the code running on the
    /// simulated CPU.
    pub(crate) fn enter(&self) -> Guard<'_> {
        let g = self.lock();
        if g.phase == Phase::Running {
            assert_eq!(
                g.cpu,
                current_thread_cpu(),
                "kernel function called from a thread that doesn't own the CPU"
            );
        }
        g
    }

    fn wait_for_cpu<'a>(&'a self, mut g: Guard<'a>, cpu: Cpu) -> Guard<'a> {
        while g.cpu != cpu {
            g = self
                .cpu_released
                .wait(g)
                .unwrap_or_else(PoisonError::into_inner);
        }
        g
    }

    /// Hand the CPU to the highest-priority ready task. Returns `true` if
    /// the CPU changed hands, in which case the caller must wait to get it
    /// back.
    pub(crate) fn dispatch<I: PortInstance>(&self, g: &mut Inner) -> bool {
        if g.phase != Phase::Running {
            return false;
        }
        if !g.can_switch() {
            g.switch_pending = true;
            return false;
        }
        g.switch_pending = false;

        let Some(next) = g.highest_ready_task() else {
            unreachable!("the idle task is not ready")
        };
        if g.cpu == Cpu::Task(next) {
            return false;
        }

        log::trace!("dispatch: {:?} -> task {next}", g.cpu);
        g.cpu = Cpu::Task(next);

        let task = &mut g.tasks[next];
        if !task.thread_spawned {
            task.thread_spawned = true;
            spawn_task_thread::<I>(next, task.name, task.entry);
        }

        self.cpu_released.notify_all();
        true
    }

    /// A scheduling point. Let a higher-priority task run if there's one,
    /// and return when the caller owns the CPU again.
    pub(crate) fn reschedule<'a, I: PortInstance>(&'a self, mut g: Guard<'a>) -> Guard<'a> {
        if self.dispatch::<I>(&mut g) {
            g = self.wait_for_cpu(g, current_thread_cpu());
        }
        g
    }

    /// Block the running task on `on` until it's released by
    /// [`Inner::unblock`] or `deadline` passes.
    pub(crate) fn block<'a, I: PortInstance>(
        &'a self,
        mut g: Guard<'a>,
        on: WaitOn,
        deadline: Option<u64>,
    ) -> (Guard<'a>, Wake) {
        let me = g.blocking_task();
        let seq = g.next_seq();
        let task = &mut g.tasks[me];
        task.status = TaskStatus::Blocked(Wait { on, deadline });
        task.seq = seq;
        task.wake = None;
        log::trace!("task {me} blocked on {on:?} until {deadline:?}");

        let switched = self.dispatch::<I>(&mut g);
        debug_assert!(switched);
        g = self.wait_for_cpu(g, Cpu::Task(me));

        let Some(wake) = g.tasks[me].wake.take() else {
            unreachable!("task {me} was dispatched while blocked")
        };
        (g, wake)
    }

    /// Call `attempt` until it succeeds, blocking the running task on `on`
    /// in between for a total of at most `ticks` ticks.
    pub(crate) fn wait_for<'a, I: PortInstance, R>(
        &'a self,
        mut g: Guard<'a>,
        on: WaitOn,
        ticks: TickType,
        mut attempt: impl FnMut(&mut Inner) -> Option<R>,
    ) -> (Guard<'a>, Option<R>) {
        let deadline = g.deadline_after(ticks);
        loop {
            if let Some(result) = attempt(&mut g) {
                return (g, Some(result));
            }
            if ticks == 0 || matches!(deadline, Some(d) if d <= g.now) {
                return (g, None);
            }
            g = self.block::<I>(g, on, deadline).0;
        }
    }

    /// Implements `start_scheduler`. Returns when the scheduler is stopped.
    pub(crate) fn start_scheduler<I: PortInstance>(&self) {
        let mut g = self.lock();
        assert_eq!(
            g.phase,
            Phase::NotStarted,
            "the scheduler can be started only once"
        );
        assert!(
            g.can_switch(),
            "the scheduler can't be started while context switches are held off"
        );
        THREAD_ROLE.with(|role| role.set(ThreadRole::Boot));

        let idle = g.add_task(TaskCb::new("IDLE", 0, MINIMAL_STACK_SIZE, Entry::Idle));
        let timer = g.add_task(TaskCb::new(
            "Tmr Svc",
            TIMER_TASK_PRIORITY,
            MINIMAL_STACK_SIZE,
            Entry::TimerService,
        ));
        g.idle_task = Some(idle);
        g.timer_task = Some(timer);

        log::trace!("starting the scheduler with {} tasks", g.tasks.len());
        g.phase = Phase::Running;
        self.dispatch::<I>(&mut g);

        g = self.wait_for_cpu(g, Cpu::Boot);
        log::trace!("the scheduler stopped at tick {}", g.now);

        let panic = g.panic.take();
        drop(g);
        THREAD_ROLE.with(|role| role.set(ThreadRole::Unknown));

        // Propagate any panic that occurred in a task
        if let Some(payload) = panic {
            panic::resume_unwind(payload);
        }
    }

    /// Implements `end_scheduler`.
    pub(crate) fn end_scheduler(&self) {
        let g = self.enter();
        match g.phase {
            Phase::Running => self.stop(g),
            Phase::NotStarted | Phase::Ended => {
                log::debug!("end_scheduler: the scheduler isn't running");
            }
        }
    }

    /// Stop the scheduler and return the CPU to the boot thread. The calling
    /// task never runs again.
    fn stop(&self, mut g: Guard<'_>) -> ! {
        let me = current_thread_cpu();
        log::trace!("{me:?} is stopping the scheduler");
        g.phase = Phase::Ended;
        g.cpu = Cpu::Boot;
        self.cpu_released.notify_all();
        let _g = self.wait_for_cpu(g, me);
        unreachable!("the CPU was given back to a stopped task")
    }

    /// Stop the scheduler because a task panicked.
    fn abort(&self, payload: Box<dyn Any + Send>) {
        let mut g = self.lock();
        log::debug!("stopping the scheduler due to a panic in {:?}", g.cpu);
        if g.panic.is_none() {
            g.panic = Some(payload);
        }
        g.phase = Phase::Ended;
        g.cpu = Cpu::Boot;
        self.cpu_released.notify_all();
    }

    /// Park the running task forever after it was deleted.
    pub(crate) fn retire<'a, I: PortInstance>(&'a self, mut g: Guard<'a>, me: TaskIndex) -> ! {
        assert!(
            g.can_switch(),
            "a task can't delete itself while context switches are held off"
        );
        self.dispatch::<I>(&mut g);
        let _g = self.wait_for_cpu(g, Cpu::Task(me));
        unreachable!("the CPU was given to a deleted task")
    }

    pub(crate) fn scheduler_state(&self) -> SchedulerState {
        let g = self.lock();
        match g.phase {
            Phase::Running if g.suspend_all > 0 => SchedulerState::Suspended,
            Phase::Running => SchedulerState::Running,
            Phase::NotStarted | Phase::Ended => SchedulerState::NotStarted,
        }
    }

    pub(crate) fn number_of_tasks(&self) -> usize {
        let g = self.lock();
        g.tasks
            .iter()
            .filter(|task| task.status != TaskStatus::Deleted)
            .count()
    }

    pub(crate) fn current_task(&self) -> Option<TaskIndex> {
        self.lock().running_task()
    }

    pub(crate) fn suspend_all(&self) {
        let mut g = self.enter();
        g.suspend_all += 1;
        log::trace!("suspend_all (nesting = {})", g.suspend_all);
    }

    pub(crate) fn resume_all<I: PortInstance>(&self) -> bool {
        let mut g = self.enter();
        assert!(g.suspend_all > 0, "resume_all without a matching suspend_all");
        g.suspend_all -= 1;
        log::trace!("resume_all (nesting = {})", g.suspend_all);
        if g.suspend_all > 0 {
            return false;
        }
        let switched = self.dispatch::<I>(&mut g);
        if switched {
            drop(self.wait_for_cpu(g, current_thread_cpu()));
        }
        switched
    }

    pub(crate) fn tick_count(&self) -> TickType {
        // Truncation is intended; the kernel's tick count wraps around
        self.lock().now as TickType
    }

    pub(crate) fn idle_run_time_counter(&self) -> TickType {
        self.lock().idle_ticks as TickType
    }

    pub(crate) fn step_tick(&self, ticks: TickType) {
        let mut g = self.enter();
        let now = g.now + u64::from(ticks);
        log::trace!("step_tick({ticks})");
        if g.advance_to(now) {
            g.switch_pending = true;
        }
    }

    pub(crate) fn catch_up_ticks<I: PortInstance>(&self, ticks: TickType) -> bool {
        let mut g = self.enter();
        let now = g.now + u64::from(ticks);
        log::trace!("catch_up_ticks({ticks})");
        g.advance_to(now);
        let switched = self.dispatch::<I>(&mut g);
        if switched {
            drop(self.wait_for_cpu(g, current_thread_cpu()));
        }
        switched
    }

    /// Implements `yield`. Moves the running task behind the other ready
    /// tasks of the same priority.
    pub(crate) fn yield_cpu<I: PortInstance>(&self) {
        let mut g = self.enter();
        if let Some(me) = g.running_task() {
            g.rotate(me);
        }
        drop(self.reschedule::<I>(g));
    }

    pub(crate) fn yield_from_isr(&self, switch_required: bool) {
        if switch_required {
            let mut g = self.enter();
            g.yield_from_isr = true;
        }
    }

    pub(crate) fn enter_critical(&self) {
        let mut g = self.enter();
        g.critical += 1;
    }

    pub(crate) fn exit_critical<I: PortInstance>(&self) {
        let mut g = self.enter();
        assert!(g.critical > 0, "exit_critical without a matching enter_critical");
        g.critical -= 1;
        if g.critical == 0 && g.switch_pending {
            drop(self.reschedule::<I>(g));
        }
    }

    /// Mask interrupts. Returns the previous mask state.
    pub(crate) fn mask_interrupts(&self) -> bool {
        let mut g = self.enter();
        mem::replace(&mut g.interrupts_masked, true)
    }

    pub(crate) fn restore_interrupts<I: PortInstance>(&self, masked: bool) {
        let mut g = self.enter();
        g.interrupts_masked = masked;
        if g.switch_pending {
            drop(self.reschedule::<I>(g));
        }
    }

    pub(crate) fn is_interrupt_context(&self) -> bool {
        self.lock().isr_nesting > 0
    }

    /// Run `handler` as an interrupt handler of the running task.
    pub(crate) fn interrupt<I: PortInstance, R>(&self, handler: impl FnOnce() -> R) -> R {
        {
            let mut g = self.enter();
            assert!(
                g.critical == 0 && !g.interrupts_masked,
                "interrupts are masked"
            );
            g.isr_nesting += 1;
            log::trace!("interrupt enter (nesting = {})", g.isr_nesting);
        }

        let result = handler();

        let mut g = self.enter();
        g.isr_nesting -= 1;
        log::trace!("interrupt leave (nesting = {})", g.isr_nesting);
        if g.isr_nesting == 0 && mem::take(&mut g.yield_from_isr) {
            if let Some(me) = g.running_task() {
                g.rotate(me);
            }
            drop(self.reschedule::<I>(g));
        }
        result
    }

    /// Implements `delay`.
    pub(crate) fn delay<I: PortInstance>(&self, ticks: TickType) {
        let g = self.enter();
        if ticks == 0 {
            drop(g);
            self.yield_cpu::<I>();
            return;
        }
        let deadline = g.deadline_after(ticks);
        let (_g, wake) = self.block::<I>(g, WaitOn::Delay, deadline);
        log::trace!("delay({ticks}) ended by {wake:?}");
    }

    /// Implements `delay_until`.
    pub(crate) fn delay_until<I: PortInstance>(
        &self,
        previous_wake_time: &mut TickType,
        increment: TickType,
    ) -> bool {
        let g = self.enter();
        let now = g.now as TickType;
        let time_to_wake = previous_wake_time.wrapping_add(increment);

        let should_delay = if now < *previous_wake_time {
            // The tick count has wrapped around since the previous wake time
            time_to_wake < *previous_wake_time && time_to_wake > now
        } else {
            time_to_wake < *previous_wake_time || time_to_wake > now
        };
        *previous_wake_time = time_to_wake;

        if should_delay {
            let deadline = g.now + u64::from(time_to_wake.wrapping_sub(now));
            drop(self.block::<I>(g, WaitOn::Delay, Some(deadline)));
        }
        should_delay
    }
}

impl Inner {
    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub(crate) fn can_switch(&self) -> bool {
        self.isr_nesting == 0
            && self.suspend_all == 0
            && self.critical == 0
            && !self.interrupts_masked
    }

    pub(crate) fn is_interrupt_context(&self) -> bool {
        self.isr_nesting > 0
    }

    /// Get the task owning the CPU, if the scheduler is running.
    pub(crate) fn running_task(&self) -> Option<TaskIndex> {
        match (self.phase, self.cpu) {
            (Phase::Running, Cpu::Task(index)) => Some(index),
            _ => None,
        }
    }

    /// Get the running task, panicking if the caller isn't a task.
    #[track_caller]
    pub(crate) fn current_task(&self) -> TaskIndex {
        match self.running_task() {
            Some(index) => index,
            None => panic!("this operation must be called from a task"),
        }
    }

    /// Get the running task, which is about to block, validating that it
    /// may block.
    #[track_caller]
    fn blocking_task(&self) -> TaskIndex {
        assert_eq!(
            self.isr_nesting, 0,
            "blocking operation in an interrupt context"
        );
        assert_eq!(
            self.suspend_all, 0,
            "blocking operation while the scheduler is suspended"
        );
        assert!(
            self.critical == 0 && !self.interrupts_masked,
            "blocking operation while interrupts are masked"
        );
        self.current_task()
    }

    pub(crate) fn add_task(&mut self, mut task: TaskCb) -> TaskIndex {
        task.priority = task.priority.min(MAX_PRIORITIES - 1);
        task.seq = self.next_seq();
        self.tasks.push(task);
        self.tasks.len() - 1
    }

    /// The absolute deadline of a wait of `ticks` ticks starting now.
    pub(crate) fn deadline_after(&self, ticks: TickType) -> Option<u64> {
        (ticks != MAX_DELAY).then(|| self.now + u64::from(ticks))
    }

    /// Get a task's priority including the priority inherited through the
    /// mutexes it holds.
    pub(crate) fn effective_priority(&self, task: TaskIndex) -> Priority {
        self.effective_priority_bounded(task, MAX_INHERITANCE_DEPTH)
    }

    fn effective_priority_bounded(&self, task: TaskIndex, depth: usize) -> Priority {
        let base = self.tasks[task].priority;
        if depth == 0 {
            return base;
        }
        self.semaphores
            .iter()
            .filter(|(_, semaphore)| semaphore.holder == Some(task))
            .flat_map(|(key, _)| self.waiters(WaitOn::Semaphore(key)))
            .map(|waiter| self.effective_priority_bounded(waiter, depth - 1))
            .fold(base, Priority::max)
    }

    /// Get the ordering key of a ready or blocked task: higher priority
    /// first, then first come, first served.
    fn precedence(&self, task: TaskIndex) -> (Priority, Reverse<u64>) {
        (self.effective_priority(task), Reverse(self.tasks[task].seq))
    }

    fn highest_ready_task(&self) -> Option<TaskIndex> {
        (0..self.tasks.len())
            .filter(|&i| self.tasks[i].status == TaskStatus::Ready)
            .max_by_key(|&i| self.precedence(i))
    }

    /// Iterate over the tasks blocked on `on`.
    pub(crate) fn waiters(&self, on: WaitOn) -> impl Iterator<Item = TaskIndex> + '_ {
        self.tasks
            .iter()
            .enumerate()
            .filter(move |(_, task)| matches!(task.status, TaskStatus::Blocked(w) if w.on == on))
            .map(|(i, _)| i)
    }

    pub(crate) fn has_waiters(&self, on: WaitOn) -> bool {
        self.waiters(on).next().is_some()
    }

    /// Panic if a task is blocked on any of `on`. Tasks left blocked after
    /// the scheduler has stopped never run again and are ignored.
    #[track_caller]
    pub(crate) fn assert_no_waiters(&self, on: &[WaitOn], object: &str) {
        if self.phase == Phase::Running && on.iter().any(|&on| self.has_waiters(on)) {
            panic!("deleting a {object} that tasks are blocked on");
        }
    }

    /// Get the tasks blocked on `on` in the order they are to be released.
    pub(crate) fn waiters_in_order(&self, on: WaitOn) -> Vec<TaskIndex> {
        let mut waiters: Vec<_> = self.waiters(on).collect();
        waiters.sort_by_key(|&i| Reverse(self.precedence(i)));
        waiters
    }

    /// Release the first task blocked on `on`. Returns `true` if it has
    /// an equal or higher priority than the running task.
    pub(crate) fn wake_first(&mut self, on: WaitOn) -> bool {
        let first = self.waiters(on).max_by_key(|&i| self.precedence(i));
        match first {
            Some(task) => self.unblock(task, Wake::Signaled),
            None => false,
        }
    }

    /// Release a blocked task. Returns `true` if it has an equal or higher
    /// priority than the running task.
    pub(crate) fn unblock(&mut self, task: TaskIndex, wake: Wake) -> bool {
        debug_assert!(matches!(self.tasks[task].status, TaskStatus::Blocked(_)));
        log::trace!("task {task} released by {wake:?}");
        self.tasks[task].wake = Some(wake);
        self.make_ready(task)
    }

    /// Put a task at the end of the ready queue of its priority. Returns
    /// `true` if it has an equal or higher priority than the running task.
    pub(crate) fn make_ready(&mut self, task: TaskIndex) -> bool {
        let seq = self.next_seq();
        let cb = &mut self.tasks[task];
        cb.status = TaskStatus::Ready;
        cb.seq = seq;
        match self.running_task() {
            Some(running) if running != task => {
                self.effective_priority(task) >= self.effective_priority(running)
            }
            _ => false,
        }
    }

    /// Move a ready task behind the other ready tasks of the same priority.
    pub(crate) fn rotate(&mut self, task: TaskIndex) {
        self.tasks[task].seq = self.next_seq();
    }

    /// Get the earliest timeout of the blocked tasks.
    fn next_deadline(&self) -> Option<u64> {
        self.tasks
            .iter()
            .filter_map(|task| match task.status {
                TaskStatus::Blocked(wait) => wait.deadline,
                _ => None,
            })
            .min()
    }

    /// Advance the clock to `now`, releasing the tasks whose timeouts
    /// expired. Returns `true` if any of them should preempt the running
    /// task.
    pub(crate) fn advance_to(&mut self, now: u64) -> bool {
        self.now = self.now.max(now);
        let expired: Vec<_> = (0..self.tasks.len())
            .filter(|&i| {
                matches!(self.tasks[i].status,
                    TaskStatus::Blocked(Wait { deadline: Some(d), .. }) if d <= self.now)
            })
            .collect();
        let mut preempt = false;
        for task in expired {
            preempt |= self.unblock(task, Wake::Timeout);
        }
        preempt
    }
}

fn spawn_task_thread<I: PortInstance>(index: TaskIndex, name: &'static str, entry: Entry) {
    log::trace!("spawning a thread for task {index} ({name:?})");
    let result = thread::Builder::new()
        .name(format!("task {index} {name}"))
        .spawn(move || run_task::<I>(index, entry));
    if let Err(e) = result {
        panic!("failed to spawn a thread for task {index}: {e}");
    }
}

/// The body of the backing thread of a task.
fn run_task<I: PortInstance>(index: TaskIndex, entry: Entry) {
    THREAD_ROLE.with(|role| role.set(ThreadRole::Task(index)));
    let state = I::port_state();
    drop(state.wait_for_cpu(state.lock(), Cpu::Task(index)));
    log::trace!("task {index} is running for the first time");

    let result = panic::catch_unwind(AssertUnwindSafe(|| match entry {
        Entry::Task { entry, param } => {
            // Safety: `param` is the context value the task was created with
            unsafe { entry(param as *mut c_void) };
            log::warn!("task {index} returned from its entry point; deleting it");
            state.delete_task::<I>(index);
        }
        Entry::Idle => idle_task::<I>(index),
        Entry::TimerService => crate::timer::timer_service_task::<I>(index),
    }));

    if let Err(payload) = result {
        state.abort(payload);
    }
}

/// The idle task. Advances the clock whenever every other task is blocked.
fn idle_task<I: PortInstance>(me: TaskIndex) -> ! {
    let state = I::port_state();
    loop {
        let mut g = state.enter();

        // Let the other idle-priority tasks run
        if (0..g.tasks.len()).any(|i| i != me && g.tasks[i].status == TaskStatus::Ready) {
            g.rotate(me);
            drop(state.reschedule::<I>(g));
            continue;
        }

        match g.next_deadline() {
            Some(deadline) => {
                log::trace!("idle: advancing the clock from {} to {deadline}", g.now);
                g.idle_ticks += deadline.saturating_sub(g.now);
                g.advance_to(deadline);
                drop(state.reschedule::<I>(g));
            }
            None => {
                log::warn!("no task can make progress; stopping the scheduler");
                state.stop(g);
            }
        }
    }
}
