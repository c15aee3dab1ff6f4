//! Software timers and the timer service task
use std::ffi::c_void;

use rtbind::kernel::{
    raw::{KernelTimer, TimerCallbackFn, TimerCommand},
    Priority, ResultCode, TickType,
};

use crate::{
    sched::{Inner, TaskIndex, WaitOn},
    storage::{CbRef, StaticCb, TIMER_CB_SIZE},
    PortInstance, State, System, TimerId, TIMER_TASK_PRIORITY,
};

pub(crate) struct TimerCb {
    name: &'static str,
    period: TickType,
    auto_reload: bool,
    context: usize,
    callback: TimerCallbackFn<TimerId>,
    active: bool,
    /// Valid if `active`
    expiry: u64,
    allocation: usize,
    cb: Option<CbRef>,
}

impl Inner {
    #[track_caller]
    fn timer(&mut self, id: TimerId) -> &mut TimerCb {
        match self.timers.get_mut(id.index()) {
            Some(timer) => timer,
            None => panic!("invalid timer ID: {id:?}"),
        }
    }

    /// Apply a timer command. Commands take effect immediately, so the
    /// command queue never fills up. Returns whether the timer service task
    /// was released and should preempt the running task.
    fn timer_command(&mut self, id: TimerId, command: TimerCommand) -> Result<bool, ResultCode> {
        let now = self.now;
        log::trace!("timer {}: {command:?} at {now}", id.index());
        match command {
            TimerCommand::Start | TimerCommand::Reset => {
                let timer = self.timer(id);
                timer.active = true;
                timer.expiry = now + u64::from(timer.period);
            }
            TimerCommand::Stop => self.timer(id).active = false,
            TimerCommand::ChangePeriod(0) => return Err(ResultCode::BadParam),
            TimerCommand::ChangePeriod(period) => {
                let timer = self.timer(id);
                timer.period = period;
                timer.active = true;
                timer.expiry = now + u64::from(period);
            }
            TimerCommand::Delete => {
                let _ = self.timer(id);
                let timer = self.timers.remove(id.index());
                if let Some(cb) = &timer.cb {
                    cb.check();
                }
            }
        }
        // Let the service task re-evaluate its next wake-up time
        Ok(self.wake_first(WaitOn::TimerCommand))
    }
}

impl State {
    fn create_timer(&self, timer: TimerCb, cb: Option<*mut StaticCb>) -> Result<TimerId, ResultCode> {
        if timer.period == 0 {
            return Err(ResultCode::BadParam);
        }
        let mut timer = timer;
        let mut g = self.enter();
        let key = g.timers.vacant_key();
        match cb {
            Some(cb) => {
                // Safety: Upheld by `raw_timer_create_static`'s caller
                timer.cb = Some(unsafe { CbRef::install(cb, 5, key) }.ok_or(ResultCode::BadParam)?);
            }
            None => {
                self.heap.lock().allocate(TIMER_CB_SIZE)?;
                timer.allocation = TIMER_CB_SIZE;
            }
        }
        log::trace!("created timer {key} ({:?})", timer.name);
        g.timers.insert(timer);
        Ok(TimerId::from_index(key))
    }

    /// [`Inner::timer_command`] plus the heap accounting of `Delete`.
    fn apply_timer_command(
        &self,
        g: &mut Inner,
        id: TimerId,
        command: TimerCommand,
    ) -> Result<bool, ResultCode> {
        let allocation = match command {
            TimerCommand::Delete => g.timer(id).allocation,
            _ => 0,
        };
        let preempt = g.timer_command(id, command)?;
        self.heap.lock().release(allocation);
        Ok(preempt)
    }

    fn timer_command<I: PortInstance>(&self, id: TimerId, command: TimerCommand) -> ResultCode {
        let mut g = self.enter();
        match self.apply_timer_command(&mut g, id, command) {
            Ok(preempt) => {
                if preempt {
                    drop(self.reschedule::<I>(g));
                }
                ResultCode::Success
            }
            Err(e) => e,
        }
    }
}

/// The body of the timer service task.
pub(crate) fn timer_service_task<I: PortInstance>(me: TaskIndex) -> ! {
    let state = I::port_state();
    loop {
        let mut g = state.enter();
        let now = g.now;

        let due = g
            .timers
            .iter()
            .filter(|(_, timer)| timer.active && timer.expiry <= now)
            .min_by_key(|(key, timer)| (timer.expiry, *key))
            .map(|(key, _)| key);

        if let Some(key) = due {
            let timer = &mut g.timers[key];
            if timer.auto_reload {
                // Missed periods are made up for by the following iterations
                timer.expiry += u64::from(timer.period);
            } else {
                timer.active = false;
            }
            let callback = timer.callback;
            log::trace!("timer {key} ({:?}) expired at {now}", timer.name);

            // The callback may use the kernel, so release the lock first
            drop(g);
            // Safety: The callback was supplied with this timer
            unsafe { callback(TimerId::from_index(key)) };
            continue;
        }

        let next_expiry = g
            .timers
            .iter()
            .filter(|(_, timer)| timer.active)
            .map(|(_, timer)| timer.expiry)
            .min();
        debug_assert_eq!(g.running_task(), Some(me));
        drop(state.block::<I>(g, WaitOn::TimerCommand, next_expiry));
    }
}

unsafe impl<I: PortInstance> KernelTimer for System<I> {
    type RawTimerId = TimerId;
    type RawStaticTimerCb = StaticCb;

    const RAW_TIMER_TASK_PRIORITY: Priority = TIMER_TASK_PRIORITY;

    unsafe fn raw_timer_create(
        name: &'static str,
        period: TickType,
        auto_reload: bool,
        context: *mut c_void,
        callback: TimerCallbackFn<TimerId>,
    ) -> Result<TimerId, ResultCode> {
        let timer = TimerCb {
            name,
            period,
            auto_reload,
            context: context as usize,
            callback,
            active: false,
            expiry: 0,
            allocation: 0,
            cb: None,
        };
        I::port_state().create_timer(timer, None)
    }

    unsafe fn raw_timer_create_static(
        name: &'static str,
        period: TickType,
        auto_reload: bool,
        context: *mut c_void,
        callback: TimerCallbackFn<TimerId>,
        cb: *mut StaticCb,
    ) -> Result<TimerId, ResultCode> {
        let timer = TimerCb {
            name,
            period,
            auto_reload,
            context: context as usize,
            callback,
            active: false,
            expiry: 0,
            allocation: 0,
            cb: None,
        };
        I::port_state().create_timer(timer, Some(cb))
    }

    unsafe fn raw_timer_context(this: TimerId) -> *mut c_void {
        I::port_state().enter().timer(this).context as *mut c_void
    }

    unsafe fn raw_timer_command(
        this: TimerId,
        command: TimerCommand,
        _ticks: TickType,
    ) -> ResultCode {
        I::port_state().timer_command::<I>(this, command)
    }

    unsafe fn raw_timer_command_from_isr(
        this: TimerId,
        command: TimerCommand,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        let state = I::port_state();
        let mut g = state.enter();
        match state.apply_timer_command(&mut g, this, command) {
            Ok(preempt) => {
                *higher_priority_task_woken |= preempt;
                ResultCode::Success
            }
            Err(e) => e,
        }
    }

    unsafe fn raw_timer_is_active(this: TimerId) -> bool {
        I::port_state().enter().timer(this).active
    }

    unsafe fn raw_timer_set_reload_mode(this: TimerId, auto_reload: bool) {
        I::port_state().enter().timer(this).auto_reload = auto_reload;
    }

    unsafe fn raw_timer_reload_mode(this: TimerId) -> bool {
        I::port_state().enter().timer(this).auto_reload
    }

    unsafe fn raw_timer_name(this: TimerId) -> &'static str {
        I::port_state().enter().timer(this).name
    }

    unsafe fn raw_timer_period(this: TimerId) -> TickType {
        I::port_state().enter().timer(this).period
    }

    unsafe fn raw_timer_expiry_time(this: TimerId) -> TickType {
        // Truncation is intended; the kernel's tick count wraps around
        I::port_state().enter().timer(this).expiry as TickType
    }
}
