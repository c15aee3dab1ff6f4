//! Semaphores and mutexes
use rtbind::kernel::{
    raw::{KernelSemaphore, SemaphoreKind},
    ResultCode, TickType,
};

use crate::{
    sched::{Inner, TaskIndex, WaitOn},
    storage::{CbRef, StaticCb, QUEUE_CB_SIZE},
    PortInstance, SemaphoreId, State, System, TaskId,
};

pub(crate) struct SemaphoreCb {
    kind: SemaphoreKind,
    count: usize,
    max: usize,
    /// The task holding the mutex. Priority inheritance is derived from this
    /// field by [`Inner::effective_priority`].
    pub(crate) holder: Option<TaskIndex>,
    /// The number of nested takes by `holder` beyond the first one.
    recursion: usize,
    allocation: usize,
    cb: Option<CbRef>,
}

impl SemaphoreCb {
    fn is_mutex(&self) -> bool {
        matches!(
            self.kind,
            SemaphoreKind::Mutex | SemaphoreKind::RecursiveMutex
        )
    }
}

impl Inner {
    #[track_caller]
    fn semaphore(&mut self, id: SemaphoreId) -> &mut SemaphoreCb {
        match self.semaphores.get_mut(id.index()) {
            Some(semaphore) => semaphore,
            None => panic!("invalid semaphore ID: {id:?}"),
        }
    }

    fn semaphore_try_take(&mut self, id: SemaphoreId, taker: Option<TaskIndex>) -> bool {
        let semaphore = self.semaphore(id);
        if semaphore.count == 0 {
            return false;
        }
        semaphore.count -= 1;
        if semaphore.is_mutex() {
            semaphore.holder = taker;
            semaphore.recursion = 0;
        }
        true
    }

    /// Returns `Ok(preempt)` on success.
    fn semaphore_give(
        &mut self,
        id: SemaphoreId,
        giver: Option<TaskIndex>,
    ) -> Result<bool, ResultCode> {
        let semaphore = self.semaphore(id);
        if semaphore.count >= semaphore.max {
            return Err(ResultCode::QueueOverflow);
        }
        if semaphore.is_mutex() {
            if semaphore.holder.is_some() && semaphore.holder != giver {
                return Err(ResultCode::NotOwner);
            }
            semaphore.holder = None;
        }
        semaphore.count += 1;
        Ok(self.wake_first(WaitOn::Semaphore(id.index())))
    }
}

impl State {
    fn create_semaphore(
        &self,
        kind: SemaphoreKind,
        cb: Option<*mut StaticCb>,
    ) -> Result<SemaphoreId, ResultCode> {
        let (count, max) = match kind {
            SemaphoreKind::Binary => (0, 1),
            SemaphoreKind::Counting { max, initial } => {
                if max == 0 || initial > max {
                    return Err(ResultCode::BadParam);
                }
                (initial, max)
            }
            SemaphoreKind::Mutex | SemaphoreKind::RecursiveMutex => (1, 1),
        };

        let mut g = self.enter();
        let key = g.semaphores.vacant_key();
        let (cb, allocation) = match cb {
            Some(cb) => {
                // Safety: Upheld by `raw_semaphore_create_static`'s caller
                let cb = unsafe { CbRef::install(cb, 2, key) }.ok_or(ResultCode::BadParam)?;
                (Some(cb), 0)
            }
            None => {
                self.heap.lock().allocate(QUEUE_CB_SIZE)?;
                (None, QUEUE_CB_SIZE)
            }
        };

        g.semaphores.insert(SemaphoreCb {
            kind,
            count,
            max,
            holder: None,
            recursion: 0,
            allocation,
            cb,
        });
        log::trace!("created semaphore {key} ({kind:?})");
        Ok(SemaphoreId::from_index(key))
    }

    fn delete_semaphore(&self, id: SemaphoreId) {
        let mut g = self.enter();
        let _ = g.semaphore(id);
        g.assert_no_waiters(&[WaitOn::Semaphore(id.index())], "semaphore");
        let semaphore = g.semaphores.remove(id.index());
        if let Some(cb) = &semaphore.cb {
            cb.check();
        }
        self.heap.lock().release(semaphore.allocation);
        log::trace!("deleted semaphore {}", id.index());
    }

    fn semaphore_take<I: PortInstance>(&self, id: SemaphoreId, ticks: TickType) -> ResultCode {
        let g = self.enter();
        let me = g.running_task();
        let (_g, taken) = self.wait_for::<I, _>(g, WaitOn::Semaphore(id.index()), ticks, |g| {
            g.semaphore_try_take(id, me).then_some(())
        });
        match taken {
            Some(()) => ResultCode::Success,
            None => ResultCode::Timeout,
        }
    }

    fn semaphore_give<I: PortInstance>(&self, id: SemaphoreId) -> ResultCode {
        let mut g = self.enter();
        let me = g.running_task();
        match g.semaphore_give(id, me) {
            Ok(_) => {
                // Releasing a mutex may also end a priority inheritance, so
                // the running task is re-evaluated either way
                drop(self.reschedule::<I>(g));
                ResultCode::Success
            }
            Err(e) => e,
        }
    }
}

unsafe impl<I: PortInstance> KernelSemaphore for System<I> {
    type RawSemaphoreId = SemaphoreId;
    type RawStaticSemaphoreCb = StaticCb;

    fn raw_semaphore_create(kind: SemaphoreKind) -> Result<SemaphoreId, ResultCode> {
        I::port_state().create_semaphore(kind, None)
    }

    unsafe fn raw_semaphore_create_static(
        kind: SemaphoreKind,
        cb: *mut StaticCb,
    ) -> Result<SemaphoreId, ResultCode> {
        I::port_state().create_semaphore(kind, Some(cb))
    }

    unsafe fn raw_semaphore_delete(this: SemaphoreId) {
        I::port_state().delete_semaphore(this)
    }

    unsafe fn raw_semaphore_take(this: SemaphoreId, ticks: TickType) -> ResultCode {
        I::port_state().semaphore_take::<I>(this, ticks)
    }

    unsafe fn raw_semaphore_take_from_isr(
        this: SemaphoreId,
        _higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        // Taking never releases a task, so the flag is left untouched
        let mut g = I::port_state().enter();
        if g.semaphore_try_take(this, None) {
            ResultCode::Success
        } else {
            ResultCode::Timeout
        }
    }

    unsafe fn raw_semaphore_give(this: SemaphoreId) -> ResultCode {
        I::port_state().semaphore_give::<I>(this)
    }

    unsafe fn raw_semaphore_give_from_isr(
        this: SemaphoreId,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        let mut g = I::port_state().enter();
        match g.semaphore_give(this, None) {
            Ok(preempt) => {
                *higher_priority_task_woken |= preempt;
                ResultCode::Success
            }
            Err(e) => e,
        }
    }

    unsafe fn raw_semaphore_take_recursive(this: SemaphoreId, ticks: TickType) -> ResultCode {
        let state = I::port_state();
        {
            let mut g = state.enter();
            let me = g.running_task();
            let semaphore = g.semaphore(this);
            if me.is_some() && semaphore.holder == me {
                semaphore.recursion += 1;
                return ResultCode::Success;
            }
        }
        state.semaphore_take::<I>(this, ticks)
    }

    unsafe fn raw_semaphore_give_recursive(this: SemaphoreId) -> ResultCode {
        let state = I::port_state();
        {
            let mut g = state.enter();
            let me = g.running_task();
            let semaphore = g.semaphore(this);
            if me.is_none() || semaphore.holder != me {
                return ResultCode::NotOwner;
            }
            if semaphore.recursion > 0 {
                semaphore.recursion -= 1;
                return ResultCode::Success;
            }
        }
        state.semaphore_give::<I>(this)
    }

    unsafe fn raw_semaphore_count(this: SemaphoreId) -> usize {
        I::port_state().enter().semaphore(this).count
    }

    unsafe fn raw_semaphore_holder(this: SemaphoreId) -> Option<TaskId> {
        I::port_state()
            .enter()
            .semaphore(this)
            .holder
            .map(TaskId::from_index)
    }
}
