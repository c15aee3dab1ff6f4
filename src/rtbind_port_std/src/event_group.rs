//! Event groups
use rtbind::kernel::{
    raw::{KernelEventGroup, RawEventBits},
    EventGroupWaitFlags, ResultCode, TickType,
};

use crate::{
    sched::{Guard, Inner, WaitOn, Wake},
    storage::{CbRef, StaticCb, EVENT_GROUP_CB_SIZE},
    task::EventWait,
    EventGroupId, PortInstance, State, System,
};

pub(crate) struct EventGroupCb {
    bits: RawEventBits,
    allocation: usize,
    cb: Option<CbRef>,
}

impl EventWait {
    fn is_satisfied_by(&self, bits: RawEventBits) -> bool {
        if self.flags.contains(EventGroupWaitFlags::ALL) {
            bits & self.bits == self.bits
        } else {
            bits & self.bits != 0
        }
    }
}

impl Inner {
    #[track_caller]
    fn event_group(&mut self, id: EventGroupId) -> &mut EventGroupCb {
        match self.event_groups.get_mut(id.index()) {
            Some(event_group) => event_group,
            None => panic!("invalid event group ID: {id:?}"),
        }
    }

    /// Set bits and release the waiters whose conditions are met, in the
    /// order they are released. Returns the bits after the released waiters
    /// cleared theirs, and whether any of the waiters should preempt the
    /// running task.
    fn event_group_set(&mut self, id: EventGroupId, bits: RawEventBits) -> (RawEventBits, bool) {
        let event_group = self.event_group(id);
        event_group.bits |= bits;
        let current = event_group.bits;

        let mut clear = 0;
        let mut preempt = false;
        for task in self.waiters_in_order(WaitOn::EventGroup(id.index())) {
            let Some(wait) = self.tasks[task].event_wait else {
                continue;
            };
            if !wait.is_satisfied_by(current) {
                continue;
            }
            if wait.flags.contains(EventGroupWaitFlags::CLEAR) {
                clear |= wait.bits;
            }
            self.tasks[task].event_result = Some(current);
            preempt |= self.unblock(task, Wake::Signaled);
        }

        let event_group = self.event_group(id);
        event_group.bits &= !clear;
        log::trace!(
            "event group {}: set {bits:#x}, cleared {clear:#x}, now {:#x}",
            id.index(),
            event_group.bits
        );
        (event_group.bits, preempt)
    }

    /// Check a wait condition without blocking, consuming the bits on
    /// success.
    fn event_group_poll(&mut self, id: EventGroupId, wait: EventWait) -> Option<RawEventBits> {
        let event_group = self.event_group(id);
        let current = event_group.bits;
        if !wait.is_satisfied_by(current) {
            return None;
        }
        if wait.flags.contains(EventGroupWaitFlags::CLEAR) {
            event_group.bits &= !wait.bits;
        }
        Some(current)
    }
}

impl State {
    fn create_event_group(&self, cb: Option<*mut StaticCb>) -> Result<EventGroupId, ResultCode> {
        let mut g = self.enter();
        let key = g.event_groups.vacant_key();
        let (cb, allocation) = match cb {
            Some(cb) => {
                // Safety: Upheld by `raw_event_group_create_static`'s caller
                let cb = unsafe { CbRef::install(cb, 3, key) }.ok_or(ResultCode::BadParam)?;
                (Some(cb), 0)
            }
            None => {
                self.heap.lock().allocate(EVENT_GROUP_CB_SIZE)?;
                (None, EVENT_GROUP_CB_SIZE)
            }
        };
        g.event_groups.insert(EventGroupCb {
            bits: 0,
            allocation,
            cb,
        });
        log::trace!("created event group {key}");
        Ok(EventGroupId::from_index(key))
    }

    /// Delete an event group. Tasks blocked on it are released as if the
    /// wait timed out with no bits set.
    fn delete_event_group<I: PortInstance>(&self, id: EventGroupId) {
        let mut g = self.enter();
        let _ = g.event_group(id);
        let mut preempt = false;
        for task in g.waiters_in_order(WaitOn::EventGroup(id.index())) {
            g.tasks[task].event_result = Some(0);
            preempt |= g.unblock(task, Wake::Signaled);
        }
        let event_group = g.event_groups.remove(id.index());
        if let Some(cb) = &event_group.cb {
            cb.check();
        }
        self.heap.lock().release(event_group.allocation);
        log::trace!("deleted event group {}", id.index());
        if preempt {
            drop(self.reschedule::<I>(g));
        }
    }

    /// Block the running task until `wait` is satisfied by a setter. The
    /// setter consumes the bits on the waiter's behalf.
    fn event_group_block<'a, I: PortInstance>(
        &'a self,
        mut g: Guard<'a>,
        id: EventGroupId,
        wait: EventWait,
        ticks: TickType,
    ) -> RawEventBits {
        let me = g.current_task();
        g.tasks[me].event_wait = Some(wait);
        g.tasks[me].event_result = None;

        let (mut g, result) = self.wait_for::<I, _>(g, WaitOn::EventGroup(id.index()), ticks, |g| {
            g.tasks[me].event_result.take()
        });
        g.tasks[me].event_wait = None;

        match result {
            Some(bits) => bits,
            // Deleted event groups don't time out, so `id` is still valid
            None => g.event_group(id).bits,
        }
    }

    fn event_group_wait<I: PortInstance>(
        &self,
        id: EventGroupId,
        bits: RawEventBits,
        flags: EventGroupWaitFlags,
        ticks: TickType,
    ) -> RawEventBits {
        assert_ne!(bits, 0, "waiting for no event bits");
        let wait = EventWait { bits, flags };
        let mut g = self.enter();
        if let Some(current) = g.event_group_poll(id, wait) {
            return current;
        }
        if ticks == 0 {
            return g.event_group(id).bits;
        }
        self.event_group_block::<I>(g, id, wait, ticks)
    }

    fn event_group_sync<I: PortInstance>(
        &self,
        id: EventGroupId,
        set: RawEventBits,
        wait_for: RawEventBits,
        ticks: TickType,
    ) -> RawEventBits {
        assert_ne!(wait_for, 0, "waiting for no event bits");
        let mut g = self.enter();
        let original = g.event_group(id).bits;
        let (current, preempt) = g.event_group_set(id, set);

        if (original | set) & wait_for == wait_for {
            // Every other party has already arrived
            g.event_group(id).bits &= !wait_for;
            if preempt {
                drop(self.reschedule::<I>(g));
            }
            return original | set;
        }
        if ticks == 0 {
            if preempt {
                drop(self.reschedule::<I>(g));
            }
            return current;
        }

        let wait = EventWait {
            bits: wait_for,
            flags: EventGroupWaitFlags::ALL | EventGroupWaitFlags::CLEAR,
        };
        self.event_group_block::<I>(g, id, wait, ticks)
    }
}

unsafe impl<I: PortInstance> KernelEventGroup for System<I> {
    type RawEventGroupId = EventGroupId;
    type RawStaticEventGroupCb = StaticCb;

    fn raw_event_group_create() -> Result<EventGroupId, ResultCode> {
        I::port_state().create_event_group(None)
    }

    unsafe fn raw_event_group_create_static(cb: *mut StaticCb) -> Result<EventGroupId, ResultCode> {
        I::port_state().create_event_group(Some(cb))
    }

    unsafe fn raw_event_group_delete(this: EventGroupId) {
        I::port_state().delete_event_group::<I>(this)
    }

    unsafe fn raw_event_group_wait(
        this: EventGroupId,
        bits: RawEventBits,
        flags: EventGroupWaitFlags,
        ticks: TickType,
    ) -> RawEventBits {
        I::port_state().event_group_wait::<I>(this, bits, flags, ticks)
    }

    unsafe fn raw_event_group_set(this: EventGroupId, bits: RawEventBits) -> RawEventBits {
        let state = I::port_state();
        let mut g = state.enter();
        let (current, preempt) = g.event_group_set(this, bits);
        if preempt {
            drop(state.reschedule::<I>(g));
        }
        current
    }

    unsafe fn raw_event_group_set_from_isr(
        this: EventGroupId,
        bits: RawEventBits,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        let mut g = I::port_state().enter();
        let (_, preempt) = g.event_group_set(this, bits);
        *higher_priority_task_woken |= preempt;
        ResultCode::Success
    }

    unsafe fn raw_event_group_clear(this: EventGroupId, bits: RawEventBits) -> RawEventBits {
        let mut g = I::port_state().enter();
        let event_group = g.event_group(this);
        let previous = event_group.bits;
        event_group.bits &= !bits;
        previous
    }

    unsafe fn raw_event_group_clear_from_isr(
        this: EventGroupId,
        bits: RawEventBits,
    ) -> ResultCode {
        I::port_state().enter().event_group(this).bits &= !bits;
        ResultCode::Success
    }

    unsafe fn raw_event_group_get(this: EventGroupId) -> RawEventBits {
        I::port_state().enter().event_group(this).bits
    }

    unsafe fn raw_event_group_get_from_isr(this: EventGroupId) -> RawEventBits {
        I::port_state().enter().event_group(this).bits
    }

    unsafe fn raw_event_group_sync(
        this: EventGroupId,
        set: RawEventBits,
        wait_for: RawEventBits,
        ticks: TickType,
    ) -> RawEventBits {
        I::port_state().event_group_sync::<I>(this, set, wait_for, ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_conditions() {
        let any = EventWait {
            bits: 0b101,
            flags: EventGroupWaitFlags::empty(),
        };
        let all = EventWait {
            bits: 0b101,
            flags: EventGroupWaitFlags::ALL,
        };
        assert!(any.is_satisfied_by(0b100));
        assert!(!any.is_satisfied_by(0b010));
        assert!(!all.is_satisfied_by(0b100));
        assert!(all.is_satisfied_by(0b111));
    }
}
