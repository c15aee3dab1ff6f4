/// Accumulates whether interrupt-context operations unblocked a task that
/// should preempt the interrupted one.
///
/// An interrupt handler creates one flag, passes it to every `*_from_isr`
/// operation it performs, and finally hands it to
/// [`Kernel::yield_from_isr`](super::Kernel::yield_from_isr). Operations only
/// ever set the flag; nothing but the handler itself can clear it.
///
/// ```
/// use rtbind::kernel::HigherPriorityTaskWoken;
/// let woken = HigherPriorityTaskWoken::new();
/// assert!(!woken.is_set());
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use = "pass the flag to `Kernel::yield_from_isr`"]
pub struct HigherPriorityTaskWoken(bool);

impl HigherPriorityTaskWoken {
    #[inline]
    pub const fn new() -> Self {
        Self(false)
    }

    /// Get a flag indicating whether a context switch should be requested
    /// before the interrupt handler returns.
    #[inline]
    pub const fn is_set(self) -> bool {
        self.0
    }

    /// Run a raw interrupt-context operation with a fresh kernel-side flag
    /// and fold the outcome into `self`.
    #[inline]
    pub(crate) fn track<R>(&mut self, f: impl FnOnce(&mut bool) -> R) -> R {
        let mut woken = false;
        let result = f(&mut woken);
        self.0 |= woken;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_by_operation() {
        let mut woken = HigherPriorityTaskWoken::new();
        let result = woken.track(|w| {
            *w = true;
            42
        });
        assert_eq!(result, 42);
        assert!(woken.is_set());
    }

    #[test]
    fn never_cleared_by_later_operations() {
        let mut woken = HigherPriorityTaskWoken::new();
        woken.track(|w| *w = true);
        woken.track(|w| *w = false);
        woken.track(|_| {});
        assert!(woken.is_set());
    }

    #[test]
    fn stays_unset_without_wakeup() {
        let mut woken = HigherPriorityTaskWoken::new();
        woken.track(|_| {});
        assert!(!woken.is_set());
    }
}
