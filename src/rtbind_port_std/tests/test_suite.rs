//! Runs the kernel test cases under `kernel_tests` on the simulator.
use rtbind::kernel::Kernel;
use rtbind_port_std::PortInstance;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct KernelTestUtil {
    is_successful: AtomicBool,
}

impl KernelTestUtil {
    const fn new() -> Self {
        Self {
            is_successful: AtomicBool::new(false),
        }
    }

    fn success<Traits: PortInstance>(&self) {
        self.is_successful.store(true, Ordering::Relaxed);
        rtbind_port_std::System::<Traits>::end_scheduler();
    }

    fn run(&self, func: impl FnOnce()) {
        let _ = env_logger::try_init();

        if let Err(panic_info) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(func)) {
            std::panic::resume_unwind(panic_info);
        }

        if self.is_successful.load(Ordering::Relaxed) {
            return;
        }

        panic!("The program deadlocked without calling `success`");
    }
}

/// The interface between a test case and the test harness.
pub trait Driver: 'static {
    type Traits: PortInstance;

    /// Signal the successful completion of the test case. Must be called
    /// by a task or a timer callback. The caller never runs again.
    fn success();
}

/// The kernel a test case runs on.
pub type System<D> = rtbind_port_std::System<<D as Driver>::Traits>;

/// Tracks the progress of a test case that involves multiple tasks.
pub struct SeqTracker {
    counter: AtomicUsize,
}

impl SeqTracker {
    pub const fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    /// Assert that the counter is equal to `old` and then replace it with
    /// `new`.
    #[track_caller]
    pub fn expect_and_replace(&self, old: usize, new: usize) {
        let got = self.counter.load(Ordering::Relaxed);
        log::debug!("{} (expected: {}) → {}", got, old, new);
        assert_eq!(got, old, "expected {}, got {}", old, got);
        self.counter.store(new, Ordering::Relaxed);
    }
}

mod kernel_tests {
    pub mod event_group_misc;
    pub mod heap_exhaustion;
    pub mod kernel_misc;
    pub mod mutex_misc;
    pub mod queue_misc;
    pub mod semaphore_misc;
    pub mod stream_buffer_misc;
    pub mod task_delay;
    pub mod task_misc;
    pub mod task_notify;
    pub mod timer_misc;
}

macro_rules! instantiate_kernel_tests {
    ( $( $name_ident:ident, )* ) => {$(
        mod $name_ident {
            use crate::kernel_tests::$name_ident as test_case;

            rtbind_port_std::use_port!(struct SystemTraits);

            struct Driver;
            static TEST_UTIL: super::KernelTestUtil = super::KernelTestUtil::new();

            impl super::Driver for Driver {
                type Traits = SystemTraits;

                fn success() {
                    TEST_UTIL.success::<SystemTraits>();
                }
            }

            #[test]
            fn run() {
                TEST_UTIL.run(test_case::app::<Driver>);
            }
        }
    )*};
}

instantiate_kernel_tests!(
    event_group_misc,
    heap_exhaustion,
    kernel_misc,
    mutex_misc,
    queue_misc,
    semaphore_misc,
    stream_buffer_misc,
    task_delay,
    task_misc,
    task_notify,
    timer_misc,
);

/// A task panic stops the scheduler and resurfaces from `start_scheduler`.
mod task_panic {
    use rtbind::kernel::{prelude::*, CurrentTask, Task};

    rtbind_port_std::use_port!(struct SystemTraits);
    type System = rtbind_port_std::System<SystemTraits>;

    #[test]
    #[should_panic(expected = "panicked on purpose")]
    fn run() {
        let _ = env_logger::try_init();
        let _task = Task::<System>::build()
            .name("doomed")
            .spawn(|task: &CurrentTask<System>| {
                task.delay(3);
                panic!("panicked on purpose");
            });
        System::start_scheduler();
    }
}

/// The scheduler stops when every task is blocked indefinitely.
mod deadlock {
    use rtbind::kernel::{prelude::*, BinarySemaphore, CurrentTask, Task, MAX_DELAY};

    rtbind_port_std::use_port!(struct SystemTraits);
    type System = rtbind_port_std::System<SystemTraits>;

    static TEST_UTIL: super::KernelTestUtil = super::KernelTestUtil::new();

    #[test]
    #[should_panic(expected = "deadlocked")]
    fn run() {
        TEST_UTIL.run(|| {
            let sem = BinarySemaphore::<System>::new();
            let _task = Task::<System>::build()
                .name("stuck")
                .spawn(move |_: &CurrentTask<System>| {
                    sem.take(MAX_DELAY);
                    TEST_UTIL.success::<SystemTraits>();
                });
            System::start_scheduler();
        });
    }
}
