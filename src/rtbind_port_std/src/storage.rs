//! Kernel heap accounting and the memory backing kernel objects
use std::{ptr::NonNull, slice};

use rtbind::kernel::ResultCode;

/// The simulated size of a task control block.
pub(crate) const TASK_CB_SIZE: usize = 96;
/// The simulated size of the control block shared by queues, semaphores,
/// and mutexes.
pub(crate) const QUEUE_CB_SIZE: usize = 80;
pub(crate) const EVENT_GROUP_CB_SIZE: usize = 32;
pub(crate) const STREAM_BUFFER_CB_SIZE: usize = 40;
pub(crate) const TIMER_CB_SIZE: usize = 48;

/// Byte accounting for the kernel heap. The memory itself comes from the
/// host allocator; only the totals are simulated.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    used: usize,
    limit: Option<usize>,
}

impl Heap {
    pub(crate) const fn new() -> Self {
        Self {
            used: 0,
            limit: None,
        }
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Reserve `bytes` bytes. Fails with [`ResultCode::NoMemory`] if that
    /// would exceed the limit.
    pub(crate) fn allocate(&mut self, bytes: usize) -> Result<(), ResultCode> {
        let used = self.used.checked_add(bytes).ok_or(ResultCode::NoMemory)?;
        if matches!(self.limit, Some(limit) if used > limit) {
            log::debug!(
                "heap exhausted: {bytes} bytes requested, {} of {:?} bytes in use",
                self.used,
                self.limit
            );
            return Err(ResultCode::NoMemory);
        }
        self.used = used;
        Ok(())
    }

    pub(crate) fn release(&mut self, bytes: usize) {
        assert!(bytes <= self.used, "released more than allocated");
        self.used -= bytes;
    }
}

/// The backing memory of a queue or a stream buffer.
pub(crate) enum Storage {
    /// Allocated by the kernel.
    Owned(Box<[u8]>),
    /// Provided by a static variant. Valid until the object is deleted.
    Borrowed { ptr: NonNull<u8>, len: usize },
}

// Safety: `Borrowed` memory is handed over to the kernel object, which is
//         only accessed with the kernel lock held
unsafe impl Send for Storage {}

impl Storage {
    pub(crate) fn owned(len: usize) -> Self {
        Self::Owned(vec![0; len].into_boxed_slice())
    }

    /// Take over `len` bytes at `ptr`. Returns `None` if `ptr` is null.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// returned `Storage` is dropped, and nothing else may access it in the
    /// meantime.
    pub(crate) unsafe fn borrowed(ptr: *mut u8, len: usize) -> Option<Self> {
        let ptr = NonNull::new(ptr)?;
        // The memory may be uninitialized
        // Safety: Upheld by the caller
        unsafe { ptr.as_ptr().write_bytes(0, len) };
        Some(Self::Borrowed { ptr, len })
    }

    pub(crate) fn bytes(&mut self) -> &mut [u8] {
        match self {
            Self::Owned(bytes) => bytes,
            // Safety: See `Storage::borrowed`
            Self::Borrowed { ptr, len } => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), *len) },
        }
    }
}

/// The control block embedded by the static variants of every object
/// family.
///
/// The simulator keeps its bookkeeping in its own tables. The embedded
/// control block only carries a signature that is checked when the object
/// is deleted, to catch a static object that was moved or overwritten while
/// registered.
#[derive(Debug)]
pub struct StaticCb {
    signature: usize,
}

/// The kernel's reference to a [`StaticCb`].
pub(crate) struct CbRef {
    ptr: NonNull<StaticCb>,
    signature: usize,
}

// Safety: The control block is handed over to the kernel object, which is
//         only accessed with the kernel lock held
unsafe impl Send for CbRef {}

impl CbRef {
    /// Initialize the control block at `ptr` for the object identified by
    /// `key` of the given kind. Returns `None` if `ptr` is null.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes until the returned `CbRef`
    /// is dropped.
    pub(crate) unsafe fn install(ptr: *mut StaticCb, kind: usize, key: usize) -> Option<Self> {
        let ptr = NonNull::new(ptr)?;
        let signature = 0x5354_4342 ^ (kind << 24) ^ key;
        // Safety: Upheld by the caller
        unsafe { ptr.as_ptr().write(StaticCb { signature }) };
        Some(Self { ptr, signature })
    }

    /// Assert that the control block still holds the value written by
    /// [`install`](Self::install).
    pub(crate) fn check(&self) {
        // Safety: See `CbRef::install`
        let found = unsafe { self.ptr.as_ref() }.signature;
        assert_eq!(
            found, self.signature,
            "the control block of a static kernel object was moved or overwritten"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    #[test]
    fn heap_limit() {
        let mut heap = Heap::new();
        heap.set_limit(Some(100));
        assert_eq!(heap.allocate(60), Ok(()));
        assert_eq!(heap.allocate(60), Err(ResultCode::NoMemory));
        assert_eq!(heap.used(), 60);
        heap.release(60);
        assert_eq!(heap.allocate(100), Ok(()));
        heap.set_limit(None);
        assert_eq!(heap.allocate(usize::MAX), Err(ResultCode::NoMemory));
    }

    #[test]
    fn borrowed_storage_is_zeroed() {
        let mut memory = MaybeUninit::<[u8; 16]>::uninit();
        let mut storage = unsafe { Storage::borrowed(memory.as_mut_ptr().cast(), 16) }.unwrap();
        assert_eq!(storage.bytes(), &[0; 16]);
        storage.bytes()[3] = 42;
        drop(storage);
        assert_eq!(unsafe { memory.assume_init() }[3], 42);
    }

    #[test]
    fn null_storage() {
        assert!(unsafe { Storage::borrowed(std::ptr::null_mut(), 16) }.is_none());
    }

    #[test]
    #[should_panic = "moved or overwritten"]
    fn overwritten_cb() {
        let mut cb = MaybeUninit::<StaticCb>::uninit();
        let ptr = cb.as_mut_ptr();
        let cb_ref = unsafe { CbRef::install(ptr, 1, 0) }.unwrap();
        cb_ref.check();
        unsafe { ptr.write(StaticCb { signature: 0 }) };
        cb_ref.check();
    }
}
