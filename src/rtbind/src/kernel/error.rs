use core::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use rtbind::kernel::ResultCode;
            /// assert_eq!(ResultCode::QueueOverflow.as_str(), "QueueOverflow");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that a raw kernel operation can
    /// return.
    ///
    /// The kernel reports most outcomes as a tri-state: success, an expected
    /// failure ([`Timeout`], [`QueueOverflow`]), or a usage error. The
    /// wrappers in [`kernel`](crate::kernel) collapse this into `bool` or
    /// `Option<T>`, so application code rarely sees a `ResultCode`.
    ///
    /// The discriminants follow the μITRON4.0 error codes.
    ///
    /// [`Timeout`]: ResultCode::Timeout
    /// [`QueueOverflow`]: ResultCode::QueueOverflow
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// A parameter is invalid, e.g., a zero-length queue or a trigger
        /// level exceeding the buffer size.
        BadParam = -17,
        /// The current context disallows the operation, e.g., a blocking call
        /// was made from an interrupt context or while the scheduler is
        /// suspended.
        BadContext = -25,
        /// The caller does not own the resource.
        NotOwner = -29,
        /// The kernel heap could not satisfy an allocation.
        NoMemory = -33,
        /// A target object is in a state that disallows the operation.
        BadObjectState = -41,
        /// The object is full: a queue has no free slot, a semaphore is at its
        /// maximum count, or a notification slot already holds a pending value.
        QueueOverflow = -43,
        /// The operation timed out, or a non-blocking attempt found the
        /// unblocking condition unsatisfied.
        Timeout = -50,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a success.
    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Convert `self` to `Result<(), ResultCode>`.
    #[inline]
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_variants() {
        assert_eq!(format!("{:?}", ResultCode::Timeout), "Timeout");
        assert_eq!(ResultCode::NoMemory.as_str(), "NoMemory");
    }

    #[test]
    fn only_success_converts_to_ok() {
        assert_eq!(ResultCode::Success.into_result(), Ok(()));
        assert_eq!(
            ResultCode::QueueOverflow.into_result(),
            Err(ResultCode::QueueOverflow)
        );
        assert!(!ResultCode::Timeout.is_success());
    }

    #[test]
    fn discriminants_are_negative_for_errors() {
        assert_eq!(ResultCode::Success as i8, 0);
        assert_eq!(ResultCode::Timeout as i8, -50);
        assert!((ResultCode::BadContext as i8) < 0);
    }
}
