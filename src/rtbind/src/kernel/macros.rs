//! Macros for internal use

/// Define a handle-owning kernel object wrapper: the struct, its validity
/// query, and a `Drop` implementation that deletes the kernel object.
macro_rules! define_handle {
    (
        $(#[$meta:meta])*
        pub struct $Name:ident<System: $Trait:ident>(System::$RawId:ident);
        delete = $delete:ident;
    ) => {
        $(#[$meta])*
        pub struct $Name<System: raw::$Trait> {
            handle: Option<System::$RawId>,
        }

        // `$Name` intentionally lacks support for cloning.

        impl<System: raw::$Trait> $Name<System> {
            /// Construct a wrapper owning `handle`, or an invalid wrapper if
            /// `handle` is `None`.
            const fn from_raw(handle: Option<System::$RawId>) -> Self {
                Self { handle }
            }

            /// Construct a wrapper from the outcome of a raw creation call.
            fn from_create_result(
                result: Result<System::$RawId, crate::kernel::ResultCode>,
            ) -> Self {
                match result {
                    Ok(id) => Self::from_raw(Some(id)),
                    Err(e) => {
                        log::debug!(concat!(stringify!($Name), " creation failed: {:?}"), e);
                        Self::from_raw(None)
                    }
                }
            }

            /// Get a flag indicating whether the kernel object was created
            /// successfully and is still owned by `self`.
            #[inline]
            pub fn is_valid(&self) -> bool {
                self.handle.is_some()
            }

            /// Get the raw ID of the owned kernel object.
            #[inline]
            pub fn raw_id(&self) -> Option<System::$RawId> {
                self.handle
            }

            #[inline]
            #[track_caller]
            fn id(&self) -> System::$RawId {
                match self.handle {
                    Some(id) => id,
                    None => crate::kernel::macros::invalid_handle(stringify!($Name)),
                }
            }
        }

        impl<System: raw::$Trait> Drop for $Name<System> {
            fn drop(&mut self) {
                if let Some(id) = self.handle.take() {
                    log::trace!(concat!("deleting ", stringify!($Name), " {:?}"), id);
                    // Safety: `self` owned the object, and it's not
                    //         accessible anymore
                    unsafe { System::$delete(id) };
                }
            }
        }

        impl<System: raw::$Trait> core::fmt::Debug for $Name<System> {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                f.debug_tuple(stringify!($Name)).field(&self.handle).finish()
            }
        }
    };
}

/// Report an operation on a handle whose creation failed.
#[cold]
#[track_caller]
pub(crate) fn invalid_handle(type_name: &str) -> ! {
    panic!("operation on an invalid `{type_name}` handle")
}
