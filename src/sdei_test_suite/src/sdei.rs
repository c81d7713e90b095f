//! SDEI types shared by the test cases and the ports
use core::fmt;

/// An SDEI event number.
pub type EventNum = u32;

/// An interrupt ID (GSIV) as understood by the interrupt controller.
pub type IntId = u32;

bitflags::bitflags! {
    /// The value returned by `SDEI_EVENT_STATUS`.
    ///
    /// The bit positions are fixed by the SDEI ABI and must not
    /// be changed.
    pub struct EventStatus: u64 {
        /// A handler is registered for the event.
        const REGISTERED = 1 << 0;
        /// The event is enabled.
        const ENABLED = 1 << 1;
        /// A handler for the event is currently running.
        const RUNNING = 1 << 2;
    }
}

impl EventStatus {
    /// Get a flag indicating whether the event is in the Handler-Unregister
    /// Pending state, i.e., it's still running but no longer registered.
    #[inline]
    pub fn is_unregister_pending(self) -> bool {
        self.contains(Self::RUNNING) && !self.contains(Self::REGISTERED)
    }
}

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
            /// use sdei_test_suite::sdei::ResultCode;
            /// assert_eq!(ResultCode::Pending.as_str(), "Pending");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            /// Decode a raw value returned by an SDEI call. Returns `None` if
            /// the value isn't a known result code.
            pub fn from_raw(raw: i64) -> Option<Self> {
                match raw {
                    $(
                        x if x == $vd => Some(Self::$vname),
                    )*
                    _ => None,
                }
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that an SDEI call can return.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The call completed successfully.
        Success = 0,
        /// The call is not supported by the implementation.
        NotSupported = -1,
        /// One of the parameters is invalid, e.g., an unknown event number.
        InvalidParameters = -2,
        /// The call was denied because of the current state of the event.
        Denied = -3,
        /// The call could not complete immediately and will take effect later.
        ///
        /// `SDEI_EVENT_UNREGISTER` returns this when the event is running.
        Pending = -5,
        /// There are insufficient resources to complete the call.
        OutOfResource = -10,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode`
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                match x {
                    $( $name::$vname => Self::$vname, )*
                }
            }
        }

        impl TryFrom<ResultCode> for $name {
            /// The code is `Success` or isn't a valid error for this call.
            type Error = ResultCode;

            #[inline]
            fn try_from(x: ResultCode) -> Result<Self, ResultCode> {
                match x {
                    $( ResultCode::$vname => Ok(Self::$vname), )*
                    other => Err(other),
                }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                    assert_eq!(
                        ResultCode::$vname as i8,
                        $name::$vname as i8,
                    );
                )*
            }

            #[test]
            fn from_result_code() {
                $(
                    assert_eq!(
                        Ok($name::$vname),
                        $name::try_from(ResultCode::$vname),
                    );
                )*
                assert_eq!(
                    Err(ResultCode::Success),
                    $name::try_from(ResultCode::Success),
                );
            }
        }
    };
}

define_error! {
    mod event_status_error {}
    /// Error type for [`Sdei::event_status`].
    ///
    /// [`Sdei::event_status`]: crate::platform::Sdei::event_status
    pub enum EventStatusError {
        NotSupported,
        /// The event number is invalid.
        InvalidParameters,
    }
}

define_error! {
    mod interrupt_bind_error {}
    /// Error type for [`Sdei::interrupt_bind`].
    ///
    /// [`Sdei::interrupt_bind`]: crate::platform::Sdei::interrupt_bind
    pub enum InterruptBindError {
        NotSupported,
        /// The interrupt can't be bound to an event.
        InvalidParameters,
        /// The interrupt is already bound.
        Denied,
        /// No free event is available for binding.
        OutOfResource,
    }
}

define_error! {
    mod register_event_error {}
    /// Error type for [`Sdei::event_register`].
    ///
    /// [`Sdei::event_register`]: crate::platform::Sdei::event_register
    pub enum RegisterEventError {
        NotSupported,
        /// The event number or the routing mode is invalid.
        InvalidParameters,
        /// A handler is already registered or an unregistration is pending.
        Denied,
    }
}

define_error! {
    mod enable_event_error {}
    /// Error type for [`Sdei::event_enable`].
    ///
    /// [`Sdei::event_enable`]: crate::platform::Sdei::event_enable
    pub enum EnableEventError {
        NotSupported,
        InvalidParameters,
        /// No handler is registered for the event.
        Denied,
    }
}

define_error! {
    mod unregister_event_error {}
    /// Error type for [`Sdei::event_unregister`].
    ///
    /// `Pending` is not an error here; see [`Unregistration`].
    ///
    /// [`Sdei::event_unregister`]: crate::platform::Sdei::event_unregister
    pub enum UnregisterEventError {
        NotSupported,
        InvalidParameters,
        /// No handler is registered for the event.
        Denied,
    }
}

define_error! {
    mod interrupt_release_error {}
    /// Error type for [`Sdei::interrupt_release`].
    ///
    /// [`Sdei::interrupt_release`]: crate::platform::Sdei::interrupt_release
    pub enum InterruptReleaseError {
        NotSupported,
        /// The event number doesn't refer to a bound interrupt event.
        InvalidParameters,
        /// The event is still registered.
        Denied,
    }
}

/// The successful result of `SDEI_EVENT_UNREGISTER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    /// The handler was unregistered immediately.
    Complete,
    /// The event is running. The handler will be unregistered when the
    /// running handler completes.
    Pending,
}

impl Unregistration {
    /// Decode the raw result of `SDEI_EVENT_UNREGISTER`.
    pub fn from_result_code(code: ResultCode) -> Result<Self, UnregisterEventError> {
        match code {
            ResultCode::Success => Ok(Self::Complete),
            ResultCode::Pending => Ok(Self::Pending),
            other => Err(UnregisterEventError::try_from(other)
                .unwrap_or(UnregisterEventError::InvalidParameters)),
        }
    }
}

/// An event created by binding an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub event_num: EventNum,
    /// The event wraps a physical interrupt line.
    pub is_bound_irq: bool,
}

/// The entry point and the argument passed to `SDEI_EVENT_REGISTER`.
///
/// The dispatcher calls `entry(arg)` in the interrupt context each time the
/// event is delivered. `entry` must not block.
#[derive(Clone, Copy)]
pub struct EventHandler {
    pub entry: unsafe extern "C" fn(arg: usize),
    pub arg: usize,
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("entry", &(self.entry as usize as *const ()))
            .field("arg", &(self.arg as *const ()))
            .finish()
    }
}

/// The routing mode of an event registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// The event may be delivered to any PE.
    Any,
    /// The event is delivered to the PE with the specified affinity.
    Pe(u64),
}
