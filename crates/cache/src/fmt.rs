//! Log macros that forward to defmt (hardware) or tracing (simulator).
//!
//! With neither feature enabled the arguments are still type-checked through
//! `format_args!` and then discarded. Format strings must stay compatible with
//! both backends: `{}` for integers, `{:?}` for enums and structs.

#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::info!($($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}
