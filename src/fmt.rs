//! Logging macros that forward to `defmt` when the `unstable-defmt` feature is enabled.
//!
//! Without the feature, the arguments are still type-checked and borrowed so that values which are
//! only logged do not trigger unused-variable warnings.
#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "unstable-defmt")]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(not(feature = "unstable-defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "unstable-defmt")]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(not(feature = "unstable-defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "unstable-defmt")]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(not(feature = "unstable-defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}
