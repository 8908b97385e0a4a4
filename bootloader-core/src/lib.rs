// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update session of the serial bootloader, free of any hardware.
//!
//! [`session::transition`] is the whole protocol as a pure function over a
//! [`Session`] value. [`Bootloader`] drives it one step per [`Bootloader::poll`],
//! feeding bytes from a [`host_protocol::Transport`], arming the session [`Timer`]
//! and carrying out flash and handoff effects through [`FlashHal`] and [`Board`].

#![no_std]

pub mod bootloader;
pub mod flash;
pub mod session;
pub mod timer;

pub use bootloader::{Board, Bootloader, Poll};
pub use flash::{FlashError, FlashHal, FlashProgrammer, Layout};
pub use session::{transition, Config, Effect, Effects, Event, Outcome, Session, State};
pub use timer::{Ticks, Timer};

#[cfg(test)]
mod tests;

#[cfg(feature = "defmt")]
pub(crate) use defmt as log;

#[cfg(all(feature = "log", not(feature = "defmt")))]
pub(crate) use ::log;

#[cfg(not(any(feature = "log", feature = "defmt")))]
#[allow(unused_imports, unused_macros)]
pub(crate) mod log {
    macro_rules! trace {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    pub(crate) use trace;
    macro_rules! debug {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    pub(crate) use debug;
    macro_rules! info {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    pub(crate) use info;
    macro_rules! warner {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    pub(crate) use warner as warn;
    macro_rules! error {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    pub(crate) use error;
}
