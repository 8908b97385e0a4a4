// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host to bootloader serial protocol.
//! The host pushes a new application image, the MCU bootloader receives and programs it.
//! Every exchange is an 18 bytes frame: a length byte, a 16 bytes payload padded with
//! 0xFF and a CRC-8 over both. Single byte frames carry protocol signals ([`Control`]).
//! Corrupted frames are recovered with a retransmit request, valid ones are acknowledged.

#![no_std]

pub mod channel;
pub mod codec;
pub mod host;
pub mod packet;
pub mod queue;

pub use channel::{Channel, Transport, RX_QUEUE_LEN};
pub use codec::{Frame, PacketCodec};
pub use host::{HostError, HostState, HostUpdater};
pub use packet::{checksum, Control, Packet, PacketError, FILL_BYTE, PACKET_LEN, PAYLOAD_LEN};
pub use queue::PacketQueue;

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
