// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update session as a pure state transition.
//!
//! [`transition`] never touches hardware: it returns the next [`Session`] and the
//! [`Effect`]s the caller has to carry out, in order.

use crate::flash::Layout;
use crate::log::warn;
use crate::timer::Ticks;
use host_protocol::{Control, Packet, PAYLOAD_LEN};

/// Runtime parameters of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Value the host must send back in the device ID response
    pub device_id: u8,
    pub sync_magic: [u8; 4],
    /// Deadline of every waiting state, in ticks
    pub session_timeout: Ticks,
    pub layout: Layout,
    /// Indicator toggles after a successful update
    pub success_pulses: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: consts::DEVICE_ID,
            sync_magic: consts::SYNC_MAGIC,
            session_timeout: consts::SESSION_TIMEOUT_MS,
            layout: Layout::DEFAULT,
            success_pulses: consts::SUCCESS_PULSE_COUNT,
        }
    }
}

/// How the session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// New image programmed
    Updated,
    /// Timeout, flash fault or protocol dead end, whatever is in flash gets booted
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Looking for the sync magic in the raw byte stream
    Sync,
    SendUpdateReq,
    WaitForUpdateRes,
    DeviceIdReq,
    DeviceIdRes,
    FwLengthReq,
    FwLengthRes,
    EraseApplication,
    ReceiveFirmware,
    UpdateSuccess,
    /// Control was handed to the application
    HandedOff(Outcome),
}

impl State {
    /// States that wait for the host and are bounded by the session timer.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            State::Sync | State::WaitForUpdateRes | State::DeviceIdRes | State::FwLengthRes | State::ReceiveFirmware
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    pub state: State,
    /// Image length announced by the host
    pub firmware_length: u32,
    /// Flash address of the next data packet
    pub write_cursor: u32,
    pub bytes_written: u32,
    /// Last four raw bytes seen while looking for the sync magic
    pub sync_window: [u8; 4],
}

impl Session {
    pub fn new(layout: &Layout) -> Self {
        Self {
            state: State::Sync,
            firmware_length: 0,
            write_cursor: layout.application_base(),
            bytes_written: 0,
            sync_window: [0; 4],
        }
    }
}

/// Input of one session step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Nothing received, drives the states that only act
    Idle,
    /// Raw byte, only looked at while synchronizing
    Byte(u8),
    /// Packet taken from the receive queue
    Packet(Packet),
    /// The session timer elapsed
    Timeout,
    /// A flash operation failed
    Fault,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    /// Transmit a control frame
    Send(Control),
    /// Restart the session timer from now
    ArmTimer,
    EraseApplication,
    Program { address: u32, data: [u8; PAYLOAD_LEN] },
    /// Toggle the indicator `count` times
    Pulse(u8),
    /// Jump to the application vector table at this address
    Boot(u32),
}

/// A single step never yields more than three effects.
pub type Effects = heapless::Vec<Effect, 4>;

fn emit(effects: &[Effect]) -> Effects {
    effects.iter().copied().collect()
}

fn fail(mut session: Session, config: &Config) -> (Session, Effects) {
    session.state = State::HandedOff(Outcome::Failed);
    let effects = emit(&[
        Effect::Send(Control::FwUpdateFailed),
        Effect::Boot(config.layout.application_base()),
    ]);
    (session, effects)
}

fn is_device_id_response(packet: &Packet, device_id: u8) -> bool {
    packet.length == 2
        && packet.payload[0] == Control::DeviceIdRes.code()
        && packet.payload[1] == device_id
        && packet.is_intact()
}

fn firmware_length(packet: &Packet) -> Option<u32> {
    if packet.length != 5 || packet.payload[0] != Control::FwLengthRes.code() || !packet.is_intact() {
        return None;
    }
    let mut be = [0u8; 4];
    be.copy_from_slice(&packet.payload[1..5]);
    Some(u32::from_be_bytes(be))
}

/// Advances `session` by one event.
pub fn transition(mut session: Session, event: Event, config: &Config) -> (Session, Effects) {
    let none = Effects::new();

    match (session.state, event) {
        (State::HandedOff(_), _) => (session, none),
        (_, Event::Fault) => fail(session, config),
        (state, Event::Timeout) if state.is_waiting() => fail(session, config),

        (State::Sync, Event::Byte(byte)) => {
            session.sync_window.copy_within(1.., 0);
            session.sync_window[3] = byte;
            if session.sync_window != config.sync_magic {
                return (session, none);
            }
            session.state = State::SendUpdateReq;
            (session, emit(&[Effect::Send(Control::SeqObserved)]))
        }

        (State::SendUpdateReq, _) => {
            session.state = State::WaitForUpdateRes;
            (session, emit(&[Effect::Send(Control::FwUpdateReq), Effect::ArmTimer]))
        }
        (State::WaitForUpdateRes, Event::Packet(packet)) if packet.is_control(Control::FwUpdateRes) => {
            session.state = State::DeviceIdReq;
            (session, none)
        }

        (State::DeviceIdReq, _) => {
            session.state = State::DeviceIdRes;
            (session, emit(&[Effect::Send(Control::DeviceIdReq), Effect::ArmTimer]))
        }
        (State::DeviceIdRes, Event::Packet(packet)) if is_device_id_response(&packet, config.device_id) => {
            session.state = State::FwLengthReq;
            (session, none)
        }

        (State::FwLengthReq, _) => {
            session.state = State::FwLengthRes;
            (session, emit(&[Effect::Send(Control::FwLengthReq), Effect::ArmTimer]))
        }
        (State::FwLengthRes, Event::Packet(packet)) => match firmware_length(&packet) {
            Some(length) if length <= config.layout.application_size() => {
                session.firmware_length = length;
                session.state = State::EraseApplication;
                (session, none)
            }
            Some(length) => {
                warn!("Image of {} bytes does not fit the application region", length);
                (session, none)
            }
            None => (session, none),
        },

        (State::EraseApplication, _) => {
            session.state = if session.firmware_length == 0 {
                State::UpdateSuccess
            } else {
                State::ReceiveFirmware
            };
            let effects = emit(&[
                Effect::EraseApplication,
                Effect::Send(Control::ReadyForData),
                Effect::ArmTimer,
            ]);
            (session, effects)
        }
        (State::ReceiveFirmware, Event::Packet(packet)) => {
            let program = Effect::Program {
                address: session.write_cursor,
                data: packet.payload,
            };
            session.write_cursor = session.write_cursor.saturating_add(PAYLOAD_LEN as u32);
            session.bytes_written = session.bytes_written.saturating_add(PAYLOAD_LEN as u32);

            if session.bytes_written >= session.firmware_length {
                session.state = State::UpdateSuccess;
                (session, emit(&[program]))
            } else {
                (session, emit(&[program, Effect::Send(Control::ReadyForData), Effect::ArmTimer]))
            }
        }

        (State::UpdateSuccess, _) => {
            session.state = State::HandedOff(Outcome::Updated);
            let effects = emit(&[
                Effect::Send(Control::FwUpdateSuccess),
                Effect::Pulse(config.success_pulses),
                Effect::Boot(config.layout.application_base()),
            ]);
            (session, effects)
        }

        // Guard not satisfied, keep waiting until the timer runs out
        _ => (session, none),
    }
}
