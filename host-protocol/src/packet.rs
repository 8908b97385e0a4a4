// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crc::{Crc, CRC_8_SMBUS};

/// Payload bytes carried by every frame, unused bytes are padded with [`FILL_BYTE`].
pub const PAYLOAD_LEN: usize = 16;

/// Full frame size on the wire: length byte, payload and CRC.
pub const PACKET_LEN: usize = 1 + PAYLOAD_LEN + 1;

/// Padding for the unused part of the payload.
pub const FILL_BYTE: u8 = 0xFF;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC-8 (polynomial 0x07, init 0x00) used for every frame.
pub fn checksum(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

/// Protocol signals, carried in the first payload byte of a single byte frame.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Control {
    /// Last frame arrived corrupted, send it again
    Retx = 0x15,
    /// Frame received and queued
    Ack = 0x19,
    /// Bootloader saw the sync sequence
    SeqObserved = 0x23,
    /// Bootloader asks the host whether an update should happen
    FwUpdateReq = 0x25,
    /// Host confirms the update
    FwUpdateRes = 0x26,
    /// Bootloader asks for the device identifier
    DeviceIdReq = 0x31,
    /// Host answers with the device identifier in the second payload byte
    DeviceIdRes = 0x32,
    /// Bootloader asks for the image length
    FwLengthReq = 0x35,
    /// Host answers with the big endian image length in the next four payload bytes
    FwLengthRes = 0x36,
    /// Bootloader is ready for the next 16 bytes of image
    ReadyForData = 0x39,
    /// Whole image programmed
    FwUpdateSuccess = 0x41,
    /// Session aborted, the bootloader boots whatever is in flash
    FwUpdateFailed = 0x42,
}

impl Control {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Retransmit and acknowledge frames belong to the link itself and are
    /// never queued for the session nor remembered for retransmission.
    pub const fn is_link(self) -> bool {
        matches!(self, Control::Retx | Control::Ack)
    }
}

impl TryFrom<u8> for Control {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x15 => Control::Retx,
            0x19 => Control::Ack,
            0x23 => Control::SeqObserved,
            0x25 => Control::FwUpdateReq,
            0x26 => Control::FwUpdateRes,
            0x31 => Control::DeviceIdReq,
            0x32 => Control::DeviceIdRes,
            0x35 => Control::FwLengthReq,
            0x36 => Control::FwLengthRes,
            0x39 => Control::ReadyForData,
            0x41 => Control::FwUpdateSuccess,
            0x42 => Control::FwUpdateFailed,
            other => return Err(other),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// Frames carry at least one byte
    Empty,
    /// More than [`PAYLOAD_LEN`] bytes
    TooLong(usize),
}

/// One protocol frame.
///
/// Fields are public so a received frame is kept exactly as it came off the wire,
/// including a length or CRC that do not match the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    pub length: u8,
    pub payload: [u8; PAYLOAD_LEN],
    pub crc: u8,
}

impl Default for Packet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Packet {
    pub const EMPTY: Packet = Packet {
        length: 0,
        payload: [0; PAYLOAD_LEN],
        crc: 0,
    };

    /// Builds a frame around `data`, padding the payload with [`FILL_BYTE`].
    pub fn new(data: &[u8]) -> Result<Self, PacketError> {
        if data.is_empty() {
            return Err(PacketError::Empty);
        }
        if data.len() > PAYLOAD_LEN {
            return Err(PacketError::TooLong(data.len()));
        }

        let mut payload = [FILL_BYTE; PAYLOAD_LEN];
        payload[..data.len()].copy_from_slice(data);

        let mut packet = Packet {
            length: data.len() as u8,
            payload,
            crc: 0,
        };
        packet.crc = packet.compute_crc();
        Ok(packet)
    }

    /// Single byte frame carrying `code`.
    pub fn sentinel(code: u8) -> Self {
        let mut payload = [FILL_BYTE; PAYLOAD_LEN];
        payload[0] = code;

        let mut packet = Packet { length: 1, payload, crc: 0 };
        packet.crc = packet.compute_crc();
        packet
    }

    pub fn control(control: Control) -> Self {
        Self::sentinel(control.code())
    }

    /// True only for the exact sentinel shape: length 1, `code`, then 0xFF filler.
    pub fn is_sentinel(&self, code: u8) -> bool {
        self.length == 1 && self.payload[0] == code && self.payload[1..].iter().all(|&b| b == FILL_BYTE)
    }

    pub fn is_control(&self, control: Control) -> bool {
        self.is_sentinel(control.code())
    }

    /// The protocol signal carried by this frame, if it is a known sentinel.
    pub fn as_control(&self) -> Option<Control> {
        let control = Control::try_from(self.payload[0]).ok()?;
        self.is_control(control).then_some(control)
    }

    /// Meaningful part of the payload according to the length byte.
    pub fn data(&self) -> &[u8] {
        let len = usize::from(self.length).min(PAYLOAD_LEN);
        &self.payload[..len]
    }

    /// CRC over the length byte followed by the full padded payload.
    pub fn compute_crc(&self) -> u8 {
        let mut digest = CRC8.digest();
        digest.update(&[self.length]);
        digest.update(&self.payload);
        digest.finalize()
    }

    pub fn is_intact(&self) -> bool {
        self.crc == self.compute_crc()
    }

    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut bytes = [0u8; PACKET_LEN];
        bytes[0] = self.length;
        bytes[1..=PAYLOAD_LEN].copy_from_slice(&self.payload);
        bytes[PACKET_LEN - 1] = self.crc;
        bytes
    }

    /// Takes the bytes as they are, see [`Packet::is_intact`] for validation.
    pub fn from_bytes(bytes: &[u8; PACKET_LEN]) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[1..=PAYLOAD_LEN]);
        Packet {
            length: bytes[0],
            payload,
            crc: bytes[PACKET_LEN - 1],
        }
    }
}
