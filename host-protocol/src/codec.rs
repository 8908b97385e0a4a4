// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::packet::{Packet, PACKET_LEN, PAYLOAD_LEN};

/// A complete frame coming out of the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// CRC matches length and payload
    Valid(Packet),
    /// CRC mismatch, the frame is handed over as received
    Invalid(Packet),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RxState {
    Length,
    Payload,
    Crc,
}

/// Reassembles frames from a byte stream, one byte at a time.
pub struct PacketCodec {
    state: RxState,
    packet: Packet,
    received: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketCodec {
    pub const fn new() -> Self {
        Self {
            state: RxState::Length,
            packet: Packet::EMPTY,
            received: 0,
        }
    }

    /// Advances the receive state by one byte, returns a frame when its CRC byte arrives.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            RxState::Length => {
                self.packet.length = byte;
                self.received = 0;
                self.state = RxState::Payload;
                None
            }
            RxState::Payload => {
                self.packet.payload[self.received] = byte;
                self.received += 1;
                if self.received == PAYLOAD_LEN {
                    self.state = RxState::Crc;
                }
                None
            }
            RxState::Crc => {
                self.packet.crc = byte;
                self.state = RxState::Length;
                self.received = 0;

                let packet = self.packet;
                if packet.is_intact() {
                    Some(Frame::Valid(packet))
                } else {
                    Some(Frame::Invalid(packet))
                }
            }
        }
    }

    /// True between frames.
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Length
    }

    /// Drops a partially received frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn encode(packet: &Packet) -> [u8; PACKET_LEN] {
        packet.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Control;

    fn feed_all(codec: &mut PacketCodec, bytes: &[u8]) -> Option<Frame> {
        let mut last = None;
        for (i, &byte) in bytes.iter().enumerate() {
            let frame = codec.feed(byte);
            if i + 1 < bytes.len() {
                assert_eq!(frame, None, "frame emitted early at byte {i}");
            }
            last = frame;
        }
        last
    }

    #[test]
    fn emits_valid_frame_on_crc_byte() {
        let packet = Packet::new(&[0x36, 0x00, 0x00, 0x00, 0x20]).unwrap();
        let mut codec = PacketCodec::new();

        assert_eq!(feed_all(&mut codec, &PacketCodec::encode(&packet)), Some(Frame::Valid(packet)));
        assert!(codec.is_idle());
    }

    #[test]
    fn reports_crc_mismatch() {
        let packet = Packet::control(Control::FwUpdateRes);
        let mut bytes = packet.to_bytes();
        bytes[5] ^= 0x10;

        let mut codec = PacketCodec::new();
        match feed_all(&mut codec, &bytes) {
            Some(Frame::Invalid(received)) => assert_eq!(received.payload[4], packet.payload[4] ^ 0x10),
            other => panic!("expected an invalid frame, got {other:?}"),
        }
    }

    #[test]
    fn back_to_back_frames() {
        let first = Packet::control(Control::Ack);
        let second = Packet::new(&[0xAB; 16]).unwrap();
        let mut codec = PacketCodec::new();

        assert_eq!(feed_all(&mut codec, &first.to_bytes()), Some(Frame::Valid(first)));
        assert_eq!(feed_all(&mut codec, &second.to_bytes()), Some(Frame::Valid(second)));
    }

    #[test]
    fn reset_drops_partial_frame() {
        let packet = Packet::control(Control::Retx);
        let mut codec = PacketCodec::new();
        codec.feed(0x01);
        codec.feed(0x02);
        assert!(!codec.is_idle());

        codec.reset();
        assert_eq!(feed_all(&mut codec, &packet.to_bytes()), Some(Frame::Valid(packet)));
    }
}
