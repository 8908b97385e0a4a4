// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::codec::{Frame, PacketCodec};
use crate::log::{debug, trace, warn};
use crate::packet::{Control, Packet, PACKET_LEN};
use crate::queue::PacketQueue;

/// Depth of the received packets ring.
pub const RX_QUEUE_LEN: usize = 16;

/// Raw byte link to the other side, usually a UART.
pub trait Transport {
    /// Next received byte, `None` when nothing is pending.
    fn read_byte(&mut self) -> Option<u8>;

    fn write(&mut self, bytes: &[u8]);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn write(&mut self, bytes: &[u8]) {
        (**self).write(bytes)
    }
}

/// Reliable packet layer on top of a [`Transport`].
///
/// Corrupted frames are answered with a retransmit request, valid data frames are
/// queued and acknowledged, and a retransmit request from the other side replays
/// the last frame sent, byte for byte.
pub struct Channel<const N: usize = RX_QUEUE_LEN> {
    codec: PacketCodec,
    queue: PacketQueue<N>,
    last_sent: [u8; PACKET_LEN],
}

impl<const N: usize> Default for Channel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Channel<N> {
    pub fn new() -> Self {
        Self {
            codec: PacketCodec::new(),
            queue: PacketQueue::new(),
            // Nothing sent yet, a retransmit request is answered with an acknowledge
            last_sent: Packet::control(Control::Ack).to_bytes(),
        }
    }

    /// Sends `packet` and remembers it for retransmission unless it is a link control frame.
    pub fn write<T: Transport>(&mut self, link: &mut T, packet: &Packet) {
        let bytes = PacketCodec::encode(packet);
        link.write(&bytes);

        if !packet.as_control().is_some_and(Control::is_link) {
            self.last_sent = bytes;
        }
    }

    pub fn send<T: Transport>(&mut self, link: &mut T, control: Control) {
        self.write(link, &Packet::control(control));
    }

    /// Pulls at most one byte from `link`. Returns false when nothing was pending.
    pub fn update<T: Transport>(&mut self, link: &mut T) -> bool {
        match link.read_byte() {
            Some(byte) => {
                self.on_byte(link, byte);
                true
            }
            None => false,
        }
    }

    /// Feeds one received byte and reacts to a completed frame.
    pub fn on_byte<T: Transport>(&mut self, link: &mut T, byte: u8) {
        let Some(frame) = self.codec.feed(byte) else {
            return;
        };

        match frame {
            Frame::Invalid(packet) => {
                debug!("CRC mismatch (got {:#x}), asking for retransmit", packet.crc);
                self.send(link, Control::Retx);
            }
            Frame::Valid(packet) if packet.is_control(Control::Retx) => {
                debug!("Retransmit requested");
                link.write(&self.last_sent);
            }
            Frame::Valid(packet) if packet.is_control(Control::Ack) => {
                trace!("Ack received");
            }
            Frame::Valid(packet) => {
                if self.queue.push(packet).is_some() {
                    warn!("Receive queue full, oldest packet dropped");
                }
                self.send(link, Control::Ack);
            }
        }
    }

    pub fn packets_available(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn read(&mut self) -> Option<Packet> {
        self.queue.pop()
    }

    /// Bytes replayed on the next retransmit request.
    pub fn last_sent(&self) -> &[u8; PACKET_LEN] {
        &self.last_sent
    }
}
