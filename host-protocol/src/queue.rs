// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::packet::Packet;

/// Fixed capacity ring of received packets.
///
/// Pushing into a full ring moves the read cursor first, so the oldest unread
/// packet is lost. Only the control loop touches the ring, there is no
/// interrupt side producer.
pub struct PacketQueue<const N: usize> {
    slots: [Packet; N],
    read: usize,
    write: usize,
    len: usize,
}

impl<const N: usize> Default for PacketQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PacketQueue<N> {
    pub const fn new() -> Self {
        assert!(N > 0, "packet queue needs at least one slot");
        Self {
            slots: [Packet::EMPTY; N],
            read: 0,
            write: 0,
            len: 0,
        }
    }

    #[inline]
    fn next(idx: usize) -> usize {
        (idx + 1) % N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Stores `packet`, returning the unread packet it overwrote if the ring was full.
    pub fn push(&mut self, packet: Packet) -> Option<Packet> {
        let evicted = if self.is_full() {
            let oldest = self.slots[self.read];
            self.read = Self::next(self.read);
            self.len -= 1;
            Some(oldest)
        } else {
            None
        };

        self.slots[self.write] = packet;
        self.write = Self::next(self.write);
        self.len += 1;
        evicted
    }

    pub fn pop(&mut self) -> Option<Packet> {
        if self.is_empty() {
            return None;
        }
        let packet = self.slots[self.read];
        self.read = Self::next(self.read);
        self.len -= 1;
        Some(packet)
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }
}
