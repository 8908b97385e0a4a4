// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! nRF52805 implementations of the session collaborators.

use bootloader_core::{Board, FlashHal, Ticks};
use consts::FLASH_PAGE;
use defmt::warn;
use embassy_nrf::nvmc::{self, Nvmc};
use embassy_time::Instant;
use embedded_storage::nor_flash::NorFlash;
use heapless::{Deque, Vec};
use host_protocol::{Transport, PACKET_LEN};

pub const RX_LEN: usize = 64;
/// One poll sends at most an acknowledge and two more frames.
pub const TX_LEN: usize = 4 * PACKET_LEN;

/// Byte queues between the buffered UARTE and the session.
///
/// The main loop fills `rx` from the UARTE ring buffer and drains `tx` into it after
/// every poll, so the session never waits on the serial port.
#[derive(Default)]
pub struct UartLink {
    rx: Deque<u8, RX_LEN>,
    tx: Vec<u8, TX_LEN>,
}

impl UartLink {
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn receive(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.rx.push_back(byte).is_err() {
                warn!("RX queue full, byte dropped");
            }
        }
    }

    pub fn take_tx(&mut self) -> Vec<u8, TX_LEN> {
        core::mem::take(&mut self.tx)
    }
}

impl Transport for UartLink {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) {
        if self.tx.extend_from_slice(bytes).is_err() {
            warn!("TX queue full, {} bytes dropped", bytes.len());
        }
    }
}

/// NVMC backed flash.
///
/// The NVMC programs whole words, a halfword is written with the other half left
/// at 0xFF so each word takes two writes between erases, the limit on the nRF52805.
pub struct NrfFlash<'d> {
    nvmc: Nvmc<'d>,
}

impl<'d> NrfFlash<'d> {
    pub fn new(nvmc: Nvmc<'d>) -> Self {
        Self { nvmc }
    }
}

impl FlashHal for NrfFlash<'_> {
    type Error = nvmc::Error;

    // The NVMC driver enables write and erase around every operation
    fn unlock(&mut self) {}

    fn lock(&mut self) {}

    fn erase_page(&mut self, address: u32) -> Result<(), Self::Error> {
        self.nvmc.erase(address, address + FLASH_PAGE)
    }

    fn program_halfword(&mut self, address: u32, halfword: u16) -> Result<(), Self::Error> {
        let offset = (address & 0b11) as usize;
        let mut word = [0xFF; 4];
        word[offset..offset + 2].copy_from_slice(&halfword.to_le_bytes());
        self.nvmc.write(address & !0b11, &word)
    }
}

/// Millisecond clock plus the requests the main loop carries out once the
/// session is over and its last frame left the UARTE.
#[derive(Default)]
pub struct NrfBoard {
    pub pulses: u8,
    pub boot_address: Option<u32>,
}

impl Board for NrfBoard {
    fn now(&self) -> Ticks {
        Instant::now().as_millis()
    }

    fn pulse_indicator(&mut self, count: u8) {
        self.pulses = count;
    }

    fn boot(&mut self, application_base: u32) {
        self.boot_address = Some(application_base);
    }
}
