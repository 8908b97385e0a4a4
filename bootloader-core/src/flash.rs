// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::log::{debug, info};
use core::fmt::Debug;

/// Flash hardware primitives.
pub trait FlashHal {
    type Error: Debug;

    /// Enables erase and program operations.
    fn unlock(&mut self);

    fn lock(&mut self);

    /// Erases the page starting at `address`.
    fn erase_page(&mut self, address: u32) -> Result<(), Self::Error>;

    /// Programs one 16-bit unit at the even `address`.
    fn program_halfword(&mut self, address: u32, halfword: u16) -> Result<(), Self::Error>;
}

/// Placement of the application region in flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    pub flash_base: u32,
    pub page_size: u32,
    /// First page of the application, right after the bootloader
    pub first_app_page: u32,
    /// Last page of the application (inclusive)
    pub last_app_page: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Layout {
    pub const DEFAULT: Layout = Layout {
        flash_base: consts::FLASH_BASE,
        page_size: consts::FLASH_PAGE,
        first_app_page: consts::APP_FIRST_PAGE,
        last_app_page: consts::APP_LAST_PAGE,
    };

    pub const fn application_base(&self) -> u32 {
        self.flash_base + self.first_app_page * self.page_size
    }

    /// First address past the application region.
    pub const fn application_end(&self) -> u32 {
        self.flash_base + (self.last_app_page + 1) * self.page_size
    }

    pub const fn application_size(&self) -> u32 {
        self.application_end() - self.application_base()
    }

    /// Start address of every application page, in order.
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        let (base, size) = (self.flash_base, self.page_size);
        (self.first_app_page..=self.last_app_page).map(move |page| base + page * size)
    }

    /// True when `[address, address + len)` lies inside the application region.
    pub fn contains(&self, address: u32, len: usize) -> bool {
        let Ok(len) = u32::try_from(len) else {
            return false;
        };
        match address.checked_add(len) {
            Some(end) => address >= self.application_base() && end <= self.application_end(),
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError<E> {
    /// Write would touch flash outside the application region
    OutOfBounds { address: u32, len: usize },
    /// Program operations work on 16-bit units
    Misaligned { address: u32 },
    Hal(E),
}

/// Erases and programs the application region, never the bootloader.
pub struct FlashProgrammer<F> {
    hal: F,
    layout: Layout,
}

impl<F: FlashHal> FlashProgrammer<F> {
    pub fn new(hal: F, layout: Layout) -> Self {
        Self { hal, layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn hal(&self) -> &F {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut F {
        &mut self.hal
    }

    pub fn release(self) -> F {
        self.hal
    }

    /// Erases every application page. Flash is locked again even if a page fails.
    pub fn erase_application(&mut self) -> Result<(), FlashError<F::Error>> {
        info!(
            "Erasing application {:#x}..{:#x}",
            self.layout.application_base(),
            self.layout.application_end()
        );

        self.hal.unlock();
        let hal = &mut self.hal;
        let result = self.layout.pages().try_for_each(|page| hal.erase_page(page));
        self.hal.lock();

        result.map_err(FlashError::Hal)
    }

    /// Programs `data` at `address` in 16-bit little endian units, an odd trailing
    /// byte is paired with 0xFF.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError<F::Error>> {
        if !self.layout.contains(address, data.len()) {
            return Err(FlashError::OutOfBounds {
                address,
                len: data.len(),
            });
        }
        if address % 2 != 0 {
            return Err(FlashError::Misaligned { address });
        }

        debug!("Programming {} bytes at {:#x}", data.len(), address);

        self.hal.unlock();
        let hal = &mut self.hal;
        let result = data.chunks(2).zip((address..).step_by(2)).try_for_each(|(unit, addr)| {
            let high = unit.get(1).copied().unwrap_or(0xFF);
            hal.program_halfword(addr, u16::from_le_bytes([unit[0], high]))
        });
        self.hal.lock();

        result.map_err(FlashError::Hal)
    }
}
