// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Base address of the internal flash.
pub const FLASH_BASE: u32 = 0x0000_0000;

/// Total internal flash size of the nRF52805 (192KB).
pub const FLASH_SIZE: u32 = 192 * 1024;

/// Total RAM size of the nRF52805 (24KB).
pub const RAM_SIZE: u32 = 24 * 1024;

/// Size of a flash memory page in bytes (4KB).
/// Erase operations always cover whole pages.
pub const FLASH_PAGE: u32 = 4096;

/// Size reserved for the bootloader at the base of flash (24KB).
/// The bootloader binary is padded with 0xFF up to this size when packaged,
/// and the application is linked to start right after it.
pub const BOOTLOADER_SIZE: u32 = 0x6000;

/// Start address of the bootloader, which is also the vector table base
/// programmed into VTOR on bootloader entry.
pub const BASE_BOOTLOADER_ADDR: u32 = FLASH_BASE;

/// Base address of the application image.
/// The application vector table lives here: initial MSP at offset 0, reset handler at offset 4.
pub const BASE_APP_ADDR: u32 = FLASH_BASE + BOOTLOADER_SIZE;

/// First flash page erased before an update, the page holding `BASE_APP_ADDR`.
pub const APP_FIRST_PAGE: u32 = BOOTLOADER_SIZE / FLASH_PAGE;

/// Last flash page erased before an update (inclusive).
pub const APP_LAST_PAGE: u32 = FLASH_SIZE / FLASH_PAGE - 1;

/// Maximum application size, the whole erasable application region.
pub const APP_SIZE: u32 = (APP_LAST_PAGE - APP_FIRST_PAGE + 1) * FLASH_PAGE;

/// Identifier the host must echo back in the device ID response.
pub const DEVICE_ID: u8 = 0x52;

/// Byte sequence the host sends before any framed packet.
pub const SYNC_MAGIC: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

/// Deadline, in milliseconds, for every waiting stage of an update session.
pub const SESSION_TIMEOUT_MS: u64 = 10_000;

/// Number of LED toggles after a successful update.
pub const SUCCESS_PULSE_COUNT: u8 = 10;

/// Time between two LED toggles after a successful update.
pub const SUCCESS_PULSE_PERIOD_MS: u64 = 500;
