// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later
use cortex_m::peripheral::{NVIC, SCB};
use defmt::info;
use embassy_nrf::interrupt::Interrupt;

/// Boots the application whose vector table is at `app_base`.
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and will run code placed in the application region.
pub unsafe fn jump_to_app(app_base: u32) -> ! {
    // Disable active interrupts
    NVIC::mask(Interrupt::UARTE0_UART0);
    NVIC::mask(Interrupt::RTC1);

    critical_section::with(|_| {
        let msp = *(app_base as *const u32);
        let rv = *((app_base + 4) as *const u32);

        info!("msp = {=u32:x}, rv = {=u32:x}", msp, rv);

        // Exceptions from now on go through the application vector table
        (*SCB::PTR).vtor.write(app_base);

        // Loads MSP from the first word and branches to the reset handler in the second
        cortex_m::asm::bootload(app_base as *const u32)
    })
}
