// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]
mod board;
mod jump_app;

use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use board::{NrfBoard, NrfFlash, UartLink, RX_LEN};
use bootloader_core::{Bootloader, Config, Outcome, Poll};
use consts::{BASE_APP_ADDR, BASE_BOOTLOADER_ADDR, SUCCESS_PULSE_PERIOD_MS};
use cortex_m::peripheral::SCB;
use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_nrf::buffered_uarte::{self, BufferedUarte};
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals;
use embassy_nrf::{bind_interrupts, uarte};
use embassy_time::{with_timeout, Duration, Timer};
use embedded_io_async::Write;
use jump_app::jump_to_app;
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => buffered_uarte::InterruptHandler<peripherals::UARTE0>;
});

static UART_RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static UART_TX_BUF: StaticCell<[u8; 128]> = StaticCell::new();

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    // Exceptions go through the bootloader vector table until the handoff
    unsafe {
        (*SCB::PTR).vtor.write(BASE_BOOTLOADER_ADDR);
    }

    let p = embassy_nrf::init(Default::default());

    let mut config_uart = uarte::Config::default();
    config_uart.parity = uarte::Parity::EXCLUDED;
    config_uart.baudrate = uarte::Baudrate::BAUD115200;

    // Uarte config
    let uart = BufferedUarte::new(
        p.UARTE0,
        p.TIMER1,
        p.PPI_CH0,
        p.PPI_CH1,
        p.PPI_GROUP0,
        Irqs,
        p.P0_16,
        p.P0_18,
        config_uart,
        UART_RX_BUF.init([0; 256]),
        UART_TX_BUF.init([0; 128]),
    );
    let (mut rx, mut tx) = uart.split();

    // Status LED, toggled after a successful update
    let mut led = Output::new(p.P0_20, Level::High, OutputDrive::Standard);

    // FLASH
    let flash = NrfFlash::new(Nvmc::new(p.NVMC));

    let mut bootloader = Bootloader::new(UartLink::default(), flash, NrfBoard::default(), Config::default());

    let mut raw_buf = [0u8; RX_LEN];
    let outcome = loop {
        // Only wait on the UARTE when the session consumed everything received
        if bootloader.link().is_empty() {
            if let Ok(Ok(n)) = with_timeout(Duration::from_micros(200), rx.read(&mut raw_buf)).await {
                bootloader.link_mut().receive(&raw_buf[..n]);
            }
        }

        let poll = bootloader.poll();

        let pending = bootloader.link_mut().take_tx();
        if !pending.is_empty() {
            if let Err(e) = tx.write_all(&pending).await {
                error!("UART write failed: {:?}", e);
            }
        }

        if let Poll::HandedOff(outcome) = poll {
            break outcome;
        }
    };

    // Last frame out before the UARTE goes away
    let _ = tx.flush().await;
    info!("Session finished: {:?}", outcome);

    if outcome == Outcome::Updated {
        for _ in 0..bootloader.board().pulses {
            led.toggle();
            Timer::after_millis(SUCCESS_PULSE_PERIOD_MS).await;
        }
    }

    let app_base = bootloader.board().boot_address.unwrap_or(BASE_APP_ADDR);
    drop(tx);
    drop(rx);
    unsafe {
        jump_to_app(app_base);
    }
}
