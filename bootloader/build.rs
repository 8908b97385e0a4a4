// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` from the memory map in `consts` and puts it where the
//! linker can find it. The bootloader is linked at the base of flash and may not
//! grow past `BOOTLOADER_SIZE`, the application region starts right after it.

use consts::{BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE, RAM_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let memory_x_content = format!(
        r##"
        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            /* Bootloader partition at the base of flash, the application follows it */
            FLASH (rx) : ORIGIN = {:#X}, LENGTH = {:#X}
            RAM : ORIGIN = 0x20000000, LENGTH = {}K
        }}
        "##,
        BASE_BOOTLOADER_ADDR,
        BOOTLOADER_SIZE,
        RAM_SIZE / 1024
    );

    // Put `memory.x` in our output directory and ensure it's
    // on the linker search path.
    let out = PathBuf::from(env::var("OUT_DIR")?);
    File::create(out.join("memory.x"))?.write_all(memory_x_content.as_bytes())?;
    println!("cargo:rustc-link-search={}", out.display());

    // Only the memory map can change the linker script
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../consts/src/lib.rs");

    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    Ok(())
}
