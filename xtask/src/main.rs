// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use clap::{Parser, Subcommand};
use consts::{BASE_APP_ADDR, BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE, FLASH_BASE, FLASH_SIZE};
use std::path::{Path, PathBuf};
use std::process::{exit, Command, Stdio};
use std::{env, fs};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PACKAGE_DIR: &str = "UpdatePackage";
const BOOTLOADER_BIN: &str = "bootloader.bin";
const FULL_IMAGE: &str = "full_image";

/// Bytes of an erased flash cell.
const ERASED: u8 = 0xFF;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct XtaskArgs {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the bootloader in release and write its binary, padded with 0xFF
    /// to the whole bootloader region, to UpdatePackage/bootloader.bin
    #[command(verbatim_doc_comment)]
    BuildBootloader,

    /// Pad an existing bootloader binary to the bootloader region size, in place
    PadBootloader {
        /// Path to the bootloader binary
        path: PathBuf,
    },

    /// Merge the padded bootloader with an application binary into
    /// UpdatePackage/full_image.bin and UpdatePackage/full_image.hex
    #[command(verbatim_doc_comment)]
    Package {
        /// Application binary, linked at the application base address
        app: PathBuf,
    },

    /// BuildBootloader followed by Package
    BuildFullImage {
        /// Application binary, linked at the application base address
        app: PathBuf,
    },
}

fn project_root() -> PathBuf {
    Path::new(&env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(1)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn package_dir() -> PathBuf {
    project_root().join(PACKAGE_DIR)
}

pub fn cargo() -> String {
    env::var("CARGO").unwrap_or_else(|_| "cargo".to_string())
}

fn fail(msg: &str) -> ! {
    tracing::error!("{msg}");
    exit(-1)
}

fn run(cmd: &mut Command, verbose: bool, what: &str) {
    if !verbose {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    match cmd.status() {
        Ok(status) if status.success() => {}
        Ok(_) => fail(&format!("{what} failed")),
        Err(e) => fail(&format!("Running {what} failed: {e}")),
    }
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| fail(&format!("Unable to read {}: {e}", path.display())))
}

fn write(path: &Path, data: &[u8]) {
    if let Err(e) = fs::write(path, data) {
        fail(&format!("Unable to write {}: {e}", path.display()));
    }
}

fn build_tools_check(verbose: bool) {
    tracing::info!("Checking cargo binutils install state");
    let mut cmd = Command::new(cargo());
    cmd.current_dir(project_root()).args(["objcopy", "--version"]);
    if !verbose {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    if !cmd.status().map(|s| s.success()).unwrap_or(false) {
        tracing::info!("Please install cargo binutils with these commands:");
        tracing::info!("cargo install cargo-binutils");
        tracing::info!("rustup component add llvm-tools");
        exit(-1);
    }

    let build_dir = package_dir();
    if !build_dir.exists() {
        if let Err(e) = fs::create_dir(&build_dir) {
            fail(&format!("Unable to create {}: {e}", build_dir.display()));
        }
    }
}

fn build_bootloader(verbose: bool) {
    tracing::info!("Building bootloader....");
    let mut cmd = Command::new(cargo());
    cmd.current_dir(project_root().join("bootloader")).args(["build", "--release"]);
    if !verbose {
        cmd.arg("--quiet");
    }
    run(&mut cmd, verbose, "Bootloader build");

    tracing::info!("Creating bootloader binary file");
    let output = package_dir().join(BOOTLOADER_BIN);
    let mut cmd = Command::new(cargo());
    cmd.current_dir(project_root().join("bootloader"))
        .args(["objcopy", "--release", "--", "-O", "binary"])
        .arg(&output);
    run(&mut cmd, verbose, "Bootloader objcopy");

    print_binary_size(&output, "Bootloader Binary (actual size)", BOOTLOADER_SIZE);
    pad_bootloader_file(&output);
}

/// Fills `image` with erased bytes up to the bootloader region size.
fn pad_bootloader(image: &mut Vec<u8>) -> Result<(), usize> {
    let region = BOOTLOADER_SIZE as usize;
    if image.len() > region {
        return Err(image.len());
    }
    image.resize(region, ERASED);
    Ok(())
}

fn pad_bootloader_file(path: &Path) {
    let mut image = read(path);
    if let Err(len) = pad_bootloader(&mut image) {
        fail(&format!(
            "Bootloader is {len} bytes, more than the {BOOTLOADER_SIZE} bytes reserved for it"
        ));
    }
    write(path, &image);
    tracing::info!("Padded {} to {:#X} bytes", path.display(), BOOTLOADER_SIZE);
}

/// Padded bootloader followed by the application, as laid out in flash from its base.
fn merge_image(bootloader: &[u8], app: &[u8]) -> Result<Vec<u8>, String> {
    if bootloader.len() != BOOTLOADER_SIZE as usize {
        return Err(format!("bootloader binary is not padded to {BOOTLOADER_SIZE:#X} bytes"));
    }
    let app_region = (FLASH_BASE + FLASH_SIZE - BASE_APP_ADDR) as usize;
    if app.len() > app_region {
        return Err(format!("application is {} bytes, only {app_region} fit", app.len()));
    }

    let mut image = Vec::with_capacity(bootloader.len() + app.len());
    image.extend_from_slice(bootloader);
    image.extend_from_slice(app);
    Ok(image)
}

/// Intel HEX representation of `data` placed at `base`.
fn to_ihex(base: u32, data: &[u8]) -> Result<String, ihex::WriterError> {
    let mut records = vec![];
    let mut segment_upper_address = None;

    for (i, chunk) in data.chunks(16).enumerate() {
        let addr = base + (i as u32) * 16;
        let upper = addr >> 16;

        // write extend linear address record if it has changed
        if segment_upper_address != Some(upper) {
            records.push(ihex::Record::ExtendedLinearAddress(upper as u16));
            segment_upper_address = Some(upper);
        }

        records.push(ihex::Record::Data {
            offset: (addr & 0xffff) as u16,
            value: chunk.to_vec(),
        });
    }
    records.push(ihex::Record::EndOfFile);

    ihex::create_object_file_representation(&records)
}

fn build_package(app: &Path) {
    tracing::info!("Merging bootloader and application in a single image");
    let bootloader = read(&package_dir().join(BOOTLOADER_BIN));
    let app = read(app);

    let image = merge_image(&bootloader, &app).unwrap_or_else(|e| fail(&e));
    let bin = package_dir().join(format!("{FULL_IMAGE}.bin"));
    write(&bin, &image);

    let hex = to_ihex(BASE_BOOTLOADER_ADDR, &image).unwrap_or_else(|e| fail(&format!("Creating ihex failed: {e:?}")));
    write(&package_dir().join(format!("{FULL_IMAGE}.hex")), hex.as_bytes());

    print_binary_size(&bin, "Full Image", FLASH_SIZE);
}

fn print_binary_size(binary_path: &Path, description: &str, available: u32) {
    if let Ok(metadata) = fs::metadata(binary_path) {
        let size_bytes = metadata.len();
        let size_kb = size_bytes as f64 / 1024.0;
        let usage_percentage = (size_bytes as f64 / available as f64) * 100.0;

        println!("{} Size:", description);
        println!("   Bytes: {} bytes", size_bytes);
        println!("   KiB: {:.2} KiB", size_kb);
        println!("   Flash Usage: {:.1}% of {} bytes available", usage_percentage, available);
    } else {
        tracing::warn!("Could not read binary metadata for: {}", binary_path.display());
    }
}

fn main() {
    // Tracing using RUST_LOG, info by default
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = XtaskArgs::parse();

    match args.command {
        Commands::BuildBootloader => {
            build_tools_check(args.verbose);
            build_bootloader(args.verbose);
        }
        Commands::PadBootloader { path } => {
            pad_bootloader_file(&path);
        }
        Commands::Package { app } => {
            build_package(&app);
        }
        Commands::BuildFullImage { app } => {
            build_tools_check(args.verbose);
            build_bootloader(args.verbose);
            build_package(&app);
        }
    }
}
