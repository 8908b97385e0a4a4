// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

extern crate std;

use crate::{Board, Bootloader, Config, FlashHal, Layout, Outcome, Poll, State, Ticks};
use host_protocol::{Control, HostState, HostUpdater, Packet, Transport, PACKET_LEN};
use std::collections::VecDeque;
use std::vec;
use std::vec::Vec;

#[derive(Default)]
struct MockLink {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl Transport for MockLink {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
    }
}

#[derive(Default)]
struct MockFlash {
    unlocked: bool,
    erased: Vec<u32>,
    programmed: Vec<(u32, u16)>,
    fail_program: bool,
}

impl FlashHal for MockFlash {
    type Error = ();

    fn unlock(&mut self) {
        self.unlocked = true;
    }

    fn lock(&mut self) {
        self.unlocked = false;
    }

    fn erase_page(&mut self, address: u32) -> Result<(), ()> {
        assert!(self.unlocked, "erase while locked");
        self.erased.push(address);
        Ok(())
    }

    fn program_halfword(&mut self, address: u32, halfword: u16) -> Result<(), ()> {
        assert!(self.unlocked, "program while locked");
        if self.fail_program {
            return Err(());
        }
        self.programmed.push((address, halfword));
        Ok(())
    }
}

impl MockFlash {
    /// Programmed bytes, in programming order.
    fn bytes(&self) -> Vec<u8> {
        self.programmed.iter().flat_map(|&(_, unit)| unit.to_le_bytes()).collect()
    }
}

#[derive(Default)]
struct MockBoard {
    now: Ticks,
    pulses: Vec<u8>,
    boots: Vec<u32>,
}

impl Board for MockBoard {
    fn now(&self) -> Ticks {
        self.now
    }

    fn pulse_indicator(&mut self, count: u8) {
        self.pulses.push(count);
    }

    fn boot(&mut self, application_base: u32) {
        self.boots.push(application_base);
    }
}

type Device = Bootloader<MockLink, MockFlash, MockBoard>;

const APP_BASE: u32 = consts::BASE_APP_ADDR;

fn device() -> Device {
    Bootloader::new(MockLink::default(), MockFlash::default(), MockBoard::default(), Config::default())
}

fn receive(device: &mut Device, bytes: &[u8]) {
    device.link_mut().rx.extend(bytes.iter().copied());
}

fn receive_packet(device: &mut Device, data: &[u8]) {
    receive(device, &Packet::new(data).unwrap().to_bytes());
}

/// Polls until the device waits for input with nothing left to read.
fn settle(device: &mut Device) -> Poll {
    for _ in 0..10_000 {
        let poll = device.poll();
        if poll != Poll::Pending {
            return poll;
        }
        if device.state().is_waiting() && device.link().rx.is_empty() && !device.channel().packets_available() {
            return poll;
        }
    }
    panic!("device never settled");
}

fn take_tx(device: &mut Device) -> Vec<u8> {
    core::mem::take(&mut device.link_mut().tx)
}

fn frames(controls: &[Control]) -> Vec<u8> {
    controls.iter().flat_map(|&c| Packet::control(c).to_bytes()).collect()
}

fn sync(device: &mut Device) {
    receive(device, &consts::SYNC_MAGIC);
    settle(device);
    assert_eq!(device.state(), State::WaitForUpdateRes);
    assert_eq!(take_tx(device), frames(&[Control::SeqObserved, Control::FwUpdateReq]));
}

fn to_device_id(device: &mut Device) {
    sync(device);
    receive_packet(device, &[0x26]);
    settle(device);
    assert_eq!(device.state(), State::DeviceIdRes);
    assert_eq!(take_tx(device), frames(&[Control::Ack, Control::DeviceIdReq]));
}

fn to_length(device: &mut Device) {
    to_device_id(device);
    receive_packet(device, &[0x32, 0x52]);
    settle(device);
    assert_eq!(device.state(), State::FwLengthRes);
    assert_eq!(take_tx(device), frames(&[Control::Ack, Control::FwLengthReq]));
}

fn to_firmware(device: &mut Device, length: u32) {
    to_length(device);
    let be = length.to_be_bytes();
    receive_packet(device, &[0x36, be[0], be[1], be[2], be[3]]);
    settle(device);
    assert_eq!(device.state(), State::ReceiveFirmware);
    assert_eq!(take_tx(device), frames(&[Control::Ack, Control::ReadyForData]));
}

#[test]
fn successful_update() {
    let image: Vec<u8> = (0..32).collect();
    let mut device = device();
    to_firmware(&mut device, 32);

    let pages: Vec<u32> = Layout::DEFAULT.pages().collect();
    assert_eq!(device.flash().hal().erased, pages);
    assert_eq!(pages[0], APP_BASE);

    receive_packet(&mut device, &image[..16]);
    settle(&mut device);
    assert_eq!(take_tx(&mut device), frames(&[Control::Ack, Control::ReadyForData]));

    receive_packet(&mut device, &image[16..]);
    while device.state() != State::UpdateSuccess {
        assert_eq!(device.poll(), Poll::Pending);
    }
    assert_eq!(device.poll(), Poll::HandedOff(Outcome::Updated));
    assert_eq!(take_tx(&mut device), frames(&[Control::Ack, Control::FwUpdateSuccess]));

    let flash = device.flash().hal();
    // Exactly one erase pass
    assert_eq!(flash.erased, pages);
    let addresses: Vec<u32> = flash.programmed.iter().map(|&(addr, _)| addr).collect();
    let expected: Vec<u32> = (APP_BASE..APP_BASE + 32).step_by(2).collect();
    assert_eq!(addresses, expected);
    assert_eq!(flash.bytes(), image);
    assert!(!flash.unlocked);

    assert_eq!(device.board().pulses, vec![consts::SUCCESS_PULSE_COUNT]);
    assert_eq!(device.board().boots, vec![APP_BASE]);

    // Handed off for good
    assert_eq!(device.poll(), Poll::HandedOff(Outcome::Updated));
    assert_eq!(device.board().boots.len(), 1);
}

#[test]
fn short_last_packet_is_written_whole() {
    let mut device = device();
    to_firmware(&mut device, 20);

    receive_packet(&mut device, &[0xA5; 16]);
    receive_packet(&mut device, &[1, 2, 3, 4]);
    assert_eq!(settle(&mut device), Poll::HandedOff(Outcome::Updated));

    let mut expected = vec![0xA5; 16];
    expected.extend_from_slice(&[1, 2, 3, 4]);
    expected.extend_from_slice(&[0xFF; 12]);
    assert_eq!(device.flash().hal().bytes(), expected);
}

#[test]
fn empty_image_boots_after_erase() {
    let mut device = device();
    to_length(&mut device);

    receive_packet(&mut device, &[0x36, 0, 0, 0, 0]);
    assert_eq!(settle(&mut device), Poll::HandedOff(Outcome::Updated));
    assert_eq!(
        take_tx(&mut device),
        frames(&[Control::Ack, Control::ReadyForData, Control::FwUpdateSuccess])
    );
    assert!(!device.flash().hal().erased.is_empty());
    assert!(device.flash().hal().programmed.is_empty());
    assert_eq!(device.board().boots, vec![APP_BASE]);
}

#[test]
fn sync_found_in_noise() {
    let mut device = device();
    receive(&mut device, &[0x00, 0x13, 0xAA, 0xAA, 0xBB, 0xAA, 0xBB, 0xCC]);
    settle(&mut device);
    assert_eq!(device.state(), State::Sync);
    assert!(take_tx(&mut device).is_empty());

    sync(&mut device);
}

#[test]
fn partial_sync_is_not_enough() {
    let mut device = device();
    receive(&mut device, &[0xAA, 0xBB, 0xCC, 0x00, 0xBB, 0xCC, 0xDD, 0xDD]);
    settle(&mut device);

    assert_eq!(device.state(), State::Sync);
    assert!(take_tx(&mut device).is_empty());
}

fn expect_timeout(device: &mut Device) {
    let deadline = device.timer().deadline();
    assert_eq!(deadline, consts::SESSION_TIMEOUT_MS);
    take_tx(device);

    device.board_mut().now = deadline - 1;
    assert_eq!(device.poll(), Poll::Pending);

    device.board_mut().now = deadline;
    assert_eq!(device.poll(), Poll::HandedOff(Outcome::Failed));
    assert_eq!(take_tx(device), frames(&[Control::FwUpdateFailed]));
    assert_eq!(device.board().boots, vec![APP_BASE]);
    assert!(device.board().pulses.is_empty());
}

#[test]
fn timeout_while_syncing() {
    let mut device = device();
    expect_timeout(&mut device);
}

#[test]
fn timeout_waiting_for_update_response() {
    let mut device = device();
    sync(&mut device);
    expect_timeout(&mut device);
}

#[test]
fn timeout_waiting_for_device_id() {
    let mut device = device();
    to_device_id(&mut device);
    expect_timeout(&mut device);
}

#[test]
fn timeout_waiting_for_length() {
    let mut device = device();
    to_length(&mut device);
    expect_timeout(&mut device);
}

#[test]
fn timeout_waiting_for_data() {
    let mut device = device();
    to_firmware(&mut device, 64);
    receive_packet(&mut device, &[0; 16]);
    settle(&mut device);
    expect_timeout(&mut device);
    assert_eq!(device.flash().hal().programmed.len(), 8);
}

#[test]
fn waiting_states_rearm_the_timer() {
    let mut device = device();
    device.board_mut().now = 9_000;
    sync(&mut device);
    assert_eq!(device.timer().deadline(), 9_000 + consts::SESSION_TIMEOUT_MS);

    device.board_mut().now = 18_000;
    assert_eq!(device.poll(), Poll::Pending);
}

#[test]
fn wrong_device_id_times_out() {
    let mut device = device();
    to_device_id(&mut device);

    receive_packet(&mut device, &[0x32, 0x53]);
    settle(&mut device);
    assert_eq!(device.state(), State::DeviceIdRes);
    expect_timeout(&mut device);
}

#[test]
fn corrupted_frame_is_retransmitted() {
    let mut device = device();
    sync(&mut device);

    let mut bytes = Packet::control(Control::FwUpdateRes).to_bytes();
    bytes[PACKET_LEN - 1] ^= 0x80;
    receive(&mut device, &bytes);
    settle(&mut device);
    assert_eq!(device.state(), State::WaitForUpdateRes);
    assert_eq!(take_tx(&mut device), frames(&[Control::Retx]));

    receive_packet(&mut device, &[0x26]);
    settle(&mut device);
    assert_eq!(device.state(), State::DeviceIdRes);
}

#[test]
fn retransmit_request_replays_last_request() {
    let mut device = device();
    to_length(&mut device);

    receive(&mut device, &Packet::control(Control::Retx).to_bytes());
    settle(&mut device);
    assert_eq!(take_tx(&mut device), frames(&[Control::FwLengthReq]));
    assert_eq!(device.state(), State::FwLengthRes);
}

#[test]
fn flash_fault_fails_forward() {
    let mut device = device();
    to_firmware(&mut device, 32);
    device.flash_mut().hal_mut().fail_program = true;

    receive_packet(&mut device, &[0; 16]);
    assert_eq!(settle(&mut device), Poll::HandedOff(Outcome::Failed));
    assert_eq!(take_tx(&mut device), frames(&[Control::Ack, Control::FwUpdateFailed]));
    assert_eq!(device.board().boots, vec![APP_BASE]);
    assert!(!device.flash().hal().unlocked);
}

/// Byte pipe that flips one bit of the byte at `corrupt_at`.
struct Wire {
    bytes: Vec<u8>,
    passed: usize,
    corrupt_at: Option<usize>,
}

impl Wire {
    fn new(corrupt_at: Option<usize>) -> Self {
        Self {
            bytes: Vec::new(),
            passed: 0,
            corrupt_at,
        }
    }

    fn drain(&mut self) -> Vec<u8> {
        let mut bytes = core::mem::take(&mut self.bytes);
        for byte in bytes.iter_mut() {
            if self.corrupt_at == Some(self.passed) {
                *byte ^= 0x04;
            }
            self.passed += 1;
        }
        bytes
    }
}

impl Transport for Wire {
    fn read_byte(&mut self) -> Option<u8> {
        None
    }

    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

/// Runs a host and a device against each other until the device hands off.
fn run_update(image: &[u8], to_device: Option<usize>, to_host: Option<usize>) -> (Device, HostState) {
    let mut device = device();
    let mut host = HostUpdater::new(image, consts::DEVICE_ID).unwrap();
    let mut host_wire = Wire::new(to_device);
    let mut device_wire = Wire::new(to_host);

    host.start(&mut host_wire);
    for _ in 0..100_000 {
        let outbound = host_wire.drain();
        receive(&mut device, &outbound);

        let poll = device.poll();

        device_wire.write(&take_tx(&mut device));
        for byte in device_wire.drain() {
            host.on_byte(&mut host_wire, byte).unwrap();
        }

        if poll != Poll::Pending {
            return (device, host.state());
        }
    }
    panic!("update never finished, device in {:?}", device.state());
}

fn padded(image: &[u8]) -> Vec<u8> {
    let mut bytes = image.to_vec();
    bytes.resize(image.len().div_ceil(16) * 16, 0xFF);
    bytes
}

#[test]
fn host_updates_device() {
    let image: Vec<u8> = (0..100u8).map(|b| b.wrapping_mul(7)).collect();
    let (device, host) = run_update(&image, None, None);

    assert_eq!(device.state(), State::HandedOff(Outcome::Updated));
    assert_eq!(host, HostState::Done);
    assert_eq!(device.flash().hal().bytes(), padded(&image));
    assert_eq!(device.board().boots, vec![APP_BASE]);
}

#[test]
fn host_updates_device_with_empty_image() {
    let (device, host) = run_update(&[], None, None);

    assert_eq!(device.state(), State::HandedOff(Outcome::Updated));
    assert_eq!(host, HostState::Done);
    assert!(device.flash().hal().programmed.is_empty());
}

#[test]
fn corrupted_chunk_is_recovered() {
    let image: Vec<u8> = (0..48).collect();
    // magic, update response, device id and length frames come first
    let first_chunk_payload = 4 + 3 * PACKET_LEN + 2;
    let (device, host) = run_update(&image, Some(first_chunk_payload), None);

    assert_eq!(host, HostState::Done);
    assert_eq!(device.flash().hal().bytes(), image);
}

#[test]
fn corrupted_device_frame_is_recovered() {
    let image: Vec<u8> = (0..48).collect();
    // SEQ_OBSERVED, FW_UPDATE_REQ, ACK, DEVICE_ID_REQ, ACK, FW_LENGTH_REQ, ACK, READY_FOR_DATA
    let first_ready = 7 * PACKET_LEN + 1;
    let (device, host) = run_update(&image, None, Some(first_ready));

    assert_eq!(host, HostState::Done);
    assert_eq!(device.flash().hal().bytes(), image);
}

#[test]
fn lost_sync_acknowledge_is_recovered() {
    let image: Vec<u8> = (0..16).collect();
    let (device, host) = run_update(&image, None, Some(3));

    assert_eq!(host, HostState::Done);
    assert_eq!(device.flash().hal().bytes(), image);
}
