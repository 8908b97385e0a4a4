// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host side of an update session.
//!
//! [`HostUpdater`] answers the bootloader requests one frame at a time: it sends the
//! sync magic, confirms the update, tells the device identifier and the image length,
//! then streams the image in 16 bytes chunks, one per `READY_FOR_DATA`.
//! Every frame sent must be acknowledged before the next request is served. Until then
//! only retransmit requests and a failure report are acted upon.
//! Device frames are never acknowledged, a corrupted one is asked again with a
//! retransmit request and a retransmit request from the device replays the last frame.

use crate::channel::Transport;
use crate::codec::{Frame, PacketCodec};
use crate::log::{debug, info, warn};
use crate::packet::{Control, Packet, PacketError, PACKET_LEN, PAYLOAD_LEN};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// Image does not fit the 32 bits length field
    ImageTooLarge(usize),
    /// Device sent `FW_UPDATE_FAILED`
    DeviceFailed,
    Packet(PacketError),
}

impl From<PacketError> for HostError {
    fn from(err: PacketError) -> Self {
        HostError::Packet(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostState {
    /// Magic sent, waiting for `SEQ_OBSERVED`
    Sync,
    AwaitUpdateRequest,
    AwaitDeviceIdRequest,
    AwaitLengthRequest,
    /// Waiting for `READY_FOR_DATA` before the next chunk
    AwaitReady,
    AwaitSuccess,
    Done,
    Failed,
}

pub struct HostUpdater<'a> {
    image: &'a [u8],
    device_id: u8,
    magic: [u8; 4],
    state: HostState,
    offset: usize,
    codec: PacketCodec,
    last_sent: Option<[u8; PACKET_LEN]>,
    awaiting_ack: bool,
}

impl<'a> HostUpdater<'a> {
    pub fn new(image: &'a [u8], device_id: u8) -> Result<Self, HostError> {
        if u32::try_from(image.len()).is_err() {
            return Err(HostError::ImageTooLarge(image.len()));
        }

        Ok(Self {
            image,
            device_id,
            magic: consts::SYNC_MAGIC,
            state: HostState::Sync,
            offset: 0,
            codec: PacketCodec::new(),
            last_sent: None,
            awaiting_ack: false,
        })
    }

    /// Overrides the sync sequence sent by [`HostUpdater::start`].
    pub fn with_magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    /// Sends the sync magic. May be called again while the device has not answered.
    pub fn start<T: Transport>(&mut self, link: &mut T) {
        debug!("Sending sync sequence");
        link.write(&self.magic);
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// Image bytes handed to the device so far.
    pub fn bytes_sent(&self) -> usize {
        self.offset.min(self.image.len())
    }

    /// True while the last frame sent has not been acknowledged by the device.
    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, HostState::Done | HostState::Failed)
    }

    fn transmit<T: Transport>(&mut self, link: &mut T, packet: &Packet) {
        let bytes = PacketCodec::encode(packet);
        link.write(&bytes);
        self.last_sent = Some(bytes);
        self.awaiting_ack = true;
    }

    /// Feeds one byte received from the device.
    pub fn on_byte<T: Transport>(&mut self, link: &mut T, byte: u8) -> Result<(), HostError> {
        if self.is_finished() {
            return Ok(());
        }

        match self.codec.feed(byte) {
            None => Ok(()),
            Some(Frame::Invalid(_)) => {
                debug!("Corrupted frame from device, asking for retransmit");
                link.write(&Packet::control(Control::Retx).to_bytes());
                Ok(())
            }
            Some(Frame::Valid(packet)) => self.on_packet(link, &packet),
        }
    }

    fn on_packet<T: Transport>(&mut self, link: &mut T, packet: &Packet) -> Result<(), HostError> {
        let Some(control) = packet.as_control() else {
            debug!("Ignoring unexpected data frame");
            return Ok(());
        };

        match (self.state, control) {
            (_, Control::Retx) => {
                if let Some(bytes) = self.last_sent {
                    debug!("Device asked for retransmit");
                    link.write(&bytes);
                }
            }
            (_, Control::Ack) => {
                self.awaiting_ack = false;
            }
            (_, Control::FwUpdateFailed) => {
                warn!("Device reported update failure");
                self.state = HostState::Failed;
                return Err(HostError::DeviceFailed);
            }
            // Last frame not taken by the device yet, a replayed request must not advance
            (state, control) if self.awaiting_ack => {
                debug!("Ignoring {:?} in {:?} until acknowledged", control, state);
            }
            (HostState::Sync, Control::SeqObserved) => {
                info!("Device in sync");
                self.state = HostState::AwaitUpdateRequest;
            }
            // A lost SEQ_OBSERVED shows up as the update request following it
            (HostState::Sync | HostState::AwaitUpdateRequest, Control::FwUpdateReq) => {
                self.transmit(link, &Packet::control(Control::FwUpdateRes));
                self.state = HostState::AwaitDeviceIdRequest;
            }
            (HostState::AwaitDeviceIdRequest, Control::DeviceIdReq) => {
                self.transmit(link, &Packet::new(&[Control::DeviceIdRes.code(), self.device_id])?);
                self.state = HostState::AwaitLengthRequest;
            }
            (HostState::AwaitLengthRequest, Control::FwLengthReq) => {
                let len = self.image.len() as u32;
                let mut data = [Control::FwLengthRes.code(), 0, 0, 0, 0];
                data[1..].copy_from_slice(&len.to_be_bytes());
                info!("Announcing {} bytes image", len);
                self.transmit(link, &Packet::new(&data)?);
                self.state = HostState::AwaitReady;
            }
            (HostState::AwaitReady, Control::ReadyForData) => {
                if self.offset < self.image.len() {
                    let end = (self.offset + PAYLOAD_LEN).min(self.image.len());
                    let chunk = Packet::new(&self.image[self.offset..end])?;
                    self.transmit(link, &chunk);
                    self.offset += PAYLOAD_LEN;
                    debug!("Sent {} of {} bytes", self.bytes_sent(), self.image.len());
                }
                if self.offset >= self.image.len() {
                    self.state = HostState::AwaitSuccess;
                }
            }
            (HostState::AwaitSuccess, Control::FwUpdateSuccess) => {
                info!("Update completed");
                self.state = HostState::Done;
            }
            (state, control) => {
                debug!("Ignoring {:?} in {:?}", control, state);
            }
        }
        Ok(())
    }
}
