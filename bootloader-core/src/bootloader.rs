// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::flash::{FlashError, FlashHal, FlashProgrammer};
use crate::log::{error, info, trace, warn};
use crate::session::{transition, Config, Effect, Event, Outcome, Session, State};
use crate::timer::{Ticks, Timer};
use host_protocol::{Channel, Transport};

/// Board services the session needs besides the link and the flash.
pub trait Board {
    /// Monotonic tick counter, in the unit of [`Config::session_timeout`].
    fn now(&self) -> Ticks;

    /// Blinks the status indicator `count` times.
    fn pulse_indicator(&mut self, count: u8);

    /// Hands control to the application whose vector table is at `application_base`.
    ///
    /// The target implementation may defer the jump until pending output is flushed,
    /// [`Bootloader::poll`] never runs another step once this was called.
    fn boot(&mut self, application_base: u32);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Poll {
    Pending,
    HandedOff(Outcome),
}

/// Drives an update session, one step per [`Bootloader::poll`].
pub struct Bootloader<L, F, B> {
    link: L,
    flash: FlashProgrammer<F>,
    board: B,
    channel: Channel,
    timer: Timer,
    session: Session,
    config: Config,
}

impl<L, F, B> Bootloader<L, F, B>
where
    L: Transport,
    F: FlashHal,
    B: Board,
{
    /// Starts a session in [`State::Sync`], the session timer runs from now.
    pub fn new(link: L, flash: F, board: B, config: Config) -> Self {
        let timer = Timer::new(config.session_timeout, false, board.now());
        info!("Bootloader waiting for sync, deadline {}", timer.deadline());

        Self {
            link,
            flash: FlashProgrammer::new(flash, config.layout),
            board,
            channel: Channel::new(),
            timer,
            session: Session::new(&config.layout),
            config,
        }
    }

    /// Runs one session step: reads at most one byte, then carries out the effects
    /// of the resulting transition.
    pub fn poll(&mut self) -> Poll {
        if let State::HandedOff(outcome) = self.session.state {
            return Poll::HandedOff(outcome);
        }

        let event = self.next_event();
        self.step(event);

        match self.session.state {
            State::HandedOff(outcome) => Poll::HandedOff(outcome),
            _ => Poll::Pending,
        }
    }

    fn next_event(&mut self) -> Event {
        let state = self.session.state;
        if !state.is_waiting() {
            return Event::Idle;
        }

        if self.timer.has_elapsed(self.board.now()) {
            warn!("Timeout in {:?}", state);
            return Event::Timeout;
        }

        if state == State::Sync {
            return self.link.read_byte().map_or(Event::Idle, Event::Byte);
        }

        self.channel.update(&mut self.link);
        self.channel.read().map_or(Event::Idle, Event::Packet)
    }

    fn step(&mut self, event: Event) {
        let before = self.session.state;
        let (session, effects) = transition(self.session, event, &self.config);
        self.session = session;
        if session.state != before {
            info!("{:?} -> {:?}", before, session.state);
        }

        if self.apply(&effects).is_err() {
            error!("Flash operation failed in {:?}, aborting update", self.session.state);
            let (session, effects) = transition(self.session, Event::Fault, &self.config);
            self.session = session;
            // The failure path only sends and boots, it cannot fail again
            let _ = self.apply(&effects);
        }
    }

    fn apply(&mut self, effects: &[Effect]) -> Result<(), FlashError<F::Error>> {
        for effect in effects {
            match *effect {
                Effect::Send(control) => {
                    trace!("Sending {:?}", control);
                    self.channel.send(&mut self.link, control);
                }
                Effect::ArmTimer => self.timer.reset(self.board.now(), 0),
                Effect::EraseApplication => self.flash.erase_application()?,
                Effect::Program { address, data } => self.flash.write(address, &data)?,
                Effect::Pulse(count) => self.board.pulse_indicator(count),
                Effect::Boot(address) => {
                    info!("Booting application at {:#x}", address);
                    self.board.boot(address);
                }
            }
        }
        Ok(())
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn flash(&self) -> &FlashProgrammer<F> {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut FlashProgrammer<F> {
        &mut self.flash
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }
}
