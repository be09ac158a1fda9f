// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use super::state::{Action, Event, SessionInfo, State, Transition};
use crate::config::{Config, Layout};
use crate::error::Error;
use crate::flash::{ImageStore, Region, StoreError, WORD};
use crate::identity;
use crate::line::LineAssembler;
use crate::metadata::installed_version;
use crate::modem::{self, Mac};
use crate::transport::{Clock, Link, Transport};
use consts::{FLASH_CHUNK_SIZE, LINE_BUFFER_SIZE};
use embedded_storage::nor_flash::NorFlash;
use host_protocol::{Component, PeerMessage};

/// Result of a [`Session::process`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Nothing was received.
    Idle,
    /// Input was consumed, call again.
    Busy,
    /// The session is over, reset the device.
    Reboot,
}

/// Buffers payload so that flash is always programmed at word aligned
/// offsets.
struct SlotWriter {
    chunk: heapless::Vec<u8, FLASH_CHUNK_SIZE>,
    offset: u32,
}

impl SlotWriter {
    const fn new() -> Self {
        Self {
            chunk: heapless::Vec::new(),
            offset: 0,
        }
    }

    fn reset(&mut self) {
        self.chunk.clear();
        self.offset = 0;
    }

    fn push(&mut self, byte: u8) {
        // Never full here, `drain_payload` flushes as soon as it fills up.
        let _ = self.chunk.push(byte);
    }

    fn is_full(&self) -> bool {
        self.chunk.is_full()
    }

    /// Program the word aligned part of the buffer, keep the rest.
    fn flush<F: NorFlash>(&mut self, store: &mut ImageStore<F>, region: Region) -> Result<(), StoreError> {
        let aligned = self.chunk.len() - self.chunk.len() % WORD;
        if aligned == 0 {
            return Ok(());
        }
        store.program(region, self.offset, &self.chunk[..aligned])?;
        self.offset += aligned as u32;
        let rest = self.chunk.len() - aligned;
        self.chunk.copy_within(aligned.., 0);
        self.chunk.truncate(rest);
        Ok(())
    }

    /// Program everything, merging a partial last word with flash.
    fn finish<F: NorFlash>(&mut self, store: &mut ImageStore<F>, region: Region) -> Result<(), StoreError> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        store.program(region, self.offset, &self.chunk)?;
        self.offset += self.chunk.len() as u32;
        self.chunk.clear();
        Ok(())
    }
}

/// One download session, from the connection wait to the final reboot.
pub struct Session<'q, F, T, C, const N: usize> {
    store: ImageStore<F>,
    link: Link<'q, T, C, N>,
    layout: Layout,
    at_timeout_ms: u64,
    info: SessionInfo,
    lines: LineAssembler<LINE_BUFFER_SIZE>,
    state: State,
    writer: SlotWriter,
}

impl<'q, F, T, C, const N: usize> Session<'q, F, T, C, N>
where
    F: NorFlash,
    T: Transport,
    C: Clock,
{
    /// Start a session on a module that is already advertising.
    pub fn new(mut store: ImageStore<F>, link: Link<'q, T, C, N>, config: &Config, mac: Mac) -> Self {
        let layout = config.layout;
        let info = SessionInfo {
            device_id: identity::load(&mut store, layout.params),
            mac,
            bootloader_version: installed_version(&mut store, layout.bootloader),
            app_version: installed_version(&mut store, layout.slot_b),
            capacity: layout.slot_a.size,
            connect_wait_ms: config.connect_wait_ms,
        };
        info!(
            "session start, id {}, BL {=str}, APP {=str}",
            info.device_id,
            info.bootloader_version.as_str(),
            info.app_version.as_str()
        );
        let state = State::initial(link.now_ms());
        Self {
            store,
            link,
            layout,
            at_timeout_ms: config.at_timeout_ms,
            info,
            lines: LineAssembler::new(),
            state,
            writer: SlotWriter::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn store(&self) -> &ImageStore<F> {
        &self.store
    }

    pub fn link(&self) -> &Link<'q, T, C, N> {
        &self.link
    }

    /// Consume everything received so far and advance the protocol.
    pub fn process(&mut self) -> Result<Status, Error> {
        let mut status = Status::Idle;
        self.step(Event::Poll {
            now_ms: self.link.now_ms(),
        })?;

        while self.state != State::Complete {
            if let Some((component, pending)) = self.state.pending_payload() {
                let taken = self.drain_payload(component, pending)?;
                if taken == 0 {
                    break;
                }
                status = Status::Busy;
                self.step(Event::Payload(taken))?;
                continue;
            }

            let Some(byte) = self.link.pop() else {
                break;
            };
            status = Status::Busy;
            let Some(line) = self.lines.push(byte) else {
                continue;
            };
            let mut text = heapless::String::<LINE_BUFFER_SIZE>::new();
            match core::str::from_utf8(line) {
                // Same capacity as the assembler.
                Ok(line) => {
                    let _ = text.push_str(line);
                }
                Err(_) => continue,
            }
            match PeerMessage::parse(&text)? {
                Some(message) => self.step(Event::Line(message))?,
                None => debug!("unrelated line {=str}", text.as_str()),
            }
        }

        if self.state == State::Complete {
            return Ok(Status::Reboot);
        }
        Ok(status)
    }

    /// Send the peer notice and diagnostic for a fatal error.
    pub fn abort<D: embedded_hal::delay::DelayNs>(&mut self, error: &Error, delay: &mut D, flush_ms: u32) {
        super::dying_gasp(&mut self.link, error, delay, flush_ms);
    }

    /// Apply `event`, then run the entry actions of transient states.
    fn step(&mut self, event: Event<'_>) -> Result<(), Error> {
        let mut event = event;
        loop {
            let Transition { state, action, reply } = self.state.next(event, &self.info)?;
            let persisted = execute(
                action,
                &mut self.store,
                &mut self.link,
                &self.layout,
                &mut self.writer,
                self.at_timeout_ms,
            )?;
            if let Some(reply) = reply {
                self.link.send_line(reply)?;
            }
            if state != self.state {
                debug!("{} -> {}", self.state, state);
            }
            self.state = state;
            if let Some(id) = persisted {
                self.info.device_id = Some(id);
            }

            if !self.state.is_transient() {
                return Ok(());
            }
            event = Event::Poll {
                now_ms: self.link.now_ms(),
            };
        }
    }

    /// Move up to `pending` payload bytes from the receive queue into slot A.
    fn drain_payload(&mut self, component: Component, pending: u32) -> Result<u32, Error> {
        let mut taken = 0;
        while taken < pending {
            let Some(byte) = self.link.pop() else {
                break;
            };
            self.writer.push(byte);
            taken += 1;
            if self.writer.is_full() {
                self.writer
                    .flush(&mut self.store, self.layout.slot_a)
                    .map_err(|_| Error::Program(component))?;
            }
        }
        if taken > 0 && taken == pending {
            self.writer
                .flush(&mut self.store, self.layout.slot_a)
                .map_err(|_| Error::Program(component))?;
        }
        Ok(taken)
    }
}

/// Perform a side effect requested by a transition. Returns the identity
/// that was stored, if any.
fn execute<F, T, C, const N: usize>(
    action: Action,
    store: &mut ImageStore<F>,
    link: &mut Link<'_, T, C, N>,
    layout: &Layout,
    writer: &mut SlotWriter,
    at_timeout_ms: u64,
) -> Result<Option<u16>, Error>
where
    F: NorFlash,
    T: Transport,
    C: Clock,
{
    match action {
        Action::None => {}
        Action::EnterPassthrough => modem::enter_passthrough(link, at_timeout_ms)?,
        Action::PersistId(id) => {
            identity::save(store, layout.params, id).map_err(|_| Error::PersistIdentity)?;
            info!("device id {=u16} stored", id);
            return Ok(Some(id));
        }
        Action::BeginTransfer { component, size } => {
            info!("erasing slot A for {} bytes", size);
            store.erase(layout.slot_a).map_err(|_| Error::Erase(component))?;
            writer.reset();
        }
        Action::CommitTransfer(component) => {
            writer
                .finish(store, layout.slot_a)
                .map_err(|_| Error::Program(component))?;
        }
    }
    Ok(None)
}
