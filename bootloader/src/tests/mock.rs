// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::Config;
use crate::ring::{ByteQueue, Overflow};
use crate::transport::{Clock, Link, Transport};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

pub const QUEUE: usize = consts::RX_BUFFER_SIZE;
pub type Queue = ByteQueue<QUEUE>;
pub type TestLink<'q> = Link<'q, ScriptTransport<'q>, MockClock, QUEUE>;

/// Flash contents with NOR semantics: erase sets bytes to `0xFF` and a write
/// can only clear bits.
#[derive(Clone)]
pub struct MockFlash {
    pub data: Vec<u8>,
    pub fail_erase: bool,
    pub fail_write: bool,
    pub erases: usize,
    pub writes: usize,
}

impl MockFlash {
    pub fn new() -> Self {
        Self {
            data: vec![0xFF; consts::FLASH_SIZE as usize],
            fail_erase: false,
            fail_write: false,
            erases: 0,
            writes: 0,
        }
    }

    /// Put `bytes` at `address` regardless of the current contents.
    pub fn place(&mut self, address: u32, bytes: &[u8]) {
        let start = address as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn slice(&self, address: u32, len: usize) -> &[u8] {
        &self.data[address as usize..address as usize + len]
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let src = self
            .data
            .get(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = consts::FLASH_PAGE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if self.fail_erase {
            return Err(NorFlashErrorKind::Other);
        }
        if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        self.data
            .get_mut(from as usize..to as usize)
            .ok_or(NorFlashErrorKind::OutOfBounds)?
            .fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_write {
            return Err(NorFlashErrorKind::Other);
        }
        if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        let start = offset as usize;
        let dst = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        for (cell, byte) in dst.iter_mut().zip(bytes) {
            *cell &= byte;
        }
        self.writes += 1;
        Ok(())
    }
}

/// Clock that moves forward by a millisecond every time it is read, so
/// polling loops always reach their deadline.
pub struct MockClock(pub Rc<Cell<u64>>);

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        let now = self.0.get();
        self.0.set(now + 1);
        now
    }
}

/// Delay that advances the shared clock instead of sleeping.
pub struct MockDelay(pub Rc<Cell<u64>>);

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns).div_ceil(1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.set(self.0.get() + u64::from(ms));
    }
}

/// Output line that records every level change.
pub struct MockPin {
    pub name: &'static str,
    pub log: Rc<RefCell<Vec<(&'static str, bool)>>>,
}

impl PinErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push((self.name, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push((self.name, true));
        Ok(())
    }
}

/// Stands in for the BLE module and the peer behind it.
///
/// Every line sent is logged. The first unused rule whose prefix matches the
/// line injects its reply into the receive queue, AT commands without a rule
/// are answered with `OK`.
pub struct ScriptTransport<'q> {
    rx: &'q Queue,
    partial: Vec<u8>,
    log: Rc<RefCell<Vec<String>>>,
    rules: Vec<(String, Vec<u8>)>,
    pub fail: bool,
}

impl ScriptTransport<'_> {
    fn respond(&mut self, line: &str) {
        if let Some(index) = self
            .rules
            .iter()
            .position(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            let (_, reply) = self.rules.remove(index);
            inject(self.rx, &reply);
        } else if line.starts_with("AT") {
            inject(self.rx, b"OK\r\n");
        }
    }
}

impl Transport for ScriptTransport<'_> {
    type Error = ();

    fn transmit(&mut self, data: &[u8], _timeout_ms: u64) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.partial.extend_from_slice(data);
        while let Some(end) = self.partial.windows(2).position(|w| w == b"\r\n") {
            let raw: Vec<u8> = self.partial.drain(..end + 2).collect();
            let line = String::from_utf8_lossy(&raw[..end]).into_owned();
            self.respond(&line);
            self.log.borrow_mut().push(line);
        }
        Ok(())
    }
}

pub fn inject(queue: &Queue, bytes: &[u8]) {
    for &byte in bytes {
        queue.push(byte, Overflow::Reject).expect("receive queue full");
    }
}

pub fn rule(prefix: &str, reply: impl AsRef<[u8]>) -> (String, Vec<u8>) {
    (prefix.to_string(), reply.as_ref().to_vec())
}

/// Shared state of one test: the receive queue, time and the sent lines.
pub struct Rig {
    pub queue: Queue,
    pub time: Rc<Cell<u64>>,
    pub log: Rc<RefCell<Vec<String>>>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            queue: Queue::new(),
            time: Rc::new(Cell::new(0)),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn link(&self, rules: Vec<(String, Vec<u8>)>) -> TestLink<'_> {
        let transport = ScriptTransport {
            rx: &self.queue,
            partial: Vec::new(),
            log: self.log.clone(),
            rules,
            fail: false,
        };
        Link::new(transport, MockClock(self.time.clone()), &self.queue)
    }

    pub fn delay(&self) -> MockDelay {
        MockDelay(self.time.clone())
    }

    pub fn lines(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Lines sent after the AT bring-up and passthrough switch.
    pub fn protocol_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| !line.starts_with("AT"))
            .collect()
    }
}

/// Defaults without the connection wait.
pub fn config() -> Config {
    Config {
        connect_wait_ms: 0,
        ..Config::default()
    }
}
