// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Byte link to the BLE module.

use crate::error::Error;
use crate::ring::ByteQueue;
use core::fmt::Display;
use host_protocol::encode_line;

/// Blocking UART transmit.
pub trait Transport {
    type Error;

    fn transmit(&mut self, data: &[u8], timeout_ms: u64) -> Result<(), Self::Error>;
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Longest line the link renders before sending.
pub const MAX_TX_LINE: usize = 128;

/// Transmit timeout for a single line.
const TX_TIMEOUT_MS: u64 = 1000;

/// Transmit half plus the receive queue filled by the UART interrupt.
pub struct Link<'q, T, C, const N: usize> {
    transport: T,
    clock: C,
    rx: &'q ByteQueue<N>,
}

impl<'q, T: Transport, C: Clock, const N: usize> Link<'q, T, C, N> {
    pub fn new(transport: T, clock: C, rx: &'q ByteQueue<N>) -> Self {
        Self { transport, clock, rx }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn transmit(&mut self, data: &[u8]) -> Result<(), Error> {
        self.transport
            .transmit(data, TX_TIMEOUT_MS)
            .map_err(|_| Error::Transport)
    }

    /// Send `line` followed by CR/LF. A line longer than [`MAX_TX_LINE`] is
    /// not sent at all.
    pub fn send_line(&mut self, line: impl Display) -> Result<(), Error> {
        let line = encode_line::<MAX_TX_LINE>(&line)?;
        self.transmit(line.as_bytes())
    }

    /// Next received byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        self.rx.pop()
    }

    /// Fill `buf` from the receive queue until it is full or `timeout_ms`
    /// elapsed. Returns the number of bytes received.
    pub fn receive(&mut self, buf: &mut [u8], timeout_ms: u64) -> usize {
        let deadline = self.now_ms().saturating_add(timeout_ms);
        let mut len = 0;
        while len < buf.len() {
            match self.rx.pop() {
                Some(byte) => {
                    buf[len] = byte;
                    len += 1;
                }
                None if self.now_ms() >= deadline => break,
                None => core::hint::spin_loop(),
            }
        }
        len
    }

    /// Drop everything received so far.
    pub fn flush_input(&mut self) {
        self.rx.clear();
    }
}
