// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! AT command exchange with the BLE module.

use crate::error::Error;
use crate::transport::{Clock, Link, Transport};
use consts::AT_RESPONSE_SIZE;

/// Response buffer of a single command.
pub type Response = heapless::Vec<u8, AT_RESPONSE_SIZE>;

/// Outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtStatus {
    Ok,
    Error,
    Timeout,
}

impl AtStatus {
    /// Classify a response. The module answers some commands with data and
    /// no final `OK`, so any answer counts as success unless it says `ERROR`.
    pub fn classify(response: &[u8]) -> Self {
        if contains(response, b"OK") {
            AtStatus::Ok
        } else if contains(response, b"ERROR") {
            AtStatus::Error
        } else if !response.is_empty() {
            AtStatus::Ok
        } else {
            AtStatus::Timeout
        }
    }
}

impl<T: Transport, C: Clock, const N: usize> Link<'_, T, C, N> {
    /// Send `command` and wait for its final result line.
    pub fn at_command(&mut self, command: &str, timeout_ms: u64) -> Result<AtStatus, Error> {
        let mut response = Response::new();
        self.at_query(command, timeout_ms, &mut response)
    }

    /// Like [`at_command`](Self::at_command), keeping the response text.
    ///
    /// Stale input is dropped before the command is sent. Reading stops at a
    /// line holding `OK` or `ERROR`, when the buffer is full or at the timeout.
    pub fn at_query(
        &mut self,
        command: &str,
        timeout_ms: u64,
        response: &mut Response,
    ) -> Result<AtStatus, Error> {
        self.flush_input();
        self.send_line(command)?;

        response.clear();
        let deadline = self.now_ms().saturating_add(timeout_ms);
        let mut line_start = 0;
        while !response.is_full() {
            let Some(byte) = self.pop() else {
                if self.now_ms() >= deadline {
                    break;
                }
                core::hint::spin_loop();
                continue;
            };
            // Cannot fail, the buffer is not full.
            let _ = response.push(byte);
            if byte == b'\n' {
                let line = &response[line_start..];
                if contains(line, b"OK") || contains(line, b"ERROR") {
                    break;
                }
                line_start = response.len();
            }
        }

        let status = AtStatus::classify(response);
        debug!("{=str} -> {}", command, status);
        Ok(status)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
