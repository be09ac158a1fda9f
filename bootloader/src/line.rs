// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Splits received bytes into LF terminated lines.
///
/// Carriage returns are dropped wherever they appear. A line holds at most
/// `N - 1` bytes, anything past that is discarded up to the next LF.
pub struct LineAssembler<const N: usize> {
    buf: heapless::Vec<u8, N>,
    complete: bool,
}

impl<const N: usize> LineAssembler<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            complete: false,
        }
    }

    /// Feed one byte. Returns the finished line when `byte` is a LF.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }
        match byte {
            b'\r' => None,
            b'\n' => {
                self.complete = true;
                Some(&self.buf[..])
            }
            _ => {
                if self.buf.len() < N.saturating_sub(1) {
                    // Cannot fail, the length was checked above.
                    let _ = self.buf.push(byte);
                }
                None
            }
        }
    }
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}
