// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Region based access to the internal flash.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

/// Program granularity of the NVMC.
pub const WORD: usize = 4;

/// Fixed, page aligned area of flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    pub start: u32,
    pub size: u32,
}

impl Region {
    pub const fn new(start: u32, size: u32) -> Self {
        Self { start, size }
    }

    /// First address past the region.
    pub const fn end(&self) -> u32 {
        self.start + self.size
    }

    pub fn contains(&self, offset: u32, len: usize) -> bool {
        u32::try_from(len)
            .ok()
            .and_then(|len| offset.checked_add(len))
            .is_some_and(|end| end <= self.size)
    }
}

/// Flash with region bounds checks on every write.
pub struct ImageStore<F> {
    flash: F,
}

impl<F> ImageStore<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }
}

impl<F: ReadNorFlash> ImageStore<F> {
    /// Read `buf.len()` bytes at the absolute `address`.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StoreError> {
        self.flash.read(address, buf).map_err(|_| StoreError::Read)
    }

    /// Read a little-endian word at the absolute `address`.
    pub fn read_u32(&mut self, address: u32) -> Result<u32, StoreError> {
        let mut word = [0; WORD];
        self.read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }
}

impl<F: NorFlash> ImageStore<F> {
    /// Erase a whole region.
    pub fn erase(&mut self, region: Region) -> Result<(), StoreError> {
        self.flash
            .erase(region.start, region.end())
            .map_err(|_| StoreError::Erase)
    }

    /// Program `data` at `offset` inside `region`.
    ///
    /// `offset` must be word aligned. A partial trailing word is merged with
    /// the bytes already in flash.
    pub fn program(&mut self, region: Region, offset: u32, data: &[u8]) -> Result<(), StoreError> {
        if offset as usize % WORD != 0 {
            return Err(StoreError::Unaligned(offset));
        }
        if !region.contains(offset, data.len()) {
            return Err(StoreError::OutOfBounds {
                offset,
                len: data.len(),
            });
        }

        let address = region.start + offset;
        let whole = data.len() - data.len() % WORD;
        if whole > 0 {
            self.flash
                .write(address, &data[..whole])
                .map_err(|_| StoreError::Program)?;
        }

        let rest = &data[whole..];
        if !rest.is_empty() {
            let tail = address + whole as u32;
            let mut word = [0; WORD];
            self.flash
                .read(tail, &mut word)
                .map_err(|_| StoreError::Read)?;
            word[..rest.len()].copy_from_slice(rest);
            self.flash
                .write(tail, &word)
                .map_err(|_| StoreError::Program)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    Erase,
    Program,
    Read,
    Unaligned(u32),
    OutOfBounds { offset: u32, len: usize },
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Erase => write!(f, "flash erase failed"),
            StoreError::Program => write!(f, "flash program failed"),
            StoreError::Read => write!(f, "flash read failed"),
            StoreError::Unaligned(offset) => write!(f, "unaligned program offset {offset:#x}"),
            StoreError::OutOfBounds { offset, len } => {
                write!(f, "program of {len} bytes at {offset:#x} leaves the region")
            }
        }
    }
}
