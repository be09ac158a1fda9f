// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device identity assigned by the peer on first pairing.
//!
//! Stored at the start of the parameters page as the magic, the identity
//! (both little-endian) and two padding bytes left erased.

use crate::flash::{ImageStore, Region, StoreError};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

/// "WELL"
pub const MAGIC: u32 = 0x5745_4C4C;

pub const RECORD_SIZE: usize = 8;

pub fn encode(id: u16) -> [u8; RECORD_SIZE] {
    let mut record = [0xFF; RECORD_SIZE];
    record[..4].copy_from_slice(&MAGIC.to_le_bytes());
    record[4..6].copy_from_slice(&id.to_le_bytes());
    record
}

pub fn decode(record: &[u8; RECORD_SIZE]) -> Option<u16> {
    if record[..4] != MAGIC.to_le_bytes() {
        return None;
    }
    Some(u16::from_le_bytes([record[4], record[5]]))
}

/// Read the stored identity. An unreadable page counts as no identity.
pub fn load<F: ReadNorFlash>(store: &mut ImageStore<F>, region: Region) -> Option<u16> {
    let mut record = [0; RECORD_SIZE];
    store.read(region.start, &mut record).ok()?;
    decode(&record)
}

/// Replace the stored identity.
pub fn save<F: NorFlash>(store: &mut ImageStore<F>, region: Region, id: u16) -> Result<(), StoreError> {
    store.erase(region)?;
    store.program(region, 0, &encode(id))
}
