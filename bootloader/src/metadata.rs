// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Locating the metadata record of the image stored in a region.

use crate::flash::{ImageStore, Region};
use app_metadata::{has_magic, Metadata, ALIGNMENT};
use embedded_storage::nor_flash::ReadNorFlash;

/// A metadata record found in flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Absolute address of the record.
    pub address: u32,
    pub metadata: Metadata,
}

impl Record {
    /// Whether the record is the trailer of an image that fits `region`.
    pub fn is_placed(&self, region: Region) -> bool {
        if self.metadata.size() > region.size {
            return false;
        }
        self.metadata
            .expected_offset()
            .is_some_and(|offset| region.start + offset == self.address)
    }
}

/// Find the first record in `region`.
///
/// Only aligned addresses where a whole record still fits are searched.
/// Read failures are treated as "no record here".
pub fn find_metadata<F: ReadNorFlash>(
    store: &mut ImageStore<F>,
    region: Region,
) -> Option<Record> {
    scan(store, region, region.start)
}

/// Find the first record at or after `address`.
fn scan<F: ReadNorFlash>(store: &mut ImageStore<F>, region: Region, mut address: u32) -> Option<Record> {
    while address + Metadata::SIZE as u32 <= region.end() {
        let mut signature = [0; 16];
        if store.read(address, &mut signature).is_ok() && has_magic(&signature) {
            let mut raw = [0; Metadata::SIZE];
            store.read(address, &mut raw).ok()?;
            return Some(Record {
                address,
                metadata: Metadata::from_bytes(&raw),
            });
        }
        address += ALIGNMENT as u32;
    }
    None
}

/// Find the trailing record of the image in `region`.
///
/// Signatures that are not at the end of the image they describe, such as the
/// magic constants inside a firmware binary, are skipped.
pub fn find_placed_metadata<F: ReadNorFlash>(
    store: &mut ImageStore<F>,
    region: Region,
) -> Option<Record> {
    let mut address = region.start;
    while let Some(record) = scan(store, region, address) {
        if record.is_placed(region) {
            return Some(record);
        }
        address = record.address + ALIGNMENT as u32;
    }
    None
}

/// Version of the image in `region`, or [`consts::VERSION_NONE`].
pub fn installed_version<F: ReadNorFlash>(
    store: &mut ImageStore<F>,
    region: Region,
) -> heapless::String<8> {
    let mut version = heapless::String::new();
    if let Some(record) = find_placed_metadata(store, region) {
        if let Ok(found) = record.metadata.version() {
            if !found.is_empty() && version.push_str(found).is_ok() {
                return version;
            }
        }
    }
    version.clear();
    // The placeholder is shorter than the version field.
    let _ = version.push_str(consts::VERSION_NONE);
    version
}
